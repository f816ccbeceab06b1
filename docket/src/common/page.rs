use crate::common::Sort;

/// A pagination request: zero-based page number, page size and an optional
/// sort that takes precedence over any sort derived from a method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pageable {
    page_number: u64,
    page_size: u64,
    sort: Sort,
}

impl Pageable {
    /// Creates a pagination request for the given zero-based page.
    pub fn of(page_number: u64, page_size: u64) -> Self {
        Pageable {
            page_number,
            page_size,
            sort: Sort::unsorted(),
        }
    }

    /// Returns a copy of this request carrying the given sort.
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn page_number(&self) -> u64 {
        self.page_number
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// The number of rows to skip for this page.
    pub fn offset(&self) -> u64 {
        self.page_number * self.page_size
    }
}

/// A page of results together with the exact total row count.
///
/// Obtaining the total requires a second, derived count query; use
/// [`Slice`] when only "is there a next page" is needed.
#[derive(Debug, Clone)]
pub struct Page<T> {
    content: Vec<T>,
    pageable: Pageable,
    total_elements: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, pageable: Pageable, total_elements: u64) -> Self {
        Page {
            content,
            pageable,
            total_elements,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn pageable(&self) -> &Pageable {
        &self.pageable
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> u64 {
        if self.pageable.page_size() == 0 {
            return 1;
        }
        self.total_elements.div_ceil(self.pageable.page_size())
    }

    pub fn has_next(&self) -> bool {
        self.pageable.page_number() + 1 < self.total_pages()
    }
}

/// A slice of results that only knows whether a next page exists.
///
/// Produced by over-fetching one row beyond the page size and truncating;
/// no count query is issued.
#[derive(Debug, Clone)]
pub struct Slice<T> {
    content: Vec<T>,
    pageable: Pageable,
    has_next: bool,
}

impl<T> Slice<T> {
    pub fn new(content: Vec<T>, pageable: Pageable, has_next: bool) -> Self {
        Slice {
            content,
            pageable,
            has_next,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn pageable(&self) -> &Pageable {
        &self.pageable
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }
}
