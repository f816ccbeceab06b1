/// Specifies the direction for sorting query results.
///
/// # Variants
/// - `Ascending`: Sort from smallest to largest value (A to Z, 0 to 9)
/// - `Descending`: Sort from largest to smallest value (Z to A, 9 to 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Sort in ascending order
    Ascending,
    /// Sort in descending order
    Descending,
}

impl SortOrder {
    /// Returns the query-language keyword for this direction.
    pub fn keyword(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// An ordered list of `(field, direction)` pairs describing result ordering.
///
/// A `Sort` is immutable once attached to a query; `and` returns an extended
/// copy so partially built sorts can be shared safely.
///
/// # Examples
///
/// ```rust,ignore
/// use docket::common::{Sort, SortOrder};
///
/// let sort = Sort::by("lastname", SortOrder::Ascending)
///     .and("firstname", SortOrder::Descending);
/// assert!(sort.is_sorted());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sort {
    orders: Vec<(String, SortOrder)>,
}

impl Sort {
    /// Creates an empty sort carrying no ordering instructions.
    pub fn unsorted() -> Self {
        Sort { orders: Vec::new() }
    }

    /// Creates a sort with a single `(field, direction)` pair.
    pub fn by(field: &str, order: SortOrder) -> Self {
        Sort {
            orders: vec![(field.to_string(), order)],
        }
    }

    /// Returns a copy of this sort extended with another pair.
    pub fn and(mut self, field: &str, order: SortOrder) -> Self {
        self.orders.push((field.to_string(), order));
        self
    }

    /// Whether this sort carries at least one ordering instruction.
    pub fn is_sorted(&self) -> bool {
        !self.orders.is_empty()
    }

    /// The ordered `(field, direction)` pairs.
    pub fn orders(&self) -> &[(String, SortOrder)] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsorted() {
        let sort = Sort::unsorted();
        assert!(!sort.is_sorted());
        assert!(sort.is_empty());
    }

    #[test]
    fn test_by_and() {
        let sort = Sort::by("lastname", SortOrder::Ascending).and("age", SortOrder::Descending);
        assert!(sort.is_sorted());
        assert_eq!(sort.len(), 2);
        assert_eq!(sort.orders()[0].0, "lastname");
        assert_eq!(sort.orders()[1].1, SortOrder::Descending);
    }

    #[test]
    fn test_keyword() {
        assert_eq!(SortOrder::Ascending.keyword(), "ASC");
        assert_eq!(SortOrder::Descending.keyword(), "DESC");
    }
}
