use crate::common::{CallScope, ScanConsistency};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use std::sync::Arc;

/// The declared return shape of a repository method.
///
/// Fixed at method construction; the execution dispatcher is keyed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    /// At most one entity.
    One,
    /// A fully materialized collection of entities.
    Many,
    /// A page with an exact total (issues an extra count query).
    Page,
    /// A slice that only knows whether a next page exists.
    Slice,
    /// A lazy iterator over entities.
    Stream,
    /// A count projection.
    Count,
    /// An existence check.
    Exists,
    /// No result (delete methods discarding the removed entities).
    Void,
}

/// One declared method parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterDescriptor {
    /// A value bound into the query, optionally under an explicit
    /// placeholder name (required for named-placeholder templates).
    Bindable { name: Option<String> },
    /// The pagination request.
    Pageable,
    /// A standalone sort.
    Sort,
}

impl ParameterDescriptor {
    pub fn bindable() -> Self {
        ParameterDescriptor::Bindable { name: None }
    }

    pub fn named(name: &str) -> Self {
        ParameterDescriptor::Bindable {
            name: Some(name.trim_start_matches(':').to_string()),
        }
    }
}

struct MethodInner {
    name: String,
    shape: ReturnShape,
    parameters: Vec<ParameterDescriptor>,
    inline_query: Option<String>,
    consistency: ScanConsistency,
    scope: CallScope,
    reactive: bool,
    count: bool,
    exists: bool,
    delete: bool,
}

/// Immutable metadata describing one repository method.
///
/// Classified exactly once, when the repository is assembled; a malformed
/// declaration fails here, before the method ever receives traffic.
/// Clones share the same inner state and are safe for unsynchronized
/// concurrent reads.
#[derive(Clone)]
pub struct QueryMethod {
    inner: Arc<MethodInner>,
}

impl std::fmt::Debug for QueryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryMethod")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl QueryMethod {
    pub fn builder(name: &str) -> QueryMethodBuilder {
        QueryMethodBuilder {
            name: name.to_string(),
            shape: ReturnShape::Many,
            parameters: Vec::new(),
            inline_query: None,
            consistency: ScanConsistency::default(),
            scope: CallScope::none(),
            reactive: false,
            count_override: None,
            exists_override: None,
            delete_override: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn shape(&self) -> ReturnShape {
        self.inner.shape
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.inner.parameters
    }

    pub fn inline_query(&self) -> Option<&str> {
        self.inner.inline_query.as_deref()
    }

    pub fn consistency(&self) -> ScanConsistency {
        self.inner.consistency
    }

    /// The scope/collection the method's annotations pin it to.
    pub fn scope(&self) -> &CallScope {
        &self.inner.scope
    }

    pub fn is_reactive(&self) -> bool {
        self.inner.reactive
    }

    pub fn is_count_query(&self) -> bool {
        self.inner.count
    }

    pub fn is_exists_query(&self) -> bool {
        self.inner.exists
    }

    pub fn is_delete_query(&self) -> bool {
        self.inner.delete
    }

    pub fn is_page_query(&self) -> bool {
        self.inner.shape == ReturnShape::Page
    }

    pub fn is_slice_query(&self) -> bool {
        self.inner.shape == ReturnShape::Slice
    }

    pub fn has_pageable_parameter(&self) -> bool {
        self.inner
            .parameters
            .iter()
            .any(|p| matches!(p, ParameterDescriptor::Pageable))
    }

    pub fn has_sort_parameter(&self) -> bool {
        self.inner
            .parameters
            .iter()
            .any(|p| matches!(p, ParameterDescriptor::Sort))
    }

    /// Names of the bindable parameters, in declaration order.
    pub fn bindable_names(&self) -> Vec<Option<&str>> {
        self.inner
            .parameters
            .iter()
            .filter_map(|p| match p {
                ParameterDescriptor::Bindable { name } => Some(name.as_deref()),
                _ => None,
            })
            .collect()
    }
}

/// Builder for [`QueryMethod`]; `build` runs the configuration checks.
pub struct QueryMethodBuilder {
    name: String,
    shape: ReturnShape,
    parameters: Vec<ParameterDescriptor>,
    inline_query: Option<String>,
    consistency: ScanConsistency,
    scope: CallScope,
    reactive: bool,
    count_override: Option<bool>,
    exists_override: Option<bool>,
    delete_override: Option<bool>,
}

impl QueryMethodBuilder {
    pub fn returns(mut self, shape: ReturnShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn parameter(mut self, descriptor: ParameterDescriptor) -> Self {
        self.parameters.push(descriptor);
        self
    }

    /// Declares an inline query template instead of name derivation.
    pub fn inline_query(mut self, template: &str) -> Self {
        self.inline_query = Some(template.to_string());
        self
    }

    pub fn consistency(mut self, consistency: ScanConsistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn scope(mut self, scope: CallScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn reactive(mut self) -> Self {
        self.reactive = true;
        self
    }

    /// Annotation override for count intent; wins over the name prefix.
    pub fn count_query(mut self, flag: bool) -> Self {
        self.count_override = Some(flag);
        self
    }

    /// Annotation override for exists intent; wins over the name prefix.
    pub fn exists_query(mut self, flag: bool) -> Self {
        self.exists_override = Some(flag);
        self
    }

    /// Annotation override for delete intent; wins over the name prefix.
    pub fn delete_query(mut self, flag: bool) -> Self {
        self.delete_override = Some(flag);
        self
    }

    pub fn build(self) -> DocketResult<QueryMethod> {
        let lowered = self.name.to_lowercase();
        let count = self
            .count_override
            .unwrap_or_else(|| lowered.starts_with("count"));
        let exists = self
            .exists_override
            .unwrap_or_else(|| lowered.starts_with("exists"));
        let delete = self
            .delete_override
            .unwrap_or_else(|| lowered.starts_with("delete") || lowered.starts_with("remove"));
        let intents = [count, exists, delete].iter().filter(|f| **f).count();
        if intents > 1 {
            log::error!(
                "Method '{}' is simultaneously count/exists/delete",
                self.name
            );
            return Err(DocketError::new(
                &format!(
                    "Method {} must declare at most one of count, exists and delete",
                    self.name
                ),
                ErrorKind::InvalidQueryMethod,
            ));
        }
        let has_pageable = self
            .parameters
            .iter()
            .any(|p| matches!(p, ParameterDescriptor::Pageable));
        let has_sort = self
            .parameters
            .iter()
            .any(|p| matches!(p, ParameterDescriptor::Sort));
        if has_pageable && has_sort {
            return Err(DocketError::new(
                &format!(
                    "Method {} must not declare both a Pageable and a Sort parameter; \
                     put the sort on the Pageable",
                    self.name
                ),
                ErrorKind::InvalidQueryMethod,
            ));
        }
        if self.reactive && matches!(self.shape, ReturnShape::Page | ReturnShape::Slice) {
            return Err(DocketError::new(
                &format!(
                    "Reactive method {} cannot return a Page or Slice; \
                     consume the stream and page on the client",
                    self.name
                ),
                ErrorKind::InvalidQueryMethod,
            ));
        }
        Ok(QueryMethod {
            inner: Arc::new(MethodInner {
                name: self.name,
                shape: self.shape,
                parameters: self.parameters,
                inline_query: self.inline_query,
                consistency: self.consistency,
                scope: self.scope,
                reactive: self.reactive,
                count,
                exists,
                delete,
            }),
        })
    }
}
