use crate::common::{Pageable, Sort};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde_json::Value;

/// One runtime argument of a repository method invocation.
///
/// `Single` and `Multi` wrap values that originate from an asynchronous
/// source; they are drained before query creation so the derivation logic
/// stays synchronous.
pub enum Arg {
    Value(Value),
    Pageable(Pageable),
    Sort(Sort),
    /// An asynchronous single value.
    Single(BoxFuture<'static, DocketResult<Value>>),
    /// An asynchronous value sequence; buffered into an array.
    Multi(BoxStream<'static, DocketResult<Value>>),
}

impl std::fmt::Debug for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Arg::Pageable(pageable) => f.debug_tuple("Pageable").field(pageable).finish(),
            Arg::Sort(sort) => f.debug_tuple("Sort").field(sort).finish(),
            Arg::Single(_) => f.write_str("Single(..)"),
            Arg::Multi(_) => f.write_str("Multi(..)"),
        }
    }
}

/// The resolved arguments of one invocation.
///
/// Construction drains every asynchronous wrapper exactly once, up front,
/// and memoizes the result; everything the query creators see afterwards is
/// a plain value. This is what lets synchronously written derivation logic
/// accept arguments from an asynchronous source.
#[derive(Debug)]
pub struct ParameterAccessor {
    values: Vec<Value>,
    pageable: Option<Pageable>,
    sort: Option<Sort>,
}

impl ParameterAccessor {
    /// Resolves the arguments, awaiting asynchronous wrappers.
    pub async fn resolve(args: Vec<Arg>) -> DocketResult<ParameterAccessor> {
        let mut values = Vec::new();
        let mut pageable = None;
        let mut sort = None;
        for arg in args {
            match arg {
                Arg::Value(value) => values.push(value),
                Arg::Pageable(p) => pageable = Some(p),
                Arg::Sort(s) => sort = Some(s),
                Arg::Single(future) => values.push(future.await?),
                Arg::Multi(stream) => {
                    let buffered: Vec<Value> = stream.try_collect().await?;
                    values.push(Value::Array(buffered));
                }
            }
        }
        Ok(ParameterAccessor {
            values,
            pageable,
            sort,
        })
    }

    /// Resolves the arguments on the calling thread.
    pub fn resolve_blocking(args: Vec<Arg>) -> DocketResult<ParameterAccessor> {
        futures::executor::block_on(Self::resolve(args))
    }

    pub fn pageable(&self) -> Option<&Pageable> {
        self.pageable.as_ref()
    }

    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }

    /// The bindable values, in declaration order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// A cursor over the bindable values for part-tree folding.
    pub fn iterator(&self) -> ParameterIterator<'_> {
        ParameterIterator {
            values: &self.values,
            position: 0,
        }
    }
}

/// A single-pass cursor over the resolved bindable values.
///
/// Each operator consumes exactly its arity; zero-parameter operators must
/// not call [`next`].
///
/// [`next`]: ParameterIterator::next
pub struct ParameterIterator<'a> {
    values: &'a [Value],
    position: usize,
}

impl<'a> ParameterIterator<'a> {
    pub fn next(&mut self) -> DocketResult<Value> {
        match self.values.get(self.position) {
            Some(value) => {
                self.position += 1;
                Ok(value.clone())
            }
            None => {
                log::error!(
                    "Query derivation consumed more parameters than supplied ({})",
                    self.values.len()
                );
                Err(DocketError::new(
                    &format!(
                        "Not enough parameters: {} supplied, more required",
                        self.values.len()
                    ),
                    ErrorKind::QueryCreationError,
                ))
            }
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SortOrder;
    use futures::FutureExt;
    use futures::StreamExt;
    use serde_json::json;

    #[test]
    fn test_plain_values_resolve_in_order() {
        let accessor = ParameterAccessor::resolve_blocking(vec![
            Arg::Value(json!("Ada")),
            Arg::Value(json!(30)),
        ])
        .unwrap();
        assert_eq!(accessor.values(), &[json!("Ada"), json!(30)]);
    }

    #[test]
    fn test_single_wrapper_is_drained() {
        let accessor = ParameterAccessor::resolve_blocking(vec![
            Arg::Single(async { Ok(json!("Ada")) }.boxed()),
            Arg::Value(json!(true)),
        ])
        .unwrap();
        assert_eq!(accessor.values(), &[json!("Ada"), json!(true)]);
    }

    #[test]
    fn test_multi_wrapper_is_buffered_into_array() {
        let stream = futures::stream::iter(vec![Ok(json!("a")), Ok(json!("b"))]).boxed();
        let accessor = ParameterAccessor::resolve_blocking(vec![Arg::Multi(stream)]).unwrap();
        assert_eq!(accessor.values(), &[json!(["a", "b"])]);
    }

    #[test]
    fn test_wrapper_failure_propagates() {
        let err = ParameterAccessor::resolve_blocking(vec![Arg::Single(
            async { Err(DocketError::new("upstream failed", ErrorKind::StoreError)) }.boxed(),
        )])
        .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::StoreError);
    }

    #[test]
    fn test_pageable_and_sort_are_separated() {
        let accessor = ParameterAccessor::resolve_blocking(vec![
            Arg::Value(json!(1)),
            Arg::Pageable(Pageable::of(0, 10)),
            Arg::Sort(Sort::by("name", SortOrder::Ascending)),
        ])
        .unwrap();
        assert_eq!(accessor.values().len(), 1);
        assert!(accessor.pageable().is_some());
        assert!(accessor.sort().is_some());
    }

    #[test]
    fn test_iterator_exhaustion_is_an_error() {
        let accessor = ParameterAccessor::resolve_blocking(vec![Arg::Value(json!(1))]).unwrap();
        let mut iter = accessor.iterator();
        assert_eq!(iter.next().unwrap(), json!(1));
        let err = iter.next().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::QueryCreationError);
    }
}
