use std::collections::HashSet;

use docket::common::SortOrder;
use docket::mapping::EntityMetadata;
use docket::part::{PartKeyword, PartTree};
use docket::repository::binding::{ParameterAccessor, ParameterIterator};
use docket::{DocketError, DocketResult, ErrorKind};
use serde_json::Value;

use crate::view_query::ViewQuery;

/// High-sentinel appended to a `StartingWith` prefix to form an exclusive
/// end-key. This exploits index collation ordering rather than true prefix
/// matching; it assumes the sentinel sorts after every valid key character.
/// Kept byte-for-byte so range bounds stay compatible with existing indexes.
const PREFIX_SENTINEL: char = '\u{efff}';

fn view_error(message: &str) -> DocketError {
    DocketError::new(message, ErrorKind::Extension("view".to_string()))
}

/// A built view query, plus the derivation facts the execution layer needs
/// downstream (whether a limit applies and whether the reduce phase ran).
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedViewQuery {
    pub built_query: ViewQuery,
    pub is_limited: bool,
    pub is_reduce: bool,
}

/// Derives a [`ViewQuery`] from a parsed method-name part tree.
///
/// Support is deliberately narrow: every part must reference the same single
/// property (the view emits one key), `Or` is unsupported, and only key-range
/// keywords are accepted:
///
/// - `GreaterThanEqual` sets the start key
/// - `LessThanEqual` sets the end key, inclusive
/// - `LessThan` sets the end key, exclusive
/// - `Between` sets both keys
/// - `StartingWith` (string keys only) sets the start key and an end key
///   formed by appending [`PREFIX_SENTINEL`], exclusive
/// - a plain property (`Is`/`Equals`) sets an exact key; the argument may be
///   omitted when it is the only part (e.g. `findAllByUsername`)
/// - `In` sets the keys array; a scalar argument is wrapped as a singleton
///
/// All restrictions are checked at construction so a misdeclared method
/// fails when the repository is assembled, not on first call.
#[derive(Debug)]
pub struct ViewQueryCreator {
    tree: PartTree,
    explicit_reduce: bool,
}

impl ViewQueryCreator {
    pub fn new(
        tree: PartTree,
        metadata: &EntityMetadata,
        explicit_reduce: bool,
    ) -> DocketResult<ViewQueryCreator> {
        if tree.or_groups().len() > 1 {
            return Err(view_error("Or is not supported for view-based queries"));
        }

        let mut properties = HashSet::new();
        for group in tree.or_groups() {
            for part in group {
                properties.insert(metadata.resolve_path(&part.property)?);
                if !Self::supports(part.keyword) {
                    log::error!(
                        "unsupported keyword {:?} in view query derivation",
                        part.keyword
                    );
                    return Err(view_error(&format!(
                        "Unsupported keyword in view query derivation: {:?}",
                        part.keyword
                    )));
                }
            }
        }
        if properties.len() > 1 {
            return Err(view_error("View-based queries do not support compound keys"));
        }

        Ok(ViewQueryCreator {
            tree,
            explicit_reduce,
        })
    }

    fn supports(keyword: PartKeyword) -> bool {
        matches!(
            keyword,
            PartKeyword::SimpleProperty
                | PartKeyword::GreaterThanEqual
                | PartKeyword::LessThanEqual
                | PartKeyword::LessThan
                | PartKeyword::Between
                | PartKeyword::StartingWith
                | PartKeyword::In
        )
    }

    /// Applies the derived key restrictions, ordering, limit and reduce flag
    /// to `query`.
    pub fn derive(
        &self,
        mut query: ViewQuery,
        accessor: &ParameterAccessor,
    ) -> DocketResult<DerivedViewQuery> {
        let part_count: usize = self.tree.or_groups().iter().map(|g| g.len()).sum();
        let mut params = accessor.iterator();

        for group in self.tree.or_groups() {
            for part in group {
                query = self.apply(query, part.keyword, &mut params, part_count, accessor)?;
            }
        }

        let orders = self.effective_orders(accessor);
        if orders.len() > 1 {
            return Err(view_error(&format!(
                "Detected {} sort instructions, maximum one supported",
                orders.len()
            )));
        }
        if let Some((_, direction)) = orders.first() {
            query = query.descending(*direction == SortOrder::Descending);
        }

        let is_limited = self.tree.subject().limit.is_some();
        if let Some(limit) = self.tree.subject().limit {
            query = query.limit(limit);
        }

        let is_reduce = self.tree.subject().count || self.explicit_reduce;
        if is_reduce {
            query = query.reduce(true);
        }

        Ok(DerivedViewQuery {
            built_query: query,
            is_limited,
            is_reduce,
        })
    }

    // Pageable-borne sort wins over a standalone sort, then the
    // name-derived sort.
    fn effective_orders(&self, accessor: &ParameterAccessor) -> Vec<(String, SortOrder)> {
        if let Some(pageable) = accessor.pageable() {
            if pageable.sort().is_sorted() {
                return pageable.sort().orders().to_vec();
            }
        }
        if let Some(sort) = accessor.sort() {
            if sort.is_sorted() {
                return sort.orders().to_vec();
            }
        }
        self.tree.sort().to_vec()
    }

    fn apply(
        &self,
        query: ViewQuery,
        keyword: PartKeyword,
        params: &mut ParameterIterator<'_>,
        part_count: usize,
        accessor: &ParameterAccessor,
    ) -> DocketResult<ViewQuery> {
        match keyword {
            PartKeyword::GreaterThanEqual => Ok(query.start_key(params.next()?)),
            PartKeyword::LessThanEqual => Ok(query.inclusive_end(true).end_key(params.next()?)),
            PartKeyword::LessThan => Ok(query.end_key(params.next()?)),
            PartKeyword::Between => {
                let start = params.next()?;
                let end = params.next()?;
                Ok(query.start_key(start).end_key(end))
            }
            PartKeyword::StartingWith => {
                let prefix = match params.next()? {
                    Value::String(prefix) => prefix,
                    other => {
                        return Err(view_error(&format!(
                            "Expected a string key prefix, got {}",
                            other
                        )))
                    }
                };
                let mut end = prefix.clone();
                end.push(PREFIX_SENTINEL);
                Ok(query.start_key(prefix).end_key(end).inclusive_end(false))
            }
            PartKeyword::SimpleProperty => {
                if params.position() >= accessor.values().len() {
                    if part_count > 1 {
                        return Err(view_error("Not enough parameters for key"));
                    }
                    // pattern like findAllByUsername(), the view itself
                    // already selects on the property
                    return Ok(query);
                }
                Ok(query.key(params.next()?))
            }
            PartKeyword::In => {
                let keys = match params.next()? {
                    Value::Array(values) => values,
                    scalar => vec![scalar],
                };
                Ok(query.keys(keys))
            }
            // ruled out at construction
            other => Err(view_error(&format!(
                "Unsupported keyword in view query derivation: {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket::common::{Pageable, Sort};
    use docket::repository::binding::Arg;
    use serde_json::json;

    // Setup only one time throughout the project.
    // It will take effect during test, project wide
    #[ctor::ctor]
    fn init() {
        colog::init();
    }

    fn metadata() -> EntityMetadata {
        EntityMetadata::builder("users", "com.example.User").build()
    }

    fn creator(method_name: &str) -> DocketResult<ViewQueryCreator> {
        let tree = PartTree::parse(method_name).unwrap();
        ViewQueryCreator::new(tree, &metadata(), false)
    }

    fn accessor(args: Vec<Arg>) -> ParameterAccessor {
        ParameterAccessor::resolve_blocking(args).unwrap()
    }

    fn base() -> ViewQuery {
        ViewQuery::from("users", "by_name")
    }

    #[test]
    fn test_compound_keys_are_rejected_at_construction() {
        let err = creator("findByFirstnameAndLastname").unwrap_err();
        assert!(err.message().contains("compound keys"));
        assert_eq!(err.kind(), &ErrorKind::Extension("view".to_string()));
    }

    #[test]
    fn test_or_is_rejected_at_construction() {
        let err = creator("findByAgeGreaterThanEqualOrAgeLessThan").unwrap_err();
        assert!(err.message().contains("Or is not supported"));
    }

    #[test]
    fn test_unsupported_keyword_is_rejected_at_construction() {
        let err = creator("findByUsernameContaining").unwrap_err();
        assert!(err.message().contains("Unsupported keyword"));
    }

    #[test]
    fn test_starting_with_appends_high_sentinel() {
        let derived = creator("findByUsernameStartingWith")
            .unwrap()
            .derive(base(), &accessor(vec![Arg::Value(json!("ada"))]))
            .unwrap();
        let params = derived.built_query.params();
        assert_eq!(params["startkey"], json!("ada"));
        assert_eq!(params["endkey"], json!("ada\u{efff}"));
        assert_eq!(params["inclusive_end"], json!(false));
    }

    #[test]
    fn test_starting_with_requires_a_string() {
        let err = creator("findByUsernameStartingWith")
            .unwrap()
            .derive(base(), &accessor(vec![Arg::Value(json!(42))]))
            .unwrap_err();
        assert!(err.message().contains("Expected a string key prefix"));
    }

    #[test]
    fn test_less_than_equal_is_inclusive() {
        let derived = creator("findByAgeLessThanEqual")
            .unwrap()
            .derive(base(), &accessor(vec![Arg::Value(json!(65))]))
            .unwrap();
        let params = derived.built_query.params();
        assert_eq!(params["endkey"], json!(65));
        assert_eq!(params["inclusive_end"], json!(true));
    }

    #[test]
    fn test_less_than_is_exclusive() {
        let derived = creator("findByAgeLessThan")
            .unwrap()
            .derive(base(), &accessor(vec![Arg::Value(json!(65))]))
            .unwrap();
        let params = derived.built_query.params();
        assert_eq!(params["endkey"], json!(65));
        assert!(!params.contains_key("inclusive_end"));
    }

    #[test]
    fn test_between_sets_both_keys() {
        let derived = creator("findByAgeBetween")
            .unwrap()
            .derive(
                base(),
                &accessor(vec![Arg::Value(json!(18)), Arg::Value(json!(65))]),
            )
            .unwrap();
        let params = derived.built_query.params();
        assert_eq!(params["startkey"], json!(18));
        assert_eq!(params["endkey"], json!(65));
    }

    #[test]
    fn test_simple_property_without_argument_applies_no_key() {
        let derived = creator("findAllByUsername")
            .unwrap()
            .derive(base(), &accessor(Vec::new()))
            .unwrap();
        assert!(derived.built_query.params().is_empty());
    }

    #[test]
    fn test_in_wraps_scalar_argument() {
        let derived = creator("findByUsernameIn")
            .unwrap()
            .derive(base(), &accessor(vec![Arg::Value(json!("ada"))]))
            .unwrap();
        assert_eq!(derived.built_query.params()["keys"], json!(["ada"]));
    }

    #[test]
    fn test_order_by_desc_sets_descending() {
        let derived = creator("findByAgeGreaterThanEqualOrderByAgeDesc")
            .unwrap()
            .derive(base(), &accessor(vec![Arg::Value(json!(18))]))
            .unwrap();
        assert_eq!(derived.built_query.params()["descending"], json!(true));
    }

    #[test]
    fn test_pageable_sort_takes_precedence() {
        let pageable = Pageable::of(0, 10).with_sort(Sort::by("age", SortOrder::Descending));
        let derived = creator("findByAgeGreaterThanEqualOrderByAgeAsc")
            .unwrap()
            .derive(
                base(),
                &accessor(vec![Arg::Value(json!(18)), Arg::Pageable(pageable)]),
            )
            .unwrap();
        assert_eq!(derived.built_query.params()["descending"], json!(true));
    }

    #[test]
    fn test_multiple_sort_instructions_are_rejected() {
        let sort = Sort::by("age", SortOrder::Ascending).and("username", SortOrder::Descending);
        let err = creator("findByAgeGreaterThanEqual")
            .unwrap()
            .derive(
                base(),
                &accessor(vec![Arg::Value(json!(18)), Arg::Sort(sort)]),
            )
            .unwrap_err();
        assert!(err.message().contains("Detected 2 sort instructions"));
    }

    #[test]
    fn test_limiting_method_sets_limit() {
        let derived = creator("findFirst5ByAgeGreaterThanEqual")
            .unwrap()
            .derive(base(), &accessor(vec![Arg::Value(json!(18))]))
            .unwrap();
        assert!(derived.is_limited);
        assert_eq!(derived.built_query.params()["limit"], json!(5));
    }

    #[test]
    fn test_count_method_triggers_reduce() {
        let derived = creator("countByUsername")
            .unwrap()
            .derive(base(), &accessor(vec![Arg::Value(json!("ada"))]))
            .unwrap();
        assert!(derived.is_reduce);
        assert_eq!(derived.built_query.params()["reduce"], json!(true));
    }

    #[test]
    fn test_explicit_reduce_flag_triggers_reduce() {
        let tree = PartTree::parse("findByUsername").unwrap();
        let derived = ViewQueryCreator::new(tree, &metadata(), true)
            .unwrap()
            .derive(base(), &accessor(vec![Arg::Value(json!("ada"))]))
            .unwrap();
        assert!(derived.is_reduce);
    }
}
