use crate::common::{Pageable, ScanConsistency, Sort, SortOrder};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::mapping::EntityMetadata;
use crate::part::{PartKeyword, PartTree};
use crate::query::{Criteria, CriteriaOperator, Query};
use crate::repository::binding::ParameterIterator;
use serde_json::Value;

// A part with its property path already resolved against the entity.
#[derive(Debug, Clone)]
struct ResolvedPart {
    path: String,
    operator: CriteriaOperator,
}

/// Derives a [`Query`] from a parsed method name.
///
/// All configuration work happens in [`new`]: every keyword is mapped onto a
/// criteria operator and every property segment is resolved against the
/// entity, so a malformed method name fails when the repository is
/// assembled. [`create`] only folds the parts over the runtime parameters.
///
/// [`new`]: PartTreeQueryCreator::new
/// [`create`]: PartTreeQueryCreator::create
pub struct PartTreeQueryCreator {
    tree: PartTree,
    or_groups: Vec<Vec<ResolvedPart>>,
    name_sort: Sort,
    distinct_fields: Vec<String>,
}

impl std::fmt::Debug for PartTreeQueryCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartTreeQueryCreator")
            .field("tree", &self.tree)
            .finish_non_exhaustive()
    }
}

impl PartTreeQueryCreator {
    pub fn new(tree: PartTree, metadata: &EntityMetadata) -> DocketResult<PartTreeQueryCreator> {
        let mut or_groups = Vec::new();
        for group in tree.or_groups() {
            let mut resolved = Vec::new();
            for part in group {
                resolved.push(ResolvedPart {
                    path: metadata.resolve_path(&part.property)?,
                    operator: map_keyword(part.keyword)?,
                });
            }
            or_groups.push(resolved);
        }
        let mut name_sort = Sort::unsorted();
        for (segment, direction) in tree.sort() {
            let path = metadata.resolve_path(segment)?;
            name_sort = name_sort.and(&path, *direction);
        }
        let mut distinct_fields = Vec::new();
        for segment in &tree.subject().distinct_segments {
            distinct_fields.push(metadata.resolve_path(segment)?);
        }
        Ok(PartTreeQueryCreator {
            tree,
            or_groups,
            name_sort,
            distinct_fields,
        })
    }

    pub fn tree(&self) -> &PartTree {
        &self.tree
    }

    pub fn distinct_fields(&self) -> &[String] {
        &self.distinct_fields
    }

    /// The method-name result limit (`findTop3By…`), if any.
    pub fn overall_limit(&self) -> Option<u64> {
        self.tree.subject().limit
    }

    /// Folds the parts into a query, consuming runtime parameters in order.
    ///
    /// Parts within an OR-group are AND-ed left to right, groups are OR-ed;
    /// each operator advances the parameter cursor by exactly its arity. A
    /// sort carried by the pagination request wins over a standalone sort
    /// parameter, which wins over any sort encoded in the method name.
    pub fn create(
        &self,
        params: &mut ParameterIterator<'_>,
        pageable: Option<&Pageable>,
        sort_param: Option<&Sort>,
        consistency: ScanConsistency,
    ) -> DocketResult<Query> {
        let mut criteria: Option<Criteria> = None;
        for group in &self.or_groups {
            let mut group_criteria: Option<Criteria> = None;
            for part in group {
                let leaf = self.create_leaf(part, params)?;
                group_criteria = Some(match group_criteria {
                    Some(existing) => existing.and(leaf),
                    None => leaf,
                });
            }
            if let Some(group_criteria) = group_criteria {
                criteria = Some(match criteria {
                    Some(existing) => existing.or(group_criteria),
                    None => group_criteria,
                });
            }
        }
        let mut query = Query::new().with_consistency(consistency);
        if let Some(criteria) = criteria {
            query = query.add_criteria(criteria);
        }
        query = query.with_sort(self.effective_sort(pageable, sort_param));
        if let Some(limit) = self.tree.subject().limit {
            query = query.limit(limit as i64);
        }
        if !self.distinct_fields.is_empty() {
            query = query.distinct_fields(self.distinct_fields.clone());
        }
        Ok(query)
    }

    fn effective_sort(&self, pageable: Option<&Pageable>, sort_param: Option<&Sort>) -> Sort {
        if let Some(pageable) = pageable {
            if pageable.sort().is_sorted() {
                return pageable.sort().clone();
            }
        }
        if let Some(sort) = sort_param {
            if sort.is_sorted() {
                return sort.clone();
            }
        }
        self.name_sort.clone()
    }

    fn create_leaf(
        &self,
        part: &ResolvedPart,
        params: &mut ParameterIterator<'_>,
    ) -> DocketResult<Criteria> {
        let mut values: Vec<Value> = Vec::new();
        for _ in 0..part.operator.arity() {
            values.push(params.next()?);
        }
        Criteria::leaf(&part.path, part.operator, values)
    }
}

fn map_keyword(keyword: PartKeyword) -> DocketResult<CriteriaOperator> {
    let operator = match keyword {
        PartKeyword::SimpleProperty => CriteriaOperator::Eq,
        PartKeyword::NegatingSimpleProperty => CriteriaOperator::Ne,
        PartKeyword::GreaterThan => CriteriaOperator::Gt,
        PartKeyword::GreaterThanEqual => CriteriaOperator::Gte,
        PartKeyword::LessThan => CriteriaOperator::Lt,
        PartKeyword::LessThanEqual => CriteriaOperator::Lte,
        PartKeyword::Between => CriteriaOperator::Between,
        PartKeyword::IsNull => CriteriaOperator::IsNull,
        PartKeyword::IsNotNull => CriteriaOperator::IsNotNull,
        PartKeyword::Like => CriteriaOperator::Like,
        PartKeyword::NotLike => CriteriaOperator::NotLike,
        PartKeyword::StartingWith => CriteriaOperator::StartsWith,
        PartKeyword::EndingWith => CriteriaOperator::EndsWith,
        PartKeyword::Containing => CriteriaOperator::Contains,
        PartKeyword::NotContaining => CriteriaOperator::NotContains,
        PartKeyword::In => CriteriaOperator::In,
        PartKeyword::NotIn => CriteriaOperator::NotIn,
        PartKeyword::Regex => CriteriaOperator::Regex,
        PartKeyword::Exists => CriteriaOperator::Exists,
        PartKeyword::True => CriteriaOperator::True,
        PartKeyword::False => CriteriaOperator::False,
        PartKeyword::Near | PartKeyword::Within => {
            log::error!("Keyword {:?} is not supported by statement derivation", keyword);
            return Err(DocketError::new(
                &format!(
                    "Unsupported keyword {:?}; geo predicates require the view backend",
                    keyword
                ),
                ErrorKind::QueryCreationError,
            ));
        }
    };
    Ok(operator)
}
