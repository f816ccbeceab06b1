use crate::common::{JsonObject, Page, Pageable, ScanConsistency, Slice};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::mapping::{DocumentConverter, EntityMetadata, SerdeConverter};
use crate::query::{ParameterSink, Query, CAS_ALIAS, ID_ALIAS};
use crate::store::{Placeholders, StoreOperations};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// A query ready for submission: either a derived criteria query rendered
/// per call, or a pre-rendered template statement with bound placeholders.
#[derive(Debug, Clone)]
pub enum PreparedStatement {
    Derived(Query),
    Template {
        statement: String,
        count_statement: Option<String>,
        placeholders: Placeholders,
        consistency: ScanConsistency,
    },
}

impl PreparedStatement {
    /// Renders the data statement, optionally forcing pagination.
    ///
    /// For a derived query the pagination is applied to a copy; the prepared
    /// statement itself is never mutated, so it can serve the data query and
    /// the count query of the same invocation.
    pub fn data(
        &self,
        metadata: &EntityMetadata,
        pagination: Option<(i64, i64)>,
    ) -> DocketResult<(String, Placeholders, ScanConsistency)> {
        match self {
            PreparedStatement::Derived(query) => {
                let effective = match pagination {
                    Some((skip, limit)) => query.clone().skip(skip).limit(limit),
                    None => query.clone(),
                };
                let mut sink = ParameterSink::positional();
                let statement = effective.render(metadata, &mut sink)?;
                let values = sink.into_values();
                let placeholders = if values.is_empty() {
                    Placeholders::None
                } else {
                    Placeholders::Positional(values)
                };
                Ok((statement, placeholders, query.consistency()))
            }
            PreparedStatement::Template {
                statement,
                placeholders,
                consistency,
                ..
            } => {
                let statement = match pagination {
                    Some((skip, limit)) => {
                        format!("{} LIMIT {} OFFSET {}", statement, limit, skip)
                    }
                    None => statement.clone(),
                };
                Ok((statement, placeholders.clone(), *consistency))
            }
        }
    }

    /// Renders the count statement: criteria only, no sort or pagination.
    pub fn count(
        &self,
        metadata: &EntityMetadata,
    ) -> DocketResult<(String, Placeholders, ScanConsistency)> {
        match self {
            PreparedStatement::Derived(query) => {
                let count_query = query.to_count_query();
                let mut sink = ParameterSink::positional();
                let statement = count_query.render_count(metadata, &mut sink)?;
                let values = sink.into_values();
                let placeholders = if values.is_empty() {
                    Placeholders::None
                } else {
                    Placeholders::Positional(values)
                };
                Ok((statement, placeholders, query.consistency()))
            }
            PreparedStatement::Template {
                count_statement,
                placeholders,
                consistency,
                ..
            } => match count_statement {
                Some(statement) => Ok((statement.clone(), placeholders.clone(), *consistency)),
                None => Err(DocketError::new(
                    "Template has no count variant; use the full-select template variable",
                    ErrorKind::InvalidOperation,
                )),
            },
        }
    }
}

/// The terminal action selected for one invocation.
#[derive(Debug, Clone)]
pub enum ExecutionAction {
    Single { limiting: bool },
    Collection,
    Stream,
    Page(Pageable),
    Slice(Pageable),
    Count,
    Exists,
    /// `void` marks a delete whose caller discards the removed entities;
    /// row conversion is skipped entirely for those.
    Delete { void: bool },
}

/// What an invocation produced, shaped by the declared return type.
pub enum QueryOutcome<T> {
    Single(Option<T>),
    Collection(Vec<T>),
    Page(Page<T>),
    Slice(Slice<T>),
    Stream(EntityIter<T>),
    Count(u64),
    Exists(bool),
    Removed(Vec<T>),
}

impl<T> std::fmt::Debug for QueryOutcome<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            QueryOutcome::Single(_) => "Single",
            QueryOutcome::Collection(_) => "Collection",
            QueryOutcome::Page(_) => "Page",
            QueryOutcome::Slice(_) => "Slice",
            QueryOutcome::Stream(_) => "Stream",
            QueryOutcome::Count(_) => "Count",
            QueryOutcome::Exists(_) => "Exists",
            QueryOutcome::Removed(_) => "Removed",
        };
        f.debug_tuple(&format!("QueryOutcome::{variant}")).finish()
    }
}

/// A lazy, single-pass iterator over converted entities.
///
/// In blocking mode the rows are already fully fetched; only the conversion
/// is deferred to each `next` call.
pub struct EntityIter<T> {
    rows: std::vec::IntoIter<JsonObject>,
    converter: SerdeConverter,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for EntityIter<T> {
    type Item = DocketResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(|row| convert_row(&self.converter, row))
    }
}

/// Strips the statement-level meta aliases and converts a raw row.
pub fn convert_row<T: DeserializeOwned>(
    converter: &SerdeConverter,
    mut row: JsonObject,
) -> DocketResult<T> {
    row.remove(ID_ALIAS);
    row.remove(CAS_ALIAS);
    converter.from_document(row)
}

/// Extracts a primitive projection value: exactly one row with exactly one
/// column, anything else is ambiguous.
pub fn extract_scalar(rows: &[JsonObject]) -> DocketResult<&serde_json::Value> {
    if rows.len() != 1 {
        return Err(DocketError::new(
            &format!(
                "Expected exactly one result row for a primitive projection, got {}",
                rows.len()
            ),
            ErrorKind::AmbiguousResult,
        ));
    }
    let row = &rows[0];
    if row.len() != 1 {
        return Err(DocketError::new(
            &format!(
                "Expected exactly one column for a primitive projection, got {}",
                row.len()
            ),
            ErrorKind::AmbiguousResult,
        ));
    }
    Ok(row.values().next().ok_or_else(|| {
        DocketError::new("Empty projection row", ErrorKind::AmbiguousResult)
    })?)
}

pub(crate) fn extract_count(rows: &[JsonObject]) -> DocketResult<u64> {
    let value = extract_scalar(rows)?;
    value.as_u64().ok_or_else(|| {
        DocketError::new(
            &format!("Count projection yielded a non-numeric value: {}", value),
            ErrorKind::InvalidDataType,
        )
    })
}

/// Executes prepared statements against the blocking store facade.
pub struct QueryExecutor<'a> {
    store: &'a dyn StoreOperations,
    metadata: EntityMetadata,
    converter: SerdeConverter,
}

impl<'a> QueryExecutor<'a> {
    /// `metadata` must already carry any per-call keyspace override.
    pub fn new(store: &'a dyn StoreOperations, metadata: EntityMetadata) -> QueryExecutor<'a> {
        QueryExecutor {
            store,
            metadata,
            converter: SerdeConverter::new(),
        }
    }

    pub fn execute<T: DeserializeOwned>(
        &self,
        prepared: &PreparedStatement,
        action: ExecutionAction,
        overall_limit: Option<u64>,
    ) -> DocketResult<QueryOutcome<T>> {
        match action {
            ExecutionAction::Single { limiting } => self.execute_single(prepared, limiting),
            ExecutionAction::Collection => {
                Ok(QueryOutcome::Collection(self.fetch_all(prepared, None)?))
            }
            ExecutionAction::Stream => {
                let rows = self.fetch_rows(prepared, None)?;
                Ok(QueryOutcome::Stream(EntityIter {
                    rows: rows.into_iter(),
                    converter: self.converter.clone(),
                    _marker: PhantomData,
                }))
            }
            ExecutionAction::Page(pageable) => self.execute_page(prepared, pageable, overall_limit),
            ExecutionAction::Slice(pageable) => self.execute_slice(prepared, pageable),
            ExecutionAction::Count => {
                let rows = self.submit(prepared.count(&self.metadata)?)?;
                Ok(QueryOutcome::Count(extract_count(&rows)?))
            }
            ExecutionAction::Exists => {
                let rows = self.submit(prepared.count(&self.metadata)?)?;
                Ok(QueryOutcome::Exists(extract_count(&rows)? > 0))
            }
            ExecutionAction::Delete { void } => {
                let (statement, placeholders, consistency) = prepared.data(&self.metadata, None)?;
                let rows = self
                    .store
                    .remove_matching(&statement, &placeholders, consistency)?;
                if void {
                    return Ok(QueryOutcome::Removed(Vec::new()));
                }
                let removed = rows
                    .into_iter()
                    .map(|row| convert_row(&self.converter, row))
                    .collect::<DocketResult<Vec<T>>>()?;
                Ok(QueryOutcome::Removed(removed))
            }
        }
    }

    fn execute_single<T: DeserializeOwned>(
        &self,
        prepared: &PreparedStatement,
        limiting: bool,
    ) -> DocketResult<QueryOutcome<T>> {
        let mut rows = self.fetch_rows(prepared, None)?;
        if rows.len() > 1 && !limiting {
            return Err(DocketError::new(
                &format!("Expected at most one result, got {}", rows.len()),
                ErrorKind::AmbiguousResult,
            ));
        }
        if rows.is_empty() {
            return Ok(QueryOutcome::Single(None));
        }
        let first = rows.remove(0);
        Ok(QueryOutcome::Single(Some(convert_row(
            &self.converter,
            first,
        )?)))
    }

    // The count query is submitted strictly after the data query; both
    // carry the same consistency level.
    fn execute_page<T: DeserializeOwned>(
        &self,
        prepared: &PreparedStatement,
        pageable: Pageable,
        overall_limit: Option<u64>,
    ) -> DocketResult<QueryOutcome<T>> {
        let pagination = (pageable.offset() as i64, pageable.page_size() as i64);
        let content = self.fetch_all(prepared, Some(pagination))?;
        let count_rows = self.submit(prepared.count(&self.metadata)?)?;
        let mut total = extract_count(&count_rows)?;
        if let Some(limit) = overall_limit {
            total = total.min(limit);
        }
        Ok(QueryOutcome::Page(Page::new(content, pageable, total)))
    }

    fn execute_slice<T: DeserializeOwned>(
        &self,
        prepared: &PreparedStatement,
        pageable: Pageable,
    ) -> DocketResult<QueryOutcome<T>> {
        let page_size = pageable.page_size() as usize;
        let pagination = (pageable.offset() as i64, pageable.page_size() as i64 + 1);
        let mut rows = self.fetch_rows(prepared, Some(pagination))?;
        let has_next = rows.len() > page_size;
        rows.truncate(page_size);
        let content = rows
            .into_iter()
            .map(|row| convert_row(&self.converter, row))
            .collect::<DocketResult<Vec<T>>>()?;
        Ok(QueryOutcome::Slice(Slice::new(content, pageable, has_next)))
    }

    fn fetch_all<T: DeserializeOwned>(
        &self,
        prepared: &PreparedStatement,
        pagination: Option<(i64, i64)>,
    ) -> DocketResult<Vec<T>> {
        self.fetch_rows(prepared, pagination)?
            .into_iter()
            .map(|row| convert_row(&self.converter, row))
            .collect()
    }

    fn fetch_rows(
        &self,
        prepared: &PreparedStatement,
        pagination: Option<(i64, i64)>,
    ) -> DocketResult<Vec<JsonObject>> {
        self.submit(prepared.data(&self.metadata, pagination)?)
    }

    fn submit(
        &self,
        rendered: (String, Placeholders, ScanConsistency),
    ) -> DocketResult<Vec<JsonObject>> {
        let (statement, placeholders, consistency) = rendered;
        log::debug!("Submitting: {}", statement);
        Ok(self
            .store
            .submit_query(&statement, &placeholders, consistency)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::where_;
    use crate::store::StubStore;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        firstname: String,
    }

    fn metadata() -> EntityMetadata {
        EntityMetadata::builder("users", "com.example.User").build()
    }

    fn user_row(name: &str) -> JsonObject {
        let mut row = JsonObject::new();
        row.insert("__id".to_string(), json!(format!("user::{}", name)));
        row.insert("__cas".to_string(), json!(123));
        row.insert("firstname".to_string(), json!(name));
        row
    }

    fn count_row(count: u64) -> JsonObject {
        let mut row = JsonObject::new();
        row.insert("count".to_string(), json!(count));
        row
    }

    fn prepared() -> PreparedStatement {
        PreparedStatement::Derived(Query::new().add_criteria(where_("active").is_true()))
    }

    #[test]
    fn test_collection_strips_meta_aliases() {
        let store = StubStore::new();
        store.push_rows(vec![user_row("Ada"), user_row("Grace")]);
        let executor = QueryExecutor::new(&store, metadata());
        let outcome: QueryOutcome<User> = executor
            .execute(&prepared(), ExecutionAction::Collection, None)
            .unwrap();
        match outcome {
            QueryOutcome::Collection(users) => {
                assert_eq!(users.len(), 2);
                assert_eq!(users[0].firstname, "Ada");
            }
            _ => panic!("expected a collection"),
        }
    }

    #[test]
    fn test_single_with_no_match_is_none() {
        let store = StubStore::new();
        store.push_rows(Vec::new());
        let executor = QueryExecutor::new(&store, metadata());
        let outcome: QueryOutcome<User> = executor
            .execute(&prepared(), ExecutionAction::Single { limiting: false }, None)
            .unwrap();
        assert!(matches!(outcome, QueryOutcome::Single(None)));
    }

    #[test]
    fn test_single_with_multiple_rows_is_ambiguous() {
        let store = StubStore::new();
        store.push_rows(vec![user_row("Ada"), user_row("Grace")]);
        let executor = QueryExecutor::new(&store, metadata());
        let err = executor
            .execute::<User>(&prepared(), ExecutionAction::Single { limiting: false }, None)
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::AmbiguousResult);
    }

    #[test]
    fn test_limiting_single_takes_first_row() {
        let store = StubStore::new();
        store.push_rows(vec![user_row("Ada"), user_row("Grace")]);
        let executor = QueryExecutor::new(&store, metadata());
        let outcome: QueryOutcome<User> = executor
            .execute(&prepared(), ExecutionAction::Single { limiting: true }, None)
            .unwrap();
        match outcome {
            QueryOutcome::Single(Some(user)) => assert_eq!(user.firstname, "Ada"),
            _ => panic!("expected the first row"),
        }
    }

    #[test]
    fn test_page_issues_data_then_count() {
        let store = StubStore::new();
        store.push_rows(vec![user_row("Ada"), user_row("Grace")]);
        store.push_rows(vec![count_row(7)]);
        let executor = QueryExecutor::new(&store, metadata());
        let outcome: QueryOutcome<User> = executor
            .execute(&prepared(), ExecutionAction::Page(Pageable::of(0, 2)), None)
            .unwrap();
        match outcome {
            QueryOutcome::Page(page) => {
                assert_eq!(page.content().len(), 2);
                assert_eq!(page.total_elements(), 7);
                assert!(page.has_next());
            }
            _ => panic!("expected a page"),
        }
        let recorded = store.recorded();
        assert_eq!(recorded.len(), 2);
        assert!(recorded[0].statement.contains("LIMIT 2 OFFSET 0"));
        assert!(recorded[1].statement.contains("COUNT(*) AS count"));
        assert!(!recorded[1].statement.contains("LIMIT"));
    }

    #[test]
    fn test_page_total_is_capped_by_overall_limit() {
        let store = StubStore::new();
        store.push_rows(vec![user_row("Ada")]);
        store.push_rows(vec![count_row(100)]);
        let executor = QueryExecutor::new(&store, metadata());
        let outcome: QueryOutcome<User> = executor
            .execute(&prepared(), ExecutionAction::Page(Pageable::of(0, 1)), Some(5))
            .unwrap();
        match outcome {
            QueryOutcome::Page(page) => assert_eq!(page.total_elements(), 5),
            _ => panic!("expected a page"),
        }
    }

    #[test]
    fn test_slice_overfetches_and_truncates() {
        let store = StubStore::new();
        store.push_rows(vec![user_row("A"), user_row("B"), user_row("C")]);
        let executor = QueryExecutor::new(&store, metadata());
        let outcome: QueryOutcome<User> = executor
            .execute(&prepared(), ExecutionAction::Slice(Pageable::of(0, 2)), None)
            .unwrap();
        match outcome {
            QueryOutcome::Slice(slice) => {
                assert_eq!(slice.content().len(), 2);
                assert!(slice.has_next());
            }
            _ => panic!("expected a slice"),
        }
        assert!(store.recorded()[0].statement.contains("LIMIT 3"));
    }

    #[test]
    fn test_slice_without_next_page() {
        let store = StubStore::new();
        store.push_rows(vec![user_row("A"), user_row("B")]);
        let executor = QueryExecutor::new(&store, metadata());
        let outcome: QueryOutcome<User> = executor
            .execute(&prepared(), ExecutionAction::Slice(Pageable::of(0, 2)), None)
            .unwrap();
        match outcome {
            QueryOutcome::Slice(slice) => assert!(!slice.has_next()),
            _ => panic!("expected a slice"),
        }
    }

    #[test]
    fn test_count_requires_single_column() {
        let store = StubStore::new();
        let mut bad_row = count_row(7);
        bad_row.insert("extra".to_string(), json!(1));
        store.push_rows(vec![bad_row]);
        let executor = QueryExecutor::new(&store, metadata());
        let err = executor
            .execute::<User>(&prepared(), ExecutionAction::Count, None)
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::AmbiguousResult);
        assert!(err.message().contains("got 2"));
    }

    #[test]
    fn test_exists_is_count_greater_than_zero() {
        let store = StubStore::new();
        store.push_rows(vec![count_row(0)]);
        store.push_rows(vec![count_row(3)]);
        let executor = QueryExecutor::new(&store, metadata());
        let absent: QueryOutcome<User> = executor
            .execute(&prepared(), ExecutionAction::Exists, None)
            .unwrap();
        let present: QueryOutcome<User> = executor
            .execute(&prepared(), ExecutionAction::Exists, None)
            .unwrap();
        assert!(matches!(absent, QueryOutcome::Exists(false)));
        assert!(matches!(present, QueryOutcome::Exists(true)));
    }

    #[test]
    fn test_delete_returns_removed_entities() {
        let store = StubStore::new();
        store.push_rows(vec![user_row("Ada")]);
        let executor = QueryExecutor::new(&store, metadata());
        let outcome: QueryOutcome<User> = executor
            .execute(&prepared(), ExecutionAction::Delete { void: false }, None)
            .unwrap();
        match outcome {
            QueryOutcome::Removed(users) => assert_eq!(users[0].firstname, "Ada"),
            _ => panic!("expected removed entities"),
        }
    }

    #[test]
    fn test_void_delete_skips_conversion() {
        let store = StubStore::new();
        // a row that would not deserialize into User
        let mut malformed = JsonObject::new();
        malformed.insert("firstname".to_string(), json!(42));
        store.push_rows(vec![malformed]);
        let executor = QueryExecutor::new(&store, metadata());
        let outcome: QueryOutcome<User> = executor
            .execute(&prepared(), ExecutionAction::Delete { void: true }, None)
            .unwrap();
        match outcome {
            QueryOutcome::Removed(users) => assert!(users.is_empty()),
            _ => panic!("expected removed entities"),
        }
    }

    #[test]
    fn test_stream_converts_lazily() {
        let store = StubStore::new();
        store.push_rows(vec![user_row("Ada"), user_row("Grace")]);
        let executor = QueryExecutor::new(&store, metadata());
        let outcome: QueryOutcome<User> = executor
            .execute(&prepared(), ExecutionAction::Stream, None)
            .unwrap();
        match outcome {
            QueryOutcome::Stream(iter) => {
                let users: Vec<User> = iter.collect::<DocketResult<_>>().unwrap();
                assert_eq!(users.len(), 2);
            }
            _ => panic!("expected a stream"),
        }
    }

    #[test]
    fn test_store_failure_is_translated() {
        let store = StubStore::new();
        store.push_failure(crate::store::StoreFailure::Timeout("deadline".to_string()));
        let executor = QueryExecutor::new(&store, metadata());
        let err = executor
            .execute::<User>(&prepared(), ExecutionAction::Collection, None)
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Timeout);
    }
}
