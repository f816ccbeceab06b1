use crate::common::JsonObject;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::mapping::{EntityMetadata, SerdeConverter};
use crate::repository::execution::{
    convert_row, extract_count, ExecutionAction, PreparedStatement,
};
use crate::store::ReactiveStoreOperations;
use async_stream::try_stream;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// What a reactive invocation produced.
///
/// Every variant is cold: no statement is submitted until the future is
/// awaited or the stream is polled, and dropping it cancels the underlying
/// store query.
pub enum ReactiveOutcome<T> {
    Single(BoxFuture<'static, DocketResult<Option<T>>>),
    Stream(BoxStream<'static, DocketResult<T>>),
    Count(BoxFuture<'static, DocketResult<u64>>),
    Exists(BoxFuture<'static, DocketResult<bool>>),
    Removed(BoxStream<'static, DocketResult<T>>),
}

impl<T> std::fmt::Debug for ReactiveOutcome<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            ReactiveOutcome::Single(_) => "Single",
            ReactiveOutcome::Stream(_) => "Stream",
            ReactiveOutcome::Count(_) => "Count",
            ReactiveOutcome::Exists(_) => "Exists",
            ReactiveOutcome::Removed(_) => "Removed",
        };
        f.debug_tuple(&format!("ReactiveOutcome::{variant}")).finish()
    }
}

/// Executes prepared statements against the asynchronous store facade.
///
/// Statement rendering stays synchronous; only the submission crosses into
/// the returned future or stream.
pub struct ReactiveQueryExecutor {
    store: Arc<dyn ReactiveStoreOperations>,
    metadata: EntityMetadata,
    converter: SerdeConverter,
}

impl ReactiveQueryExecutor {
    /// `metadata` must already carry any per-call keyspace override.
    pub fn new(store: Arc<dyn ReactiveStoreOperations>, metadata: EntityMetadata) -> Self {
        ReactiveQueryExecutor {
            store,
            metadata,
            converter: SerdeConverter::new(),
        }
    }

    pub fn execute<T: DeserializeOwned + Send + 'static>(
        &self,
        prepared: &PreparedStatement,
        action: ExecutionAction,
    ) -> DocketResult<ReactiveOutcome<T>> {
        match action {
            ExecutionAction::Single { limiting } => self.execute_single(prepared, limiting),
            ExecutionAction::Collection | ExecutionAction::Stream => {
                Ok(ReactiveOutcome::Stream(self.entity_stream(prepared)?))
            }
            ExecutionAction::Count => {
                let (statement, placeholders, consistency) = prepared.count(&self.metadata)?;
                let store = Arc::clone(&self.store);
                let future = async move {
                    let rows: Vec<JsonObject> = store
                        .submit_query(&statement, &placeholders, consistency)
                        .try_collect()
                        .await?;
                    extract_count(&rows)
                };
                Ok(ReactiveOutcome::Count(future.boxed()))
            }
            ExecutionAction::Exists => {
                let (statement, placeholders, consistency) = prepared.count(&self.metadata)?;
                let store = Arc::clone(&self.store);
                let future = async move {
                    let rows: Vec<JsonObject> = store
                        .submit_query(&statement, &placeholders, consistency)
                        .try_collect()
                        .await?;
                    Ok(extract_count(&rows)? > 0)
                };
                Ok(ReactiveOutcome::Exists(future.boxed()))
            }
            ExecutionAction::Delete { void } => {
                let (statement, placeholders, consistency) =
                    prepared.data(&self.metadata, None)?;
                let store = Arc::clone(&self.store);
                let converter = self.converter.clone();
                let stream = try_stream! {
                    let mut rows = store.remove_matching(&statement, &placeholders, consistency);
                    while let Some(row) = rows.try_next().await? {
                        if !void {
                            yield convert_row(&converter, row)?;
                        }
                    }
                };
                Ok(ReactiveOutcome::Removed(stream.boxed()))
            }
            ExecutionAction::Page(_) | ExecutionAction::Slice(_) => Err(DocketError::new(
                "Page and Slice are not supported on the reactive execution path",
                ErrorKind::InvalidOperation,
            )),
        }
    }

    fn execute_single<T: DeserializeOwned + Send + 'static>(
        &self,
        prepared: &PreparedStatement,
        limiting: bool,
    ) -> DocketResult<ReactiveOutcome<T>> {
        let (statement, placeholders, consistency) = prepared.data(&self.metadata, None)?;
        let store = Arc::clone(&self.store);
        let converter = self.converter.clone();
        let future = async move {
            let mut rows = store.submit_query(&statement, &placeholders, consistency);
            let first = match rows.try_next().await? {
                Some(row) => row,
                None => return Ok(None),
            };
            if !limiting && rows.try_next().await?.is_some() {
                return Err(DocketError::new(
                    "Expected at most one result, got more",
                    ErrorKind::AmbiguousResult,
                ));
            }
            Ok(Some(convert_row(&converter, first)?))
        };
        Ok(ReactiveOutcome::Single(future.boxed()))
    }

    fn entity_stream<T: DeserializeOwned + Send + 'static>(
        &self,
        prepared: &PreparedStatement,
    ) -> DocketResult<BoxStream<'static, DocketResult<T>>> {
        let (statement, placeholders, consistency) = prepared.data(&self.metadata, None)?;
        let store = Arc::clone(&self.store);
        let converter = self.converter.clone();
        let stream = try_stream! {
            let mut rows = store.submit_query(&statement, &placeholders, consistency);
            while let Some(row) = rows.try_next().await? {
                yield convert_row(&converter, row)?;
            }
        };
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{where_, Query};
    use crate::store::{StoreFailure, StubStore};
    use futures::executor::block_on;
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

    fn executor(store: Arc<StubStore>) -> ReactiveQueryExecutor {
        ReactiveQueryExecutor::new(store, metadata())
    }

    #[test]
    fn test_stream_yields_converted_entities() {
        let store = Arc::new(StubStore::new());
        store.push_rows(vec![user_row("Ada"), user_row("Grace")]);
        let outcome: ReactiveOutcome<User> = executor(Arc::clone(&store))
            .execute(&prepared(), ExecutionAction::Stream)
            .unwrap();
        let users: Vec<User> = match outcome {
            ReactiveOutcome::Stream(stream) => {
                block_on(stream.try_collect()).unwrap()
            }
            _ => panic!("expected a stream"),
        };
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].firstname, "Ada");
    }

    #[test]
    fn test_stream_is_cold_until_polled() {
        let store = Arc::new(StubStore::new());
        store.push_rows(vec![user_row("Ada")]);
        let outcome: ReactiveOutcome<User> = executor(Arc::clone(&store))
            .execute(&prepared(), ExecutionAction::Stream)
            .unwrap();
        // nothing submitted yet
        assert!(store.recorded().is_empty());
        match outcome {
            ReactiveOutcome::Stream(stream) => {
                let _: Vec<User> = block_on(stream.try_collect()).unwrap();
            }
            _ => panic!("expected a stream"),
        }
        assert_eq!(store.recorded().len(), 1);
    }

    #[test]
    fn test_single_none_on_empty() {
        let store = Arc::new(StubStore::new());
        store.push_rows(Vec::new());
        let outcome: ReactiveOutcome<User> = executor(store)
            .execute(&prepared(), ExecutionAction::Single { limiting: false })
            .unwrap();
        match outcome {
            ReactiveOutcome::Single(future) => assert!(block_on(future).unwrap().is_none()),
            _ => panic!("expected a single"),
        }
    }

    #[test]
    fn test_single_ambiguous_on_extra_rows() {
        let store = Arc::new(StubStore::new());
        store.push_rows(vec![user_row("Ada"), user_row("Grace")]);
        let outcome: ReactiveOutcome<User> = executor(store)
            .execute(&prepared(), ExecutionAction::Single { limiting: false })
            .unwrap();
        match outcome {
            ReactiveOutcome::Single(future) => {
                let err = block_on(future).unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::AmbiguousResult);
            }
            _ => panic!("expected a single"),
        }
    }

    #[test]
    fn test_count_and_exists() {
        let store = Arc::new(StubStore::new());
        store.push_rows(vec![count_row(4)]);
        store.push_rows(vec![count_row(0)]);
        let executor = executor(store);
        let outcome: ReactiveOutcome<User> =
            executor.execute(&prepared(), ExecutionAction::Count).unwrap();
        match outcome {
            ReactiveOutcome::Count(future) => assert_eq!(block_on(future).unwrap(), 4),
            _ => panic!("expected a count"),
        }
        let outcome: ReactiveOutcome<User> =
            executor.execute(&prepared(), ExecutionAction::Exists).unwrap();
        match outcome {
            ReactiveOutcome::Exists(future) => assert!(!block_on(future).unwrap()),
            _ => panic!("expected exists"),
        }
    }

    #[test]
    fn test_page_is_rejected() {
        let store = Arc::new(StubStore::new());
        let err = executor(store)
            .execute::<User>(
                &prepared(),
                ExecutionAction::Page(crate::common::Pageable::of(0, 10)),
            )
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_store_failure_propagates_through_stream() {
        let store = Arc::new(StubStore::new());
        store.push_failure(StoreFailure::Timeout("deadline".to_string()));
        let outcome: ReactiveOutcome<User> = executor(store)
            .execute(&prepared(), ExecutionAction::Stream)
            .unwrap();
        match outcome {
            ReactiveOutcome::Stream(stream) => {
                let result: DocketResult<Vec<User>> = block_on(stream.try_collect());
                assert_eq!(result.unwrap_err().kind(), &ErrorKind::Timeout);
            }
            _ => panic!("expected a stream"),
        }
    }
}
