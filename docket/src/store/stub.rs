//! An in-memory store facade for tests and examples.

use crate::common::{JsonObject, ScanConsistency};
use crate::store::{Placeholders, ReactiveStoreOperations, StoreFailure, StoreOperations};
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// One statement submission observed by the stub.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub statement: String,
    pub placeholders: Placeholders,
    pub consistency: ScanConsistency,
}

#[derive(Default)]
struct StubState {
    canned_rows: VecDeque<Result<Vec<JsonObject>, StoreFailure>>,
    documents: HashMap<String, JsonObject>,
    recorded: Vec<RecordedQuery>,
}

/// An in-memory [`StoreOperations`] implementation.
///
/// Query responses are canned: each call to `submit_query` (or
/// `remove_matching`) pops the next prepared response, so a paged execution
/// can be fed its data rows and its count row in submission order. Every
/// submission is recorded for assertion.
#[derive(Default)]
pub struct StubStore {
    state: Mutex<StubState>,
}

impl StubStore {
    pub fn new() -> Self {
        StubStore::default()
    }

    /// Queues the rows returned by the next statement submission.
    pub fn push_rows(&self, rows: Vec<JsonObject>) {
        self.state.lock().canned_rows.push_back(Ok(rows));
    }

    /// Queues a failure for the next statement submission.
    pub fn push_failure(&self, failure: StoreFailure) {
        self.state.lock().canned_rows.push_back(Err(failure));
    }

    /// The statements submitted so far, in order.
    pub fn recorded(&self) -> Vec<RecordedQuery> {
        self.state.lock().recorded.clone()
    }

    fn next_response(
        &self,
        statement: &str,
        placeholders: &Placeholders,
        consistency: ScanConsistency,
    ) -> Result<Vec<JsonObject>, StoreFailure> {
        let mut state = self.state.lock();
        state.recorded.push(RecordedQuery {
            statement: statement.to_string(),
            placeholders: placeholders.clone(),
            consistency,
        });
        state
            .canned_rows
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

impl StoreOperations for StubStore {
    fn submit_query(
        &self,
        statement: &str,
        placeholders: &Placeholders,
        consistency: ScanConsistency,
    ) -> Result<Vec<JsonObject>, StoreFailure> {
        self.next_response(statement, placeholders, consistency)
    }

    fn get(&self, key: &str) -> Result<Option<JsonObject>, StoreFailure> {
        Ok(self.state.lock().documents.get(key).cloned())
    }

    fn put(&self, key: &str, document: JsonObject) -> Result<(), StoreFailure> {
        self.state.lock().documents.insert(key.to_string(), document);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<Option<JsonObject>, StoreFailure> {
        Ok(self.state.lock().documents.remove(key))
    }

    fn remove_matching(
        &self,
        statement: &str,
        placeholders: &Placeholders,
        consistency: ScanConsistency,
    ) -> Result<Vec<JsonObject>, StoreFailure> {
        self.next_response(statement, placeholders, consistency)
    }
}

impl ReactiveStoreOperations for StubStore {
    fn submit_query(
        &self,
        statement: &str,
        placeholders: &Placeholders,
        consistency: ScanConsistency,
    ) -> BoxStream<'static, Result<JsonObject, StoreFailure>> {
        match self.next_response(statement, placeholders, consistency) {
            Ok(rows) => futures::stream::iter(rows.into_iter().map(Ok)).boxed(),
            Err(failure) => futures::stream::iter(vec![Err(failure)]).boxed(),
        }
    }

    fn remove_matching(
        &self,
        statement: &str,
        placeholders: &Placeholders,
        consistency: ScanConsistency,
    ) -> BoxStream<'static, Result<JsonObject, StoreFailure>> {
        ReactiveStoreOperations::submit_query(self, statement, placeholders, consistency)
    }
}
