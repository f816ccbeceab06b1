//! The document-store facade consumed by query execution.
//!
//! The actual store client (wire protocol, pooling, retries) lives behind
//! [`StoreOperations`] / [`ReactiveStoreOperations`]; this crate only renders
//! statements, binds placeholder values and translates the facade's native
//! failures into [`DocketError`] kinds.

use crate::common::{JsonObject, ScanConsistency};
use crate::errors::{DocketError, ErrorKind};
use futures::stream::BoxStream;
use indexmap::IndexMap;
use serde_json::Value;

pub mod stub;

pub use stub::StubStore;

/// Placeholder values accompanying a rendered statement.
///
/// `Positional` values bind `$1, $2, …` in order; `Named` values bind
/// `$name` tokens by key. A statement with every operand inlined as a
/// literal carries `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum Placeholders {
    None,
    Positional(Vec<Value>),
    Named(IndexMap<String, Value>),
}

impl Placeholders {
    pub fn is_empty(&self) -> bool {
        match self {
            Placeholders::None => true,
            Placeholders::Positional(values) => values.is_empty(),
            Placeholders::Named(values) => values.is_empty(),
        }
    }
}

/// A failure reported by the store facade.
///
/// These are translated into the stable [`ErrorKind`] set and propagated
/// unchanged; retry, if any, is the facade's own responsibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFailure {
    Timeout(String),
    DuplicateKey(String),
    VersionMismatch(String),
    NotFound(String),
    Other(String),
}

impl From<StoreFailure> for DocketError {
    fn from(failure: StoreFailure) -> Self {
        match failure {
            StoreFailure::Timeout(message) => DocketError::new(&message, ErrorKind::Timeout),
            StoreFailure::DuplicateKey(message) => {
                DocketError::new(&message, ErrorKind::DuplicateKey)
            }
            StoreFailure::VersionMismatch(message) => {
                DocketError::new(&message, ErrorKind::VersionMismatch)
            }
            StoreFailure::NotFound(message) => {
                DocketError::new(&message, ErrorKind::DocumentNotFound)
            }
            StoreFailure::Other(message) => DocketError::new(&message, ErrorKind::StoreError),
        }
    }
}

/// Blocking document-store operations.
///
/// Implementations must be safe to share across threads; every method is a
/// single round trip with no hidden state between calls.
pub trait StoreOperations: Send + Sync {
    /// Submits a rendered statement and returns the raw result rows.
    fn submit_query(
        &self,
        statement: &str,
        placeholders: &Placeholders,
        consistency: ScanConsistency,
    ) -> Result<Vec<JsonObject>, StoreFailure>;

    /// Fetches a document by key.
    fn get(&self, key: &str) -> Result<Option<JsonObject>, StoreFailure>;

    /// Stores a document under a key, replacing any existing document.
    fn put(&self, key: &str, document: JsonObject) -> Result<(), StoreFailure>;

    /// Removes a document by key, returning it if it existed.
    fn remove(&self, key: &str) -> Result<Option<JsonObject>, StoreFailure>;

    /// Removes every document matched by the statement, returning the
    /// removed rows.
    fn remove_matching(
        &self,
        statement: &str,
        placeholders: &Placeholders,
        consistency: ScanConsistency,
    ) -> Result<Vec<JsonObject>, StoreFailure>;
}

/// Asynchronous document-store operations.
///
/// Returned streams must be cold: no server-side work starts until the
/// stream is polled, and dropping the stream cancels the underlying query.
pub trait ReactiveStoreOperations: Send + Sync {
    fn submit_query(
        &self,
        statement: &str,
        placeholders: &Placeholders,
        consistency: ScanConsistency,
    ) -> BoxStream<'static, Result<JsonObject, StoreFailure>>;

    fn remove_matching(
        &self,
        statement: &str,
        placeholders: &Placeholders,
        consistency: ScanConsistency,
    ) -> BoxStream<'static, Result<JsonObject, StoreFailure>>;
}
