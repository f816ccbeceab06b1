//! Common types shared across the query derivation and execution pipeline.

mod consistency;
mod page;
mod scope;
mod sort;

pub use consistency::ScanConsistency;
pub use page::{Page, Pageable, Slice};
pub use scope::CallScope;
pub use sort::{Sort, SortOrder};

/// A JSON document as stored and returned by the document store.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;
