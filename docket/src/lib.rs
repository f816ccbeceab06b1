//! # Docket - Document Repository Query Derivation
//!
//! Docket binds typed entities to JSON documents in a document store and
//! derives executable queries from repository method conventions. A method
//! name like `findByFirstnameAndAgeGreaterThan` (or an inline query
//! template) is parsed into a criteria tree, rendered into a SQL-like
//! document-query statement, bound with runtime parameters, and dispatched
//! according to the method's declared return shape.
//!
//! ## Key Features
//!
//! - **Name derivation**: `findBy…`/`countBy…`/`deleteBy…` method names are
//!   parsed into predicate part trees and folded into criteria
//! - **Inline templates**: annotated query strings with `$1`/`$name`
//!   placeholders and entity-aware template variables
//! - **Return-shape dispatch**: single entity, collection, page, slice,
//!   stream, count, exists, delete-and-return-removed
//! - **Blocking and reactive**: the same derivation core drives a blocking
//!   executor and a cold asynchronous-stream executor
//! - **Fail fast**: malformed method declarations are rejected when the
//!   repository is assembled, not on first call
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docket::common::CallScope;
//! use docket::mapping::EntityMetadata;
//! use docket::repository::binding::Arg;
//! use docket::repository::method::{QueryMethod, ReturnShape};
//! use docket::repository::RepositoryQuery;
//!
//! let metadata = EntityMetadata::builder("users", "com.example.User").build();
//! let method = QueryMethod::builder("findByFirstname")
//!     .returns(ReturnShape::One)
//!     .parameter(docket::repository::method::ParameterDescriptor::bindable())
//!     .build()?;
//!
//! let query: RepositoryQuery<User> = RepositoryQuery::new(method, metadata, store)?;
//! let outcome = query.execute(vec![Arg::Value("Ada".into())], CallScope::none())?;
//! ```
//!
//! The view-backed legacy derivation (map-reduce indexes, geo-spatial
//! predicates) lives in the companion `docket-view` crate.

pub mod common;
pub mod errors;
pub mod mapping;
pub mod part;
pub mod query;
pub mod repository;
pub mod store;

pub use errors::{DocketError, DocketResult, ErrorKind};
