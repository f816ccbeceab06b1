//! # Docket View - Legacy Map-Reduce View Backend
//!
//! Companion backend to the `docket` crate that targets pre-computed
//! map-reduce view indexes instead of the SQL-like query language. The same
//! method-name part trees drive derivation, but against a much narrower
//! feature set: a view emits a single key, so every predicate must restrict
//! that one key range, and `Or` / compound keys are unsupported.
//!
//! Two derivation flavors are provided:
//!
//! - [`creator::ViewQueryCreator`] for ordinary views (key, key ranges, the
//!   `\u{efff}` prefix trick, limit, reduce)
//! - [`spatial::SpatialViewQueryCreator`] for dimensional views (numeric
//!   start/end range arrays, bounding-box approximation of geo shapes with
//!   client-side false-positive elimination)
//!
//! All errors surface as [`docket::DocketError`] with
//! `ErrorKind::Extension("view")` or `ErrorKind::Extension("spatial")`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docket::mapping::EntityMetadata;
//! use docket::part::PartTree;
//! use docket::repository::binding::{Arg, ParameterAccessor};
//! use docket_view::creator::ViewQueryCreator;
//! use docket_view::view_query::ViewQuery;
//!
//! let tree = PartTree::parse("findByUsernameStartingWith")?;
//! let metadata = EntityMetadata::builder("users", "com.example.User").build();
//! let creator = ViewQueryCreator::new(tree, &metadata, false)?;
//!
//! let accessor = ParameterAccessor::resolve_blocking(vec![Arg::Value("ada".into())])?;
//! let derived = creator.derive(ViewQuery::from("users", "by_username"), &accessor)?;
//! ```

pub mod creator;
pub mod geo;
pub mod spatial;
pub mod view_query;

pub use creator::{DerivedViewQuery, ViewQueryCreator};
pub use geo::{Point, Shape};
pub use spatial::{
    FalsePositiveEvaluator, ReactiveSpatialViewQueryCreator, SpatialArg, SpatialViewQueryCreator,
    SpatialViewQueryWrapper,
};
pub use view_query::ViewQuery;
