//! The criteria tree and the query object it is attached to.

mod criteria;
#[allow(clippy::module_inception)]
mod query;

pub use criteria::{
    escape_path, escape_segment, where_, ChainOperator, Criteria, CriteriaBuilder,
    CriteriaOperator, ParameterSink,
};
pub use query::{Query, CAS_ALIAS, COUNT_ALIAS, ID_ALIAS, UNSET};
