//! Query creators: one per source of query intent.

mod part_tree;
mod string_based;

pub use part_tree::PartTreeQueryCreator;
pub use string_based::{
    PlaceholderStyle, StringTemplateQueryCreator, BUCKET, FIELDS, FILTER, SELECT_ENTITY,
};
