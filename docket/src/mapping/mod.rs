//! Entity metadata and document conversion.

mod converter;
mod entity;

pub use converter::{DocumentConverter, SerdeConverter};
pub use entity::{EntityMetadata, EntityMetadataBuilder, FieldMapping};
