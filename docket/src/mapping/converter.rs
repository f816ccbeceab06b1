use crate::common::JsonObject;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::mapping::EntityMetadata;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Converts between entity values and the JSON documents the store holds.
///
/// Implementations must be stateless with respect to individual conversions
/// so a single converter can be shared across threads.
pub trait DocumentConverter: Send + Sync {
    /// Serializes an entity into a document, stamping the type discriminator
    /// field so derived queries can find it again.
    fn to_document<T: Serialize>(&self, entity: &T, metadata: &EntityMetadata) -> DocketResult<JsonObject>
    where
        Self: Sized;

    /// Deserializes a document read back from the store into an entity.
    fn from_document<T: DeserializeOwned>(&self, document: JsonObject) -> DocketResult<T>
    where
        Self: Sized;
}

/// The default converter, backed by serde.
///
/// Entities must serialize to a JSON object; anything else (a bare string,
/// an array) is rejected with a conversion error naming the offending value.
#[derive(Debug, Clone, Default)]
pub struct SerdeConverter;

impl SerdeConverter {
    pub fn new() -> Self {
        SerdeConverter
    }
}

impl DocumentConverter for SerdeConverter {
    fn to_document<T: Serialize>(&self, entity: &T, metadata: &EntityMetadata) -> DocketResult<JsonObject> {
        let value = serde_json::to_value(entity).map_err(|e| {
            DocketError::new_with_cause(
                "Failed to serialize entity to a document",
                ErrorKind::ConversionError,
                e.into(),
            )
        })?;
        match value {
            Value::Object(mut document) => {
                document.insert(
                    metadata.type_field().to_string(),
                    Value::String(metadata.type_value().to_string()),
                );
                Ok(document)
            }
            other => {
                log::error!("Entity serialized to a non-object value: {}", other);
                Err(DocketError::new(
                    &format!("Entity did not serialize to a document: {}", other),
                    ErrorKind::ConversionError,
                ))
            }
        }
    }

    fn from_document<T: DeserializeOwned>(&self, document: JsonObject) -> DocketResult<T> {
        serde_json::from_value(Value::Object(document)).map_err(|e| {
            DocketError::new_with_cause(
                "Failed to deserialize document into entity",
                ErrorKind::ConversionError,
                e.into(),
            )
        })
    }
}
