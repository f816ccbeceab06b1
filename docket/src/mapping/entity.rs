use crate::errors::{DocketError, DocketResult, ErrorKind};
use std::sync::Arc;

/// Reflective metadata for a mapped entity type.
///
/// `EntityMetadata` carries everything query derivation needs to know about
/// an entity: the keyspace (bucket) it lives in, the type discriminator used
/// to restrict queries to documents of this entity, the entity-property to
/// document-field name mapping, and the id/version property flags.
///
/// Metadata is built once per repository, is immutable afterwards and is
/// cheap to clone (all clones share the same inner state), so concurrent
/// reads need no synchronization.
#[derive(Clone)]
pub struct EntityMetadata {
    inner: Arc<EntityInner>,
}

struct EntityInner {
    keyspace: String,
    type_field: String,
    type_value: String,
    fields: Vec<FieldMapping>,
    id_field: Option<String>,
    version_field: Option<String>,
}

/// Maps one entity property name onto the document field it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub property: String,
    pub field: String,
}

impl EntityMetadata {
    /// Starts building metadata for an entity stored in `keyspace` whose
    /// type discriminator value is `type_value`.
    pub fn builder(keyspace: &str, type_value: &str) -> EntityMetadataBuilder {
        EntityMetadataBuilder {
            keyspace: keyspace.to_string(),
            type_field: "_class".to_string(),
            type_value: type_value.to_string(),
            fields: Vec::new(),
            id_field: None,
            version_field: None,
        }
    }

    pub fn keyspace(&self) -> &str {
        &self.inner.keyspace
    }

    pub fn type_field(&self) -> &str {
        &self.inner.type_field
    }

    pub fn type_value(&self) -> &str {
        &self.inner.type_value
    }

    pub fn id_field(&self) -> Option<&str> {
        self.inner.id_field.as_deref()
    }

    pub fn version_field(&self) -> Option<&str> {
        self.inner.version_field.as_deref()
    }

    /// Document field names in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.inner.fields.iter().map(|f| f.field.as_str()).collect()
    }

    /// Returns a copy of this metadata bound to a different keyspace.
    ///
    /// Used when a per-call scope/collection override is in effect; the
    /// original metadata is left untouched.
    pub fn with_keyspace(&self, keyspace: &str) -> EntityMetadata {
        EntityMetadata {
            inner: Arc::new(EntityInner {
                keyspace: keyspace.to_string(),
                type_field: self.inner.type_field.clone(),
                type_value: self.inner.type_value.clone(),
                fields: self.inner.fields.clone(),
                id_field: self.inner.id_field.clone(),
                version_field: self.inner.version_field.clone(),
            }),
        }
    }

    /// Resolves a camel-cased method-name segment to a dotted document path.
    ///
    /// `Firstname` resolves to `firstname`; nested paths use an underscore
    /// separator, so `Address_City` resolves to `address.city`. Each path
    /// segment is mapped through the declared property mapping; a segment
    /// naming no declared property is rejected when the entity declares any
    /// mapping at all, and passed through decapitalized otherwise.
    pub fn resolve_path(&self, segment: &str) -> DocketResult<String> {
        let mut resolved = Vec::new();
        for piece in segment.split('_') {
            if piece.is_empty() {
                continue;
            }
            let property = decapitalize(piece);
            let field = self.document_field(&property)?;
            resolved.push(field);
        }
        if resolved.is_empty() {
            log::error!("Cannot resolve empty property path segment '{}'", segment);
            return Err(DocketError::new(
                &format!("Cannot resolve property path: {}", segment),
                ErrorKind::QueryCreationError,
            ));
        }
        Ok(resolved.join("."))
    }

    /// Maps an entity property name to its document field name.
    fn document_field(&self, property: &str) -> DocketResult<String> {
        if self.inner.fields.is_empty() {
            return Ok(property.to_string());
        }
        self.inner
            .fields
            .iter()
            .find(|f| f.property == property)
            .map(|f| f.field.clone())
            .ok_or_else(|| {
                log::error!(
                    "No property '{}' declared on entity mapped to '{}'",
                    property,
                    self.inner.keyspace
                );
                DocketError::new(
                    &format!("No property {} found on entity", property),
                    ErrorKind::QueryCreationError,
                )
            })
    }
}

/// Builder for [`EntityMetadata`].
pub struct EntityMetadataBuilder {
    keyspace: String,
    type_field: String,
    type_value: String,
    fields: Vec<FieldMapping>,
    id_field: Option<String>,
    version_field: Option<String>,
}

impl EntityMetadataBuilder {
    /// Overrides the type discriminator field name (default `_class`).
    pub fn type_field(mut self, field: &str) -> Self {
        self.type_field = field.to_string();
        self
    }

    /// Declares a property stored under a document field of the same name.
    pub fn field(self, name: &str) -> Self {
        let name = name.to_string();
        self.mapped_field(&name.clone(), &name)
    }

    /// Declares a property stored under a differently named document field.
    pub fn mapped_field(mut self, property: &str, field: &str) -> Self {
        self.fields.push(FieldMapping {
            property: property.to_string(),
            field: field.to_string(),
        });
        self
    }

    /// Marks the given property as the id property.
    pub fn id_field(mut self, field: &str) -> Self {
        self.id_field = Some(field.to_string());
        self
    }

    /// Marks the given property as the optimistic-lock version property.
    pub fn version_field(mut self, field: &str) -> Self {
        self.version_field = Some(field.to_string());
        self
    }

    pub fn build(self) -> EntityMetadata {
        EntityMetadata {
            inner: Arc::new(EntityInner {
                keyspace: self.keyspace,
                type_field: self.type_field,
                type_value: self.type_value,
                fields: self.fields,
                id_field: self.id_field,
                version_field: self.version_field,
            }),
        }
    }
}

fn decapitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_entity() -> EntityMetadata {
        EntityMetadata::builder("users", "com.example.User")
            .field("firstname")
            .field("lastname")
            .field("active")
            .mapped_field("address", "addr")
            .id_field("id")
            .build()
    }

    #[test]
    fn test_basic_accessors() {
        let entity = user_entity();
        assert_eq!(entity.keyspace(), "users");
        assert_eq!(entity.type_field(), "_class");
        assert_eq!(entity.type_value(), "com.example.User");
        assert_eq!(entity.id_field(), Some("id"));
        assert!(entity.version_field().is_none());
    }

    #[test]
    fn test_resolve_simple_path() {
        let entity = user_entity();
        assert_eq!(entity.resolve_path("Firstname").unwrap(), "firstname");
    }

    #[test]
    fn test_resolve_mapped_field() {
        let entity = user_entity();
        assert_eq!(entity.resolve_path("Address").unwrap(), "addr");
    }

    #[test]
    fn test_resolve_nested_path() {
        let entity = EntityMetadata::builder("users", "User").build();
        assert_eq!(entity.resolve_path("Address_City").unwrap(), "address.city");
    }

    #[test]
    fn test_resolve_unknown_property() {
        let entity = user_entity();
        let err = entity.resolve_path("Nickname").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::QueryCreationError);
    }

    #[test]
    fn test_with_keyspace_does_not_mutate_original() {
        let entity = user_entity();
        let other = entity.with_keyspace("archive");
        assert_eq!(entity.keyspace(), "users");
        assert_eq!(other.keyspace(), "archive");
        assert_eq!(other.type_value(), entity.type_value());
    }
}
