/// Per-call scope and collection override.
///
/// Some repository calls need to target a different scope or collection than
/// the one the entity is mapped to. The override is an explicit value passed
/// with each execution and consumed by exactly that execution; it is never
/// stashed on shared state, so concurrent calls on different threads cannot
/// observe each other's override.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallScope {
    scope: Option<String>,
    collection: Option<String>,
}

impl CallScope {
    /// An empty override: the entity's mapped keyspace is used unchanged.
    pub fn none() -> Self {
        CallScope::default()
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }

    pub fn with_collection(mut self, collection: &str) -> Self {
        self.collection = Some(collection.to_string());
        self
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Resolves the effective keyspace for one execution, consuming the
    /// override.
    pub fn resolve_keyspace(self, mapped: &str) -> String {
        match (self.scope, self.collection) {
            (Some(scope), Some(collection)) => format!("{}.{}", scope, collection),
            (None, Some(collection)) => collection,
            _ => mapped.to_string(),
        }
    }
}
