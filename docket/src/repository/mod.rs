//! Repository method execution: the entry points the repository
//! infrastructure calls into.
//!
//! A [`RepositoryQuery`] (or its reactive twin) is built once per declared
//! method; all configuration validation happens at that point, so a
//! malformed declaration fails when the repository is assembled, not on
//! first call. Query derivation is a shared synchronous core; the blocking
//! and reactive paths are thin dispatch adapters over it.

pub mod binding;
pub mod creator;
pub mod execution;
pub mod method;
pub mod reactive;

use crate::common::CallScope;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::mapping::EntityMetadata;
use crate::part::PartTree;
use crate::query::Query;
use crate::store::{ReactiveStoreOperations, StoreOperations};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

use binding::{Arg, ParameterAccessor};
use creator::{PartTreeQueryCreator, StringTemplateQueryCreator};
use execution::{ExecutionAction, PreparedStatement, QueryExecutor, QueryOutcome};
use method::{QueryMethod, ReturnShape};
use reactive::{ReactiveOutcome, ReactiveQueryExecutor};

enum CreatorKind {
    Derived(PartTreeQueryCreator),
    Template(StringTemplateQueryCreator),
}

impl CreatorKind {
    fn build(method: &QueryMethod, metadata: &EntityMetadata) -> DocketResult<CreatorKind> {
        match method.inline_query() {
            Some(template) => {
                let creator = StringTemplateQueryCreator::new(template, metadata)?;
                creator.validate_declaration(method)?;
                Ok(CreatorKind::Template(creator))
            }
            None => {
                let tree = PartTree::parse(method.name())?;
                Ok(CreatorKind::Derived(PartTreeQueryCreator::new(
                    tree, metadata,
                )?))
            }
        }
    }

    fn overall_limit(&self) -> Option<u64> {
        match self {
            CreatorKind::Derived(creator) => creator.overall_limit(),
            CreatorKind::Template(_) => None,
        }
    }

    fn prepare(
        &self,
        method: &QueryMethod,
        accessor: &ParameterAccessor,
    ) -> DocketResult<PreparedStatement> {
        match self {
            CreatorKind::Derived(creator) => {
                let query: Query = creator.create(
                    &mut accessor.iterator(),
                    accessor.pageable(),
                    accessor.sort(),
                    method.consistency(),
                )?;
                Ok(PreparedStatement::Derived(query))
            }
            CreatorKind::Template(creator) => Ok(PreparedStatement::Template {
                statement: creator.statement().to_string(),
                count_statement: creator.count_statement().map(str::to_string),
                placeholders: creator.bind(accessor, method)?,
                consistency: method.consistency(),
            }),
        }
    }
}

// The per-invocation plan shared by both execution models.
struct Invocation {
    prepared: PreparedStatement,
    action: ExecutionAction,
    overall_limit: Option<u64>,
    metadata: EntityMetadata,
}

fn plan_invocation(
    method: &QueryMethod,
    metadata: &EntityMetadata,
    creator: &CreatorKind,
    accessor: &ParameterAccessor,
    call_scope: CallScope,
) -> DocketResult<Invocation> {
    let keyspace = if call_scope != CallScope::none() {
        call_scope.resolve_keyspace(metadata.keyspace())
    } else {
        method.scope().clone().resolve_keyspace(metadata.keyspace())
    };
    let effective = if keyspace == metadata.keyspace() {
        metadata.clone()
    } else {
        metadata.with_keyspace(&keyspace)
    };
    let prepared = creator.prepare(method, accessor)?;
    let action = select_action(method, accessor, creator)?;
    Ok(Invocation {
        prepared,
        action,
        overall_limit: creator.overall_limit(),
        metadata: effective,
    })
}

fn select_action(
    method: &QueryMethod,
    accessor: &ParameterAccessor,
    creator: &CreatorKind,
) -> DocketResult<ExecutionAction> {
    if method.is_delete_query() {
        return Ok(ExecutionAction::Delete {
            void: method.shape() == ReturnShape::Void,
        });
    }
    if method.is_count_query() {
        return Ok(ExecutionAction::Count);
    }
    if method.is_exists_query() {
        return Ok(ExecutionAction::Exists);
    }
    let action = match method.shape() {
        ReturnShape::Page => ExecutionAction::Page(required_pageable(method, accessor)?),
        ReturnShape::Slice => ExecutionAction::Slice(required_pageable(method, accessor)?),
        ReturnShape::Stream => ExecutionAction::Stream,
        ReturnShape::Many => ExecutionAction::Collection,
        ReturnShape::One => ExecutionAction::Single {
            limiting: creator.overall_limit().is_some(),
        },
        ReturnShape::Count => ExecutionAction::Count,
        ReturnShape::Exists => ExecutionAction::Exists,
        ReturnShape::Void => ExecutionAction::Delete { void: true },
    };
    Ok(action)
}

fn required_pageable(
    method: &QueryMethod,
    accessor: &ParameterAccessor,
) -> DocketResult<crate::common::Pageable> {
    accessor.pageable().cloned().ok_or_else(|| {
        DocketError::new(
            &format!(
                "Method {} returns a page but received no Pageable argument",
                method.name()
            ),
            ErrorKind::InvalidOperation,
        )
    })
}

/// A blocking repository method, ready to execute.
///
/// # Examples
///
/// ```rust,ignore
/// use docket::repository::{Arg, RepositoryQuery};
///
/// let query: RepositoryQuery<User> = RepositoryQuery::new(method, metadata, store)?;
/// let outcome = query.execute(vec![Arg::Value("Ada".into())], CallScope::none())?;
/// ```
pub struct RepositoryQuery<T> {
    method: QueryMethod,
    metadata: EntityMetadata,
    store: Arc<dyn StoreOperations>,
    creator: CreatorKind,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for RepositoryQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryQuery")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl<T: DeserializeOwned> RepositoryQuery<T> {
    /// Builds the method's execution plan, validating the declaration.
    pub fn new(
        method: QueryMethod,
        metadata: EntityMetadata,
        store: Arc<dyn StoreOperations>,
    ) -> DocketResult<RepositoryQuery<T>> {
        let creator = CreatorKind::build(&method, &metadata)?;
        Ok(RepositoryQuery {
            method,
            metadata,
            store,
            creator,
            _marker: PhantomData,
        })
    }

    pub fn method(&self) -> &QueryMethod {
        &self.method
    }

    /// Executes the method with the given runtime arguments.
    ///
    /// `call_scope` overrides the target keyspace for this invocation only;
    /// it is consumed here and never stored, so concurrent calls cannot
    /// observe each other's override.
    pub fn execute(&self, args: Vec<Arg>, call_scope: CallScope) -> DocketResult<QueryOutcome<T>> {
        let accessor = ParameterAccessor::resolve_blocking(args)?;
        let invocation = plan_invocation(
            &self.method,
            &self.metadata,
            &self.creator,
            &accessor,
            call_scope,
        )?;
        let executor = QueryExecutor::new(self.store.as_ref(), invocation.metadata);
        executor.execute(
            &invocation.prepared,
            invocation.action,
            invocation.overall_limit,
        )
    }
}

/// The reactive twin of [`RepositoryQuery`].
pub struct ReactiveRepositoryQuery<T> {
    method: QueryMethod,
    metadata: EntityMetadata,
    store: Arc<dyn ReactiveStoreOperations>,
    creator: CreatorKind,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned + Send + 'static> ReactiveRepositoryQuery<T> {
    pub fn new(
        method: QueryMethod,
        metadata: EntityMetadata,
        store: Arc<dyn ReactiveStoreOperations>,
    ) -> DocketResult<ReactiveRepositoryQuery<T>> {
        let creator = CreatorKind::build(&method, &metadata)?;
        Ok(ReactiveRepositoryQuery {
            method,
            metadata,
            store,
            creator,
            _marker: PhantomData,
        })
    }

    pub fn method(&self) -> &QueryMethod {
        &self.method
    }

    /// Executes the method; asynchronous wrapper arguments are drained
    /// before query derivation, the store submission itself stays lazy
    /// inside the returned outcome.
    pub async fn execute(
        &self,
        args: Vec<Arg>,
        call_scope: CallScope,
    ) -> DocketResult<ReactiveOutcome<T>> {
        let accessor = ParameterAccessor::resolve(args).await?;
        let invocation = plan_invocation(
            &self.method,
            &self.metadata,
            &self.creator,
            &accessor,
            call_scope,
        )?;
        let executor = ReactiveQueryExecutor::new(Arc::clone(&self.store), invocation.metadata);
        executor.execute(&invocation.prepared, invocation.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Pageable;
    use crate::store::StubStore;
    use serde::Deserialize;
    use serde_json::json;

    // Setup only one time throughout the project.
    // It will take effect during test, project wide
    #[ctor::ctor]
    fn init() {
        colog::init();
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        firstname: String,
    }

    fn metadata() -> EntityMetadata {
        EntityMetadata::builder("users", "com.example.User").build()
    }

    fn user_row(name: &str) -> crate::common::JsonObject {
        let mut row = crate::common::JsonObject::new();
        row.insert("__id".to_string(), json!(format!("user::{}", name)));
        row.insert("__cas".to_string(), json!(7));
        row.insert("firstname".to_string(), json!(name));
        row
    }

    fn count_row(count: u64) -> crate::common::JsonObject {
        let mut row = crate::common::JsonObject::new();
        row.insert("count".to_string(), json!(count));
        row
    }

    #[test]
    fn test_find_by_firstname_end_to_end() {
        let store = Arc::new(StubStore::new());
        store.push_rows(vec![user_row("Ada")]);
        let method = QueryMethod::builder("findByFirstname")
            .returns(ReturnShape::One)
            .parameter(method::ParameterDescriptor::bindable())
            .build()
            .unwrap();
        let query: RepositoryQuery<User> =
            RepositoryQuery::new(method, metadata(), Arc::clone(&store) as _).unwrap();
        let outcome = query
            .execute(vec![Arg::Value(json!("Ada"))], CallScope::none())
            .unwrap();
        match outcome {
            QueryOutcome::Single(Some(user)) => assert_eq!(user.firstname, "Ada"),
            _ => panic!("expected one user"),
        }
        let recorded = store.recorded();
        assert!(recorded[0].statement.contains("firstname = $1"));
        assert!(recorded[0]
            .statement
            .contains("WHERE _class = \"com.example.User\""));
    }

    #[test]
    fn test_find_by_firstname_no_match_is_none() {
        let store = Arc::new(StubStore::new());
        store.push_rows(Vec::new());
        let method = QueryMethod::builder("findByFirstname")
            .returns(ReturnShape::One)
            .parameter(method::ParameterDescriptor::bindable())
            .build()
            .unwrap();
        let query: RepositoryQuery<User> =
            RepositoryQuery::new(method, metadata(), store).unwrap();
        let outcome = query
            .execute(vec![Arg::Value(json!("Nobody"))], CallScope::none())
            .unwrap();
        assert!(matches!(outcome, QueryOutcome::Single(None)));
    }

    #[test]
    fn test_malformed_method_fails_at_construction() {
        let store: Arc<StubStore> = Arc::new(StubStore::new());
        let method = QueryMethod::builder("findByLocationNear")
            .returns(ReturnShape::Many)
            .parameter(method::ParameterDescriptor::bindable())
            .build()
            .unwrap();
        let err = RepositoryQuery::<User>::new(method, metadata(), store).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::QueryCreationError);
    }

    #[test]
    fn test_mixed_template_fails_at_construction() {
        let store: Arc<StubStore> = Arc::new(StubStore::new());
        let method = QueryMethod::builder("findCustom")
            .returns(ReturnShape::Many)
            .inline_query("a = $1 AND b = $name")
            .build()
            .unwrap();
        let err = RepositoryQuery::<User>::new(method, metadata(), store).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidQueryMethod);
    }

    #[test]
    fn test_unnamed_parameter_with_named_template_fails_at_construction() {
        let store: Arc<StubStore> = Arc::new(StubStore::new());
        let method = QueryMethod::builder("findCustom")
            .returns(ReturnShape::Many)
            .inline_query("age > $age")
            .parameter(method::ParameterDescriptor::bindable())
            .build()
            .unwrap();
        let err = RepositoryQuery::<User>::new(method, metadata(), store).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidQueryMethod);
        assert!(err.message().contains("placeholder name"));
    }

    #[test]
    fn test_count_template_without_count_variant_fails_at_construction() {
        let store: Arc<StubStore> = Arc::new(StubStore::new());
        let method = QueryMethod::builder("countCustom")
            .returns(ReturnShape::Count)
            .inline_query("SELECT #{fields} FROM #{bucket} WHERE #{filter}")
            .build()
            .unwrap();
        let err = RepositoryQuery::<User>::new(method, metadata(), store).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidQueryMethod);
        assert!(err.message().contains("count variant"));
    }

    #[test]
    fn test_page_round_trip() {
        let store = Arc::new(StubStore::new());
        store.push_rows(vec![user_row("Ada"), user_row("Grace")]);
        store.push_rows(vec![count_row(5)]);
        let method = QueryMethod::builder("findByActiveTrue")
            .returns(ReturnShape::Page)
            .parameter(method::ParameterDescriptor::Pageable)
            .build()
            .unwrap();
        let query: RepositoryQuery<User> =
            RepositoryQuery::new(method, metadata(), Arc::clone(&store) as _).unwrap();
        let outcome = query
            .execute(
                vec![Arg::Pageable(Pageable::of(0, 2))],
                CallScope::none(),
            )
            .unwrap();
        match outcome {
            QueryOutcome::Page(page) => {
                assert_eq!(page.content().len(), 2);
                assert_eq!(page.total_elements(), 5);
            }
            _ => panic!("expected a page"),
        }
    }

    #[test]
    fn test_call_scope_overrides_keyspace() {
        let store = Arc::new(StubStore::new());
        store.push_rows(Vec::new());
        let method = QueryMethod::builder("findByFirstname")
            .returns(ReturnShape::Many)
            .parameter(method::ParameterDescriptor::bindable())
            .build()
            .unwrap();
        let query: RepositoryQuery<User> =
            RepositoryQuery::new(method, metadata(), Arc::clone(&store) as _).unwrap();
        query
            .execute(
                vec![Arg::Value(json!("Ada"))],
                CallScope::none().with_scope("tenant1").with_collection("users"),
            )
            .unwrap();
        assert!(store.recorded()[0].statement.contains("FROM `tenant1.users`"));
    }

    #[test]
    fn test_count_method_uses_count_statement() {
        let store = Arc::new(StubStore::new());
        store.push_rows(vec![count_row(9)]);
        let method = QueryMethod::builder("countByActiveTrue")
            .returns(ReturnShape::Count)
            .build()
            .unwrap();
        let query: RepositoryQuery<User> =
            RepositoryQuery::new(method, metadata(), Arc::clone(&store) as _).unwrap();
        let outcome = query.execute(Vec::new(), CallScope::none()).unwrap();
        assert!(matches!(outcome, QueryOutcome::Count(9)));
        assert!(store.recorded()[0].statement.contains("COUNT(*) AS count"));
    }

    #[test]
    fn test_delete_method_removes_matching() {
        let store = Arc::new(StubStore::new());
        store.push_rows(vec![user_row("Ada")]);
        let method = QueryMethod::builder("deleteByFirstname")
            .returns(ReturnShape::Many)
            .parameter(method::ParameterDescriptor::bindable())
            .build()
            .unwrap();
        let query: RepositoryQuery<User> =
            RepositoryQuery::new(method, metadata(), Arc::clone(&store) as _).unwrap();
        let outcome = query
            .execute(vec![Arg::Value(json!("Ada"))], CallScope::none())
            .unwrap();
        match outcome {
            QueryOutcome::Removed(users) => assert_eq!(users[0].firstname, "Ada"),
            _ => panic!("expected removed entities"),
        }
    }

    #[test]
    fn test_template_method_binds_named_placeholders() {
        let store = Arc::new(StubStore::new());
        store.push_rows(Vec::new());
        let method = QueryMethod::builder("findActiveOlderThan")
            .returns(ReturnShape::Many)
            .inline_query("#{select_entity} WHERE #{filter} AND age > $age")
            .parameter(method::ParameterDescriptor::named("age"))
            .build()
            .unwrap();
        let query: RepositoryQuery<User> =
            RepositoryQuery::new(method, metadata(), Arc::clone(&store) as _).unwrap();
        query
            .execute(vec![Arg::Value(json!(40))], CallScope::none())
            .unwrap();
        let recorded = store.recorded();
        assert!(recorded[0].statement.contains("age > $age"));
        match &recorded[0].placeholders {
            crate::store::Placeholders::Named(values) => assert_eq!(values["age"], json!(40)),
            other => panic!("expected named placeholders, got {:?}", other),
        }
    }
}
