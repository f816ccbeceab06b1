use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::mapping::EntityMetadata;
use crate::query::{escape_path, escape_segment, CAS_ALIAS, COUNT_ALIAS, ID_ALIAS};
use crate::repository::binding::ParameterAccessor;
use crate::repository::method::{QueryMethod, ReturnShape};
use crate::store::Placeholders;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Template variable expanding to the full entity select clause.
pub const SELECT_ENTITY: &str = "#{select_entity}";
/// Template variable expanding to the entity's projected field list.
pub const FIELDS: &str = "#{fields}";
/// Template variable expanding to the escaped keyspace reference.
pub const BUCKET: &str = "#{bucket}";
/// Template variable expanding to the entity type filter predicate.
pub const FILTER: &str = "#{filter}";

static POSITIONAL_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\W(\$\d+)\b").expect("invalid positional pattern"));

static NAMED_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\W(\$[[:alpha:]][[:alnum:]]*)\b").expect("invalid named pattern"));

// Escape-aware quoted spans; placeholders inside them are literal text.
static QUOTED_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'](?:[^"'\\]*(?:\\.)?)*["']"#).expect("invalid quote pattern"));

/// Placeholder style of a template, determined once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    Named,
    Positional,
    None,
}

/// A query method backed by an inline template string.
///
/// Construction substitutes the template variables against the entity,
/// prepares the count variant and classifies the placeholder style; a
/// template mixing `$1` and `$name` placeholders outside quoted literals is
/// rejected here, before the method ever executes.
pub struct StringTemplateQueryCreator {
    statement: String,
    count_statement: Option<String>,
    style: PlaceholderStyle,
}

impl std::fmt::Debug for StringTemplateQueryCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringTemplateQueryCreator")
            .field("statement", &self.statement)
            .field("count_statement", &self.count_statement)
            .finish_non_exhaustive()
    }
}

impl StringTemplateQueryCreator {
    pub fn new(template: &str, metadata: &EntityMetadata) -> DocketResult<StringTemplateQueryCreator> {
        let style = classify(template)?;
        let statement = substitute(template, metadata, false);
        let count_statement = if template.contains(SELECT_ENTITY) {
            Some(substitute(template, metadata, true))
        } else {
            None
        };
        log::debug!("Prepared template statement: {}", statement);
        Ok(StringTemplateQueryCreator {
            statement,
            count_statement,
            style,
        })
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// The count variant, available when the template used the full-select
    /// shortcut variable.
    pub fn count_statement(&self) -> Option<&str> {
        self.count_statement.as_deref()
    }

    pub fn style(&self) -> PlaceholderStyle {
        self.style
    }

    /// Checks the template against the declaring method.
    ///
    /// A named-placeholder template requires every bindable parameter to
    /// declare a placeholder name, and a method whose execution needs the
    /// count variant must opt into the full-select template variable. Both
    /// are declaration faults; they fail when the repository is assembled.
    pub fn validate_declaration(&self, method: &QueryMethod) -> DocketResult<()> {
        if self.style == PlaceholderStyle::Named {
            if let Some(index) = method.bindable_names().iter().position(|n| n.is_none()) {
                return Err(DocketError::new(
                    &format!(
                        "Parameter {} of {} must declare a placeholder name \
                         for a named-placeholder template",
                        index,
                        method.name()
                    ),
                    ErrorKind::InvalidQueryMethod,
                ));
            }
        }
        let needs_count = !method.is_delete_query()
            && (method.is_count_query()
                || method.is_exists_query()
                || matches!(
                    method.shape(),
                    ReturnShape::Page | ReturnShape::Count | ReturnShape::Exists
                ));
        if needs_count && self.count_statement.is_none() {
            return Err(DocketError::new(
                &format!(
                    "Method {} needs a count variant of its template; \
                     use the full-select template variable",
                    method.name()
                ),
                ErrorKind::InvalidQueryMethod,
            ));
        }
        Ok(())
    }

    /// Binds the resolved arguments according to the placeholder style.
    ///
    /// Positional templates take the bindable values in declaration order;
    /// named templates require every bindable parameter to declare a
    /// placeholder name.
    pub fn bind(
        &self,
        accessor: &ParameterAccessor,
        method: &QueryMethod,
    ) -> DocketResult<Placeholders> {
        match self.style {
            PlaceholderStyle::None => Ok(Placeholders::None),
            PlaceholderStyle::Positional => {
                Ok(Placeholders::Positional(accessor.values().to_vec()))
            }
            PlaceholderStyle::Named => {
                let names = method.bindable_names();
                let mut bound: IndexMap<String, Value> = IndexMap::new();
                for (index, value) in accessor.values().iter().enumerate() {
                    let name = names.get(index).copied().flatten().ok_or_else(|| {
                        DocketError::new(
                            &format!(
                                "Parameter {} of {} must declare a placeholder name \
                                 for a named-placeholder template",
                                index,
                                method.name()
                            ),
                            ErrorKind::InvalidQueryMethod,
                        )
                    })?;
                    bound.insert(name.to_string(), value.clone());
                }
                Ok(Placeholders::Named(bound))
            }
        }
    }
}

fn substitute(template: &str, metadata: &EntityMetadata, count: bool) -> String {
    let keyspace = escape_segment(metadata.keyspace());
    let select_entity = if count {
        format!("SELECT COUNT(*) AS {} FROM {}", COUNT_ALIAS, keyspace)
    } else {
        format!(
            "SELECT META({ks}).id AS {}, META({ks}).cas AS {}, {ks}.* FROM {ks}",
            ID_ALIAS,
            CAS_ALIAS,
            ks = keyspace
        )
    };
    let fields = {
        let names = metadata.field_names();
        if names.is_empty() {
            format!("{}.*", keyspace)
        } else {
            names
                .iter()
                .map(|f| escape_path(f))
                .collect::<Vec<_>>()
                .join(", ")
        }
    };
    let filter = format!(
        "{} = {}",
        escape_path(metadata.type_field()),
        Value::String(metadata.type_value().to_string())
    );
    template
        .replace(SELECT_ENTITY, &select_entity)
        .replace(FIELDS, &fields)
        .replace(BUCKET, &keyspace)
        .replace(FILTER, &filter)
}

fn classify(template: &str) -> DocketResult<PlaceholderStyle> {
    let quoted: Vec<(usize, usize)> = QUOTED_SPAN
        .find_iter(template)
        .map(|m| (m.start(), m.end()))
        .collect();
    let outside = |start: usize, end: usize| {
        !quoted.iter().any(|(qs, qe)| start >= *qs && end <= *qe)
    };
    let has_positional = POSITIONAL_PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1))
        .any(|m| outside(m.start(), m.end()));
    let has_named = NAMED_PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1))
        .any(|m| outside(m.start(), m.end()));
    match (has_positional, has_named) {
        (true, true) => {
            log::error!("Template mixes positional and named placeholders: {}", template);
            Err(DocketError::new(
                "Template must not mix positional ($1) and named ($name) placeholders",
                ErrorKind::InvalidQueryMethod,
            ))
        }
        (true, false) => Ok(PlaceholderStyle::Positional),
        (false, true) => Ok(PlaceholderStyle::Named),
        (false, false) => Ok(PlaceholderStyle::None),
    }
}
