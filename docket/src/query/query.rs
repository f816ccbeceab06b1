use crate::common::{ScanConsistency, Sort};
use crate::errors::DocketResult;
use crate::mapping::EntityMetadata;
use crate::query::criteria::{escape_path, escape_segment, Criteria, ParameterSink};
use itertools::Itertools;
use serde_json::Value;

/// Row alias carrying the document key in rendered statements.
pub const ID_ALIAS: &str = "__id";
/// Row alias carrying the document CAS value in rendered statements.
pub const CAS_ALIAS: &str = "__cas";
/// Column alias produced by count-variant statements.
pub const COUNT_ALIAS: &str = "count";

/// Sentinel meaning "skip/limit not set".
pub const UNSET: i64 = -1;

/// A derived query: criteria plus sort, pagination, consistency and
/// projection, ready to be rendered into a statement.
///
/// A `Query` is created fresh per method invocation and consumed once by the
/// execution dispatcher; variants (such as the count query backing a page
/// total) are produced as copies, never by mutating an instance the caller
/// still holds.
///
/// # Examples
///
/// ```rust,ignore
/// use docket::query::{where_, Query};
///
/// let query = Query::new()
///     .add_criteria(where_("active").eq(true))
///     .skip(20)
///     .limit(10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Query {
    criteria: Option<Criteria>,
    sort: Sort,
    skip: i64,
    limit: i64,
    consistency: ScanConsistency,
    projection: Vec<String>,
    distinct: Vec<String>,
}

impl Query {
    pub fn new() -> Self {
        Query {
            criteria: None,
            sort: Sort::unsorted(),
            skip: UNSET,
            limit: UNSET,
            consistency: ScanConsistency::default(),
            projection: Vec::new(),
            distinct: Vec::new(),
        }
    }

    /// Adds a criteria, AND-combining with any criteria already present.
    pub fn add_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = Some(match self.criteria {
            Some(existing) => existing.and(criteria),
            None => criteria,
        });
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// Sets the number of rows to skip; a negative value clears it.
    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = if skip < 0 { UNSET } else { skip };
        self
    }

    /// Sets the maximum number of rows to return; a negative value clears it.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = if limit < 0 { UNSET } else { limit };
        self
    }

    pub fn with_consistency(mut self, consistency: ScanConsistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Restricts the projected fields instead of selecting the whole entity.
    pub fn project(mut self, fields: Vec<String>) -> Self {
        self.projection = fields;
        self
    }

    /// Sets the distinct-field list; rendering switches to `SELECT DISTINCT`.
    pub fn distinct_fields(mut self, fields: Vec<String>) -> Self {
        self.distinct = fields;
        self
    }

    pub fn criteria(&self) -> Option<&Criteria> {
        self.criteria.as_ref()
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn skip_value(&self) -> i64 {
        self.skip
    }

    pub fn limit_value(&self) -> i64 {
        self.limit
    }

    pub fn consistency(&self) -> ScanConsistency {
        self.consistency
    }

    pub fn distinct(&self) -> &[String] {
        &self.distinct
    }

    /// Derives the count query backing a page total: same criteria and
    /// consistency, no sort, no pagination, no projection. The original
    /// query is left untouched.
    pub fn to_count_query(&self) -> Query {
        Query {
            criteria: self.criteria.clone(),
            sort: Sort::unsorted(),
            skip: UNSET,
            limit: UNSET,
            consistency: self.consistency,
            projection: Vec::new(),
            distinct: self.distinct.clone(),
        }
    }

    /// Renders the data statement for this query.
    ///
    /// Shape: `SELECT <projection> FROM <keyspace> WHERE <type-filter>
    /// [AND <criteria>] [ORDER BY …] [LIMIT n] [OFFSET n]`. Operand values
    /// go through `sink`; rendering the same query twice yields identical
    /// statements.
    pub fn render(&self, metadata: &EntityMetadata, sink: &mut ParameterSink) -> DocketResult<String> {
        let keyspace = escape_segment(metadata.keyspace());
        let mut statement = format!(
            "SELECT {} FROM {}",
            self.select_clause(&keyspace),
            keyspace
        );
        statement.push_str(&self.where_clause(metadata, sink)?);
        if self.sort.is_sorted() {
            let orders = self
                .sort
                .orders()
                .iter()
                .map(|(field, direction)| format!("{} {}", escape_path(field), direction.keyword()))
                .join(", ");
            statement.push_str(&format!(" ORDER BY {}", orders));
        }
        if self.limit >= 0 {
            statement.push_str(&format!(" LIMIT {}", self.limit));
        }
        if self.skip >= 0 {
            statement.push_str(&format!(" OFFSET {}", self.skip));
        }
        log::debug!("Rendered statement: {}", statement);
        Ok(statement)
    }

    /// Renders the count statement for this query.
    ///
    /// Substitutes a `COUNT(*) AS count` projection (or `COUNT(DISTINCT …)`
    /// when a distinct-field list is set) and omits ORDER BY, LIMIT and
    /// OFFSET regardless of this query's own settings.
    pub fn render_count(&self, metadata: &EntityMetadata, sink: &mut ParameterSink) -> DocketResult<String> {
        let keyspace = escape_segment(metadata.keyspace());
        let projection = if self.distinct.is_empty() {
            format!("COUNT(*) AS {}", COUNT_ALIAS)
        } else {
            format!(
                "COUNT(DISTINCT ({})) AS {}",
                self.field_list(&self.distinct),
                COUNT_ALIAS
            )
        };
        let mut statement = format!("SELECT {} FROM {}", projection, keyspace);
        statement.push_str(&self.where_clause(metadata, sink)?);
        log::debug!("Rendered count statement: {}", statement);
        Ok(statement)
    }

    fn select_clause(&self, keyspace: &str) -> String {
        if !self.distinct.is_empty() {
            return format!("DISTINCT {}", self.field_list(&self.distinct));
        }
        let meta = format!(
            "META({ks}).id AS {}, META({ks}).cas AS {}",
            ID_ALIAS,
            CAS_ALIAS,
            ks = keyspace
        );
        if self.projection.is_empty() {
            format!("{}, {}.*", meta, keyspace)
        } else {
            format!("{}, {}", meta, self.field_list(&self.projection))
        }
    }

    fn field_list(&self, fields: &[String]) -> String {
        fields.iter().map(|f| escape_path(f)).join(", ")
    }

    fn where_clause(&self, metadata: &EntityMetadata, sink: &mut ParameterSink) -> DocketResult<String> {
        let type_value = Value::String(metadata.type_value().to_string());
        let mut clause = format!(
            " WHERE {} = {}",
            escape_path(metadata.type_field()),
            type_value
        );
        if let Some(criteria) = &self.criteria {
            let rendered = criteria.render(sink)?;
            if criteria.is_or_group() {
                clause.push_str(&format!(" AND ({})", rendered));
            } else {
                clause.push_str(&format!(" AND {}", rendered));
            }
        }
        Ok(clause)
    }
}
