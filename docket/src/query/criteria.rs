use crate::errors::{DocketError, DocketResult, ErrorKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Leaf predicate operators.
///
/// The set is closed; query creators map method-name keywords onto it and
/// reject anything outside it at construction time. Each operator consumes a
/// fixed number of operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CriteriaOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    StartsWith,
    EndsWith,
    Contains,
    NotContains,
    IsNull,
    IsNotNull,
    IsValued,
    IsNotValued,
    Exists,
    Regex,
    Between,
    In,
    NotIn,
    True,
    False,
}

impl CriteriaOperator {
    /// Number of operand values this operator consumes.
    pub fn arity(self) -> usize {
        match self {
            CriteriaOperator::IsNull
            | CriteriaOperator::IsNotNull
            | CriteriaOperator::IsValued
            | CriteriaOperator::IsNotValued
            | CriteriaOperator::Exists
            | CriteriaOperator::True
            | CriteriaOperator::False => 0,
            CriteriaOperator::Between => 2,
            _ => 1,
        }
    }
}

/// How two criteria are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOperator {
    And,
    Or,
}

/// A boolean predicate tree over document fields.
///
/// A `Criteria` is either a leaf predicate (field path, operator, operands)
/// or an AND/OR combination of two sub-trees. Composition never mutates the
/// operands, so a sub-tree can safely be reused across several combinations.
///
/// # Examples
///
/// ```rust,ignore
/// use docket::query::where_;
///
/// let criteria = where_("firstname").eq("Ada").and(where_("active").eq(true));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Leaf {
        path: String,
        operator: CriteriaOperator,
        values: Vec<Value>,
    },
    Group {
        op: ChainOperator,
        left: Box<Criteria>,
        right: Box<Criteria>,
    },
}

/// Starts a criteria builder for the given document field path.
pub fn where_(path: &str) -> CriteriaBuilder {
    CriteriaBuilder {
        path: path.to_string(),
    }
}

impl Criteria {
    /// Creates a leaf predicate, validating operand arity.
    ///
    /// `In`/`NotIn` accept either an array operand or a single scalar, which
    /// is wrapped into a singleton array. A wrong operand count for any other
    /// operator is a query-creation error.
    pub fn leaf(path: &str, operator: CriteriaOperator, mut values: Vec<Value>) -> DocketResult<Criteria> {
        if matches!(operator, CriteriaOperator::In | CriteriaOperator::NotIn) {
            if values.len() != 1 {
                return Err(arity_error(path, operator, values.len()));
            }
            let operand = values.remove(0);
            let array = match operand {
                Value::Array(items) => Value::Array(items),
                scalar => Value::Array(vec![scalar]),
            };
            values = vec![array];
        } else if values.len() != operator.arity() {
            return Err(arity_error(path, operator, values.len()));
        }
        Ok(Criteria::Leaf {
            path: path.to_string(),
            operator,
            values,
        })
    }

    /// Combines this criteria with another via AND, returning a new tree.
    pub fn and(self, other: Criteria) -> Criteria {
        Criteria::Group {
            op: ChainOperator::And,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// Combines this criteria with another via OR, returning a new tree.
    pub fn or(self, other: Criteria) -> Criteria {
        Criteria::Group {
            op: ChainOperator::Or,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// True when the root of this tree is an OR combination.
    ///
    /// Callers appending the rendered tree after an `AND` must wrap it in
    /// parentheses in that case.
    pub fn is_or_group(&self) -> bool {
        matches!(
            self,
            Criteria::Group {
                op: ChainOperator::Or,
                ..
            }
        )
    }

    /// Renders this tree to a predicate string, pushing operand values into
    /// the given sink.
    ///
    /// Rendering the same tree into a fresh sink always yields the same
    /// string, so a query can safely be rendered twice (e.g. once for the
    /// data query and once for the derived count query).
    pub fn render(&self, sink: &mut ParameterSink) -> DocketResult<String> {
        match self {
            Criteria::Leaf {
                path,
                operator,
                values,
            } => render_leaf(path, *operator, values, sink),
            Criteria::Group { op, left, right } => {
                let lhs = render_operand(left, *op, sink)?;
                let rhs = render_operand(right, *op, sink)?;
                let keyword = match op {
                    ChainOperator::And => "AND",
                    ChainOperator::Or => "OR",
                };
                Ok(format!("{} {} {}", lhs, keyword, rhs))
            }
        }
    }
}

// An OR child under an AND parent must keep its own grouping.
fn render_operand(child: &Criteria, parent: ChainOperator, sink: &mut ParameterSink) -> DocketResult<String> {
    let rendered = child.render(sink)?;
    if parent == ChainOperator::And && child.is_or_group() {
        Ok(format!("({})", rendered))
    } else {
        Ok(rendered)
    }
}

fn render_leaf(
    path: &str,
    operator: CriteriaOperator,
    values: &[Value],
    sink: &mut ParameterSink,
) -> DocketResult<String> {
    let field = escape_path(path);
    let rendered = match operator {
        CriteriaOperator::Eq => format!("{} = {}", field, sink.bind(&values[0])),
        CriteriaOperator::Ne => format!("{} != {}", field, sink.bind(&values[0])),
        CriteriaOperator::Gt => format!("{} > {}", field, sink.bind(&values[0])),
        CriteriaOperator::Gte => format!("{} >= {}", field, sink.bind(&values[0])),
        CriteriaOperator::Lt => format!("{} < {}", field, sink.bind(&values[0])),
        CriteriaOperator::Lte => format!("{} <= {}", field, sink.bind(&values[0])),
        CriteriaOperator::Like => format!("{} like {}", field, sink.bind(&values[0])),
        CriteriaOperator::NotLike => format!("not( {} like {} )", field, sink.bind(&values[0])),
        CriteriaOperator::StartsWith => {
            format!("{} like ({}||\"%\")", field, sink.bind(&values[0]))
        }
        CriteriaOperator::EndsWith => {
            format!("{} like (\"%\"||{})", field, sink.bind(&values[0]))
        }
        CriteriaOperator::Contains => format!("contains({}, {})", field, sink.bind(&values[0])),
        CriteriaOperator::NotContains => {
            format!("not( contains({}, {}) )", field, sink.bind(&values[0]))
        }
        CriteriaOperator::IsNull => format!("{} is null", field),
        CriteriaOperator::IsNotNull => format!("{} is not null", field),
        CriteriaOperator::IsValued => format!("{} is valued", field),
        CriteriaOperator::IsNotValued => format!("{} is not valued", field),
        CriteriaOperator::Exists => format!("{} is not missing", field),
        CriteriaOperator::Regex => format!("regexp_like({}, {})", field, sink.bind(&values[0])),
        CriteriaOperator::Between => format!(
            "{} between {} and {}",
            field,
            sink.bind(&values[0]),
            sink.bind(&values[1])
        ),
        CriteriaOperator::In => format!("{} in {}", field, sink.bind(&values[0])),
        CriteriaOperator::NotIn => format!("not( {} in {} )", field, sink.bind(&values[0])),
        CriteriaOperator::True => format!("{} = true", field),
        CriteriaOperator::False => format!("{} = false", field),
    };
    Ok(rendered)
}

fn arity_error(path: &str, operator: CriteriaOperator, got: usize) -> DocketError {
    log::error!(
        "Operator {:?} on '{}' expects {} operand(s), got {}",
        operator,
        path,
        operator.arity(),
        got
    );
    DocketError::new(
        &format!(
            "Operator {:?} expects {} operand(s) but {} were supplied",
            operator,
            operator.arity(),
            got
        ),
        ErrorKind::QueryCreationError,
    )
}

/// Collects operand values during criteria rendering.
///
/// `Literal` inlines each operand as a JSON literal (used for statements
/// submitted without a parameter list); `Positional` replaces each operand
/// with the next `$n` placeholder and records the value for binding.
#[derive(Debug)]
pub enum ParameterSink {
    Literal,
    Positional { values: Vec<Value> },
}

impl ParameterSink {
    pub fn literal() -> Self {
        ParameterSink::Literal
    }

    pub fn positional() -> Self {
        ParameterSink::Positional { values: Vec::new() }
    }

    /// Emits the placeholder (or literal) for one operand.
    pub fn bind(&mut self, value: &Value) -> String {
        match self {
            ParameterSink::Literal => value.to_string(),
            ParameterSink::Positional { values } => {
                values.push(value.clone());
                format!("${}", values.len())
            }
        }
    }

    /// The collected positional values, in binding order.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            ParameterSink::Literal => Vec::new(),
            ParameterSink::Positional { values } => values,
        }
    }
}

static PLAIN_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("invalid identifier pattern"));

const RESERVED_WORDS: &[&str] = &[
    "select", "from", "where", "order", "group", "limit", "offset", "and", "or", "not", "in",
    "like", "between", "is", "null", "missing", "valued", "true", "false", "meta", "count",
];

/// Escapes a dotted field path for the query language.
///
/// Each segment that is not a plain identifier, or that collides with a
/// reserved word, is wrapped in backticks.
pub fn escape_path(path: &str) -> String {
    path.split('.')
        .map(escape_segment)
        .collect::<Vec<_>>()
        .join(".")
}

/// Escapes a single identifier (e.g. a keyspace name) for the query language.
pub fn escape_segment(segment: &str) -> String {
    if PLAIN_IDENTIFIER.is_match(segment) && !RESERVED_WORDS.contains(&segment.to_lowercase().as_str())
    {
        segment.to_string()
    } else {
        format!("`{}`", segment)
    }
}

/// Builder created by [`where_`]; each operator method produces a leaf.
pub struct CriteriaBuilder {
    path: String,
}

impl CriteriaBuilder {
    fn leaf(self, operator: CriteriaOperator, values: Vec<Value>) -> Criteria {
        // arity is fixed per builder method, so this cannot fail
        Criteria::Leaf {
            path: self.path,
            operator,
            values,
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::Eq, vec![value.into()])
    }

    pub fn ne(self, value: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::Ne, vec![value.into()])
    }

    pub fn gt(self, value: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::Gt, vec![value.into()])
    }

    pub fn gte(self, value: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::Gte, vec![value.into()])
    }

    pub fn lt(self, value: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::Lt, vec![value.into()])
    }

    pub fn lte(self, value: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::Lte, vec![value.into()])
    }

    pub fn like(self, value: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::Like, vec![value.into()])
    }

    pub fn not_like(self, value: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::NotLike, vec![value.into()])
    }

    pub fn starts_with(self, value: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::StartsWith, vec![value.into()])
    }

    pub fn ends_with(self, value: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::EndsWith, vec![value.into()])
    }

    pub fn contains(self, value: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::Contains, vec![value.into()])
    }

    pub fn not_contains(self, value: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::NotContains, vec![value.into()])
    }

    pub fn is_null(self) -> Criteria {
        self.leaf(CriteriaOperator::IsNull, Vec::new())
    }

    pub fn is_not_null(self) -> Criteria {
        self.leaf(CriteriaOperator::IsNotNull, Vec::new())
    }

    pub fn is_valued(self) -> Criteria {
        self.leaf(CriteriaOperator::IsValued, Vec::new())
    }

    pub fn is_not_valued(self) -> Criteria {
        self.leaf(CriteriaOperator::IsNotValued, Vec::new())
    }

    pub fn exists(self) -> Criteria {
        self.leaf(CriteriaOperator::Exists, Vec::new())
    }

    pub fn regex(self, value: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::Regex, vec![value.into()])
    }

    pub fn between(self, lower: impl Into<Value>, upper: impl Into<Value>) -> Criteria {
        self.leaf(CriteriaOperator::Between, vec![lower.into(), upper.into()])
    }

    /// Membership test; a scalar operand is wrapped into a singleton array.
    pub fn in_(self, value: impl Into<Value>) -> Criteria {
        let operand = match value.into() {
            Value::Array(items) => Value::Array(items),
            scalar => Value::Array(vec![scalar]),
        };
        self.leaf(CriteriaOperator::In, vec![operand])
    }

    /// Negated membership test; a scalar operand is wrapped like [`in_`].
    ///
    /// [`in_`]: CriteriaBuilder::in_
    pub fn not_in(self, value: impl Into<Value>) -> Criteria {
        let operand = match value.into() {
            Value::Array(items) => Value::Array(items),
            scalar => Value::Array(vec![scalar]),
        };
        self.leaf(CriteriaOperator::NotIn, vec![operand])
    }

    pub fn is_true(self) -> Criteria {
        self.leaf(CriteriaOperator::True, Vec::new())
    }

    pub fn is_false(self) -> Criteria {
        self.leaf(CriteriaOperator::False, Vec::new())
    }
}
