//! Parsing of repository method names into predicate part trees.
//!
//! A method name like `findByFirstnameAndLastnameOrActive` is tokenized into
//! a subject (find/count/exists/delete intent, distinct fields, result
//! limit) and a predicate: OR-groups of parts, each part naming a property
//! segment and an operator keyword. Query creators fold the parts into a
//! criteria tree.

use crate::errors::{DocketError, DocketResult, ErrorKind};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::common::SortOrder;

/// Operator keyword recognized in a method-name part.
///
/// This is a superset of the criteria operators: `Near` and `Within` only
/// make sense for the view-backed spatial derivation and are rejected by the
/// statement-language creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKeyword {
    SimpleProperty,
    NegatingSimpleProperty,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Between,
    IsNull,
    IsNotNull,
    Like,
    NotLike,
    StartingWith,
    EndingWith,
    Containing,
    NotContaining,
    In,
    NotIn,
    Regex,
    Exists,
    True,
    False,
    Near,
    Within,
}

impl PartKeyword {
    /// Number of runtime parameters this keyword consumes.
    pub fn parameter_count(self) -> usize {
        match self {
            PartKeyword::IsNull
            | PartKeyword::IsNotNull
            | PartKeyword::Exists
            | PartKeyword::True
            | PartKeyword::False => 0,
            PartKeyword::Between => 2,
            _ => 1,
        }
    }
}

// Longest suffix first, so "GreaterThanEqual" wins over "GreaterThan".
static KEYWORD_TABLE: Lazy<Vec<(&'static str, PartKeyword)>> = Lazy::new(|| {
    let mut table = vec![
        ("GreaterThanEqual", PartKeyword::GreaterThanEqual),
        ("IsGreaterThanEqual", PartKeyword::GreaterThanEqual),
        ("GreaterThan", PartKeyword::GreaterThan),
        ("IsGreaterThan", PartKeyword::GreaterThan),
        ("LessThanEqual", PartKeyword::LessThanEqual),
        ("IsLessThanEqual", PartKeyword::LessThanEqual),
        ("LessThan", PartKeyword::LessThan),
        ("IsLessThan", PartKeyword::LessThan),
        ("After", PartKeyword::GreaterThan),
        ("IsAfter", PartKeyword::GreaterThan),
        ("Before", PartKeyword::LessThan),
        ("IsBefore", PartKeyword::LessThan),
        ("Between", PartKeyword::Between),
        ("IsBetween", PartKeyword::Between),
        ("IsNotNull", PartKeyword::IsNotNull),
        ("NotNull", PartKeyword::IsNotNull),
        ("IsNull", PartKeyword::IsNull),
        ("Null", PartKeyword::IsNull),
        ("NotLike", PartKeyword::NotLike),
        ("IsNotLike", PartKeyword::NotLike),
        ("Like", PartKeyword::Like),
        ("IsLike", PartKeyword::Like),
        ("StartingWith", PartKeyword::StartingWith),
        ("IsStartingWith", PartKeyword::StartingWith),
        ("StartsWith", PartKeyword::StartingWith),
        ("EndingWith", PartKeyword::EndingWith),
        ("IsEndingWith", PartKeyword::EndingWith),
        ("EndsWith", PartKeyword::EndingWith),
        ("NotContaining", PartKeyword::NotContaining),
        ("IsNotContaining", PartKeyword::NotContaining),
        ("NotContains", PartKeyword::NotContaining),
        ("Containing", PartKeyword::Containing),
        ("IsContaining", PartKeyword::Containing),
        ("Contains", PartKeyword::Containing),
        ("NotIn", PartKeyword::NotIn),
        ("IsNotIn", PartKeyword::NotIn),
        ("In", PartKeyword::In),
        ("IsIn", PartKeyword::In),
        ("MatchesRegex", PartKeyword::Regex),
        ("Matches", PartKeyword::Regex),
        ("Regex", PartKeyword::Regex),
        ("Exists", PartKeyword::Exists),
        ("IsTrue", PartKeyword::True),
        ("True", PartKeyword::True),
        ("IsFalse", PartKeyword::False),
        ("False", PartKeyword::False),
        ("IsNot", PartKeyword::NegatingSimpleProperty),
        ("Not", PartKeyword::NegatingSimpleProperty),
        ("IsNear", PartKeyword::Near),
        ("Near", PartKeyword::Near),
        ("IsWithin", PartKeyword::Within),
        ("Within", PartKeyword::Within),
        ("Equals", PartKeyword::SimpleProperty),
        ("Is", PartKeyword::SimpleProperty),
    ];
    table.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    table
});

static SUBJECT_TEMPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(find|read|get|query|search|stream|count|exists|delete|remove)(\p{Lu}.*?)?By(.*)$",
    )
    .expect("invalid subject pattern")
});

static SUBJECT_ONLY_TEMPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(find|read|get|query|search|stream|count|exists|delete|remove)(\p{Lu}.*)?$")
        .expect("invalid subject pattern")
});


/// One predicate fragment: a raw property segment plus operator keyword.
///
/// The segment is resolved against entity metadata by the query creator,
/// not here, so the parser stays metadata-independent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub property: String,
    pub keyword: PartKeyword,
}

/// What the method name says about the result, before the `By`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    pub count: bool,
    pub exists: bool,
    pub delete: bool,
    pub distinct_segments: Vec<String>,
    pub limit: Option<u64>,
}

/// The parsed method name: subject, OR-groups of AND-ed parts, and any
/// name-encoded sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartTree {
    subject: Subject,
    or_groups: Vec<Vec<Part>>,
    sort: Vec<(String, SortOrder)>,
}

impl PartTree {
    /// Parses a repository method name.
    ///
    /// A name without a `By` separator yields a match-all tree (no parts),
    /// keeping whatever intent the prefix declares; a name that is not a
    /// recognizable query method at all is rejected.
    pub fn parse(method_name: &str) -> DocketResult<PartTree> {
        if let Some(captures) = SUBJECT_TEMPLATE.captures(method_name) {
            let prefix = &captures[1];
            let middle = captures.get(2).map(|m| m.as_str()).unwrap_or("");
            let predicate = &captures[3];
            let subject = parse_subject(prefix, middle);
            let (or_groups, sort) = parse_predicate(predicate, method_name)?;
            return Ok(PartTree {
                subject,
                or_groups,
                sort,
            });
        }
        if let Some(captures) = SUBJECT_ONLY_TEMPLATE.captures(method_name) {
            let prefix = &captures[1];
            let middle = captures.get(2).map(|m| m.as_str()).unwrap_or("");
            return Ok(PartTree {
                subject: parse_subject(prefix, middle),
                or_groups: Vec::new(),
                sort: Vec::new(),
            });
        }
        log::error!("Method name '{}' is not a derivable query", method_name);
        Err(DocketError::new(
            &format!("Cannot derive a query from method name: {}", method_name),
            ErrorKind::InvalidQueryMethod,
        ))
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// OR-groups in declaration order; parts within a group are AND-ed.
    pub fn or_groups(&self) -> &[Vec<Part>] {
        &self.or_groups
    }

    /// Name-encoded sort instructions as (raw property segment, direction).
    pub fn sort(&self) -> &[(String, SortOrder)] {
        &self.sort
    }

    /// Total runtime parameters the predicate consumes.
    pub fn parameter_count(&self) -> usize {
        self.or_groups
            .iter()
            .flatten()
            .map(|part| part.keyword.parameter_count())
            .sum()
    }
}

fn parse_subject(prefix: &str, middle: &str) -> Subject {
    let mut subject = Subject {
        count: prefix == "count",
        exists: prefix == "exists",
        delete: prefix == "delete" || prefix == "remove",
        ..Subject::default()
    };
    let mut remainder = middle;
    if let Some(rest) = middle.strip_prefix("Distinct") {
        let (fields, tail) = match find_limit_keyword(rest) {
            Some(index) => (&rest[..index], &rest[index..]),
            None => (rest, ""),
        };
        subject.distinct_segments = split_keyword(fields, "And");
        remainder = tail;
    }
    subject.limit = parse_limit(remainder);
    subject
}

fn parse_limit(source: &str) -> Option<u64> {
    let index = find_limit_keyword(source)?;
    let after = &source[index..];
    let rest = after
        .strip_prefix("First")
        .or_else(|| after.strip_prefix("Top"))?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    Some(if digits.is_empty() {
        1
    } else {
        digits.parse().unwrap_or(1)
    })
}

// Earliest camel-boundary occurrence of "First"/"Top": the keyword must be
// followed by an uppercase letter, a digit or the end of the string, so a
// property like "Firstname" or "Topic" is not mistaken for a result limit.
fn find_limit_keyword(source: &str) -> Option<usize> {
    for (index, _) in source.char_indices() {
        for keyword in ["First", "Top"] {
            if source[index..].starts_with(keyword) {
                let boundary_ok = source[index + keyword.len()..]
                    .chars()
                    .next()
                    .map(|c| c.is_uppercase() || c.is_ascii_digit())
                    .unwrap_or(true);
                if boundary_ok {
                    return Some(index);
                }
            }
        }
    }
    None
}

fn parse_predicate(
    predicate: &str,
    method_name: &str,
) -> DocketResult<(Vec<Vec<Part>>, Vec<(String, SortOrder)>)> {
    let (criteria_source, order_source) = match split_once_keyword(predicate, "OrderBy") {
        Some((before, after)) => (before, Some(after)),
        None => (predicate.to_string(), None),
    };
    let mut or_groups = Vec::new();
    if !criteria_source.is_empty() {
        for or_chunk in split_keyword(&criteria_source, "Or") {
            let mut group = Vec::new();
            for and_chunk in split_keyword(&or_chunk, "And") {
                group.push(parse_part(&and_chunk, method_name)?);
            }
            or_groups.push(group);
        }
    }
    let sort = match order_source {
        Some(source) => parse_order_clause(&source, method_name)?,
        None => Vec::new(),
    };
    Ok((or_groups, sort))
}

fn parse_part(source: &str, method_name: &str) -> DocketResult<Part> {
    if source.is_empty() {
        return Err(DocketError::new(
            &format!("Empty predicate part in method name: {}", method_name),
            ErrorKind::InvalidQueryMethod,
        ));
    }
    for (suffix, keyword) in KEYWORD_TABLE.iter() {
        if let Some(property) = source.strip_suffix(suffix) {
            if !property.is_empty() {
                return Ok(Part {
                    property: property.to_string(),
                    keyword: *keyword,
                });
            }
        }
    }
    Ok(Part {
        property: source.to_string(),
        keyword: PartKeyword::SimpleProperty,
    })
}

fn parse_order_clause(source: &str, method_name: &str) -> DocketResult<Vec<(String, SortOrder)>> {
    let mut orders = Vec::new();
    let mut remainder = source;
    while !remainder.is_empty() {
        let asc = find_keyword(remainder, "Asc");
        let desc = find_keyword(remainder, "Desc");
        let (index, keyword_len, direction) = match (asc, desc) {
            (Some(a), Some(d)) if a < d => (a, 3, SortOrder::Ascending),
            (Some(_), Some(d)) => (d, 4, SortOrder::Descending),
            (Some(a), None) => (a, 3, SortOrder::Ascending),
            (None, Some(d)) => (d, 4, SortOrder::Descending),
            (None, None) => {
                log::error!(
                    "Order clause '{}' in '{}' lacks an Asc/Desc direction",
                    source,
                    method_name
                );
                return Err(DocketError::new(
                    &format!("Invalid order syntax in method name: {}", method_name),
                    ErrorKind::InvalidQueryMethod,
                ));
            }
        };
        let property = &remainder[..index];
        if property.is_empty() {
            return Err(DocketError::new(
                &format!("Invalid order syntax in method name: {}", method_name),
                ErrorKind::InvalidQueryMethod,
            ));
        }
        orders.push((property.to_string(), direction));
        remainder = &remainder[index + keyword_len..];
    }
    Ok(orders)
}

/// Splits `source` on camel-hump occurrences of `keyword` (the keyword must
/// be followed by an uppercase letter or the end of the string, so property
/// names merely containing the keyword are left intact).
fn split_keyword(source: &str, keyword: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = source.to_string();
    while let Some((before, after)) = split_once_keyword(&rest, keyword) {
        chunks.push(before);
        rest = after;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

fn split_once_keyword(source: &str, keyword: &str) -> Option<(String, String)> {
    find_keyword(source, keyword)
        .map(|index| {
            (
                source[..index].to_string(),
                source[index + keyword.len()..].to_string(),
            )
        })
}

// First camel-hump occurrence of the keyword: it must start past the first
// character and the next character must be uppercase (or the string ends).
fn find_keyword(source: &str, keyword: &str) -> Option<usize> {
    let mut search_from = 0;
    while let Some(relative) = source[search_from..].find(keyword) {
        let index = search_from + relative;
        let end = index + keyword.len();
        let boundary_ok = index > 0
            && source[end..]
                .chars()
                .next()
                .map(|c| c.is_uppercase())
                .unwrap_or(true);
        if boundary_ok {
            return Some(index);
        }
        search_from = index + 1;
    }
    None
}
