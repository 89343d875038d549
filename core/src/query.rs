//! Search, ordering, and paging specifications.
//!
//! A [`SearchSpec`] maps column names to filter terms. Each term is either a
//! literal (equality, or an `IS` comparison for `null`), one advanced
//! [`Condition`], or a list of conditions on the same column. All terms are
//! AND-combined in the order they were added.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ParseError, Result};

/// Comparison mode of an advanced search condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchMode {
    /// Equal to the value (`IS` for `null`).
    Equals,
    /// Not equal to the value (`IS NOT` for `null`).
    Not,
    /// Contains the value as a substring.
    Like,
    /// Strictly smaller than the value.
    SmallerThan,
    /// Strictly greater than the value.
    GreaterThan,
}

impl SearchMode {
    /// Returns the mode name as it appears in serialized search specs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Equals => "equals",
            SearchMode::Not => "not",
            SearchMode::Like => "like",
            SearchMode::SmallerThan => "smallerThan",
            SearchMode::GreaterThan => "greaterThan",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "equals" => Ok(SearchMode::Equals),
            "not" => Ok(SearchMode::Not),
            "like" => Ok(SearchMode::Like),
            "smallerThan" => Ok(SearchMode::SmallerThan),
            "greaterThan" => Ok(SearchMode::GreaterThan),
            other => Err(ParseError::UnknownSearchMode(other.to_string())),
        }
    }
}

/// An advanced `{mode, value}` filter on one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Comparison mode.
    pub mode: SearchMode,
    /// Operand, in the column's in-memory representation.
    pub value: Value,
}

impl Condition {
    /// Creates a condition with an explicit mode.
    pub fn new(mode: SearchMode, value: impl Into<Value>) -> Self {
        Self {
            mode,
            value: value.into(),
        }
    }

    pub fn equals(value: impl Into<Value>) -> Self {
        Self::new(SearchMode::Equals, value)
    }

    pub fn not(value: impl Into<Value>) -> Self {
        Self::new(SearchMode::Not, value)
    }

    pub fn like(term: impl Into<String>) -> Self {
        Self::new(SearchMode::Like, Value::String(term.into()))
    }

    pub fn smaller_than(value: impl Into<Value>) -> Self {
        Self::new(SearchMode::SmallerThan, value)
    }

    pub fn greater_than(value: impl Into<Value>) -> Self {
        Self::new(SearchMode::GreaterThan, value)
    }
}

/// Filter term for one column of a [`SearchSpec`].
#[derive(Debug, Clone, PartialEq)]
pub enum SearchTerm {
    /// Plain literal, compared for equality.
    Value(Value),
    /// A single advanced condition.
    Condition(Condition),
    /// Several advanced conditions, AND-combined.
    Conditions(Vec<Condition>),
}

/// Declarative filter translated into a `WHERE` clause.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use sqlcon_core::{Condition, SearchSpec, SearchTerm};
///
/// // Adults whose name contains "an"
/// let spec = SearchSpec::new()
///     .with_conditions("age", vec![Condition::greater_than(17), Condition::smaller_than(65)])
///     .with_condition("name", Condition::like("an"));
/// assert_eq!(spec.len(), 2);
///
/// // The same filter in its untyped JSON form
/// let parsed = SearchSpec::from_json(&json!({
///     "age": [{"mode": "greaterThan", "value": 17}, {"mode": "smallerThan", "value": 65}],
///     "name": {"mode": "like", "value": "an"}
/// }))
/// .unwrap();
/// assert_eq!(parsed, spec);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchSpec {
    terms: Vec<(String, SearchTerm)>,
}

impl SearchSpec {
    /// Creates an empty spec, which matches every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plain literal term.
    pub fn with_value(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_term(field, SearchTerm::Value(value.into()))
    }

    /// Adds a single advanced condition.
    pub fn with_condition(self, field: impl Into<String>, condition: Condition) -> Self {
        self.with_term(field, SearchTerm::Condition(condition))
    }

    /// Adds several advanced conditions on the same column.
    pub fn with_conditions(self, field: impl Into<String>, conditions: Vec<Condition>) -> Self {
        self.with_term(field, SearchTerm::Conditions(conditions))
    }

    /// Adds a term.
    pub fn with_term(mut self, field: impl Into<String>, term: SearchTerm) -> Self {
        self.terms.push((field.into(), term));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Terms in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SearchTerm)> {
        self.terms.iter().map(|(field, term)| (field.as_str(), term))
    }

    /// Parses the untyped `{field: literal | {mode, value} | [{mode, value}]}`
    /// form.
    ///
    /// An object with exactly the keys `mode` and `value` is an advanced
    /// condition; a non-empty array made only of such objects is a condition
    /// list. Anything else is a literal.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnknownSearchMode`] for an unrecognized mode and
    /// [`ParseError::InvalidSearch`] if `json` is not an object.
    pub fn from_json(json: &Value) -> Result<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| ParseError::InvalidSearch("expected a JSON object".to_string()))?;

        let mut spec = SearchSpec::new();
        for (field, raw) in object {
            let term = if is_condition_shape(raw) {
                SearchTerm::Condition(parse_condition(raw)?)
            } else if let Some(items) = raw
                .as_array()
                .filter(|items| !items.is_empty() && items.iter().all(is_condition_shape))
            {
                SearchTerm::Conditions(items.iter().map(parse_condition).collect::<Result<_>>()?)
            } else {
                SearchTerm::Value(raw.clone())
            };
            spec.terms.push((field.clone(), term));
        }
        Ok(spec)
    }
}

fn is_condition_shape(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.len() == 2 && o.contains_key("mode") && o.contains_key("value"))
}

fn parse_condition(value: &Value) -> Result<Condition> {
    let mode = match &value["mode"] {
        Value::String(mode) => mode.parse()?,
        other => return Err(ParseError::UnknownSearchMode(other.to_string())),
    };
    Ok(Condition {
        mode,
        value: value["value"].clone(),
    })
}

/// Sort direction of an [`OrderBy`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    /// SQL keyword for the direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        }
    }
}

/// One `{key, direction}` sort entry. Earlier entries take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub key: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: Direction::Descending,
        }
    }
}

/// Filter, ordering, and paging for list queries.
///
/// A `limit` of `Some(0)` yields an empty result without touching storage.
///
/// # Examples
///
/// ```
/// use sqlcon_core::{ListQuery, OrderBy, SearchSpec};
///
/// let query = ListQuery::new()
///     .with_search(SearchSpec::new().with_value("active", true))
///     .with_order(OrderBy::desc("age"))
///     .with_limit(10)
///     .with_offset(20);
/// assert_eq!(query.limit, Some(10));
/// assert_eq!(query.order.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListQuery {
    pub search: SearchSpec,
    pub order: Vec<OrderBy>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, search: SearchSpec) -> Self {
        self.search = search;
        self
    }

    /// Appends a sort entry with lower precedence than those already present.
    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}
