//! Filter primitives understood by the store
//!
//! A [`FilterSet`] is an ordered list of single-column filters joined by
//! one combinator, plus an optional cap on the number of returned rows.
//! The first filter is the leading one: a store serves it from a
//! secondary index and evaluates the rest against each candidate.

use crate::record::{Bin, Record};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Comparison applied by a single filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equal,
    RangeFromInclusive,
    RangeToExclusive,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "=="),
            Self::RangeFromInclusive => write!(f, ">="),
            Self::RangeToExclusive => write!(f, "<"),
        }
    }
}

/// A numeric column value.
///
/// Integers compare exactly as `i64`; floating point is used only when
/// one side is not integral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Parse a stored string, preferring the integral form
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.parse::<i64>() {
            Ok(i) => Some(Self::Int(i)),
            Err(_) => raw.parse::<f64>().ok().map(Self::Float),
        }
    }

    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).total_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.total_cmp(&(*b as f64)),
        }
    }
}

/// Operand of a filter.
///
/// String operands compare lexicographically. Numeric operands compare by
/// magnitude; a stored string that does not parse as a number never
/// matches a numeric range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl FilterValue {
    /// Order a stored column value relative to this operand
    fn compare(&self, stored: &Bin) -> Option<Ordering> {
        match (stored, self) {
            (Bin::Str(s), Self::Str(v)) => Some(s.as_str().cmp(v.as_str())),
            (Bin::Int(i), Self::Str(v)) => Some(i.to_string().as_str().cmp(v.as_str())),
            (Bin::Int(i), operand) => Some(Number::Int(*i).total_cmp(&operand.number()?)),
            (Bin::Str(s), operand) => Some(Number::parse(s)?.total_cmp(&operand.number()?)),
        }
    }

    fn number(&self) -> Option<Number> {
        match self {
            Self::Str(s) => Number::parse(s),
            Self::Int(i) => Some(Number::Int(*i)),
            Self::Float(f) => Some(Number::Float(*f)),
        }
    }

    /// String form used for index lookups
    pub fn index_key(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.index_key())
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// A single `(operator, column, value)` filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub op: FilterOp,
    pub column: String,
    pub value: FilterValue,
}

impl Filter {
    pub fn new(op: FilterOp, column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            op,
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn equal(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(FilterOp::Equal, column, value)
    }

    pub fn range_from(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(FilterOp::RangeFromInclusive, column, value)
    }

    pub fn range_to(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(FilterOp::RangeToExclusive, column, value)
    }

    /// Whether `record` satisfies this filter; a missing column never matches
    pub fn matches(&self, record: &Record) -> bool {
        let Some(stored) = record.get(&self.column) else {
            return false;
        };
        match self.value.compare(stored) {
            Some(ordering) => match self.op {
                FilterOp::Equal => ordering == Ordering::Equal,
                FilterOp::RangeFromInclusive => ordering != Ordering::Less,
                FilterOp::RangeToExclusive => ordering == Ordering::Less,
            },
            None => false,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op, self.value)
    }
}

/// How the filters of a set are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

/// Ordered filters, combinator and optional result cap
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    pub filters: Vec<Filter>,
    pub combinator: Combinator,
    pub limit: Option<usize>,
}

impl FilterSet {
    /// An empty set matches every row
    pub fn all() -> Self {
        Self::default()
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self {
            filters,
            combinator: Combinator::And,
            limit: None,
        }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self {
            filters,
            combinator: Combinator::Or,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The filter a store must serve from an index
    pub fn leading(&self) -> Option<&Filter> {
        self.filters.first()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Evaluate the whole set against a record
    pub fn matches(&self, record: &Record) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        match self.combinator {
            Combinator::And => self.filters.iter().all(|f| f.matches(record)),
            Combinator::Or => self.filters.iter().any(|f| f.matches(record)),
        }
    }
}

impl fmt::Display for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joiner = match self.combinator {
            Combinator::And => " AND ",
            Combinator::Or => " OR ",
        };
        let parts: Vec<String> = self.filters.iter().map(ToString::to_string).collect();
        if parts.is_empty() {
            f.write_str("*")?;
        } else {
            f.write_str(&parts.join(joiner))?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}
