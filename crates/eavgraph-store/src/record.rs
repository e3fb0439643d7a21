//! Flat records as exchanged with the store

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single column value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bin {
    Str(String),
    Int(i64),
}

impl Bin {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Str(_) => None,
        }
    }
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Bin {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Bin {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Bin {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// A whole record: column name to value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    bins: BTreeMap<String, Bin>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing any previous value
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Bin>) -> &mut Self {
        self.bins.insert(column.into(), value.into());
        self
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Bin>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Bin> {
        self.bins.get(column)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.bins.get(column).and_then(Bin::as_str)
    }

    pub fn get_int(&self, column: &str) -> Option<i64> {
        self.bins.get(column).and_then(Bin::as_i64)
    }

    pub fn bins(&self) -> impl Iterator<Item = (&str, &Bin)> {
        self.bins.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

impl FromIterator<(String, Bin)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Bin)>>(iter: I) -> Self {
        Self {
            bins: iter.into_iter().collect(),
        }
    }
}

/// A record together with its row key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key: String,
    pub record: Record,
}

impl KeyRecord {
    pub fn new(key: impl Into<String>, record: Record) -> Self {
        Self {
            key: key.into(),
            record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accessors() {
        let record = Record::new().with("label", "person").with("createdAt", 42i64);

        assert_eq!(record.get_str("label"), Some("person"));
        assert_eq!(record.get_int("createdAt"), Some(42));
        // Typed accessors do not coerce
        assert_eq!(record.get_int("label"), None);
        assert_eq!(record.get_str("missing"), None);
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_set_replaces() {
        let mut record = Record::new();
        record.set("propValue", "30").set("propValue", "31");
        assert_eq!(record.get_str("propValue"), Some("31"));
        assert_eq!(record.len(), 1);
    }
}
