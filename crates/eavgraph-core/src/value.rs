//! Typed property values and element identifiers
//!
//! Every value is persisted as a string next to a type tag; the tag
//! travels with the value so that reads never have to guess a type.

use crate::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Value Types
// ============================================================================

/// Type tag stored next to every id and property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    String,
    Boolean,
    Integer,
    Long,
    Float,
    Double,
}

impl ValueType {
    /// The tag as written into `idType` / `propType` columns
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::Long => "LONG",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
        }
    }

    /// Numeric values compare by magnitude, everything else lexicographically
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Long | Self::Float | Self::Double
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "STRING" => Ok(Self::String),
            "BOOLEAN" => Ok(Self::Boolean),
            "INTEGER" => Ok(Self::Integer),
            "LONG" => Ok(Self::Long),
            "FLOAT" => Ok(Self::Float),
            "DOUBLE" => Ok(Self::Double),
            _ => Err(GraphError::InvalidValue {
                value_type: "type tag".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Property Values
// ============================================================================

/// A property value together with its type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "UPPERCASE")]
pub enum PropertyValue {
    String(String),
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl PropertyValue {
    /// Type tag of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::String,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Integer(_) => ValueType::Integer,
            Self::Long(_) => ValueType::Long,
            Self::Float(_) => ValueType::Float,
            Self::Double(_) => ValueType::Double,
        }
    }

    /// String representation written into the `propValue` column
    pub fn encode(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Boolean(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Long(l) => l.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Double(d) => d.to_string(),
        }
    }

    /// Parse a stored string back into a value of the given type
    pub fn decode(value_type: ValueType, raw: &str) -> Result<Self> {
        let invalid = || GraphError::InvalidValue {
            value_type: value_type.to_string(),
            value: raw.to_string(),
        };

        Ok(match value_type {
            ValueType::String => Self::String(raw.to_string()),
            ValueType::Boolean => Self::Boolean(raw.parse().map_err(|_| invalid())?),
            ValueType::Integer => Self::Integer(raw.parse().map_err(|_| invalid())?),
            ValueType::Long => Self::Long(raw.parse().map_err(|_| invalid())?),
            ValueType::Float => Self::Float(raw.parse().map_err(|_| invalid())?),
            ValueType::Double => Self::Double(raw.parse().map_err(|_| invalid())?),
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(i64::from(*i)),
            Self::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f32> for PropertyValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl TryFrom<serde_json::Value> for PropertyValue {
    type Error = GraphError;

    /// JSON integers map to LONG, other numbers to DOUBLE
    fn try_from(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(s) => Ok(Self::String(s)),
            serde_json::Value::Bool(b) => Ok(Self::Boolean(b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Long)
                .or_else(|| n.as_f64().map(Self::Double))
                .ok_or_else(|| GraphError::InvalidValue {
                    value_type: "number".to_string(),
                    value: n.to_string(),
                }),
            other => Err(GraphError::InvalidValue {
                value_type: "property".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// Element Identifiers
// ============================================================================

/// User-facing identifier of a vertex or edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementId {
    Long(i64),
    String(String),
}

impl ElementId {
    /// Random UUID id for elements created without one
    pub fn generate() -> Self {
        Self::String(Uuid::new_v4().to_string())
    }

    /// Use the supplied id or generate a fresh one
    pub fn or_generate(id: Option<ElementId>) -> Self {
        id.unwrap_or_else(Self::generate)
    }

    /// Type tag written into `idType`, `toIdType` and `fromIdType`
    pub fn id_type(&self) -> ValueType {
        match self {
            Self::Long(_) => ValueType::Long,
            Self::String(_) => ValueType::String,
        }
    }

    /// String form written into `id`, `toId` and `fromId`
    pub fn encode(&self) -> String {
        match self {
            Self::Long(l) => l.to_string(),
            Self::String(s) => s.clone(),
        }
    }

    /// Rebuild an id from its stored string form and type tag
    pub fn decode(id_type: ValueType, raw: &str) -> Result<Self> {
        match id_type {
            ValueType::Long | ValueType::Integer => {
                raw.parse()
                    .map(Self::Long)
                    .map_err(|_| GraphError::InvalidValue {
                        value_type: id_type.to_string(),
                        value: raw.to_string(),
                    })
            }
            ValueType::String => Ok(Self::String(raw.to_string())),
            other => Err(GraphError::InvalidValue {
                value_type: format!("id type {other}"),
                value: raw.to_string(),
            }),
        }
    }

    /// Canonical byte serialization used as object-cache key.
    ///
    /// The leading tag byte keeps `Long(1)` and `String("1")` apart.
    pub fn cache_key(&self) -> Vec<u8> {
        match self {
            Self::Long(l) => {
                let mut key = Vec::with_capacity(9);
                key.push(0x01);
                key.extend_from_slice(&l.to_be_bytes());
                key
            }
            Self::String(s) => {
                let mut key = Vec::with_capacity(1 + s.len());
                key.push(0x02);
                key.extend_from_slice(s.as_bytes());
                key
            }
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long(l) => write!(f, "{l}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ElementId {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<i32> for ElementId {
    fn from(value: i32) -> Self {
        Self::Long(i64::from(value))
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

// ============================================================================
// Tests
// ============================================================================
