//! Graph element models

use crate::value::{ElementId, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property map of a vertex or edge
pub type Properties = BTreeMap<String, PropertyValue>;

/// The two element kinds, each stored in its own table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Vertex,
    Edge,
}

impl ElementKind {
    /// Label assigned when the caller provides none
    pub fn default_label(&self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Edge => "edge",
        }
    }

    /// Suffix appended to the configured table prefix
    pub fn table_suffix(&self) -> &'static str {
        match self {
            Self::Vertex => "vertices",
            Self::Edge => "edges",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Edge => write!(f, "edge"),
        }
    }
}

/// Edge direction relative to a vertex.
///
/// `Out` is the tail (`from`) side and `In` the head (`to`) side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    Both,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "in"),
            Self::Out => write!(f, "out"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// A vertex of the property graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: ElementId,
    pub label: String,
    /// Epoch milliseconds
    pub created_at: i64,
    /// Epoch milliseconds
    pub updated_at: i64,
    pub properties: Properties,
}

impl Vertex {
    /// Create a vertex with the given id and label and no properties
    pub fn new(id: ElementId, label: impl Into<String>, now: i64) -> Self {
        Self {
            id,
            label: label.into(),
            created_at: now,
            updated_at: now,
            properties: Properties::new(),
        }
    }

    /// Add a property value
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }
}

/// An edge of the property graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: ElementId,
    pub label: String,
    /// Tail (out) vertex
    pub from: ElementId,
    /// Head (in) vertex
    pub to: ElementId,
    pub created_at: i64,
    pub updated_at: i64,
    pub properties: Properties,
}

impl Edge {
    pub fn new(
        id: ElementId,
        label: impl Into<String>,
        from: ElementId,
        to: ElementId,
        now: i64,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            from,
            to,
            created_at: now,
            updated_at: now,
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn out_vertex(&self) -> &ElementId {
        &self.from
    }

    pub fn in_vertex(&self) -> &ElementId {
        &self.to
    }

    /// The endpoint opposite to `vertex`; a self-loop returns the vertex itself
    pub fn other_end(&self, vertex: &ElementId) -> &ElementId {
        if &self.to == vertex {
            &self.from
        } else {
            &self.to
        }
    }

    /// Whether `vertex` is either endpoint
    pub fn touches(&self, vertex: &ElementId) -> bool {
        &self.from == vertex || &self.to == vertex
    }
}
