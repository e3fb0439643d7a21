//! eavgraph Core - Element model, value types, and shared errors
//!
//! This crate defines the abstractions shared by every eavgraph crate:
//! - Graph element models (vertices, edges, element kinds, directions)
//! - Typed property values and element identifiers
//! - The flat row layout persisted in the key-value store
//! - Common error types
//! - Configuration management and tracing setup
//!
//! Author: hephaex@gmail.com

pub mod config;
pub mod element;
pub mod schema;
pub mod telemetry;
pub mod time;
pub mod value;

pub use config::{CacheConfig, ConfigError, GraphConfig, LoggingConfig, StoreConfig};
pub use element::{Direction, Edge, ElementKind, Properties, Vertex};
pub use value::{ElementId, PropertyValue, ValueType};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for eavgraph operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// Required common fields are missing on create
    #[error("Insufficient fields to write {kind} '{id}': missing {missing}")]
    IncompleteElement {
        kind: ElementKind,
        id: String,
        missing: String,
    },

    /// Vertex deletion blocked by referencing edges
    #[error("The vertex '{0}' is referenced by at least one edge")]
    VertexInUse(String),

    /// Increment target is missing or not a LONG
    #[error("Property '{key}' of {kind} '{id}' cannot be incremented")]
    PropertyNotIncrementable {
        kind: ElementKind,
        id: String,
        key: String,
    },

    /// No rows exist for the requested element
    #[error("{kind} does not exist: {id}")]
    ElementNotFound { kind: ElementKind, id: String },

    /// Request issued against a table holding the other element kind
    #[error("Table '{table}' does not hold {requested} elements")]
    UnsupportedElementKind {
        table: String,
        requested: ElementKind,
    },

    /// A stored value could not be decoded with its type tag
    #[error("Invalid {value_type} value: '{value}'")]
    InvalidValue { value_type: String, value: String },

    /// Opaque failure reported by the store driver
    #[error("Store error: {0}")]
    Store(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GraphError {
    /// Shorthand for a not-found error
    pub fn not_found(kind: ElementKind, id: &ElementId) -> Self {
        Self::ElementNotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether this error reports a missing element
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ElementNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GraphError::VertexInUse("v1".to_string());
        assert_eq!(
            err.to_string(),
            "The vertex 'v1' is referenced by at least one edge"
        );

        let err = GraphError::not_found(ElementKind::Edge, &ElementId::from("e1"));
        assert_eq!(err.to_string(), "edge does not exist: e1");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_incomplete_element_message() {
        let err = GraphError::IncompleteElement {
            kind: ElementKind::Edge,
            id: "e1".to_string(),
            missing: "fromId, toId".to_string(),
        };
        assert!(err.to_string().contains("missing fromId, toId"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: GraphError = ConfigError::MissingRequired("store.namespace".to_string()).into();
        assert!(matches!(err, GraphError::Config(_)));
    }
}
