//! eavgraph Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults for development.

use crate::element::ElementKind;
use crate::schema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Main graph configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GraphConfig {
    /// Key-value store connection
    pub store: StoreConfig,

    /// Object cache bounds
    pub cache: CacheConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl GraphConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Store
        if let Ok(host) = std::env::var("EAVGRAPH_HOST") {
            config.store.host = host;
        }
        if let Ok(port) = std::env::var("EAVGRAPH_PORT") {
            config.store.port = parse_env("EAVGRAPH_PORT", port)?;
        }
        if let Ok(namespace) = std::env::var("EAVGRAPH_NAMESPACE") {
            config.store.namespace = namespace;
        }
        if let Ok(prefix) = std::env::var("EAVGRAPH_TABLE_PREFIX") {
            config.store.table_prefix = prefix;
        }
        if let Ok(timeout) = std::env::var("EAVGRAPH_TIMEOUT_MS") {
            config.store.timeout_ms = parse_env("EAVGRAPH_TIMEOUT_MS", timeout)?;
        }

        // Cache
        if let Ok(size) = std::env::var("EAVGRAPH_CACHE_MAX_SIZE") {
            config.cache.element_max_capacity = parse_env("EAVGRAPH_CACHE_MAX_SIZE", size)?;
        }
        if let Ok(ttl) = std::env::var("EAVGRAPH_CACHE_TTL_SECS") {
            config.cache.element_ttl_secs = parse_env("EAVGRAPH_CACHE_TTL_SECS", ttl)?;
        }
        if let Ok(size) = std::env::var("EAVGRAPH_ADJACENCY_CACHE_MAX_SIZE") {
            config.cache.adjacency_max_capacity =
                parse_env("EAVGRAPH_ADJACENCY_CACHE_MAX_SIZE", size)?;
        }
        if let Ok(ttl) = std::env::var("EAVGRAPH_ADJACENCY_CACHE_TTL_SECS") {
            config.cache.adjacency_ttl_secs = parse_env("EAVGRAPH_ADJACENCY_CACHE_TTL_SECS", ttl)?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let store_defaults = StoreConfig::default();
        let cache_defaults = CacheConfig::default();

        // Only override if env values differ from defaults
        if env_config.store.host != store_defaults.host {
            self.store.host = env_config.store.host;
        }
        if env_config.store.port != store_defaults.port {
            self.store.port = env_config.store.port;
        }
        if env_config.store.namespace != store_defaults.namespace {
            self.store.namespace = env_config.store.namespace;
        }
        if env_config.store.table_prefix != store_defaults.table_prefix {
            self.store.table_prefix = env_config.store.table_prefix;
        }
        if env_config.cache.element_max_capacity != cache_defaults.element_max_capacity {
            self.cache.element_max_capacity = env_config.cache.element_max_capacity;
        }
        if env_config.store.timeout_ms != store_defaults.timeout_ms {
            self.store.timeout_ms = env_config.store.timeout_ms;
        }
        if env_config.cache.element_ttl_secs != cache_defaults.element_ttl_secs {
            self.cache.element_ttl_secs = env_config.cache.element_ttl_secs;
        }
        if env_config.cache.adjacency_max_capacity != cache_defaults.adjacency_max_capacity {
            self.cache.adjacency_max_capacity = env_config.cache.adjacency_max_capacity;
        }
        if env_config.cache.adjacency_ttl_secs != cache_defaults.adjacency_ttl_secs {
            self.cache.adjacency_ttl_secs = env_config.cache.adjacency_ttl_secs;
        }
        if env_config.logging.level != LoggingConfig::default().level {
            self.logging.level = env_config.logging.level;
        }

        Ok(self)
    }

    /// Reject values the graph cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let result = self.check();
        if let Err(err) = &result {
            warn!(error = %err, "Invalid graph configuration");
        }
        result
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.store.namespace.trim().is_empty() {
            return Err(ConfigError::MissingRequired("store.namespace".to_string()));
        }
        if self.store.table_prefix.trim().is_empty() {
            return Err(ConfigError::MissingRequired("store.table_prefix".to_string()));
        }
        if self.cache.element_max_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "cache.element_max_capacity".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Key-value store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store host
    pub host: String,

    /// Store port
    pub port: u16,

    /// Namespace holding the graph tables
    pub namespace: String,

    /// Prefix of the vertex and edge table names
    pub table_prefix: String,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl StoreConfig {
    /// Name of the table holding elements of `kind`
    pub fn table_name(&self, kind: ElementKind) -> String {
        schema::table_name(&self.table_prefix, kind)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            namespace: "graph".to_string(),
            table_prefix: "graph".to_string(),
            timeout_ms: 1000,
        }
    }
}

/// Object cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached vertices (and, separately, edges)
    pub element_max_capacity: u64,

    /// Idle time after which a cached element is evicted (seconds)
    pub element_ttl_secs: u64,

    /// Maximum number of adjacency lists kept per vertex
    pub adjacency_max_capacity: u64,

    /// Idle time after which an adjacency list is evicted (seconds)
    pub adjacency_ttl_secs: u64,
}

impl CacheConfig {
    pub fn element_ttl(&self) -> Duration {
        Duration::from_secs(self.element_ttl_secs)
    }

    pub fn adjacency_ttl(&self) -> Duration {
        Duration::from_secs(self.adjacency_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            element_max_capacity: 1_000_000,
            element_ttl_secs: 60,
            adjacency_max_capacity: 1_000,
            adjacency_ttl_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = GraphConfig::default();
        assert_eq!(config.cache.element_max_capacity, 1_000_000);
        assert_eq!(config.cache.element_ttl_secs, 60);
        assert_eq!(config.store.table_name(ElementKind::Edge), "graph_edges");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[store]
namespace = "test"
table_prefix = "social"

[cache]
element_max_capacity = 10
"#
        )
        .unwrap();

        let config = GraphConfig::from_file(file.path()).unwrap();
        assert_eq!(config.store.namespace, "test");
        assert_eq!(config.store.table_name(ElementKind::Vertex), "social_vertices");
        assert_eq!(config.cache.element_max_capacity, 10);
        // Unspecified fields keep their defaults
        assert_eq!(config.cache.adjacency_max_capacity, 1_000);
        assert_eq!(config.store.port, 3000);
    }

    #[test]
    fn test_from_file_missing() {
        let err = GraphConfig::from_file("/nonexistent/eavgraph.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[store]
namespace = "from_file"
timeout_ms = 100

[cache]
adjacency_max_capacity = 7
"#
        )
        .unwrap();

        std::env::set_var("EAVGRAPH_TIMEOUT_MS", "2500");
        std::env::set_var("EAVGRAPH_ADJACENCY_CACHE_MAX_SIZE", "42");
        std::env::set_var("EAVGRAPH_ADJACENCY_CACHE_TTL_SECS", "5");
        let config = GraphConfig::from_file(file.path())
            .and_then(GraphConfig::with_env_override);
        std::env::remove_var("EAVGRAPH_TIMEOUT_MS");
        std::env::remove_var("EAVGRAPH_ADJACENCY_CACHE_MAX_SIZE");
        std::env::remove_var("EAVGRAPH_ADJACENCY_CACHE_TTL_SECS");

        let config = config.unwrap();
        assert_eq!(config.store.namespace, "from_file");
        assert_eq!(config.store.timeout_ms, 2500);
        assert_eq!(config.cache.adjacency_max_capacity, 42);
        assert_eq!(config.cache.adjacency_ttl_secs, 5);
    }

    #[test]
    fn test_validate_rejects_empty_prefix() {
        let mut config = GraphConfig::default();
        config.store.table_prefix = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }
}
