//! eavgraph Store - Key-value row store abstraction
//!
//! The graph layer talks to its backing store only through [`RowStore`]:
//! whole-record reads and writes plus single-column secondary-index
//! filters. No query-language strings cross this boundary.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use eavgraph_core::Result;

pub mod filter;
pub mod memory;
pub mod record;

pub use filter::{Combinator, Filter, FilterOp, FilterSet, FilterValue, Number};
pub use memory::MemoryRowStore;
pub use record::{Bin, KeyRecord, Record};

/// Trait for key-value row store operations
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Return every row of `table` matching `filters`.
    ///
    /// The leading filter must be served by a secondary index; the
    /// remaining filters are applied to its candidates. An empty filter
    /// set scans the whole table.
    async fn query_by_filter(&self, table: &str, filters: &FilterSet) -> Result<Vec<KeyRecord>>;

    /// Fetch all rows whose `id` column is one of `ids`
    async fn get_by_keys(&self, table: &str, ids: &[String]) -> Result<Vec<KeyRecord>>;

    /// Insert or replace the row stored under `key`
    async fn put_row(&self, table: &str, key: &str, record: Record) -> Result<()>;

    /// Delete rows by row key, returning how many existed
    async fn delete_rows(&self, table: &str, keys: &[String]) -> Result<usize>;

    /// Create a string secondary index on `column` if missing
    async fn ensure_index(&self, table: &str, column: &str) -> Result<()>;

    /// Release the client; later calls fail
    async fn close(&self) -> Result<()>;
}
