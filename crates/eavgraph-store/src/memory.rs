//! In-process row store with string secondary indices
//!
//! Behaves like a remote key-value store restricted to whole-record
//! access: a filter set needs an index for its leading filter (and, for
//! `or` sets, for every filter). Used by tests and by embedders that do
//! not need persistence.

use crate::filter::{Combinator, Filter, FilterOp, FilterSet, FilterValue, Number};
use crate::record::{KeyRecord, Record};
use crate::RowStore;
use async_trait::async_trait;
use eavgraph_core::schema::ID_COL;
use eavgraph_core::{GraphError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

type Index = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Default)]
struct Table {
    rows: HashMap<String, Record>,
    indices: HashMap<String, Index>,
}

impl Table {
    fn index_row(&mut self, key: &str, record: &Record) {
        for (column, index) in self.indices.iter_mut() {
            if let Some(value) = record.get(column) {
                index
                    .entry(value.to_string())
                    .or_default()
                    .insert(key.to_string());
            }
        }
    }

    fn unindex_row(&mut self, key: &str, record: &Record) {
        for (column, index) in self.indices.iter_mut() {
            if let Some(value) = record.get(column) {
                let value = value.to_string();
                if let Some(keys) = index.get_mut(&value) {
                    keys.remove(key);
                    if keys.is_empty() {
                        index.remove(&value);
                    }
                }
            }
        }
    }

    fn build_index(&mut self, column: &str) -> bool {
        if self.indices.contains_key(column) {
            return false;
        }
        let mut index = Index::new();
        for (key, record) in &self.rows {
            if let Some(value) = record.get(column) {
                index.entry(value.to_string()).or_default().insert(key.clone());
            }
        }
        self.indices.insert(column.to_string(), index);
        true
    }

    /// Row keys matching one filter, served from its column index.
    ///
    /// Range results come back in value order.
    fn candidates(&self, table: &str, filter: &Filter) -> Result<Vec<String>> {
        let index = self.indices.get(&filter.column).ok_or_else(|| {
            GraphError::Store(format!(
                "No secondary index on {table}.{}",
                filter.column
            ))
        })?;

        let keys = match (filter.op, &filter.value) {
            (FilterOp::Equal, _) => index
                .get(&filter.value.index_key())
                .map(|keys| keys.iter().cloned().collect())
                .unwrap_or_default(),
            (FilterOp::RangeFromInclusive, FilterValue::Str(from)) => index
                .range(from.clone()..)
                .flat_map(|(_, keys)| keys.iter().cloned())
                .collect(),
            (FilterOp::RangeToExclusive, FilterValue::Str(to)) => index
                .range(..to.clone())
                .flat_map(|(_, keys)| keys.iter().cloned())
                .collect(),
            _ => {
                let mut matched: Vec<(Number, &BTreeSet<String>)> = index
                    .iter()
                    .filter_map(|(value, keys)| {
                        let probe = Record::new().with(filter.column.as_str(), value.as_str());
                        if filter.matches(&probe) {
                            Number::parse(value).map(|n| (n, keys))
                        } else {
                            None
                        }
                    })
                    .collect();
                matched.sort_by(|a, b| a.0.total_cmp(&b.0));
                matched
                    .into_iter()
                    .flat_map(|(_, keys)| keys.iter().cloned())
                    .collect()
            }
        };
        Ok(keys)
    }

    fn key_records(&self, keys: impl IntoIterator<Item = String>) -> Vec<KeyRecord> {
        keys.into_iter()
            .filter_map(|key| {
                self.rows
                    .get(&key)
                    .map(|record| KeyRecord::new(key, record.clone()))
            })
            .collect()
    }
}

/// In-memory [`RowStore`] implementation
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: RwLock<HashMap<String, Table>>,
    closed: AtomicBool,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GraphError::Store("Store client is closed".to_string()));
        }
        Ok(())
    }

    /// Number of rows currently stored in `table`
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    /// Snapshot of all rows of `table`, ordered by row key
    pub async fn rows(&self, table: &str) -> Vec<KeyRecord> {
        let tables = self.tables.read().await;
        let Some(t) = tables.get(table) else {
            return Vec::new();
        };
        let keys: BTreeSet<String> = t.rows.keys().cloned().collect();
        t.key_records(keys)
    }

    /// Columns of `table` carrying a secondary index
    pub async fn indexed_columns(&self, table: &str) -> Vec<String> {
        let tables = self.tables.read().await;
        let mut columns: Vec<String> = tables
            .get(table)
            .map(|t| t.indices.keys().cloned().collect())
            .unwrap_or_default();
        columns.sort();
        columns
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn query_by_filter(&self, table: &str, filters: &FilterSet) -> Result<Vec<KeyRecord>> {
        self.check_open()?;
        debug!(table, filter = %filters, "Querying rows");

        let tables = self.tables.read().await;
        let Some(t) = tables.get(table) else {
            return Ok(Vec::new());
        };
        let limit = filters.limit.unwrap_or(usize::MAX);

        let keys: Vec<String> = match (filters.combinator, filters.leading()) {
            (_, None) => {
                let all: BTreeSet<String> = t.rows.keys().cloned().collect();
                all.into_iter().take(limit).collect()
            }
            (Combinator::And, Some(leading)) => t
                .candidates(table, leading)?
                .into_iter()
                .filter(|key| {
                    t.rows
                        .get(key)
                        .map(|record| filters.matches(record))
                        .unwrap_or(false)
                })
                .take(limit)
                .collect(),
            (Combinator::Or, Some(_)) => {
                let mut seen = HashSet::new();
                let mut keys = Vec::new();
                for filter in &filters.filters {
                    for key in t.candidates(table, filter)? {
                        if seen.insert(key.clone()) {
                            keys.push(key);
                        }
                    }
                }
                keys.truncate(limit);
                keys
            }
        };

        let rows = t.key_records(keys);
        debug!(table, rows = rows.len(), "Query complete");
        Ok(rows)
    }

    async fn get_by_keys(&self, table: &str, ids: &[String]) -> Result<Vec<KeyRecord>> {
        self.check_open()?;

        let tables = self.tables.read().await;
        let Some(t) = tables.get(table) else {
            return Ok(Vec::new());
        };

        let mut keys = Vec::new();
        match t.indices.get(ID_COL) {
            Some(index) => {
                for id in ids {
                    if let Some(matched) = index.get(id) {
                        keys.extend(matched.iter().cloned());
                    }
                }
            }
            None => {
                let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
                let mut matched: Vec<&String> = t
                    .rows
                    .iter()
                    .filter(|(_, record)| {
                        record
                            .get_str(ID_COL)
                            .map(|id| wanted.contains(id))
                            .unwrap_or(false)
                    })
                    .map(|(key, _)| key)
                    .collect();
                matched.sort();
                keys.extend(matched.into_iter().cloned());
            }
        }
        Ok(t.key_records(keys))
    }

    async fn put_row(&self, table: &str, key: &str, record: Record) -> Result<()> {
        self.check_open()?;

        let mut tables = self.tables.write().await;
        let t = tables.entry(table.to_string()).or_default();
        if let Some(previous) = t.rows.remove(key) {
            t.unindex_row(key, &previous);
        }
        t.index_row(key, &record);
        t.rows.insert(key.to_string(), record);
        Ok(())
    }

    async fn delete_rows(&self, table: &str, keys: &[String]) -> Result<usize> {
        self.check_open()?;

        let mut tables = self.tables.write().await;
        let Some(t) = tables.get_mut(table) else {
            return Ok(0);
        };
        let mut deleted = 0;
        for key in keys {
            if let Some(previous) = t.rows.remove(key) {
                t.unindex_row(key, &previous);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn ensure_index(&self, table: &str, column: &str) -> Result<()> {
        self.check_open()?;

        let mut tables = self.tables.write().await;
        if tables
            .entry(table.to_string())
            .or_default()
            .build_index(column)
        {
            info!(table, column, "Created secondary index");
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Memory row store closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryRowStore {
        let store = MemoryRowStore::new();
        store.ensure_index("t", "label").await.unwrap();
        store.ensure_index("t", "propValue").await.unwrap();
        for (key, label, value) in [
            ("k1", "person", "30"),
            ("k2", "person", "4"),
            ("k3", "place", "Paris"),
        ] {
            let record = Record::new()
                .with("id", key)
                .with("label", label)
                .with("propValue", value);
            store.put_row("t", key, record).await.unwrap();
        }
        store
    }

    fn keys(rows: &[KeyRecord]) -> Vec<&str> {
        rows.iter().map(|r| r.key.as_str()).collect()
    }

    #[tokio::test]
    async fn test_equal_uses_index() {
        let store = seeded().await;
        let rows = store
            .query_by_filter("t", &FilterSet::and(vec![Filter::equal("label", "person")]))
            .await
            .unwrap();
        assert_eq!(keys(&rows), vec!["k1", "k2"]);
    }

    #[tokio::test]
    async fn test_leading_filter_requires_index() {
        let store = seeded().await;
        let err = store
            .query_by_filter("t", &FilterSet::and(vec![Filter::equal("id", "k1")]))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Store(_)));
    }

    #[tokio::test]
    async fn test_numeric_range_in_value_order() {
        let store = seeded().await;
        let rows = store
            .query_by_filter(
                "t",
                &FilterSet::and(vec![Filter::range_from("propValue", 0i64)]).with_limit(1),
            )
            .await
            .unwrap();
        // "4" sorts before "30" numerically
        assert_eq!(keys(&rows), vec!["k2"]);
    }

    #[tokio::test]
    async fn test_reindex_on_overwrite() {
        let store = seeded().await;
        store
            .put_row("t", "k3", Record::new().with("label", "person"))
            .await
            .unwrap();

        let places = store
            .query_by_filter("t", &FilterSet::and(vec![Filter::equal("label", "place")]))
            .await
            .unwrap();
        assert!(places.is_empty());
        assert_eq!(store.row_count("t").await, 3);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_calls() {
        let store = seeded().await;
        store.close().await.unwrap();
        assert!(store.get_by_keys("t", &["k1".to_string()]).await.is_err());
    }
}
