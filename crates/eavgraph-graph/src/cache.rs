//! Graph object cache
//!
//! Bounded, time-to-idle caches of reconstructed vertices and edges,
//! keyed by the canonical byte serialization of the element id.
//!
//! Every vertex entry owns its adjacency lists, keyed by direction and
//! label set. Evicting or invalidating a vertex therefore drops its
//! adjacency lists with it, and adjacency writes for a vertex that is not
//! cached are discarded.
//!
//! Callers receive [`Slot`] snapshots, never shared mutable elements.
//!
//! Loads race with invalidations: a reader may fetch rows, lose the CPU
//! to a mutation and its invalidation, then try to cache what it read.
//! Every invalidation therefore advances an [`Epoch`], and a load is
//! written back only if the epoch it observed before reading the store
//! is still current. The check and the write happen inside one per-key
//! compute, so they cannot interleave with an invalidation of that key.
//!
//! Author: hephaex@gmail.com

use eavgraph_core::{CacheConfig, Direction, Edge, ElementId, Vertex};
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::ops::compute::{CompResult, Op};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::future::ready;
use std::time::Duration;
use tracing::trace;

// ============================================================================
// Slots
// ============================================================================

/// Cached state of one element
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    /// Known id, properties not fetched yet
    Placeholder,
    Loaded(T),
}

impl<T> Slot<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(element) => Some(element),
            Self::Placeholder => None,
        }
    }

    pub fn into_loaded(self) -> Option<T> {
        match self {
            Self::Loaded(element) => Some(element),
            Self::Placeholder => None,
        }
    }
}

/// Invalidation count observed before a store read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch(u64);

/// Adjacency list key: direction plus the sorted label filter
type AdjacencyKey = (Direction, Vec<String>);
type AdjacencyCache = Cache<AdjacencyKey, Arc<Vec<ElementId>>>;

#[derive(Clone)]
struct VertexEntry {
    slot: Slot<Vertex>,
    adjacency: AdjacencyCache,
}

fn adjacency_key(direction: Direction, labels: &[String]) -> AdjacencyKey {
    let mut labels = labels.to_vec();
    labels.sort();
    labels.dedup();
    (direction, labels)
}

// ============================================================================
// Graph Cache
// ============================================================================

/// Vertex, edge and adjacency caches of one graph
#[derive(Clone)]
pub struct GraphCache {
    vertices: Cache<Vec<u8>, VertexEntry>,
    edges: Cache<Vec<u8>, Slot<Edge>>,
    adjacency_capacity: u64,
    adjacency_ttl: Duration,
    epoch: Arc<AtomicU64>,
    vertex_stats: Arc<CacheStats>,
    edge_stats: Arc<CacheStats>,
    adjacency_stats: Arc<CacheStats>,
}

impl GraphCache {
    /// Create caches bounded by `config`
    pub fn new(config: &CacheConfig) -> Self {
        let vertex_stats = Arc::new(CacheStats::new("vertex"));
        let edge_stats = Arc::new(CacheStats::new("edge"));

        let evicted = Arc::clone(&vertex_stats);
        let vertices = Cache::builder()
            .max_capacity(config.element_max_capacity)
            .time_to_idle(config.element_ttl())
            .eviction_listener(move |_key, _value: VertexEntry, cause: RemovalCause| {
                if cause.was_evicted() {
                    evicted.record_eviction();
                    trace!(?cause, "Vertex evicted with its adjacency lists");
                }
            })
            .build();

        let evicted = Arc::clone(&edge_stats);
        let edges = Cache::builder()
            .max_capacity(config.element_max_capacity)
            .time_to_idle(config.element_ttl())
            .eviction_listener(move |_key, _value: Slot<Edge>, cause: RemovalCause| {
                if cause.was_evicted() {
                    evicted.record_eviction();
                    trace!(?cause, "Edge evicted");
                }
            })
            .build();

        Self {
            vertices,
            edges,
            adjacency_capacity: config.adjacency_max_capacity,
            adjacency_ttl: config.adjacency_ttl(),
            epoch: Arc::new(AtomicU64::new(0)),
            vertex_stats,
            edge_stats,
            adjacency_stats: Arc::new(CacheStats::new("adjacency")),
        }
    }

    fn new_adjacency(&self) -> AdjacencyCache {
        Cache::builder()
            .max_capacity(self.adjacency_capacity)
            .time_to_idle(self.adjacency_ttl)
            .build()
    }

    /// Take before reading the store; pass to the `fill_*` call that
    /// caches what was read
    pub fn epoch(&self) -> Epoch {
        Epoch(self.epoch.load(Ordering::SeqCst))
    }

    fn is_current(&self, epoch: Epoch) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch.0
    }

    fn advance_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Vertices
    // ------------------------------------------------------------------

    /// Snapshot of the vertex slot, allocating a placeholder on a miss
    pub async fn vertex(&self, id: &ElementId) -> Slot<Vertex> {
        let entry = self
            .vertices
            .entry(id.cache_key())
            .or_insert_with(async {
                VertexEntry {
                    slot: Slot::Placeholder,
                    adjacency: self.new_adjacency(),
                }
            })
            .await;

        let slot = entry.into_value().slot;
        if slot.is_loaded() {
            self.vertex_stats.record_hit();
        } else {
            self.vertex_stats.record_miss();
        }
        slot
    }

    /// Cache a vertex read from the store after `epoch` was taken,
    /// keeping any adjacency lists it already has.
    ///
    /// Returns `false` when an invalidation happened in between and the
    /// vertex was discarded.
    pub async fn fill_vertex(&self, epoch: Epoch, vertex: Vertex) -> bool {
        let result = self
            .vertices
            .entry(vertex.id.cache_key())
            .and_compute_with(|current| {
                let op = if self.is_current(epoch) {
                    let adjacency = match current {
                        Some(entry) => entry.into_value().adjacency,
                        None => self.new_adjacency(),
                    };
                    Op::Put(VertexEntry {
                        slot: Slot::Loaded(vertex),
                        adjacency,
                    })
                } else {
                    Op::Nop
                };
                ready(op)
            })
            .await;

        let stored = is_stored(&result);
        if stored {
            self.vertex_stats.record_load();
        } else {
            trace!("Stale vertex load discarded");
        }
        stored
    }

    /// Drop the vertex entry together with its adjacency lists
    pub async fn invalidate_vertex(&self, id: &ElementId) {
        self.advance_epoch();
        self.vertices
            .entry(id.cache_key())
            .and_compute_with(|_| ready(Op::Remove))
            .await;
        self.vertex_stats.record_invalidation();
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Snapshot of the edge slot, allocating a placeholder on a miss
    pub async fn edge(&self, id: &ElementId) -> Slot<Edge> {
        let slot = self
            .edges
            .entry(id.cache_key())
            .or_insert(Slot::Placeholder)
            .await
            .into_value();

        if slot.is_loaded() {
            self.edge_stats.record_hit();
        } else {
            self.edge_stats.record_miss();
        }
        slot
    }

    /// Cache an edge read from the store after `epoch` was taken
    pub async fn fill_edge(&self, epoch: Epoch, edge: Edge) -> bool {
        let result = self
            .edges
            .entry(edge.id.cache_key())
            .and_compute_with(|_| {
                ready(if self.is_current(epoch) {
                    Op::Put(Slot::Loaded(edge))
                } else {
                    Op::Nop
                })
            })
            .await;

        let stored = is_stored(&result);
        if stored {
            self.edge_stats.record_load();
        } else {
            trace!("Stale edge load discarded");
        }
        stored
    }

    pub async fn invalidate_edge(&self, id: &ElementId) {
        self.advance_epoch();
        self.edges
            .entry(id.cache_key())
            .and_compute_with(|_| ready(Op::Remove))
            .await;
        self.edge_stats.record_invalidation();
    }

    // ------------------------------------------------------------------
    // Adjacency
    // ------------------------------------------------------------------

    /// Cached edge ids at `vertex` for a direction and label filter
    pub async fn adjacency(
        &self,
        vertex: &ElementId,
        direction: Direction,
        labels: &[String],
    ) -> Option<Arc<Vec<ElementId>>> {
        let found = match self.vertices.get(&vertex.cache_key()).await {
            Some(entry) => entry.adjacency.get(&adjacency_key(direction, labels)).await,
            None => None,
        };
        if found.is_some() {
            self.adjacency_stats.record_hit();
        } else {
            self.adjacency_stats.record_miss();
        }
        found
    }

    /// Store an adjacency list queried after `epoch` was taken.
    ///
    /// Returns `false` when the vertex is not cached or an invalidation
    /// happened in between, and the list was dropped.
    pub async fn put_adjacency(
        &self,
        epoch: Epoch,
        vertex: &ElementId,
        direction: Direction,
        labels: &[String],
        edge_ids: Vec<ElementId>,
    ) -> bool {
        let mut stored = false;
        self.vertices
            .entry(vertex.cache_key())
            .and_compute_with(|current| {
                let stored = &mut stored;
                async move {
                    if let Some(entry) = current {
                        if self.is_current(epoch) {
                            entry
                                .into_value()
                                .adjacency
                                .insert(adjacency_key(direction, labels), Arc::new(edge_ids))
                                .await;
                            *stored = true;
                        }
                    }
                    Op::Nop
                }
            })
            .await;

        if stored {
            self.adjacency_stats.record_load();
        } else {
            trace!(vertex = %vertex, "Adjacency list dropped");
        }
        stored
    }

    /// Forget every adjacency list of `vertex`, keeping its slot
    pub async fn invalidate_adjacency(&self, vertex: &ElementId) {
        self.advance_epoch();
        let result = self
            .vertices
            .entry(vertex.cache_key())
            .and_compute_with(|current| {
                if let Some(entry) = &current {
                    entry.value().adjacency.invalidate_all();
                }
                ready(Op::Nop)
            })
            .await;
        if matches!(result, CompResult::Unchanged(_)) {
            self.adjacency_stats.record_invalidation();
        }
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Drop every cached element
    pub async fn clear(&self) {
        self.advance_epoch();
        self.vertices.invalidate_all();
        self.edges.invalidate_all();
        self.run_pending_tasks().await;
    }

    /// Apply pending evictions and refresh entry counts
    pub async fn run_pending_tasks(&self) {
        self.vertices.run_pending_tasks().await;
        self.edges.run_pending_tasks().await;
    }

    pub fn vertex_count(&self) -> u64 {
        self.vertices.entry_count()
    }

    pub fn edge_count(&self) -> u64 {
        self.edges.entry_count()
    }

    pub fn vertex_stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.vertex_stats)
    }

    pub fn edge_stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.edge_stats)
    }

    pub fn adjacency_stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.adjacency_stats)
    }

    /// Reports for the vertex, edge and adjacency caches
    pub fn all_stats(&self) -> Vec<CacheStatsReport> {
        vec![
            self.vertex_stats.report(),
            self.edge_stats.report(),
            self.adjacency_stats.report(),
        ]
    }
}

fn is_stored<K, V>(result: &CompResult<K, V>) -> bool {
    matches!(result, CompResult::Inserted(_) | CompResult::ReplacedWith(_))
}

// ============================================================================
// Cache Statistics
// ============================================================================

/// Counters of one cache
#[derive(Debug)]
pub struct CacheStats {
    name: String,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    invalidations: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    pub fn report(&self) -> CacheStatsReport {
        CacheStatsReport {
            name: self.name.clone(),
            hits: self.hits(),
            misses: self.misses(),
            loads: self.loads(),
            invalidations: self.invalidations(),
            evictions: self.evictions(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Serializable cache statistics report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub invalidations: u64,
    pub evictions: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(id: &str) -> Vertex {
        Vertex::new(ElementId::from(id), "person", 1).with_property("name", id)
    }

    async fn load(cache: &GraphCache, vertex: Vertex) {
        assert!(cache.fill_vertex(cache.epoch(), vertex).await);
    }

    fn small_config() -> CacheConfig {
        CacheConfig {
            element_max_capacity: 100,
            element_ttl_secs: 1,
            adjacency_max_capacity: 10,
            adjacency_ttl_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_miss_allocates_placeholder() {
        let cache = GraphCache::new(&CacheConfig::default());
        let id = ElementId::from("v1");

        assert_eq!(cache.vertex(&id).await, Slot::Placeholder);
        // The placeholder stays until loaded
        assert_eq!(cache.vertex(&id).await, Slot::Placeholder);
        assert_eq!(cache.vertex_stats().misses(), 2);

        load(&cache, vertex("v1")).await;
        assert_eq!(cache.vertex(&id).await, Slot::Loaded(vertex("v1")));
        assert_eq!(cache.vertex_stats().hits(), 1);
        assert_eq!(cache.vertex_stats().loads(), 1);
    }

    #[tokio::test]
    async fn test_numeric_and_string_ids_do_not_collide() {
        let cache = GraphCache::new(&CacheConfig::default());
        load(&cache, vertex("1")).await;
        assert!(!cache.vertex(&ElementId::Long(1)).await.is_loaded());
    }

    #[tokio::test]
    async fn test_adjacency_lives_inside_vertex_entry() {
        let cache = GraphCache::new(&CacheConfig::default());
        let id = ElementId::from("v1");
        let labels = vec!["knows".to_string()];

        // Uncached vertex: the list is dropped
        assert!(
            !cache
                .put_adjacency(
                    cache.epoch(),
                    &id,
                    Direction::Out,
                    &labels,
                    vec![ElementId::from("e1")]
                )
                .await
        );

        load(&cache, vertex("v1")).await;
        assert!(
            cache
                .put_adjacency(
                    cache.epoch(),
                    &id,
                    Direction::Out,
                    &labels,
                    vec![ElementId::from("e1")]
                )
                .await
        );
        let ids = cache.adjacency(&id, Direction::Out, &labels).await.unwrap();
        assert_eq!(ids.as_slice(), &[ElementId::from("e1")]);
        assert!(cache.adjacency(&id, Direction::In, &labels).await.is_none());

        // Reloading the vertex keeps its lists
        load(&cache, vertex("v1")).await;
        assert!(cache.adjacency(&id, Direction::Out, &labels).await.is_some());

        cache.invalidate_vertex(&id).await;
        assert!(cache.adjacency(&id, Direction::Out, &labels).await.is_none());
    }

    #[tokio::test]
    async fn test_label_order_does_not_matter() {
        let cache = GraphCache::new(&CacheConfig::default());
        let id = ElementId::from("v1");
        load(&cache, vertex("v1")).await;

        let labels = vec!["b".to_string(), "a".to_string()];
        cache
            .put_adjacency(cache.epoch(), &id, Direction::In, &labels, vec![])
            .await;
        let reversed = vec!["a".to_string(), "b".to_string()];
        assert!(cache.adjacency(&id, Direction::In, &reversed).await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_adjacency_keeps_slot() {
        let cache = GraphCache::new(&CacheConfig::default());
        let id = ElementId::from("v1");
        load(&cache, vertex("v1")).await;
        cache
            .put_adjacency(
                cache.epoch(),
                &id,
                Direction::Out,
                &[],
                vec![ElementId::from("e1")],
            )
            .await;

        cache.invalidate_adjacency(&id).await;
        assert!(cache.adjacency(&id, Direction::Out, &[]).await.is_none());
        assert!(cache.vertex(&id).await.is_loaded());
    }

    #[tokio::test]
    async fn test_edge_slots() {
        let cache = GraphCache::new(&CacheConfig::default());
        let id = ElementId::from("e1");
        let edge = Edge::new(
            id.clone(),
            "knows",
            ElementId::from("a"),
            ElementId::from("b"),
            1,
        );

        assert_eq!(cache.edge(&id).await, Slot::Placeholder);
        assert!(cache.fill_edge(cache.epoch(), edge.clone()).await);
        assert_eq!(cache.edge(&id).await.into_loaded(), Some(edge));

        cache.invalidate_edge(&id).await;
        assert_eq!(cache.edge(&id).await, Slot::Placeholder);
        assert_eq!(cache.edge_stats().invalidations(), 1);
    }

    #[tokio::test]
    async fn test_load_older_than_invalidation_is_discarded() {
        let cache = GraphCache::new(&CacheConfig::default());
        let id = ElementId::from("v1");
        assert!(!cache.vertex(&id).await.is_loaded());

        // Rows read, then the element is written and invalidated
        let epoch = cache.epoch();
        cache.invalidate_vertex(&id).await;

        assert!(!cache.fill_vertex(epoch, vertex("v1")).await);
        assert!(!cache.vertex(&id).await.is_loaded());
        assert_eq!(cache.vertex_stats().loads(), 0);

        // A read started after the invalidation is cached
        load(&cache, vertex("v1")).await;
        assert!(cache.vertex(&id).await.is_loaded());
    }

    #[tokio::test]
    async fn test_adjacency_older_than_invalidation_is_discarded() {
        let cache = GraphCache::new(&CacheConfig::default());
        let id = ElementId::from("v1");
        load(&cache, vertex("v1")).await;

        let epoch = cache.epoch();
        cache.invalidate_adjacency(&id).await;
        assert!(
            !cache
                .put_adjacency(epoch, &id, Direction::Out, &[], vec![ElementId::from("e1")])
                .await
        );
        assert!(cache.adjacency(&id, Direction::Out, &[]).await.is_none());
        assert!(cache.vertex(&id).await.is_loaded());
    }

    #[tokio::test]
    async fn test_idle_entries_expire() {
        let cache = GraphCache::new(&small_config());
        let id = ElementId::from("v1");
        load(&cache, vertex("v1")).await;

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        cache.run_pending_tasks().await;

        assert!(!cache
            .put_adjacency(cache.epoch(), &id, Direction::Out, &[], vec![])
            .await);
        assert_eq!(cache.vertex(&id).await, Slot::Placeholder);
    }

    #[tokio::test]
    async fn test_clear_and_report() {
        let cache = GraphCache::new(&CacheConfig::default());
        load(&cache, vertex("v1")).await;
        cache.clear().await;

        assert_eq!(cache.vertex_count(), 0);
        let reports = cache.all_stats();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].name, "vertex");
        assert_eq!(reports[0].loads, 1);
    }
}
