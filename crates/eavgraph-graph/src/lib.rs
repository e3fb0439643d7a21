//! eavgraph Graph - Cached property graph over a key-value store
//!
//! Provides the surface a host embeds:
//! - `KvGraph`: vertex and edge operations, scans and traversals
//! - `GraphCache`: bounded vertex/edge caches with per-vertex adjacency lists
//!
//! Author: hephaex@gmail.com

pub mod cache;
pub mod graph;

pub use cache::{CacheStats, CacheStatsReport, Epoch, GraphCache, Slot};
pub use graph::KvGraph;

pub use eavgraph_core::{
    Direction, Edge, ElementId, ElementKind, GraphConfig, GraphError, Properties, PropertyValue,
    Result, Vertex,
};
pub use eavgraph_mapper::{DeleteRequest, IncrementRequest, Mutation, MutationOutcome, PutRequest};
