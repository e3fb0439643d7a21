//! Graph facade
//!
//! `KvGraph` is what a host embeds: it owns the vertex and edge tables of
//! one configured graph, routes element operations to them and keeps the
//! object cache consistent with every mutation it performs.

use crate::cache::{CacheStatsReport, GraphCache, Slot};
use eavgraph_core::{
    Direction, Edge, ElementId, ElementKind, GraphConfig, GraphError, Properties, PropertyValue,
    Result, Vertex,
};
use eavgraph_mapper::{
    DeleteRequest, ElementHeader, ElementResult, IncrementRequest, Mutation, MutationOutcome,
    PutRequest, Query, Table, Target,
};
use eavgraph_store::RowStore;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Cached ids touched by one mutation
#[derive(Debug, Default)]
struct Affected {
    vertices: Vec<ElementId>,
    edges: Vec<ElementId>,
    /// Vertices whose adjacency lists go stale
    endpoints: Vec<ElementId>,
}

impl Affected {
    fn edge(&mut self, edge: &Edge) {
        self.edges.push(edge.id.clone());
        self.endpoints.push(edge.from.clone());
        self.endpoints.push(edge.to.clone());
    }
}

/// Property graph stored as EAV rows in a key-value store
pub struct KvGraph {
    config: GraphConfig,
    store: Arc<dyn RowStore>,
    vertices: Table,
    edges: Table,
    cache: GraphCache,
}

impl KvGraph {
    /// Open the graph described by `config` on an already connected store.
    ///
    /// Creates the secondary indices both tables lead their queries with.
    pub async fn open(config: GraphConfig, store: Arc<dyn RowStore>) -> Result<Self> {
        config.validate()?;

        let vertex_table = config.store.table_name(ElementKind::Vertex);
        let edge_table = config.store.table_name(ElementKind::Edge);
        let vertices = Table::vertices(Arc::clone(&store), vertex_table, edge_table.clone());
        let edges = Table::edges(Arc::clone(&store), edge_table);

        vertices.ensure_indices().await?;
        edges.ensure_indices().await?;

        let cache = GraphCache::new(&config.cache);
        info!(
            namespace = %config.store.namespace,
            vertices = %vertices.name(),
            edges = %edges.name(),
            "Graph opened"
        );

        Ok(Self {
            config,
            store,
            vertices,
            edges,
            cache,
        })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn cache(&self) -> &GraphCache {
        &self.cache
    }

    pub fn vertex_table(&self) -> &Table {
        &self.vertices
    }

    pub fn edge_table(&self) -> &Table {
        &self.edges
    }

    fn table(&self, kind: ElementKind) -> &Table {
        match kind {
            ElementKind::Vertex => &self.vertices,
            ElementKind::Edge => &self.edges,
        }
    }

    // ========================================================================
    // Vertices
    // ========================================================================

    /// Create a vertex, generating the id and defaulting the label when
    /// absent. An existing id is updated with `properties` instead.
    pub async fn add_vertex(
        &self,
        id: Option<ElementId>,
        label: Option<&str>,
        properties: Properties,
    ) -> Result<Vertex> {
        let id = ElementId::or_generate(id);
        let label = label.unwrap_or(ElementKind::Vertex.default_label());
        let header = ElementHeader::vertex(id.clone(), label);

        self.apply(&Mutation::Put(PutRequest::new(header, properties)))
            .await?;
        self.vertex(&id).await
    }

    async fn load_vertices(&self, ids: &[ElementId]) -> Result<Vec<Vertex>> {
        let epoch = self.cache.epoch();
        let results = self.vertices.get_many(ElementKind::Vertex, ids).await?;
        let mut loaded = Vec::with_capacity(results.len());
        for result in &results {
            let vertex = result.to_vertex()?;
            self.cache.fill_vertex(epoch, vertex.clone()).await;
            loaded.push(vertex);
        }
        Ok(loaded)
    }

    /// Vertex by id, `None` when it does not exist
    pub async fn get_vertex(&self, id: &ElementId) -> Result<Option<Vertex>> {
        if let Slot::Loaded(vertex) = self.cache.vertex(id).await {
            return Ok(Some(vertex));
        }
        Ok(self.load_vertices(std::slice::from_ref(id)).await?.pop())
    }

    /// Vertex by id, failing with `ElementNotFound` when it does not exist
    pub async fn vertex(&self, id: &ElementId) -> Result<Vertex> {
        self.get_vertex(id)
            .await?
            .ok_or_else(|| GraphError::not_found(ElementKind::Vertex, id))
    }

    /// Vertices in the order of `ids`, loading every uncached one in a
    /// single store call. Missing ids are skipped.
    pub async fn get_vertices(&self, ids: &[ElementId]) -> Result<Vec<Vertex>> {
        let mut slots = Vec::with_capacity(ids.len());
        let mut pending = Vec::new();
        for id in ids {
            let slot = self.cache.vertex(id).await;
            if !slot.is_loaded() {
                pending.push(id.clone());
            }
            slots.push(slot);
        }

        let loaded = self.load_vertices(&pending).await?;
        Ok(ids
            .iter()
            .zip(slots)
            .filter_map(|(id, slot)| match slot {
                Slot::Loaded(vertex) => Some(vertex),
                Slot::Placeholder => loaded.iter().find(|v| &v.id == id).cloned(),
            })
            .collect())
    }

    /// Merge `properties` into an existing vertex
    pub async fn set_vertex_properties(
        &self,
        id: &ElementId,
        properties: Properties,
    ) -> Result<Vertex> {
        let current = self.vertex(id).await?;
        let header = ElementHeader::from(&current);
        self.apply(&Mutation::Put(PutRequest::new(header, properties)))
            .await?;
        self.vertex(id).await
    }

    /// Delete a vertex that no edge references
    pub async fn delete_vertex(&self, id: &ElementId) -> Result<()> {
        self.apply(&Mutation::Delete(DeleteRequest::element(
            ElementKind::Vertex,
            id.clone(),
        )))
        .await
        .map(|_| ())
    }

    /// Delete a vertex together with every edge at either end of it
    #[instrument(skip(self, id), fields(vertex = %id))]
    pub async fn remove_vertex(&self, id: &ElementId) -> Result<()> {
        let incident = self
            .edges
            .query(
                ElementKind::Edge,
                &Query::EdgesForVertex { vertex: id.clone() },
            )
            .await?;

        for result in &incident {
            let edge_id = result.id(ElementKind::Edge)?;
            match self.delete_edge(&edge_id).await {
                Ok(()) => {}
                // Removed concurrently
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        debug!(edges = incident.len(), "Incident edges removed");
        self.delete_vertex(id).await
    }

    pub async fn delete_vertex_properties<I, S>(&self, id: &ElementId, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = DeleteRequest::element(ElementKind::Vertex, id.clone()).properties(keys);
        self.apply(&Mutation::Delete(request)).await.map(|_| ())
    }

    /// Add one to a LONG vertex property, returning the new value
    pub async fn increment_vertex(&self, id: &ElementId, key: &str) -> Result<i64> {
        self.increment(IncrementRequest::new(ElementKind::Vertex, id.clone(), key))
            .await
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Create an edge from `from` to `to`.
    ///
    /// Endpoint vertices are not required to exist.
    pub async fn add_edge(
        &self,
        id: Option<ElementId>,
        label: Option<&str>,
        from: &ElementId,
        to: &ElementId,
        properties: Properties,
    ) -> Result<Edge> {
        let id = ElementId::or_generate(id);
        let label = label.unwrap_or(ElementKind::Edge.default_label());
        let header = ElementHeader::edge(id.clone(), label, from.clone(), to.clone());

        self.apply(&Mutation::Put(PutRequest::new(header, properties)))
            .await?;
        self.edge(&id).await
    }

    async fn load_edges(&self, ids: &[ElementId]) -> Result<Vec<Edge>> {
        let epoch = self.cache.epoch();
        let results = self.edges.get_many(ElementKind::Edge, ids).await?;
        let mut loaded = Vec::with_capacity(results.len());
        for result in &results {
            let edge = result.to_edge()?;
            self.cache.fill_edge(epoch, edge.clone()).await;
            loaded.push(edge);
        }
        Ok(loaded)
    }

    pub async fn get_edge(&self, id: &ElementId) -> Result<Option<Edge>> {
        if let Slot::Loaded(edge) = self.cache.edge(id).await {
            return Ok(Some(edge));
        }
        Ok(self.load_edges(std::slice::from_ref(id)).await?.pop())
    }

    /// Edge by id, failing with `ElementNotFound` when it does not exist
    pub async fn edge(&self, id: &ElementId) -> Result<Edge> {
        self.get_edge(id)
            .await?
            .ok_or_else(|| GraphError::not_found(ElementKind::Edge, id))
    }

    /// Edges in the order of `ids`, loading uncached ones in one call
    pub async fn get_edges(&self, ids: &[ElementId]) -> Result<Vec<Edge>> {
        let mut slots = Vec::with_capacity(ids.len());
        let mut pending = Vec::new();
        for id in ids {
            let slot = self.cache.edge(id).await;
            if !slot.is_loaded() {
                pending.push(id.clone());
            }
            slots.push(slot);
        }

        let loaded = self.load_edges(&pending).await?;
        Ok(ids
            .iter()
            .zip(slots)
            .filter_map(|(id, slot)| match slot {
                Slot::Loaded(edge) => Some(edge),
                Slot::Placeholder => loaded.iter().find(|e| &e.id == id).cloned(),
            })
            .collect())
    }

    pub async fn set_edge_properties(&self, id: &ElementId, properties: Properties) -> Result<Edge> {
        let current = self.edge(id).await?;
        let header = ElementHeader::from(&current);
        self.apply(&Mutation::Put(PutRequest::new(header, properties)))
            .await?;
        self.edge(id).await
    }

    pub async fn delete_edge(&self, id: &ElementId) -> Result<()> {
        self.apply(&Mutation::Delete(DeleteRequest::element(
            ElementKind::Edge,
            id.clone(),
        )))
        .await
        .map(|_| ())
    }

    /// Delete every edge from `from` to `to`
    pub async fn delete_edges_between(&self, from: &ElementId, to: &ElementId) -> Result<()> {
        self.apply(&Mutation::Delete(DeleteRequest::edges_between(
            from.clone(),
            to.clone(),
        )))
        .await
        .map(|_| ())
    }

    pub async fn delete_edge_properties<I, S>(&self, id: &ElementId, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = DeleteRequest::element(ElementKind::Edge, id.clone()).properties(keys);
        self.apply(&Mutation::Delete(request)).await.map(|_| ())
    }

    /// Add one to a LONG edge property, returning the new value
    pub async fn increment_edge(&self, id: &ElementId, key: &str) -> Result<i64> {
        self.increment(IncrementRequest::new(ElementKind::Edge, id.clone(), key))
            .await
    }

    async fn increment(&self, request: IncrementRequest) -> Result<i64> {
        let affected = self
            .affected(&Mutation::Increment(request.clone()))
            .await?;
        let value = self.table(request.kind).increment(&request).await;
        self.invalidate(&affected).await;
        value
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Edges at `vertex` for a direction and optional label set.
    ///
    /// `In` matches edges ending at the vertex; `Out` and `Both` match
    /// edges starting at it. Results are served from the vertex's
    /// adjacency list when cached.
    pub async fn vertex_edges(
        &self,
        vertex: &ElementId,
        direction: Direction,
        labels: &[String],
    ) -> Result<Vec<Edge>> {
        if let Some(ids) = self.cache.adjacency(vertex, direction, labels).await {
            return self.get_edges(&ids).await;
        }

        let epoch = self.cache.epoch();
        let query = Query::EdgesByEndpoint {
            vertex: vertex.clone(),
            direction,
            labels: labels.to_vec(),
        };
        let edges: Vec<Edge> = self.scan_edges(query).try_collect().await?;
        let ids = edges.iter().map(|edge| edge.id.clone()).collect();
        self.cache
            .put_adjacency(epoch, vertex, direction, labels, ids)
            .await;
        Ok(edges)
    }

    /// Vertices across the edges returned by [`Self::vertex_edges`],
    /// loaded in one batch
    pub async fn adjacent_vertices(
        &self,
        vertex: &ElementId,
        direction: Direction,
        labels: &[String],
    ) -> Result<Vec<Vertex>> {
        let edges = self.vertex_edges(vertex, direction, labels).await?;

        let mut ids: Vec<ElementId> = Vec::with_capacity(edges.len());
        for edge in &edges {
            let other = match direction {
                Direction::In => &edge.from,
                Direction::Out => &edge.to,
                Direction::Both => edge.other_end(vertex),
            };
            if !ids.contains(other) {
                ids.push(other.clone());
            }
        }
        self.get_vertices(&ids).await
    }

    /// Edges at `vertex` with one label and one property value
    pub fn vertex_edges_with_property(
        &self,
        vertex: &ElementId,
        direction: Direction,
        label: &str,
        key: &str,
        value: PropertyValue,
    ) -> BoxStream<'static, Result<Edge>> {
        self.scan_edges(Query::EdgesByEndpointProperty {
            vertex: vertex.clone(),
            direction,
            label: label.to_string(),
            key: key.to_string(),
            value,
        })
    }

    /// Edges at `vertex` with one label and `from <= value < to`
    pub fn vertex_edges_in_range(
        &self,
        vertex: &ElementId,
        direction: Direction,
        label: &str,
        key: &str,
        from: PropertyValue,
        to: PropertyValue,
    ) -> BoxStream<'static, Result<Edge>> {
        self.scan_edges(Query::EdgesByEndpointRange {
            vertex: vertex.clone(),
            direction,
            label: label.to_string(),
            key: key.to_string(),
            from,
            to,
        })
    }

    // ========================================================================
    // Scans
    // ========================================================================

    /// Stream the vertices matching `query`, caching each one unless
    /// an invalidation happened after the stream was created
    pub fn scan_vertices(&self, query: Query) -> BoxStream<'static, Result<Vertex>> {
        let cache = self.cache.clone();
        let epoch = cache.epoch();
        scan(self.vertices.clone(), ElementKind::Vertex, query)
            .and_then(move |result| {
                let cache = cache.clone();
                async move {
                    let vertex = result.to_vertex()?;
                    cache.fill_vertex(epoch, vertex.clone()).await;
                    Ok(vertex)
                }
            })
            .boxed()
    }

    /// Stream the edges matching `query`, caching each one unless an
    /// invalidation happened after the stream was created
    pub fn scan_edges(&self, query: Query) -> BoxStream<'static, Result<Edge>> {
        let cache = self.cache.clone();
        let epoch = cache.epoch();
        scan(self.edges.clone(), ElementKind::Edge, query)
            .and_then(move |result| {
                let cache = cache.clone();
                async move {
                    let edge = result.to_edge()?;
                    cache.fill_edge(epoch, edge.clone()).await;
                    Ok(edge)
                }
            })
            .boxed()
    }

    pub fn vertices_by_label(&self, label: &str) -> BoxStream<'static, Result<Vertex>> {
        self.scan_vertices(Query::ByLabel {
            label: label.to_string(),
        })
    }

    pub fn vertices_by_property(
        &self,
        label: &str,
        key: &str,
        value: PropertyValue,
    ) -> BoxStream<'static, Result<Vertex>> {
        self.scan_vertices(Query::ByProperty {
            label: label.to_string(),
            key: key.to_string(),
            value,
        })
    }

    /// Vertices with `from <= value < to`
    pub fn vertices_in_range(
        &self,
        label: &str,
        key: &str,
        from: PropertyValue,
        to: PropertyValue,
    ) -> BoxStream<'static, Result<Vertex>> {
        self.scan_vertices(Query::InRange {
            label: label.to_string(),
            key: key.to_string(),
            from,
            to,
        })
    }

    /// At most `limit` vertices with `value >= from`
    pub fn vertices_with_limit(
        &self,
        label: &str,
        key: &str,
        from: PropertyValue,
        limit: usize,
    ) -> BoxStream<'static, Result<Vertex>> {
        self.scan_vertices(Query::WithLimit {
            label: label.to_string(),
            key: key.to_string(),
            from,
            limit,
        })
    }

    pub fn edges_by_label(&self, label: &str) -> BoxStream<'static, Result<Edge>> {
        self.scan_edges(Query::ByLabel {
            label: label.to_string(),
        })
    }

    pub fn edges_by_property(
        &self,
        label: &str,
        key: &str,
        value: PropertyValue,
    ) -> BoxStream<'static, Result<Edge>> {
        self.scan_edges(Query::ByProperty {
            label: label.to_string(),
            key: key.to_string(),
            value,
        })
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Ids whose cached state a mutation makes stale, read before it runs
    async fn affected(&self, mutation: &Mutation) -> Result<Affected> {
        let mut affected = Affected::default();
        match mutation {
            Mutation::Put(put) if put.header.kind == ElementKind::Vertex => {
                affected.vertices.push(put.header.id.clone());
            }
            Mutation::Put(put) => {
                affected.edges.push(put.header.id.clone());
                affected.endpoints.extend(put.header.from.iter().cloned());
                affected.endpoints.extend(put.header.to.iter().cloned());
            }
            Mutation::Delete(delete) => match (&delete.kind, &delete.target) {
                (ElementKind::Vertex, Target::Id(id)) => affected.vertices.push(id.clone()),
                (ElementKind::Edge, Target::Id(id)) => match self.get_edge(id).await? {
                    Some(edge) => affected.edge(&edge),
                    None => affected.edges.push(id.clone()),
                },
                (ElementKind::Vertex, Target::Endpoints { .. }) => {}
                (ElementKind::Edge, Target::Endpoints { from, to }) => {
                    let query = Query::EdgesBetween {
                        from: from.clone(),
                        to: to.clone(),
                    };
                    for result in self.edges.query(ElementKind::Edge, &query).await? {
                        affected.edges.push(result.id(ElementKind::Edge)?);
                    }
                    affected.endpoints.push(from.clone());
                    affected.endpoints.push(to.clone());
                }
            },
            Mutation::Increment(increment) => match increment.kind {
                ElementKind::Vertex => affected.vertices.push(increment.id.clone()),
                ElementKind::Edge => affected.edges.push(increment.id.clone()),
            },
        }
        Ok(affected)
    }

    async fn invalidate(&self, affected: &Affected) {
        for id in &affected.vertices {
            self.cache.invalidate_vertex(id).await;
        }
        for id in &affected.edges {
            self.cache.invalidate_edge(id).await;
        }
        for id in &affected.endpoints {
            self.cache.invalidate_adjacency(id).await;
        }
    }

    /// Execute one mutation against the table of its element kind
    pub async fn apply(&self, mutation: &Mutation) -> Result<MutationOutcome> {
        let affected = self.affected(mutation).await?;
        let outcome = self.table(mutation.kind()).apply(mutation).await;
        // Multi-row writes are not atomic: drop cached state even on failure
        self.invalidate(&affected).await;

        if let Err(err) = &outcome {
            debug!(kind = %mutation.kind(), error = %err, "Mutation failed");
        }
        outcome
    }

    /// Execute mutations in order, one result per input.
    ///
    /// A failing mutation does not stop the ones after it.
    pub async fn apply_batch(&self, mutations: &[Mutation]) -> Vec<Result<MutationOutcome>> {
        let results: Vec<Result<MutationOutcome>> = stream::iter(mutations)
            .then(|mutation| self.apply(mutation))
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(total = results.len(), failed, "Batch finished with failures");
        }
        results
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Statistics of the vertex, edge and adjacency caches
    pub fn stats(&self) -> Vec<CacheStatsReport> {
        self.cache.all_stats()
    }

    /// Drop cached elements and close the store client
    pub async fn close(&self) -> Result<()> {
        self.cache.clear().await;
        self.store.close().await?;
        info!(namespace = %self.config.store.namespace, "Graph closed");
        Ok(())
    }
}

/// Forward-only stream over the elements a table query returns
fn scan(
    table: Table,
    kind: ElementKind,
    query: Query,
) -> impl futures::Stream<Item = Result<ElementResult>> + Send + 'static {
    stream::once(async move { table.query(kind, &query).await })
        .map_ok(|results| stream::iter(results).map(Ok::<_, GraphError>))
        .try_flatten()
}

impl std::fmt::Debug for KvGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvGraph")
            .field("vertices", &self.vertices)
            .field("edges", &self.edges)
            .finish()
    }
}
