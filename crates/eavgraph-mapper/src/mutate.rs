//! Mutation batch executor
//!
//! Turns create/update/delete/increment requests into row writes and
//! deletes. Each logical request reports its own outcome; a batch never
//! stops at a failing member. Multi-row writes are not atomic.

use crate::builder::FilterBuilder;
use crate::codec::{
    apply_increment, apply_update, decompose, group_rows, prop_key, sentinel_from, ElementHeader,
};
use crate::table::Table;
use eavgraph_core::time::now_millis;
use eavgraph_core::{ElementId, ElementKind, GraphError, Properties, Result};
use eavgraph_store::KeyRecord;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

// ============================================================================
// Requests
// ============================================================================

/// Create-or-update request
#[derive(Debug, Clone, PartialEq)]
pub struct PutRequest {
    pub header: ElementHeader,
    pub properties: Properties,
}

impl PutRequest {
    pub fn new(header: ElementHeader, properties: Properties) -> Self {
        Self { header, properties }
    }
}

/// Element addressed by a delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Id(ElementId),
    /// Every edge from `from` to `to`
    Endpoints { from: ElementId, to: ElementId },
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Endpoints { from, to } => write!(f, "{from}->{to}"),
        }
    }
}

/// Delete a whole element, or only some of its properties
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub kind: ElementKind,
    pub target: Target,
    /// Empty deletes the element itself
    pub property_keys: Vec<String>,
}

impl DeleteRequest {
    pub fn element(kind: ElementKind, id: ElementId) -> Self {
        Self {
            kind,
            target: Target::Id(id),
            property_keys: Vec::new(),
        }
    }

    pub fn edges_between(from: ElementId, to: ElementId) -> Self {
        Self {
            kind: ElementKind::Edge,
            target: Target::Endpoints { from, to },
            property_keys: Vec::new(),
        }
    }

    pub fn properties<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.property_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// Add one to a LONG property
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementRequest {
    pub kind: ElementKind,
    pub id: ElementId,
    pub key: String,
}

impl IncrementRequest {
    pub fn new(kind: ElementKind, id: ElementId, key: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            key: key.into(),
        }
    }
}

/// One logical mutation of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Put(PutRequest),
    Delete(DeleteRequest),
    Increment(IncrementRequest),
}

impl Mutation {
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Put(put) => put.header.kind,
            Self::Delete(delete) => delete.kind,
            Self::Increment(increment) => increment.kind,
        }
    }
}

/// What a successful mutation did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MutationOutcome {
    Created { rows: usize },
    Updated { rewritten: usize, appended: usize },
    Deleted { rows: usize },
    Incremented { value: i64 },
}

// ============================================================================
// Executor
// ============================================================================

impl Table {
    async fn write_rows(&self, rows: Vec<KeyRecord>) -> Result<()> {
        for row in rows {
            self.store().put_row(self.name(), &row.key, row.record).await?;
        }
        Ok(())
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.store().delete_rows(self.name(), keys).await
    }

    /// Create the element when no rows exist for its id, else update it
    pub async fn put(&self, request: &PutRequest) -> Result<MutationOutcome> {
        let header = &request.header;
        self.check_kind(header.kind)?;
        if header.kind == ElementKind::Edge && (header.from.is_none() || header.to.is_none()) {
            // Endpoints are required on update too
            header.check_complete()?;
        }

        let now = now_millis();
        let existing = self.rows_of(&header.id).await?;

        match apply_update(&existing, &request.properties, now)? {
            None => {
                let rows = decompose(header, &request.properties, now)?;
                let count = rows.len();
                self.write_rows(rows).await?;
                debug!(table = %self.name(), id = %header.id, rows = count, "Element created");
                Ok(MutationOutcome::Created { rows: count })
            }
            Some(plan) => {
                let (rewritten, appended) = (plan.rewritten.len(), plan.appended.len());
                self.write_rows(plan.rewritten).await?;
                self.write_rows(plan.appended).await?;
                self.delete_keys(&plan.obsolete).await?;
                debug!(
                    table = %self.name(),
                    id = %header.id,
                    rewritten,
                    appended,
                    "Element updated"
                );
                Ok(MutationOutcome::Updated {
                    rewritten,
                    appended,
                })
            }
        }
    }

    /// Any edge row referencing the vertex at either end
    pub async fn vertex_in_use(&self, vertex: &ElementId) -> Result<bool> {
        let Some(edge_table) = self.edge_table() else {
            return Ok(false);
        };
        let plan = FilterBuilder::edge_exists_for_vertex(vertex);
        Ok(!self.run_plan(edge_table, &plan).await?.is_empty())
    }

    async fn target_rows(&self, target: &Target) -> Result<Vec<KeyRecord>> {
        match target {
            Target::Id(id) => self.rows_of(id).await,
            Target::Endpoints { from, to } => {
                let plan = FilterBuilder::edge_by_endpoints(from, to);
                let matched = self.run_plan(self.name(), &plan).await?;
                let ids = crate::builder::distinct_ids(&matched);
                self.rows_of_many(&ids).await
            }
        }
    }

    /// Delete an element, or only the listed properties of it
    pub async fn delete(&self, request: &DeleteRequest) -> Result<MutationOutcome> {
        self.check_kind(request.kind)?;
        if matches!(request.target, Target::Endpoints { .. }) {
            self.check_kind(ElementKind::Edge)?;
        }

        let rows = self.target_rows(&request.target).await?;
        if rows.is_empty() {
            return Err(GraphError::ElementNotFound {
                kind: request.kind,
                id: request.target.to_string(),
            });
        }

        if request.property_keys.is_empty() {
            if let Target::Id(id) = &request.target {
                if self.vertex_in_use(id).await? {
                    warn!(table = %self.name(), id = %id, "Refusing to delete referenced vertex");
                    return Err(GraphError::VertexInUse(id.to_string()));
                }
            }
            let keys: Vec<String> = rows.iter().map(|row| row.key.clone()).collect();
            let deleted = self.delete_keys(&keys).await?;
            debug!(table = %self.name(), target = %request.target, rows = deleted, "Element deleted");
            return Ok(MutationOutcome::Deleted { rows: deleted });
        }

        let wanted: HashSet<&str> = request.property_keys.iter().map(String::as_str).collect();
        let now = now_millis();
        let mut keys = Vec::new();
        for element_rows in group_rows(rows) {
            let doomed: Vec<&KeyRecord> = element_rows
                .iter()
                .filter(|row| prop_key(row).map(|k| wanted.contains(k)).unwrap_or(false))
                .collect();
            if doomed.is_empty() {
                continue;
            }
            let remaining = element_rows
                .iter()
                .filter(|row| prop_key(row).is_some())
                .count()
                - doomed.len();
            if remaining == 0 {
                // Last property gone: keep the element alive as a sentinel
                self.write_rows(vec![sentinel_from(doomed[0], now)]).await?;
            }
            keys.extend(doomed.iter().map(|row| row.key.clone()));
        }

        let deleted = self.delete_keys(&keys).await?;
        debug!(table = %self.name(), target = %request.target, rows = deleted, "Properties deleted");
        Ok(MutationOutcome::Deleted { rows: deleted })
    }

    /// Increment a LONG property by one and return the new value
    pub async fn increment(&self, request: &IncrementRequest) -> Result<i64> {
        self.check_kind(request.kind)?;

        let rows = self.rows_of(&request.id).await?;
        if rows.is_empty() {
            return Err(GraphError::not_found(request.kind, &request.id));
        }
        let (row, value) = apply_increment(&rows, &request.key, now_millis()).ok_or_else(|| {
            GraphError::PropertyNotIncrementable {
                kind: request.kind,
                id: request.id.to_string(),
                key: request.key.clone(),
            }
        })?;
        self.write_rows(vec![row]).await?;
        debug!(table = %self.name(), id = %request.id, key = %request.key, value, "Property incremented");
        Ok(value)
    }

    /// Execute one mutation
    pub async fn apply(&self, mutation: &Mutation) -> Result<MutationOutcome> {
        match mutation {
            Mutation::Put(put) => self.put(put).await,
            Mutation::Delete(delete) => self.delete(delete).await,
            Mutation::Increment(increment) => self
                .increment(increment)
                .await
                .map(|value| MutationOutcome::Incremented { value }),
        }
    }

    /// Execute mutations in order, one result slot per input
    pub async fn batch(&self, mutations: &[Mutation]) -> Vec<Result<MutationOutcome>> {
        let results: Vec<Result<MutationOutcome>> = stream::iter(mutations)
            .then(|mutation| self.apply(mutation))
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            info!(table = %self.name(), total = results.len(), failed, "Batch finished with failures");
        } else {
            debug!(table = %self.name(), total = results.len(), "Batch finished");
        }
        results
    }
}
