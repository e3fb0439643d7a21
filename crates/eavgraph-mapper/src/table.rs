//! Table handle: one element kind stored in one store table

use crate::builder::QueryPlan;
use crate::codec::row_has_id;
use eavgraph_core::{schema, ElementId, ElementKind, GraphError, Result};
use eavgraph_store::{KeyRecord, RowStore};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Store table holding the rows of one element kind.
///
/// A vertex table knows the name of its edge table so that deletions can
/// check for referencing edges.
#[derive(Clone)]
pub struct Table {
    store: Arc<dyn RowStore>,
    name: String,
    kind: ElementKind,
    edge_table: Option<String>,
}

impl Table {
    pub fn vertices(
        store: Arc<dyn RowStore>,
        name: impl Into<String>,
        edge_table: impl Into<String>,
    ) -> Self {
        Self {
            store,
            name: name.into(),
            kind: ElementKind::Vertex,
            edge_table: Some(edge_table.into()),
        }
    }

    pub fn edges(store: Arc<dyn RowStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            kind: ElementKind::Edge,
            edge_table: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    pub(crate) fn edge_table(&self) -> Option<&str> {
        self.edge_table.as_deref()
    }

    /// Fail unless this table holds `requested` elements
    pub(crate) fn check_kind(&self, requested: ElementKind) -> Result<()> {
        if requested == self.kind {
            Ok(())
        } else {
            Err(GraphError::UnsupportedElementKind {
                table: self.name.clone(),
                requested,
            })
        }
    }

    /// Create the secondary indices this table's queries lead with
    pub async fn ensure_indices(&self) -> Result<()> {
        for column in schema::indexed_columns(self.kind) {
            self.store.ensure_index(&self.name, column).await?;
        }
        debug!(table = %self.name, kind = %self.kind, "Secondary indices ensured");
        Ok(())
    }

    /// Every row of the element with this typed id
    pub(crate) async fn rows_of(&self, id: &ElementId) -> Result<Vec<KeyRecord>> {
        let rows = self.store.get_by_keys(&self.name, &[id.encode()]).await?;
        Ok(rows.into_iter().filter(|row| row_has_id(row, id)).collect())
    }

    /// Every row of any of the given elements, in one store call
    pub(crate) async fn rows_of_many(&self, ids: &[ElementId]) -> Result<Vec<KeyRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut encoded: Vec<String> = ids.iter().map(ElementId::encode).collect();
        encoded.sort();
        encoded.dedup();

        let rows = self.store.get_by_keys(&self.name, &encoded).await?;
        Ok(rows
            .into_iter()
            .filter(|row| ids.iter().any(|id| row_has_id(row, id)))
            .collect())
    }

    /// Run a plan against `table`, applying its client-side predicates
    pub(crate) async fn run_plan(&self, table: &str, plan: &QueryPlan) -> Result<Vec<KeyRecord>> {
        let rows = self.store.query_by_filter(table, &plan.filters).await?;
        let total = rows.len();
        let rows: Vec<KeyRecord> = rows.into_iter().filter(|row| plan.accepts(row)).collect();
        trace!(table, filter = %plan.filters, total, kept = rows.len(), "Plan executed");
        Ok(rows)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("edge_table", &self.edge_table)
            .finish()
    }
}
