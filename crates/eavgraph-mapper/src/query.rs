//! Query translator
//!
//! Each graph access pattern is one [`Query`] variant. A table turns it
//! into a store request through the filter builder, post-filters the
//! returned rows, re-fetches partial elements and recomposes them.

use crate::builder::{distinct_ids, FilterBuilder, QueryPlan};
use crate::codec::{group_rows, recompose, row_has_id, ElementResult};
use crate::table::Table;
use eavgraph_core::{Direction, ElementId, ElementKind, GraphError, PropertyValue, Result};
use tracing::debug;

/// Graph-level access patterns
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Direct multi-id lookup
    ByIds(Vec<ElementId>),
    /// Every element, optionally capped.
    ///
    /// The cap counts store rows, not elements: an element with `k`
    /// properties uses `k` of it.
    All { limit: Option<usize> },
    /// Elements whose id sorts at or after `from`, at most `limit` rows
    /// (an element spans one row per property)
    FromId { from: ElementId, limit: usize },
    ByLabel { label: String },
    ByProperty {
        label: String,
        key: String,
        value: PropertyValue,
    },
    /// `from <= value < to`
    InRange {
        label: String,
        key: String,
        from: PropertyValue,
        to: PropertyValue,
    },
    /// `value >= from`, at most `limit` rows
    WithLimit {
        label: String,
        key: String,
        from: PropertyValue,
        limit: usize,
    },
    /// Edges at a vertex, optionally restricted to a label set
    EdgesByEndpoint {
        vertex: ElementId,
        direction: Direction,
        labels: Vec<String>,
    },
    EdgesByEndpointProperty {
        vertex: ElementId,
        direction: Direction,
        label: String,
        key: String,
        value: PropertyValue,
    },
    EdgesByEndpointRange {
        vertex: ElementId,
        direction: Direction,
        label: String,
        key: String,
        from: PropertyValue,
        to: PropertyValue,
    },
    /// Edges with the vertex at either end
    EdgesForVertex { vertex: ElementId },
    EdgesBetween { from: ElementId, to: ElementId },
}

impl Query {
    /// Whether the pattern only makes sense on an edge table
    pub fn edges_only(&self) -> bool {
        matches!(
            self,
            Self::EdgesByEndpoint { .. }
                | Self::EdgesByEndpointProperty { .. }
                | Self::EdgesByEndpointRange { .. }
                | Self::EdgesForVertex { .. }
                | Self::EdgesBetween { .. }
        )
    }

    /// Store plan for this pattern; `None` for direct id lookups
    pub fn plan(&self) -> Option<QueryPlan> {
        Some(match self {
            Self::ByIds(_) => return None,
            Self::All { limit } => FilterBuilder::all(*limit),
            Self::FromId { from, limit } => FilterBuilder::from_id(from, *limit),
            Self::ByLabel { label } => FilterBuilder::by_label(label),
            Self::ByProperty { label, key, value } => FilterBuilder::by_property(label, key, value),
            Self::InRange {
                label,
                key,
                from,
                to,
            } => FilterBuilder::in_range(label, key, from, to),
            Self::WithLimit {
                label,
                key,
                from,
                limit,
            } => FilterBuilder::with_limit(label, key, from, *limit),
            Self::EdgesByEndpoint {
                vertex,
                direction,
                labels,
            } => FilterBuilder::edges_by_endpoint(vertex, *direction, labels),
            Self::EdgesByEndpointProperty {
                vertex,
                direction,
                label,
                key,
                value,
            } => FilterBuilder::edges_by_endpoint_property(vertex, *direction, label, key, value),
            Self::EdgesByEndpointRange {
                vertex,
                direction,
                label,
                key,
                from,
                to,
            } => FilterBuilder::edges_by_endpoint_range(vertex, *direction, label, key, from, to),
            Self::EdgesForVertex { vertex } => FilterBuilder::edge_exists_for_vertex(vertex),
            Self::EdgesBetween { from, to } => FilterBuilder::edge_by_endpoints(from, to),
        })
    }
}

impl Table {
    /// Recompose one element; empty when absent or of the other kind
    pub async fn get(&self, requested: ElementKind, id: &ElementId) -> Result<ElementResult> {
        if requested != self.kind() {
            return Ok(ElementResult::empty());
        }
        let rows = self.rows_of(id).await?;
        Ok(recompose(requested, self.kind(), &rows))
    }

    /// Recompose several elements in one store call.
    ///
    /// Results follow the order of `ids`; missing elements are skipped.
    pub async fn get_many(
        &self,
        requested: ElementKind,
        ids: &[ElementId],
    ) -> Result<Vec<ElementResult>> {
        if requested != self.kind() {
            return Ok(Vec::new());
        }
        let groups = group_rows(self.rows_of_many(ids).await?);

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(rows) = groups
                .iter()
                .find(|rows| rows.first().map(|r| row_has_id(r, id)).unwrap_or(false))
            {
                let result = recompose(requested, self.kind(), rows);
                if !result.is_empty() && !results.contains(&result) {
                    results.push(result);
                }
            }
        }
        Ok(results)
    }

    /// Run an access pattern and recompose every matched element
    pub async fn query(&self, requested: ElementKind, query: &Query) -> Result<Vec<ElementResult>> {
        if query.edges_only() && self.kind() != ElementKind::Edge {
            return Err(GraphError::UnsupportedElementKind {
                table: self.name().to_string(),
                requested: ElementKind::Edge,
            });
        }
        if requested != self.kind() {
            return Ok(Vec::new());
        }

        let plan = match (query, query.plan()) {
            (Query::ByIds(ids), _) => return self.get_many(requested, ids).await,
            (_, Some(plan)) => plan,
            (_, None) => return Ok(Vec::new()),
        };

        let rows = self.run_plan(self.name(), &plan).await?;
        let groups = if plan.hydrate {
            let ids = distinct_ids(&rows);
            let hydrated = group_rows(self.rows_of_many(&ids).await?);
            // Keep the order in which the store matched the elements
            ids.iter()
                .filter_map(|id| {
                    hydrated
                        .iter()
                        .find(|rows| rows.first().map(|r| row_has_id(r, id)).unwrap_or(false))
                        .cloned()
                })
                .collect()
        } else {
            group_rows(rows)
        };

        let results: Vec<ElementResult> = groups
            .iter()
            .map(|rows| recompose(requested, self.kind(), rows))
            .filter(|result| !result.is_empty())
            .collect();
        debug!(table = %self.name(), ?query, found = results.len(), "Query translated");
        Ok(results)
    }

    /// Whether the pattern matches at least one row
    pub async fn exists(&self, query: &Query) -> Result<bool> {
        match query.plan() {
            Some(plan) => Ok(!self.run_plan(self.name(), &plan).await?.is_empty()),
            None => Ok(!self.query(self.kind(), query).await?.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_patterns_flagged() {
        let query = Query::EdgesForVertex {
            vertex: ElementId::from("v1"),
        };
        assert!(query.edges_only());
        assert!(!Query::ByLabel {
            label: "person".to_string()
        }
        .edges_only());
    }

    #[test]
    fn test_id_lookup_has_no_plan() {
        assert!(Query::ByIds(vec![ElementId::from("v1")]).plan().is_none());
        assert!(Query::All { limit: None }.plan().is_some());
    }
}
