//! Table Integration Tests
//!
//! Drives the query translator and mutation executor against the
//! in-memory row store.
//!
//! Author: hephaex@gmail.com

use eavgraph_core::{
    Direction, ElementId, ElementKind, GraphError, Properties, PropertyValue,
};
use eavgraph_mapper::{
    DeleteRequest, ElementHeader, IncrementRequest, Mutation, MutationOutcome, PutRequest, Query,
    Table,
};
use eavgraph_store::MemoryRowStore;
use std::sync::Arc;

const VERTICES: &str = "test_vertices";
const EDGES: &str = "test_edges";

struct Fixture {
    store: Arc<MemoryRowStore>,
    vertices: Table,
    edges: Table,
}

async fn setup() -> Fixture {
    let store = Arc::new(MemoryRowStore::new());
    let vertices = Table::vertices(store.clone(), VERTICES, EDGES);
    let edges = Table::edges(store.clone(), EDGES);
    vertices.ensure_indices().await.unwrap();
    edges.ensure_indices().await.unwrap();
    Fixture {
        store,
        vertices,
        edges,
    }
}

fn props(pairs: &[(&str, PropertyValue)]) -> Properties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn put_vertex(id: &str, label: &str, properties: Properties) -> PutRequest {
    PutRequest::new(ElementHeader::vertex(ElementId::from(id), label), properties)
}

fn put_edge(id: &str, label: &str, from: &str, to: &str, properties: Properties) -> PutRequest {
    PutRequest::new(
        ElementHeader::edge(
            ElementId::from(id),
            label,
            ElementId::from(from),
            ElementId::from(to),
        ),
        properties,
    )
}

fn ids(results: &[eavgraph_mapper::ElementResult], kind: ElementKind) -> Vec<ElementId> {
    results.iter().map(|r| r.id(kind).unwrap()).collect()
}

async fn row_key_of(store: &MemoryRowStore, table: &str, id: &str, key: &str) -> Option<String> {
    store
        .rows(table)
        .await
        .into_iter()
        .find(|r| r.record.get_str("id") == Some(id) && r.record.get_str("propKey") == Some(key))
        .map(|r| r.key)
}

// =============================================================================
// Mutation Scenario
// =============================================================================

#[tokio::test]
async fn test_vertex_lifecycle_scenario() {
    let fx = setup().await;
    let v1 = ElementId::from("v1");

    let outcome = fx
        .vertices
        .put(&put_vertex("v1", "person", props(&[("name", "Ann".into())])))
        .await
        .unwrap();
    assert_eq!(outcome, MutationOutcome::Created { rows: 1 });

    let before = fx
        .vertices
        .get(ElementKind::Vertex, &v1)
        .await
        .unwrap()
        .to_vertex()
        .unwrap();
    let name_key = row_key_of(&fx.store, VERTICES, "v1", "name").await.unwrap();

    let outcome = fx
        .vertices
        .put(&put_vertex("v1", "person", props(&[("age", 30i64.into())])))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        MutationOutcome::Updated {
            rewritten: 0,
            appended: 1
        }
    );

    let after = fx
        .vertices
        .get(ElementKind::Vertex, &v1)
        .await
        .unwrap()
        .to_vertex()
        .unwrap();
    assert!(after.updated_at > before.updated_at);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(
        row_key_of(&fx.store, VERTICES, "v1", "name").await,
        Some(name_key)
    );

    let value = fx
        .vertices
        .increment(&IncrementRequest::new(ElementKind::Vertex, v1.clone(), "age"))
        .await
        .unwrap();
    assert_eq!(value, 31);

    fx.vertices
        .delete(&DeleteRequest::element(ElementKind::Vertex, v1.clone()).properties(["name"]))
        .await
        .unwrap();

    let vertex = fx
        .vertices
        .get(ElementKind::Vertex, &v1)
        .await
        .unwrap()
        .to_vertex()
        .unwrap();
    assert_eq!(vertex.properties, props(&[("age", PropertyValue::Long(31))]));
    assert_eq!(fx.store.row_count(VERTICES).await, 1);
}

#[tokio::test]
async fn test_first_property_replaces_sentinel() {
    let fx = setup().await;
    fx.vertices
        .put(&put_vertex("v1", "person", Properties::new()))
        .await
        .unwrap();
    assert_eq!(fx.store.row_count(VERTICES).await, 1);

    fx.vertices
        .put(&put_vertex("v1", "person", props(&[("name", "Ann".into())])))
        .await
        .unwrap();

    let rows = fx.store.rows(VERTICES).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].record.get_str("propKey"), Some("name"));
}

#[tokio::test]
async fn test_removing_last_property_keeps_element() {
    let fx = setup().await;
    let v1 = ElementId::from("v1");
    fx.vertices
        .put(&put_vertex("v1", "person", props(&[("name", "Ann".into())])))
        .await
        .unwrap();

    fx.vertices
        .delete(&DeleteRequest::element(ElementKind::Vertex, v1.clone()).properties(["name"]))
        .await
        .unwrap();

    let result = fx.vertices.get(ElementKind::Vertex, &v1).await.unwrap();
    assert!(!result.is_empty());
    assert!(result.property_columns().is_empty());
    assert!(row_key_of(&fx.store, VERTICES, "v1", "*").await.is_some());
}

#[tokio::test]
async fn test_increment_guard() {
    let fx = setup().await;
    let v1 = ElementId::from("v1");
    fx.vertices
        .put(&put_vertex(
            "v1",
            "person",
            props(&[("name", "Ann".into()), ("rank", 3i32.into())]),
        ))
        .await
        .unwrap();

    for key in ["name", "rank", "missing"] {
        let err = fx
            .vertices
            .increment(&IncrementRequest::new(ElementKind::Vertex, v1.clone(), key))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::PropertyNotIncrementable { .. }));
    }

    let err = fx
        .vertices
        .increment(&IncrementRequest::new(
            ElementKind::Vertex,
            ElementId::from("ghost"),
            "age",
        ))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_edge_put_requires_endpoints() {
    let fx = setup().await;
    let header = ElementHeader {
        kind: ElementKind::Edge,
        id: ElementId::from("e1"),
        label: Some("knows".to_string()),
        from: None,
        to: Some(ElementId::from("b")),
    };
    let err = fx
        .edges
        .put(&PutRequest::new(header, Properties::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::IncompleteElement { .. }));
    assert_eq!(fx.store.row_count(EDGES).await, 0);
}

#[tokio::test]
async fn test_wrong_kind_rejected() {
    let fx = setup().await;
    let err = fx
        .vertices
        .put(&put_edge("e1", "knows", "a", "b", Properties::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::UnsupportedElementKind { .. }));

    let result = fx
        .vertices
        .get(ElementKind::Edge, &ElementId::from("e1"))
        .await
        .unwrap();
    assert!(result.is_empty());
}

// =============================================================================
// Referential Guard and Batches
// =============================================================================

#[tokio::test]
async fn test_referenced_vertex_cannot_be_deleted() {
    let fx = setup().await;
    for id in ["a", "b"] {
        fx.vertices
            .put(&put_vertex(id, "person", props(&[("name", id.into())])))
            .await
            .unwrap();
    }
    fx.edges
        .put(&put_edge("e1", "knows", "a", "b", Properties::new()))
        .await
        .unwrap();

    let err = fx
        .vertices
        .delete(&DeleteRequest::element(ElementKind::Vertex, ElementId::from("b")))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::VertexInUse(_)));
    assert_eq!(fx.store.row_count(VERTICES).await, 2);

    // Property deletes are not guarded
    fx.vertices
        .delete(&DeleteRequest::element(ElementKind::Vertex, ElementId::from("b")).properties(["name"]))
        .await
        .unwrap();

    fx.edges
        .delete(&DeleteRequest::edges_between(ElementId::from("a"), ElementId::from("b")))
        .await
        .unwrap();
    let outcome = fx
        .vertices
        .delete(&DeleteRequest::element(ElementKind::Vertex, ElementId::from("b")))
        .await
        .unwrap();
    assert_eq!(outcome, MutationOutcome::Deleted { rows: 1 });
}

#[tokio::test]
async fn test_batch_isolation() {
    let fx = setup().await;
    let mutations = vec![
        Mutation::Put(put_vertex("v1", "person", props(&[("age", 1i64.into())]))),
        Mutation::Delete(DeleteRequest::element(
            ElementKind::Vertex,
            ElementId::from("ghost"),
        )),
        Mutation::Increment(IncrementRequest::new(
            ElementKind::Vertex,
            ElementId::from("v1"),
            "age",
        )),
    ];

    let results = fx.vertices.batch(&mutations).await;
    assert_eq!(results.len(), 3);
    assert!(matches!(results[0], Ok(MutationOutcome::Created { rows: 1 })));
    assert!(results[1].as_ref().unwrap_err().is_not_found());
    assert!(matches!(
        results[2],
        Ok(MutationOutcome::Incremented { value: 2 })
    ));
}

// =============================================================================
// Access Patterns
// =============================================================================

async fn people(fx: &Fixture) {
    for (id, name, age) in [("a", "Ann", 30i64), ("b", "Bob", 17), ("c", "Cid", 45)] {
        fx.vertices
            .put(&put_vertex(
                id,
                "person",
                props(&[("name", name.into()), ("age", age.into())]),
            ))
            .await
            .unwrap();
    }
    fx.vertices
        .put(&put_vertex("p", "place", props(&[("name", "Oslo".into())])))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_label_and_property_queries_hydrate() {
    let fx = setup().await;
    people(&fx).await;

    let found = fx
        .vertices
        .query(
            ElementKind::Vertex,
            &Query::ByLabel {
                label: "person".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 3);

    let found = fx
        .vertices
        .query(
            ElementKind::Vertex,
            &Query::ByProperty {
                label: "person".to_string(),
                key: "name".to_string(),
                value: "Bob".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    let bob = found[0].to_vertex().unwrap();
    // Matched on `name`, still carries `age`
    assert_eq!(bob.property("age"), Some(&PropertyValue::Long(17)));
}

#[tokio::test]
async fn test_range_and_limit_queries() {
    let fx = setup().await;
    people(&fx).await;

    let found = fx
        .vertices
        .query(
            ElementKind::Vertex,
            &Query::InRange {
                label: "person".to_string(),
                key: "age".to_string(),
                from: 18i64.into(),
                to: 45i64.into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(ids(&found, ElementKind::Vertex), vec![ElementId::from("a")]);

    let found = fx
        .vertices
        .query(
            ElementKind::Vertex,
            &Query::WithLimit {
                label: "person".to_string(),
                key: "age".to_string(),
                from: 18i64.into(),
                limit: 10,
            },
        )
        .await
        .unwrap();
    let mut adults = ids(&found, ElementKind::Vertex);
    adults.sort();
    assert_eq!(adults, vec![ElementId::from("a"), ElementId::from("c")]);

    let found = fx
        .vertices
        .query(
            ElementKind::Vertex,
            &Query::WithLimit {
                label: "person".to_string(),
                key: "age".to_string(),
                from: 0i64.into(),
                limit: 1,
            },
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn test_id_scan_cap_counts_rows() {
    let fx = setup().await;
    fx.vertices
        .put(&put_vertex(
            "w",
            "person",
            props(&[("a", 1i64.into()), ("b", 2i64.into()), ("c", 3i64.into())]),
        ))
        .await
        .unwrap();
    fx.vertices
        .put(&put_vertex("x", "person", props(&[("a", 1i64.into())])))
        .await
        .unwrap();

    // Three rows of "w" use up the whole cap
    let capped = fx
        .vertices
        .query(
            ElementKind::Vertex,
            &Query::FromId {
                from: ElementId::from("w"),
                limit: 3,
            },
        )
        .await
        .unwrap();
    assert_eq!(ids(&capped, ElementKind::Vertex), vec![ElementId::from("w")]);
    assert_eq!(capped[0].property_columns().len(), 3);

    let wider = fx
        .vertices
        .query(
            ElementKind::Vertex,
            &Query::FromId {
                from: ElementId::from("w"),
                limit: 4,
            },
        )
        .await
        .unwrap();
    assert_eq!(
        ids(&wider, ElementKind::Vertex),
        vec![ElementId::from("w"), ElementId::from("x")]
    );
}

#[tokio::test]
async fn test_id_scans() {
    let fx = setup().await;
    people(&fx).await;

    let all = fx
        .vertices
        .query(ElementKind::Vertex, &Query::All { limit: None })
        .await
        .unwrap();
    assert_eq!(all.len(), 4);

    let found = fx
        .vertices
        .query(
            ElementKind::Vertex,
            &Query::FromId {
                from: ElementId::from("b"),
                limit: 100,
            },
        )
        .await
        .unwrap();
    let mut found = ids(&found, ElementKind::Vertex);
    found.sort();
    assert_eq!(
        found,
        vec![ElementId::from("b"), ElementId::from("c"), ElementId::from("p")]
    );

    let many = fx
        .vertices
        .get_many(
            ElementKind::Vertex,
            &[ElementId::from("c"), ElementId::from("zz"), ElementId::from("a")],
        )
        .await
        .unwrap();
    assert_eq!(
        ids(&many, ElementKind::Vertex),
        vec![ElementId::from("c"), ElementId::from("a")]
    );
}

#[tokio::test]
async fn test_edge_endpoint_queries() {
    let fx = setup().await;
    fx.edges
        .put(&put_edge("e1", "knows", "a", "b", props(&[("since", 2010i64.into())])))
        .await
        .unwrap();
    fx.edges
        .put(&put_edge("e2", "likes", "a", "c", props(&[("since", 2020i64.into())])))
        .await
        .unwrap();
    fx.edges
        .put(&put_edge("e3", "knows", "c", "a", Properties::new()))
        .await
        .unwrap();
    let a = ElementId::from("a");

    let out = fx
        .edges
        .query(
            ElementKind::Edge,
            &Query::EdgesByEndpoint {
                vertex: a.clone(),
                direction: Direction::Out,
                labels: vec![],
            },
        )
        .await
        .unwrap();
    assert_eq!(out.len(), 2);

    let incoming = fx
        .edges
        .query(
            ElementKind::Edge,
            &Query::EdgesByEndpoint {
                vertex: a.clone(),
                direction: Direction::In,
                labels: vec!["knows".to_string()],
            },
        )
        .await
        .unwrap();
    assert_eq!(ids(&incoming, ElementKind::Edge), vec![ElementId::from("e3")]);

    // BOTH matches on fromId only
    let both = fx
        .edges
        .query(
            ElementKind::Edge,
            &Query::EdgesByEndpoint {
                vertex: a.clone(),
                direction: Direction::Both,
                labels: vec![],
            },
        )
        .await
        .unwrap();
    assert_eq!(both.len(), 2);

    let by_prop = fx
        .edges
        .query(
            ElementKind::Edge,
            &Query::EdgesByEndpointProperty {
                vertex: a.clone(),
                direction: Direction::Out,
                label: "likes".to_string(),
                key: "since".to_string(),
                value: 2020i64.into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(ids(&by_prop, ElementKind::Edge), vec![ElementId::from("e2")]);

    let in_range = fx
        .edges
        .query(
            ElementKind::Edge,
            &Query::EdgesByEndpointRange {
                vertex: a.clone(),
                direction: Direction::Out,
                label: "knows".to_string(),
                key: "since".to_string(),
                from: 2000i64.into(),
                to: 2015i64.into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(ids(&in_range, ElementKind::Edge), vec![ElementId::from("e1")]);

    assert!(fx
        .edges
        .exists(&Query::EdgesForVertex { vertex: a.clone() })
        .await
        .unwrap());
    assert!(!fx
        .edges
        .exists(&Query::EdgesForVertex {
            vertex: ElementId::from("zz")
        })
        .await
        .unwrap());
}

#[tokio::test]
async fn test_edge_patterns_rejected_on_vertex_table() {
    let fx = setup().await;
    let err = fx
        .vertices
        .query(
            ElementKind::Vertex,
            &Query::EdgesForVertex {
                vertex: ElementId::from("a"),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::UnsupportedElementKind { .. }));
}

#[tokio::test]
async fn test_numeric_and_string_ids_stay_apart() {
    let fx = setup().await;
    fx.vertices
        .put(&PutRequest::new(
            ElementHeader::vertex(ElementId::Long(1), "n"),
            props(&[("kind", "long".into())]),
        ))
        .await
        .unwrap();
    fx.vertices
        .put(&put_vertex("1", "n", props(&[("kind", "string".into())])))
        .await
        .unwrap();

    let long = fx
        .vertices
        .get(ElementKind::Vertex, &ElementId::Long(1))
        .await
        .unwrap()
        .to_vertex()
        .unwrap();
    assert_eq!(long.id, ElementId::Long(1));
    assert_eq!(long.property("kind"), Some(&PropertyValue::from("long")));
}
