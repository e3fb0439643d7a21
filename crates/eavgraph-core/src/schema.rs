//! Flat row layout persisted in the key-value store
//!
//! Column names are bit-exact: the store and any external reader rely
//! on them.

use crate::element::ElementKind;

pub const ID_COL: &str = "id";
pub const ID_TYPE_COL: &str = "idType";
pub const LABEL_COL: &str = "label";
pub const TO_COL: &str = "toId";
pub const TO_TYPE_COL: &str = "toIdType";
pub const FROM_COL: &str = "fromId";
pub const FROM_TYPE_COL: &str = "fromIdType";
pub const CREATED_AT_COL: &str = "createdAt";
pub const UPDATED_AT_COL: &str = "updatedAt";
pub const PROP_KEY_COL: &str = "propKey";
pub const PROP_TYPE_COL: &str = "propType";
pub const PROP_VALUE_COL: &str = "propValue";

/// Key, type and value of the placeholder row of a property-less element
pub const SENTINEL: &str = "*";

const VERTEX_INDEXED: [&str; 4] = [ID_COL, LABEL_COL, PROP_KEY_COL, PROP_VALUE_COL];
const EDGE_INDEXED: [&str; 6] = [
    ID_COL,
    LABEL_COL,
    TO_COL,
    FROM_COL,
    PROP_KEY_COL,
    PROP_VALUE_COL,
];

/// Columns of the given table that need a string secondary index
pub fn indexed_columns(kind: ElementKind) -> &'static [&'static str] {
    match kind {
        ElementKind::Vertex => &VERTEX_INDEXED,
        ElementKind::Edge => &EDGE_INDEXED,
    }
}

/// Name of the table holding elements of `kind`
pub fn table_name(prefix: &str, kind: ElementKind) -> String {
    format!("{}_{}", prefix, kind.table_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(table_name("graph", ElementKind::Vertex), "graph_vertices");
        assert_eq!(table_name("graph", ElementKind::Edge), "graph_edges");
    }

    #[test]
    fn test_endpoint_indices_only_on_edges() {
        assert!(!indexed_columns(ElementKind::Vertex).contains(&TO_COL));
        assert!(indexed_columns(ElementKind::Edge).contains(&FROM_COL));
    }
}
