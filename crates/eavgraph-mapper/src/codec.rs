//! Row codec: graph elements to flat EAV rows and back
//!
//! An element with properties `P` is stored as `|P|` rows, one per
//! property, each repeating the element's common fields. An element
//! without properties is a single sentinel row whose property triple is
//! `("*", "*", "*")`.

use eavgraph_core::schema::{
    CREATED_AT_COL, FROM_COL, FROM_TYPE_COL, ID_COL, ID_TYPE_COL, LABEL_COL, PROP_KEY_COL,
    PROP_TYPE_COL, PROP_VALUE_COL, SENTINEL, TO_COL, TO_TYPE_COL, UPDATED_AT_COL,
};
use eavgraph_core::{
    Edge, ElementId, ElementKind, GraphError, Properties, PropertyValue, Result, ValueType, Vertex,
};
use eavgraph_store::{KeyRecord, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Fresh random row key
pub fn new_row_key() -> String {
    Uuid::new_v4().to_string()
}

// ============================================================================
// Element Header
// ============================================================================

/// Common fields repeated on every row of one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementHeader {
    pub kind: ElementKind,
    pub id: ElementId,
    pub label: Option<String>,
    /// Tail vertex, edges only
    pub from: Option<ElementId>,
    /// Head vertex, edges only
    pub to: Option<ElementId>,
}

impl ElementHeader {
    pub fn vertex(id: ElementId, label: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Vertex,
            id,
            label: Some(label.into()),
            from: None,
            to: None,
        }
    }

    pub fn edge(id: ElementId, label: impl Into<String>, from: ElementId, to: ElementId) -> Self {
        Self {
            kind: ElementKind::Edge,
            id,
            label: Some(label.into()),
            from: Some(from),
            to: Some(to),
        }
    }

    /// Names of required columns this header cannot fill
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.label.as_deref().map_or(true, str::is_empty) {
            missing.push(LABEL_COL);
        }
        if self.kind == ElementKind::Edge {
            if self.from.is_none() {
                missing.push(FROM_COL);
            }
            if self.to.is_none() {
                missing.push(TO_COL);
            }
        }
        missing
    }

    /// Fail with `IncompleteElement` when a required field is absent
    pub fn check_complete(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(GraphError::IncompleteElement {
                kind: self.kind,
                id: self.id.to_string(),
                missing: missing.join(", "),
            })
        }
    }

    fn common_record(&self, now: i64) -> Result<Record> {
        self.check_complete()?;

        let mut record = Record::new();
        record
            .set(ID_COL, self.id.encode())
            .set(ID_TYPE_COL, self.id.id_type().as_str())
            .set(LABEL_COL, self.label.clone().unwrap_or_default())
            .set(CREATED_AT_COL, now)
            .set(UPDATED_AT_COL, now);
        if let (Some(from), Some(to)) = (&self.from, &self.to) {
            record
                .set(TO_COL, to.encode())
                .set(TO_TYPE_COL, to.id_type().as_str())
                .set(FROM_COL, from.encode())
                .set(FROM_TYPE_COL, from.id_type().as_str());
        }
        Ok(record)
    }
}

impl From<&Vertex> for ElementHeader {
    fn from(vertex: &Vertex) -> Self {
        Self::vertex(vertex.id.clone(), vertex.label.clone())
    }
}

impl From<&Edge> for ElementHeader {
    fn from(edge: &Edge) -> Self {
        Self::edge(
            edge.id.clone(),
            edge.label.clone(),
            edge.from.clone(),
            edge.to.clone(),
        )
    }
}

// ============================================================================
// Row helpers
// ============================================================================

fn set_property(record: &mut Record, key: &str, value: &PropertyValue) {
    record
        .set(PROP_KEY_COL, key)
        .set(PROP_TYPE_COL, value.value_type().as_str())
        .set(PROP_VALUE_COL, value.encode());
}

fn set_sentinel(record: &mut Record) {
    record
        .set(PROP_KEY_COL, SENTINEL)
        .set(PROP_TYPE_COL, SENTINEL)
        .set(PROP_VALUE_COL, SENTINEL);
}

/// Whether the row is the placeholder of a property-less element
pub fn is_sentinel(row: &KeyRecord) -> bool {
    row.record.get_str(PROP_KEY_COL) == Some(SENTINEL)
}

/// Property key carried by a row, `None` for sentinel rows
pub fn prop_key(row: &KeyRecord) -> Option<&str> {
    row.record
        .get_str(PROP_KEY_COL)
        .filter(|key| *key != SENTINEL)
}

/// Copy of `template` carrying only the element's common fields
fn common_fields(template: &Record) -> Record {
    template
        .bins()
        .filter(|(column, _)| {
            !matches!(*column, PROP_KEY_COL | PROP_TYPE_COL | PROP_VALUE_COL)
        })
        .map(|(column, bin)| (column.to_string(), bin.clone()))
        .collect()
}

/// Identity of the element a row belongs to: encoded id and its type tag
pub fn row_identity(row: &KeyRecord) -> Option<(&str, &str)> {
    Some((
        row.record.get_str(ID_COL)?,
        row.record.get_str(ID_TYPE_COL)?,
    ))
}

/// Typed id of the element a row belongs to
pub fn row_element_id(row: &KeyRecord) -> Option<ElementId> {
    let (raw, id_type) = row_identity(row)?;
    ElementId::decode(id_type.parse().ok()?, raw).ok()
}

/// Whether the row belongs to the element with the given typed id
pub fn row_has_id(row: &KeyRecord, id: &ElementId) -> bool {
    row_identity(row)
        .map(|(raw, id_type)| raw == id.encode() && id_type == id.id_type().as_str())
        .unwrap_or(false)
}

/// Split rows into per-element groups, in order of first appearance
pub fn group_rows(rows: Vec<KeyRecord>) -> Vec<Vec<KeyRecord>> {
    let mut positions: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<Vec<KeyRecord>> = Vec::new();
    for row in rows {
        let Some((id, id_type)) = row_identity(&row) else {
            continue;
        };
        let identity = (id.to_string(), id_type.to_string());
        match positions.get(&identity) {
            Some(&pos) => groups[pos].push(row),
            None => {
                positions.insert(identity, groups.len());
                groups.push(vec![row]);
            }
        }
    }
    groups
}

// ============================================================================
// Decompose
// ============================================================================

/// Reject property keys that collide with the sentinel marker
fn check_property_keys(properties: &Properties) -> Result<()> {
    match properties.keys().find(|key| key.as_str() == SENTINEL) {
        Some(key) => Err(GraphError::InvalidValue {
            value_type: "property key".to_string(),
            value: key.clone(),
        }),
        None => Ok(()),
    }
}

/// Turn one element and its properties into fresh rows
pub fn decompose(
    header: &ElementHeader,
    properties: &Properties,
    now: i64,
) -> Result<Vec<KeyRecord>> {
    check_property_keys(properties)?;
    let common = header.common_record(now)?;

    if properties.is_empty() {
        let mut record = common;
        set_sentinel(&mut record);
        return Ok(vec![KeyRecord::new(new_row_key(), record)]);
    }

    Ok(properties
        .iter()
        .map(|(key, value)| {
            let mut record = common.clone();
            set_property(&mut record, key, value);
            KeyRecord::new(new_row_key(), record)
        })
        .collect())
}

// ============================================================================
// Recompose
// ============================================================================

/// One `(colName, colType, colValue)` tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub col_type: String,
    pub value: String,
}

impl Column {
    fn new(name: impl Into<String>, col_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            col_type: col_type.into(),
            value: value.into(),
        }
    }
}

/// Columns gathered from every row of one element.
///
/// Common fields come first, each once, followed by one column per
/// property. Empty means the element does not exist (or was requested
/// from a table holding the other kind).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementResult {
    header: Vec<Column>,
    properties: Vec<Column>,
}

impl ElementResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }

    pub fn header_column(&self, name: &str) -> Option<&Column> {
        self.header.iter().find(|c| c.name == name)
    }

    pub fn property_columns(&self) -> &[Column] {
        &self.properties
    }

    fn required(&self, kind: ElementKind, name: &str) -> Result<&Column> {
        self.header_column(name)
            .ok_or_else(|| GraphError::IncompleteElement {
                kind,
                id: self
                    .header_column(ID_COL)
                    .map(|c| c.value.clone())
                    .unwrap_or_default(),
                missing: name.to_string(),
            })
    }

    fn typed_id(&self, kind: ElementKind, name: &str) -> Result<ElementId> {
        let column = self.required(kind, name)?;
        ElementId::decode(column.col_type.parse()?, &column.value)
    }

    fn timestamp(&self, kind: ElementKind, name: &str) -> Result<i64> {
        let column = self.required(kind, name)?;
        column.value.parse().map_err(|_| GraphError::InvalidValue {
            value_type: ValueType::Long.to_string(),
            value: column.value.clone(),
        })
    }

    pub fn id(&self, kind: ElementKind) -> Result<ElementId> {
        self.typed_id(kind, ID_COL)
    }

    pub fn label(&self) -> Option<&str> {
        self.header_column(LABEL_COL).map(|c| c.value.as_str())
    }

    /// Decode the property columns
    pub fn properties(&self) -> Result<Properties> {
        self.properties
            .iter()
            .map(|c| -> Result<(String, PropertyValue)> {
                let value = PropertyValue::decode(c.col_type.parse()?, &c.value)?;
                Ok((c.name.clone(), value))
            })
            .collect()
    }

    pub fn to_vertex(&self) -> Result<Vertex> {
        let kind = ElementKind::Vertex;
        Ok(Vertex {
            id: self.id(kind)?,
            label: self.required(kind, LABEL_COL)?.value.clone(),
            created_at: self.timestamp(kind, CREATED_AT_COL)?,
            updated_at: self.timestamp(kind, UPDATED_AT_COL)?,
            properties: self.properties()?,
        })
    }

    pub fn to_edge(&self) -> Result<Edge> {
        let kind = ElementKind::Edge;
        Ok(Edge {
            id: self.id(kind)?,
            label: self.required(kind, LABEL_COL)?.value.clone(),
            from: self.typed_id(kind, FROM_COL)?,
            to: self.typed_id(kind, TO_COL)?,
            created_at: self.timestamp(kind, CREATED_AT_COL)?,
            updated_at: self.timestamp(kind, UPDATED_AT_COL)?,
            properties: self.properties()?,
        })
    }
}

/// Rebuild one element from the rows sharing its id.
///
/// A `requested` kind different from the table's kind yields an empty
/// result. Rows of other ids than the first row's are ignored.
pub fn recompose(requested: ElementKind, table: ElementKind, rows: &[KeyRecord]) -> ElementResult {
    if requested != table {
        return ElementResult::empty();
    }
    let Some(first) = rows.first() else {
        return ElementResult::empty();
    };
    let Some((id, id_type)) = row_identity(first) else {
        return ElementResult::empty();
    };
    let rows: Vec<&KeyRecord> = rows
        .iter()
        .filter(|row| row_identity(row) == Some((id, id_type)))
        .collect();

    let created_at = rows
        .iter()
        .filter_map(|row| row.record.get_int(CREATED_AT_COL))
        .min();
    let updated_at = rows
        .iter()
        .filter_map(|row| row.record.get_int(UPDATED_AT_COL))
        .max();

    let mut header = vec![Column::new(ID_COL, id_type, id)];
    if let Some(label) = first.record.get_str(LABEL_COL) {
        header.push(Column::new(LABEL_COL, ValueType::String.as_str(), label));
    }
    if table == ElementKind::Edge {
        for (column, type_column) in [(TO_COL, TO_TYPE_COL), (FROM_COL, FROM_TYPE_COL)] {
            if let (Some(value), Some(value_type)) = (
                first.record.get_str(column),
                first.record.get_str(type_column),
            ) {
                header.push(Column::new(column, value_type, value));
            }
        }
    }
    for (column, stamp) in [(CREATED_AT_COL, created_at), (UPDATED_AT_COL, updated_at)] {
        if let Some(stamp) = stamp {
            header.push(Column::new(
                column,
                ValueType::Long.as_str(),
                stamp.to_string(),
            ));
        }
    }

    let mut properties: Vec<Column> = Vec::new();
    for row in &rows {
        let Some(key) = prop_key(row) else {
            continue;
        };
        // A duplicated key keeps the last row seen
        let (Some(prop_type), Some(value)) = (
            row.record.get_str(PROP_TYPE_COL),
            row.record.get_str(PROP_VALUE_COL),
        ) else {
            continue;
        };
        let column = Column::new(key, prop_type, value);
        match properties.iter().position(|c| c.name == key) {
            Some(pos) => properties[pos] = column,
            None => properties.push(column),
        }
    }
    properties.sort_by(|a, b| a.name.cmp(&b.name));

    ElementResult { header, properties }
}

// ============================================================================
// Update and Increment
// ============================================================================

/// Row writes needed to apply new properties to an existing element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatePlan {
    /// Existing rows rewritten in place under their original key
    pub rewritten: Vec<KeyRecord>,
    /// New rows for keys the element did not have
    pub appended: Vec<KeyRecord>,
    /// Sentinel rows made obsolete by the first real property
    pub obsolete: Vec<String>,
}

impl UpdatePlan {
    pub fn is_empty(&self) -> bool {
        self.rewritten.is_empty() && self.appended.is_empty() && self.obsolete.is_empty()
    }
}

/// Partition `properties` against the existing rows.
///
/// Keys already stored are rewritten under the same row key with a new
/// `updatedAt`; unknown keys are appended as rows templated from the
/// first existing row with fresh timestamps. Rows of keys not in
/// `properties` are left untouched. Returns `Ok(None)` when `existing`
/// is empty.
pub fn apply_update(
    existing: &[KeyRecord],
    properties: &Properties,
    now: i64,
) -> Result<Option<UpdatePlan>> {
    check_property_keys(properties)?;
    let Some(template) = existing.first() else {
        return Ok(None);
    };
    let mut plan = UpdatePlan::default();

    for (key, value) in properties {
        match existing.iter().find(|row| prop_key(row) == Some(key.as_str())) {
            Some(row) => {
                let mut record = row.record.clone();
                set_property(&mut record, key, value);
                record.set(UPDATED_AT_COL, now);
                plan.rewritten.push(KeyRecord::new(row.key.clone(), record));
            }
            None => {
                let mut record = common_fields(&template.record);
                record.set(CREATED_AT_COL, now).set(UPDATED_AT_COL, now);
                set_property(&mut record, key, value);
                plan.appended.push(KeyRecord::new(new_row_key(), record));
            }
        }
    }

    if !properties.is_empty() {
        plan.obsolete = existing
            .iter()
            .filter(|row| is_sentinel(row))
            .map(|row| row.key.clone())
            .collect();
    }
    Ok(Some(plan))
}

/// Sentinel row for an element whose last property is being removed
pub fn sentinel_from(template: &KeyRecord, now: i64) -> KeyRecord {
    let mut record = common_fields(&template.record);
    record.set(UPDATED_AT_COL, now);
    set_sentinel(&mut record);
    KeyRecord::new(new_row_key(), record)
}

/// Increment the LONG property `key` by one.
///
/// Returns the rewritten row and the new value, or `None` when the key is
/// absent, not a LONG, or the increment would overflow.
pub fn apply_increment(existing: &[KeyRecord], key: &str, now: i64) -> Option<(KeyRecord, i64)> {
    let row = existing.iter().find(|row| {
        prop_key(row) == Some(key)
            && row.record.get_str(PROP_TYPE_COL) == Some(ValueType::Long.as_str())
    })?;
    let current: i64 = row.record.get_str(PROP_VALUE_COL)?.parse().ok()?;
    let next = current.checked_add(1)?;

    let mut record = row.record.clone();
    record
        .set(PROP_VALUE_COL, next.to_string())
        .set(UPDATED_AT_COL, now);
    Some((KeyRecord::new(row.key.clone(), record), next))
}
