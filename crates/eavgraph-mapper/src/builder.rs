//! Filter builder
//!
//! Translates graph-level predicates into a store [`FilterSet`] and a
//! list of client-side [`RowPredicate`]s for whatever the store cannot
//! express. The leading filter of every plan targets an indexed column.

use crate::codec::{prop_key, row_element_id};
use eavgraph_core::schema::{
    FROM_COL, FROM_TYPE_COL, ID_COL, ID_TYPE_COL, LABEL_COL, PROP_KEY_COL, PROP_TYPE_COL,
    PROP_VALUE_COL, TO_COL, TO_TYPE_COL,
};
use eavgraph_core::{Direction, ElementId, PropertyValue, ValueType};
use eavgraph_store::{Filter, FilterSet, FilterValue, KeyRecord, Number};
use std::cmp::Ordering;

/// Column holding the vertex id matched for a direction.
///
/// `In` matches the head (`toId`); `Out` and `Both` match the tail
/// (`fromId`).
pub fn endpoint_columns(direction: Direction) -> (&'static str, &'static str) {
    match direction {
        Direction::In => (TO_COL, TO_TYPE_COL),
        Direction::Out | Direction::Both => (FROM_COL, FROM_TYPE_COL),
    }
}

/// Equality operand for a stored string column
fn exact(value: &PropertyValue) -> FilterValue {
    FilterValue::Str(value.encode())
}

/// Ordering operand: numbers compare by magnitude, the rest as strings
fn ordered(value: &PropertyValue) -> FilterValue {
    match value {
        PropertyValue::Integer(i) => FilterValue::Int(i64::from(*i)),
        PropertyValue::Long(l) => FilterValue::Int(*l),
        PropertyValue::Float(f) => FilterValue::Float(f64::from(*f)),
        PropertyValue::Double(d) => FilterValue::Float(*d),
        other => FilterValue::Str(other.encode()),
    }
}

fn ordered_id(id: &ElementId) -> FilterValue {
    match id {
        ElementId::Long(l) => FilterValue::Int(*l),
        ElementId::String(s) => FilterValue::Str(s.clone()),
    }
}

fn as_number(value: &PropertyValue) -> Option<Number> {
    match value {
        PropertyValue::Integer(i) => Some(Number::Int(i64::from(*i))),
        PropertyValue::Long(l) => Some(Number::Int(*l)),
        PropertyValue::Float(f) => Some(Number::Float(f64::from(*f))),
        PropertyValue::Double(d) => Some(Number::Float(*d)),
        PropertyValue::String(s) => Number::parse(s),
        PropertyValue::Boolean(_) => None,
    }
}

// ============================================================================
// Client-side predicates
// ============================================================================

/// A row test evaluated after the store returns its candidates
#[derive(Debug, Clone, PartialEq)]
pub enum RowPredicate {
    /// Row label is one of the listed labels
    LabelIn(Vec<String>),
    /// `from <= propValue < to`, numeric when the stored type is numeric
    ValueInRange {
        from: PropertyValue,
        to: PropertyValue,
    },
    /// Either endpoint of the edge row is exactly this typed vertex id
    TouchesVertex(ElementId),
}

impl RowPredicate {
    pub fn matches(&self, row: &KeyRecord) -> bool {
        match self {
            Self::LabelIn(labels) => row
                .record
                .get_str(LABEL_COL)
                .map(|label| labels.iter().any(|l| l == label))
                .unwrap_or(false),
            Self::ValueInRange { from, to } => value_in_range(row, from, to),
            Self::TouchesVertex(vertex) => {
                endpoint_is(row, TO_COL, TO_TYPE_COL, vertex)
                    || endpoint_is(row, FROM_COL, FROM_TYPE_COL, vertex)
            }
        }
    }
}

fn endpoint_is(row: &KeyRecord, column: &str, type_column: &str, vertex: &ElementId) -> bool {
    row.record.get_str(column) == Some(vertex.encode().as_str())
        && row.record.get_str(type_column) == Some(vertex.id_type().as_str())
}

fn value_in_range(row: &KeyRecord, from: &PropertyValue, to: &PropertyValue) -> bool {
    if prop_key(row).is_none() {
        return false;
    }
    let (Some(raw_type), Some(raw)) = (
        row.record.get_str(PROP_TYPE_COL),
        row.record.get_str(PROP_VALUE_COL),
    ) else {
        return false;
    };
    let numeric = raw_type
        .parse::<ValueType>()
        .map(|t| t.is_numeric())
        .unwrap_or(false);

    if numeric {
        let (Some(value), Some(lower), Some(upper)) =
            (Number::parse(raw), as_number(from), as_number(to))
        else {
            return false;
        };
        value.total_cmp(&lower) != Ordering::Less && value.total_cmp(&upper) == Ordering::Less
    } else {
        let (lower, upper) = (from.encode(), to.encode());
        raw.cmp(lower.as_str()) != Ordering::Less && raw.cmp(upper.as_str()) == Ordering::Less
    }
}

// ============================================================================
// Query plans
// ============================================================================

/// Store filters plus client-side predicates for one access pattern
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub filters: FilterSet,
    pub predicates: Vec<RowPredicate>,
    /// Matched rows are partial; re-fetch each element's full row set
    pub hydrate: bool,
}

impl QueryPlan {
    fn new(filters: FilterSet) -> Self {
        Self {
            filters,
            predicates: Vec::new(),
            hydrate: false,
        }
    }

    fn with_predicate(mut self, predicate: RowPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    fn hydrated(mut self) -> Self {
        self.hydrate = true;
        self
    }

    /// Whether a returned row passes every client-side predicate
    pub fn accepts(&self, row: &KeyRecord) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }
}

/// Builds the [`QueryPlan`] of each access pattern
pub struct FilterBuilder;

impl FilterBuilder {
    /// Every element, optionally capped at a number of rows
    pub fn all(limit: Option<usize>) -> QueryPlan {
        let mut filters = FilterSet::all();
        filters.limit = limit;
        let plan = QueryPlan::new(filters);
        if limit.is_some() {
            plan.hydrated()
        } else {
            plan
        }
    }

    /// Elements whose id sorts at or after `from`, capped at `limit` rows
    pub fn from_id(from: &ElementId, limit: usize) -> QueryPlan {
        QueryPlan::new(
            FilterSet::and(vec![
                Filter::range_from(ID_COL, ordered_id(from)),
                Filter::equal(ID_TYPE_COL, from.id_type().as_str()),
            ])
            .with_limit(limit),
        )
        .hydrated()
    }

    pub fn by_label(label: &str) -> QueryPlan {
        QueryPlan::new(FilterSet::and(vec![Filter::equal(LABEL_COL, label)]))
    }

    pub fn by_property(label: &str, key: &str, value: &PropertyValue) -> QueryPlan {
        QueryPlan::new(FilterSet::and(vec![
            Filter::equal(LABEL_COL, label),
            Filter::equal(PROP_KEY_COL, key),
            Filter::equal(PROP_VALUE_COL, exact(value)),
        ]))
        .hydrated()
    }

    pub fn in_range(label: &str, key: &str, from: &PropertyValue, to: &PropertyValue) -> QueryPlan {
        QueryPlan::new(FilterSet::and(vec![
            Filter::equal(LABEL_COL, label),
            Filter::equal(PROP_KEY_COL, key),
        ]))
        .with_predicate(RowPredicate::ValueInRange {
            from: from.clone(),
            to: to.clone(),
        })
        .hydrated()
    }

    /// The cap is enforced by the store; nothing is truncated client-side
    pub fn with_limit(label: &str, key: &str, from: &PropertyValue, limit: usize) -> QueryPlan {
        QueryPlan::new(
            FilterSet::and(vec![
                Filter::equal(LABEL_COL, label),
                Filter::equal(PROP_KEY_COL, key),
                Filter::range_from(PROP_VALUE_COL, ordered(from)),
            ])
            .with_limit(limit),
        )
        .hydrated()
    }

    fn endpoint_filters(vertex: &ElementId, direction: Direction) -> Vec<Filter> {
        let (column, type_column) = endpoint_columns(direction);
        vec![
            Filter::equal(column, vertex.encode()),
            Filter::equal(type_column, vertex.id_type().as_str()),
        ]
    }

    /// Edges at `vertex`, restricted to `labels` when non-empty
    pub fn edges_by_endpoint(vertex: &ElementId, direction: Direction, labels: &[String]) -> QueryPlan {
        let plan = QueryPlan::new(FilterSet::and(Self::endpoint_filters(vertex, direction)));
        if labels.is_empty() {
            plan
        } else {
            plan.with_predicate(RowPredicate::LabelIn(labels.to_vec()))
        }
    }

    pub fn edges_by_endpoint_property(
        vertex: &ElementId,
        direction: Direction,
        label: &str,
        key: &str,
        value: &PropertyValue,
    ) -> QueryPlan {
        let mut filters = Self::endpoint_filters(vertex, direction);
        filters.extend([
            Filter::equal(LABEL_COL, label),
            Filter::equal(PROP_KEY_COL, key),
            Filter::equal(PROP_VALUE_COL, exact(value)),
        ]);
        QueryPlan::new(FilterSet::and(filters)).hydrated()
    }

    pub fn edges_by_endpoint_range(
        vertex: &ElementId,
        direction: Direction,
        label: &str,
        key: &str,
        from: &PropertyValue,
        to: &PropertyValue,
    ) -> QueryPlan {
        let mut filters = Self::endpoint_filters(vertex, direction);
        filters.extend([Filter::equal(LABEL_COL, label), Filter::equal(PROP_KEY_COL, key)]);
        QueryPlan::new(FilterSet::and(filters))
            .with_predicate(RowPredicate::ValueInRange {
                from: from.clone(),
                to: to.clone(),
            })
            .hydrated()
    }

    /// Any edge with `vertex` at either end
    pub fn edge_exists_for_vertex(vertex: &ElementId) -> QueryPlan {
        QueryPlan::new(FilterSet::or(vec![
            Filter::equal(TO_COL, vertex.encode()),
            Filter::equal(FROM_COL, vertex.encode()),
        ]))
        .with_predicate(RowPredicate::TouchesVertex(vertex.clone()))
    }

    pub fn edge_by_endpoints(from: &ElementId, to: &ElementId) -> QueryPlan {
        QueryPlan::new(FilterSet::and(vec![
            Filter::equal(FROM_COL, from.encode()),
            Filter::equal(TO_COL, to.encode()),
            Filter::equal(FROM_TYPE_COL, from.id_type().as_str()),
            Filter::equal(TO_TYPE_COL, to.id_type().as_str()),
        ]))
    }
}

/// Typed ids of the distinct elements among `rows`, in order of appearance
pub fn distinct_ids(rows: &[KeyRecord]) -> Vec<ElementId> {
    let mut ids: Vec<ElementId> = Vec::new();
    for row in rows {
        let Some(id) = row_element_id(row) else {
            continue;
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use eavgraph_store::{FilterOp, Record};

    fn prop_row(prop_type: &str, value: &str) -> KeyRecord {
        KeyRecord::new(
            "k",
            Record::new()
                .with(LABEL_COL, "person")
                .with(PROP_KEY_COL, "age")
                .with(PROP_TYPE_COL, prop_type)
                .with(PROP_VALUE_COL, value),
        )
    }

    #[test]
    fn test_direction_rule() {
        assert_eq!(endpoint_columns(Direction::In).0, TO_COL);
        assert_eq!(endpoint_columns(Direction::Out).0, FROM_COL);
        assert_eq!(endpoint_columns(Direction::Both).0, FROM_COL);
    }

    #[test]
    fn test_range_numeric_vs_lexicographic() {
        let range = RowPredicate::ValueInRange {
            from: PropertyValue::Long(5),
            to: PropertyValue::Long(20),
        };
        assert!(range.matches(&prop_row("LONG", "10")));
        assert!(range.matches(&prop_row("LONG", "5")));
        assert!(!range.matches(&prop_row("LONG", "20")));
        // As strings "10" < "20" but "10" < "5"
        assert!(!range.matches(&prop_row("STRING", "10")));
    }

    #[test]
    fn test_long_range_is_exact_above_f64_precision() {
        let lower = 9_007_199_254_740_993i64; // 2^53 + 1
        let range = RowPredicate::ValueInRange {
            from: PropertyValue::Long(lower),
            to: PropertyValue::Long(lower + 1),
        };
        assert!(!range.matches(&prop_row("LONG", &(lower - 1).to_string())));
        assert!(range.matches(&prop_row("LONG", &lower.to_string())));
        assert!(!range.matches(&prop_row("LONG", &(lower + 1).to_string())));
    }

    #[test]
    fn test_label_in() {
        let predicate = RowPredicate::LabelIn(vec!["knows".to_string(), "person".to_string()]);
        assert!(predicate.matches(&prop_row("LONG", "1")));
        assert!(!RowPredicate::LabelIn(vec!["knows".to_string()]).matches(&prop_row("LONG", "1")));
    }

    #[test]
    fn test_property_plan_leads_with_label() {
        let plan = FilterBuilder::by_property("person", "name", &PropertyValue::from("Ann"));
        let leading = plan.filters.leading().unwrap();
        assert_eq!(leading.column, LABEL_COL);
        assert_eq!(plan.filters.filters.len(), 3);
        assert!(plan.hydrate);
    }

    #[test]
    fn test_limit_plan_passes_cap_to_store() {
        let plan = FilterBuilder::with_limit("person", "age", &PropertyValue::Long(18), 10);
        assert_eq!(plan.filters.limit, Some(10));
        assert_eq!(plan.filters.filters[2].op, FilterOp::RangeFromInclusive);
        assert_eq!(plan.filters.filters[2].value, FilterValue::Int(18));
        assert!(plan.predicates.is_empty());
    }

    #[test]
    fn test_exists_plan_is_disjunction() {
        let plan = FilterBuilder::edge_exists_for_vertex(&ElementId::from("v1"));
        assert_eq!(plan.filters.combinator, eavgraph_store::Combinator::Or);
        assert_eq!(plan.filters.filters[0].column, TO_COL);
        assert_eq!(plan.filters.filters[1].column, FROM_COL);
    }
}
