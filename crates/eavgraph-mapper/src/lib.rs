//! eavgraph Mapper - EAV row mapping for graph tables
//!
//! Maps vertices and edges onto flat key-value rows:
//! - Row codec: decompose elements into rows and recompose them
//! - Filter builder: store filter sets plus client-side predicates
//! - Query translator: one query variant per access pattern
//! - Mutation batch executor: put, delete, increment and batches
//!
//! Author: hephaex@gmail.com

pub mod builder;
pub mod codec;
pub mod mutate;
pub mod query;
pub mod table;

pub use builder::{FilterBuilder, QueryPlan, RowPredicate};
pub use codec::{decompose, recompose, Column, ElementHeader, ElementResult, UpdatePlan};
pub use mutate::{
    DeleteRequest, IncrementRequest, Mutation, MutationOutcome, PutRequest, Target,
};
pub use query::Query;
pub use table::Table;
