//! Graph operations over relational storage.
//!
//! Nodes are rows of a table and edges are either a foreign-key column
//! (O2O, O2M, M2O) or a row of a join table (M2M). The entry points take a
//! declarative spec, compile it into dialect-aware SQL with relgraph-sql,
//! and run it through a [`relgraph_sql::Driver`]. Every mutating entry point
//! runs in a single transaction that is rolled back on the first error.
//!
//! # Modules
//!
//! - [`spec`]: field, edge, node and operation specs
//! - [`create`]: single and batch node creation
//! - [`update`]: single-node and predicate-based updates
//! - [`delete`]: predicate-based deletion
//! - [`query`]: node, count and edge queries
//! - [`step`]: traversal steps and neighbor selectors
//! - [`entql`]: predicate evaluation against a graph schema
//! - [`error`]: GraphError and constraint classification

pub mod create;
pub mod delete;
mod edges;
pub mod entql;
pub mod error;
mod graph;
pub mod query;
pub mod spec;
pub mod step;
pub mod update;

pub use create::{batch_create, create_node};
pub use delete::delete_nodes;
pub use entql::{wrap_func, Edge, Node, Schema, SelectorFunc};
pub use error::{
    is_check_constraint_error, is_constraint_error, is_foreign_key_constraint_error,
    is_unique_constraint_error, ConstraintError, ConstraintKind, GraphError, NotFoundError,
};
pub use query::{count_nodes, query_edges, query_nodes};
pub use spec::{
    BatchCreateSpec, CreateSpec, DeleteSpec, EdgeQuerySpec, EdgeSpec, EdgeTarget, FieldSpec,
    NodeSpec, QuerySpec, UpdateSpec,
};
pub use step::{has_neighbors, has_neighbors_with, neighbors, set_neighbors, Step, Vertex};
pub use update::{update_node, update_nodes};
