//! SQL statement building and drivers for relgraph.
//!
//! Statements are built as small trees and rendered once per dialect, so
//! identifiers are quoted and placeholders numbered consistently. Drivers
//! execute the rendered text with positional arguments.
//!
//! # Modules
//!
//! - [`dialect`]: MySQL, SQLite and Postgres quoting rules
//! - [`builder`]: the shared statement writer and comparison operators
//! - [`predicate`]: WHERE clause trees
//! - [`select`]: SELECT statements, tables and joins
//! - [`mutation`]: INSERT, UPDATE and DELETE builders
//! - [`driver`]: the Driver/Tx capability traits and the call Context
//! - [`sqlite`]: rusqlite-backed driver
//! - [`config`]: environment driven SQLite settings
//! - [`debug`]: statement logging decorator
//! - [`mock`]: scripted driver for statement-level tests
//! - [`error`]: SqlError enum and constraint classification

pub mod builder;
pub mod config;
pub mod debug;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod mock;
pub mod mutation;
pub mod predicate;
pub mod select;
pub mod sqlite;

// Re-export key types for ergonomic use.
pub use builder::Op;
pub use config::SqliteConfig;
pub use debug::DebugDriver;
pub use dialect::Dialect;
pub use driver::{Context, Driver, ExecQuerier, ExecResult, Rows, Tx};
pub use error::{ConstraintKind, SqlError};
pub use mock::MockDriver;
pub use mutation::{ConflictAction, DeleteBuilder, InsertBuilder, OnConflict, UpdateBuilder};
pub use predicate::Predicate;
pub use select::{Selector, Table, TableView, MAX_LIMIT};
pub use sqlite::SqliteDriver;
