//! Error types for relgraph-graph.
//!
//! [`GraphError`] is returned by every entry point. Driver failures caused by
//! a violated database constraint surface as [`GraphError::Constraint`] so
//! callers can tell them apart from other failures with the `is_*` helpers.

use std::fmt;

use relgraph_core::{CoreError, Value};
use relgraph_sql::SqlError;
use thiserror::Error;

/// The constraint a mutation violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    Check,
    /// The target of an FK edge is already linked to another node.
    Linked,
}

impl From<relgraph_sql::ConstraintKind> for ConstraintKind {
    fn from(kind: relgraph_sql::ConstraintKind) -> Self {
        match kind {
            relgraph_sql::ConstraintKind::Unique => ConstraintKind::Unique,
            relgraph_sql::ConstraintKind::ForeignKey => ConstraintKind::ForeignKey,
            relgraph_sql::ConstraintKind::Check => ConstraintKind::Check,
        }
    }
}

/// A mutation violated a constraint.
#[derive(Debug, Error)]
#[error("{msg}")]
pub struct ConstraintError {
    pub kind: ConstraintKind,
    pub msg: String,
    #[source]
    pub source: Option<SqlError>,
}

impl ConstraintError {
    pub(crate) fn linked(msg: String) -> Self {
        ConstraintError {
            kind: ConstraintKind::Linked,
            msg,
            source: None,
        }
    }
}

/// The node an update targeted does not exist.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct NotFoundError {
    pub table: String,
    pub id: Vec<Value>,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id.as_slice() {
            [id] => write!(f, "record with id {id} not found in table {}", self.table),
            ids => write!(
                f,
                "record with id {} not found in table {}",
                relgraph_core::value::display_list(ids),
                self.table
            ),
        }
    }
}

/// Errors produced by the graph engine.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A constraint was violated.
    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    /// The updated node does not exist.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// The spec is malformed.
    #[error("{0}")]
    Invalid(String),

    /// The entql expression could not be evaluated.
    #[error("entql: {0}")]
    Eval(String),

    /// A driver call failed.
    #[error("{context}: {source}")]
    Driver {
        context: String,
        #[source]
        source: SqlError,
    },

    /// A field value could not be marshalled for storage.
    #[error("marshal value for column {column}: {source}")]
    Marshal {
        column: String,
        #[source]
        source: CoreError,
    },

    /// The operation failed and rolling back its transaction failed too.
    #[error("{source}: rollback: {rollback}")]
    Rollback {
        #[source]
        source: Box<GraphError>,
        rollback: SqlError,
    },

    /// A caller callback rejected a row.
    #[error("assign: {0}")]
    Assign(String),
}

impl GraphError {
    /// Wraps a driver failure, classifying constraint violations.
    pub(crate) fn driver(context: impl Into<String>, source: SqlError) -> Self {
        let context = context.into();
        match source.constraint_kind() {
            Some(kind) => GraphError::Constraint(ConstraintError {
                kind: kind.into(),
                msg: format!("{context}: {source}"),
                source: Some(source),
            }),
            None => GraphError::Driver { context, source },
        }
    }

    /// Returns the violated constraint, looking through rollback failures.
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            GraphError::Constraint(e) => Some(e.kind),
            GraphError::Rollback { source, .. } => source.constraint_kind(),
            _ => None,
        }
    }

    /// Reports whether the error is a [`NotFoundError`], looking through
    /// rollback failures.
    pub fn is_not_found(&self) -> bool {
        match self {
            GraphError::NotFound(_) => true,
            GraphError::Rollback { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Returns a closure that wraps driver failures with `context`.
pub(crate) fn with_context(context: impl Into<String>) -> impl FnOnce(SqlError) -> GraphError {
    let context = context.into();
    move |err| GraphError::driver(context, err)
}

/// Reports whether `err` is a constraint violation of any kind.
pub fn is_constraint_error(err: &GraphError) -> bool {
    err.constraint_kind().is_some()
}

pub fn is_unique_constraint_error(err: &GraphError) -> bool {
    err.constraint_kind() == Some(ConstraintKind::Unique)
}

pub fn is_foreign_key_constraint_error(err: &GraphError) -> bool {
    err.constraint_kind() == Some(ConstraintKind::ForeignKey)
}

pub fn is_check_constraint_error(err: &GraphError) -> bool {
    err.constraint_kind() == Some(ConstraintKind::Check)
}
