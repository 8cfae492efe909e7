//! Core error types for relgraph-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! value conversion and JSON marshalling.

use thiserror::Error;

/// Errors produced by the relgraph-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A value could not be converted to the requested Rust type.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },

    /// JSON serialization or deserialization failed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
