//! Core data model shared by the relgraph crates.
//!
//! # Modules
//!
//! - [`rel`]: relation kinds (O2O, O2M, M2O, M2M)
//! - [`field`]: semantic field type tags
//! - [`value`]: driver-level values and conversions
//! - [`entql`]: the storage-independent predicate expression tree
//! - [`error`]: CoreError enum

pub mod entql;
pub mod error;
pub mod field;
pub mod rel;
pub mod value;

// Re-export commonly used types
pub use error::CoreError;
pub use field::FieldType;
pub use rel::Rel;
pub use value::Value;
