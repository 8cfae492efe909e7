//! Semantic field type tags.
//!
//! A [`FieldType`] does not change how most values are bound: the only tag
//! with storage behavior is [`FieldType::Json`], whose values are marshalled
//! to JSON text before they reach the driver. [`FieldType::numeric`] decides
//! whether a generated identifier can be read back as an integer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The semantic type of a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[default]
    Other,
    Bool,
    Time,
    Json,
    Uuid,
    Bytes,
    Enum,
    String,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

impl FieldType {
    /// Returns `true` for the integer and floating point tags.
    pub fn numeric(self) -> bool {
        matches!(
            self,
            FieldType::Int
                | FieldType::Int8
                | FieldType::Int16
                | FieldType::Int32
                | FieldType::Int64
                | FieldType::Uint
                | FieldType::Uint8
                | FieldType::Uint16
                | FieldType::Uint32
                | FieldType::Uint64
                | FieldType::Float32
                | FieldType::Float64
        )
    }

    /// Returns `true` for the tags whose values are stored as JSON text.
    pub fn is_json(self) -> bool {
        self == FieldType::Json
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::Other => "other",
            FieldType::Bool => "bool",
            FieldType::Time => "time",
            FieldType::Json => "json",
            FieldType::Uuid => "uuid",
            FieldType::Bytes => "bytes",
            FieldType::Enum => "enum",
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Int8 => "int8",
            FieldType::Int16 => "int16",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Uint => "uint",
            FieldType::Uint8 => "uint8",
            FieldType::Uint16 => "uint16",
            FieldType::Uint32 => "uint32",
            FieldType::Uint64 => "uint64",
            FieldType::Float32 => "float32",
            FieldType::Float64 => "float64",
        };
        f.write_str(s)
    }
}
