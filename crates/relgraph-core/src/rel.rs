//! Relation kinds between node types.
//!
//! Every edge in the graph resolves to exactly one [`Rel`] before the
//! execution engine runs. The kind decides where the edge lives:
//!
//! - [`Rel::M2O`], and [`Rel::O2O`] when inverse or bidirectional, keep the
//!   foreign key on the node's own row.
//! - [`Rel::O2M`], and non-inverse [`Rel::O2O`], keep the foreign key in the
//!   other table.
//! - [`Rel::M2M`] keeps pairs of keys in a join table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Edge relation type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rel {
    /// Unresolved placeholder. The engine rejects edges of this kind.
    #[default]
    Unknown,
    /// One to one, or "has one".
    O2O,
    /// One to many, or "has many".
    O2M,
    /// Many to one. The inverse perspective of [`Rel::O2M`].
    M2O,
    /// Many to many, backed by a join table.
    M2M,
}

impl Rel {
    /// Returns the number of edge columns this relation kind requires:
    /// two join-table columns for M2M, one foreign key otherwise.
    /// Returns `None` for [`Rel::Unknown`].
    pub fn column_count(self) -> Option<usize> {
        match self {
            Rel::M2M => Some(2),
            Rel::O2O | Rel::O2M | Rel::M2O => Some(1),
            Rel::Unknown => None,
        }
    }
}

impl fmt::Display for Rel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rel::O2O => "O2O",
            Rel::O2M => "O2M",
            Rel::M2O => "M2O",
            Rel::M2M => "M2M",
            Rel::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names() {
        assert_eq!(Rel::O2O.to_string(), "O2O");
        assert_eq!(Rel::O2M.to_string(), "O2M");
        assert_eq!(Rel::M2O.to_string(), "M2O");
        assert_eq!(Rel::M2M.to_string(), "M2M");
        assert_eq!(Rel::Unknown.to_string(), "Unknown");
        assert_eq!(Rel::default(), Rel::Unknown);
    }

    #[test]
    fn column_counts_by_kind() {
        assert_eq!(Rel::M2M.column_count(), Some(2));
        assert_eq!(Rel::O2M.column_count(), Some(1));
        assert_eq!(Rel::M2O.column_count(), Some(1));
        assert_eq!(Rel::O2O.column_count(), Some(1));
        assert_eq!(Rel::Unknown.column_count(), None);
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&Rel::M2O).unwrap();
        assert_eq!(json, "\"M2O\"");
        let back: Rel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Rel::M2O);
    }
}
