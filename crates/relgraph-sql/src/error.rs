//! Error types for relgraph-sql.
//!
//! [`SqlError`] covers statement building, driver failures and context
//! cancellation. [`SqlError::constraint_kind`] classifies driver failures
//! that were caused by a violated database constraint.

use thiserror::Error;

/// Errors produced by the statement builders and drivers.
#[derive(Debug, Error)]
pub enum SqlError {
    /// The underlying SQLite call failed.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A driver without a structured error type reported a failure.
    #[error("{0}")]
    Driver(String),

    /// The statement could not be built.
    #[error("build statement: {0}")]
    Build(String),

    /// The context was canceled before the call.
    #[error("context canceled")]
    Canceled,

    /// The context deadline passed before the call.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The result set did not have the expected shape.
    #[error("unexpected result: {0}")]
    Mismatch(String),
}

/// The kind of database constraint a failure violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    Check,
}

const FOREIGN_KEY_FRAGMENTS: &[&str] = &[
    "Error 1451",                      // MySQL (cannot delete or update a parent row)
    "Error 1452",                      // MySQL (cannot add or update a child row)
    "violates foreign key constraint", // Postgres
    "FOREIGN KEY constraint failed",   // SQLite
];

const UNIQUE_FRAGMENTS: &[&str] = &[
    "Error 1062",                 // MySQL
    "violates unique constraint", // Postgres
    "UNIQUE constraint failed",   // SQLite
];

const CHECK_FRAGMENTS: &[&str] = &[
    "Error 3819",                // MySQL
    "violates check constraint", // Postgres
    "CHECK constraint failed",   // SQLite
];

/// Classifies a driver error message by the known per-dialect fragments.
pub fn classify_message(msg: &str) -> Option<ConstraintKind> {
    let has = |fragments: &[&str]| fragments.iter().any(|f| msg.contains(f));
    if has(FOREIGN_KEY_FRAGMENTS) {
        Some(ConstraintKind::ForeignKey)
    } else if has(UNIQUE_FRAGMENTS) {
        Some(ConstraintKind::Unique)
    } else if has(CHECK_FRAGMENTS) {
        Some(ConstraintKind::Check)
    } else {
        None
    }
}

impl SqlError {
    /// Returns the constraint this failure violated, if any. Structured
    /// SQLite extended codes are checked first, the message text second.
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        if let SqlError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) = self {
            match e.extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return Some(ConstraintKind::Unique)
                }
                rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return Some(ConstraintKind::ForeignKey)
                }
                rusqlite::ffi::SQLITE_CONSTRAINT_CHECK => return Some(ConstraintKind::Check),
                _ => {}
            }
        }
        match self {
            SqlError::Canceled | SqlError::DeadlineExceeded => None,
            other => classify_message(&other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_messages() {
        let unique = "Error 1062: Duplicate entry 'user@example.com' for key 'email'";
        assert_eq!(classify_message(unique), Some(ConstraintKind::Unique));
        let fk = "Error 1452: Cannot add or update a child row: a foreign key constraint fails";
        assert_eq!(classify_message(fk), Some(ConstraintKind::ForeignKey));
        let parent = "Error 1451: Cannot delete or update a parent row";
        assert_eq!(classify_message(parent), Some(ConstraintKind::ForeignKey));
        let check = "Error 3819: Check constraint 'users_chk_1' is violated.";
        assert_eq!(classify_message(check), Some(ConstraintKind::Check));
    }

    #[test]
    fn postgres_messages() {
        let unique = "pq: duplicate key value violates unique constraint \"users_email_key\"";
        assert_eq!(classify_message(unique), Some(ConstraintKind::Unique));
        let fk = "insert or update on table \"pets\" violates foreign key constraint \"pets_owner\"";
        assert_eq!(classify_message(fk), Some(ConstraintKind::ForeignKey));
        let check = "new row for relation \"users\" violates check constraint \"age_check\"";
        assert_eq!(classify_message(check), Some(ConstraintKind::Check));
    }

    #[test]
    fn sqlite_messages() {
        assert_eq!(
            classify_message("UNIQUE constraint failed: users.email"),
            Some(ConstraintKind::Unique)
        );
        assert_eq!(
            classify_message("FOREIGN KEY constraint failed"),
            Some(ConstraintKind::ForeignKey)
        );
        assert_eq!(
            classify_message("CHECK constraint failed: age > 0"),
            Some(ConstraintKind::Check)
        );
    }

    #[test]
    fn unrelated_messages() {
        assert_eq!(classify_message("connection refused"), None);
        assert_eq!(classify_message("syntax error near SELECT"), None);
        assert_eq!(SqlError::Canceled.constraint_kind(), None);
    }

    #[test]
    fn driver_error_text_is_classified() {
        let err = SqlError::Driver("UNIQUE constraint failed: users.name".into());
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
    }
}
