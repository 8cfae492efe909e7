//! SQL dialects and their quoting rules.

use std::fmt;
use std::str::FromStr;

use crate::error::SqlError;

/// A supported SQL dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySQL,
    #[default]
    SQLite,
    Postgres,
}

impl Dialect {
    /// Quotes a single identifier.
    pub fn quote(self, ident: &str) -> String {
        match self {
            Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::MySQL | Dialect::SQLite => format!("`{}`", ident.replace('`', "``")),
        }
    }

    /// Quotes a possibly qualified identifier (`schema.table.column`), part
    /// by part. `*` and expressions containing parentheses or spaces are
    /// returned unchanged.
    pub fn quote_ident(self, ident: &str) -> String {
        if ident == "*" || ident.contains('(') || ident.contains(' ') {
            return ident.to_string();
        }
        ident
            .split('.')
            .map(|part| if part == "*" { part.to_string() } else { self.quote(part) })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Returns the placeholder for the `n`th argument (1-based).
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${n}"),
            Dialect::MySQL | Dialect::SQLite => "?".to_string(),
        }
    }

    /// Reports whether INSERT statements may carry a `RETURNING` clause.
    pub fn supports_returning(self) -> bool {
        !matches!(self, Dialect::MySQL)
    }

    /// Returns the dialect name.
    pub fn name(self) -> &'static str {
        match self {
            Dialect::MySQL => "mysql",
            Dialect::SQLite => "sqlite3",
            Dialect::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = SqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql" => Ok(Dialect::MySQL),
            "sqlite3" | "sqlite" => Ok(Dialect::SQLite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(SqlError::Build(format!("unsupported dialect: {other:?}"))),
        }
    }
}
