//! Connection settings for the SQLite driver.
//!
//! Settings come from the environment, with defaults for anything unset:
//!
//! - `RELGRAPH_DB_PATH`: database file, `relgraph.db` by default;
//!   `:memory:` opens an in-memory database
//! - `RELGRAPH_BUSY_TIMEOUT_MS`: busy timeout in milliseconds, 5000
//! - `RELGRAPH_FOREIGN_KEYS`: `0`/`off`/`false` disables foreign key
//!   enforcement

use std::time::Duration;

use crate::error::SqlError;

pub const DB_PATH_VAR: &str = "RELGRAPH_DB_PATH";
pub const BUSY_TIMEOUT_VAR: &str = "RELGRAPH_BUSY_TIMEOUT_MS";
pub const FOREIGN_KEYS_VAR: &str = "RELGRAPH_FOREIGN_KEYS";

pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    pub path: String,
    pub busy_timeout: Duration,
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        SqliteConfig {
            path: "relgraph.db".to_string(),
            busy_timeout: Duration::from_millis(5000),
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    /// An in-memory database with the default settings.
    pub fn in_memory() -> Self {
        SqliteConfig {
            path: IN_MEMORY.to_string(),
            ..SqliteConfig::default()
        }
    }

    /// Reads the settings from the process environment.
    pub fn from_env() -> Result<Self, SqlError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SqlError> {
        let mut config = SqliteConfig::default();
        if let Some(path) = lookup(DB_PATH_VAR) {
            config.path = path;
        }
        if let Some(ms) = lookup(BUSY_TIMEOUT_VAR) {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                SqlError::Build(format!("{BUSY_TIMEOUT_VAR} must be milliseconds, got {ms:?}"))
            })?;
            config.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(fk) = lookup(FOREIGN_KEYS_VAR) {
            config.foreign_keys = !matches!(
                fk.trim().to_ascii_lowercase().as_str(),
                "0" | "off" | "false" | "no"
            );
        }
        Ok(config)
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY
    }
}
