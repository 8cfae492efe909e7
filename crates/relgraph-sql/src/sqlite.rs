//! SQLite implementation of [`Driver`].
//!
//! [`SqliteDriver`] owns one rusqlite [`Connection`] opened in WAL mode.
//! Statements go through the connection's prepared statement cache and
//! arguments are bound positionally. Booleans are stored as integers, JSON
//! and UUID values as TEXT.

use rusqlite::types::{ToSqlOutput, Type, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql, Transaction};

use relgraph_core::Value;

use crate::config::SqliteConfig;
use crate::dialect::Dialect;
use crate::driver::{Context, Driver, ExecQuerier, ExecResult, Rows, Tx};
use crate::error::SqlError;

/// SQLite-backed implementation of [`Driver`].
pub struct SqliteDriver {
    conn: Connection,
}

impl SqliteDriver {
    /// Opens (or creates) the database described by `config`.
    pub fn open(config: &SqliteConfig) -> Result<Self, SqlError> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.path)?
        };
        configure(&conn, config)?;
        tracing::info!(path = %config.path, "opened sqlite database");
        Ok(SqliteDriver { conn })
    }

    /// Opens (or creates) a database at `path` with the default settings.
    pub fn new(path: &str) -> Result<Self, SqlError> {
        Self::open(&SqliteConfig {
            path: path.to_string(),
            ..SqliteConfig::default()
        })
    }

    /// Opens an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, SqlError> {
        Self::open(&SqliteConfig::in_memory())
    }

    /// Returns the underlying connection, e.g. to run DDL.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Applies the connection pragmas.
fn configure(conn: &Connection, config: &SqliteConfig) -> Result<(), SqlError> {
    conn.busy_timeout(config.busy_timeout)?;
    if !config.is_in_memory() {
        conn.pragma_update(None, "journal_mode", "WAL")?;
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", if config.foreign_keys { "ON" } else { "OFF" })?;
    Ok(())
}

impl ExecQuerier for SqliteDriver {
    fn exec(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, SqlError> {
        exec(&self.conn, ctx, query, args)
    }

    fn query(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, SqlError> {
        select(&self.conn, ctx, query, args)
    }
}

impl Driver for SqliteDriver {
    fn tx<'a>(&'a mut self, ctx: &Context) -> Result<Box<dyn Tx + 'a>, SqlError> {
        ctx.err()?;
        let tx = self.conn.transaction()?;
        Ok(Box::new(SqliteTx { tx }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::SQLite
    }
}

/// A transaction on a [`SqliteDriver`]. Rolled back on drop unless
/// committed.
pub struct SqliteTx<'a> {
    tx: Transaction<'a>,
}

impl ExecQuerier for SqliteTx<'_> {
    fn exec(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, SqlError> {
        exec(&self.tx, ctx, query, args)
    }

    fn query(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, SqlError> {
        select(&self.tx, ctx, query, args)
    }
}

impl Tx for SqliteTx<'_> {
    fn commit(self: Box<Self>) -> Result<(), SqlError> {
        self.tx.commit()?;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), SqlError> {
        self.tx.rollback()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Statement execution
// ---------------------------------------------------------------------------

fn exec(conn: &Connection, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, SqlError> {
    ctx.err()?;
    let mut stmt = conn.prepare_cached(query)?;
    let affected = stmt.execute(params_from_iter(args.iter().map(SqlArg)))?;
    Ok(ExecResult {
        rows_affected: affected as u64,
        last_insert_id: Some(conn.last_insert_rowid()),
    })
}

fn select(conn: &Connection, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, SqlError> {
    ctx.err()?;
    let mut stmt = conn.prepare_cached(query)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let mut rows = stmt.query(params_from_iter(args.iter().map(SqlArg)))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(from_value_ref(row.get_ref(i)?, i)?);
        }
        out.push(values);
    }
    Ok(Rows { columns, rows: out })
}

/// Binds a [`Value`] as a SQLite parameter.
struct SqlArg<'a>(&'a Value);

impl ToSql for SqlArg<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sqlite;
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(Sqlite::Null),
            Value::Bool(b) => ToSqlOutput::Owned(Sqlite::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(Sqlite::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(Sqlite::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Json(j) => ToSqlOutput::Owned(Sqlite::Text(j.to_string())),
            Value::Uuid(u) => ToSqlOutput::Owned(Sqlite::Text(u.to_string())),
        })
    }
}

/// Converts the cell at column `idx`. TEXT that is not valid UTF-8 is an
/// error.
fn from_value_ref(v: ValueRef<'_>, idx: usize) -> Result<Value, SqlError> {
    Ok(match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(_) => {
            let s = v
                .as_str()
                .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))?;
            Value::Text(s.to_string())
        }
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    })
}
