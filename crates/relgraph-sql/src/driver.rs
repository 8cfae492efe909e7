//! The driver capability consumed by the graph engine.
//!
//! Drivers are synchronous (not async): every call blocks until the
//! backend answers. A [`Context`] travels with each call and carries the
//! caller's cancellation flag and deadline; drivers check it before
//! issuing a statement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use relgraph_core::Value;

use crate::dialect::Dialect;
use crate::error::SqlError;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Cancellation and deadline for one logical operation. Clones share the
/// cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct Context {
    canceled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never canceled and has no deadline.
    pub fn background() -> Self {
        Context::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Context {
            canceled: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Context {
            canceled: Arc::default(),
            deadline: Some(deadline),
        }
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the reason the context is done, if it is.
    pub fn err(&self) -> Result<(), SqlError> {
        if self.canceled.load(Ordering::SeqCst) {
            return Err(SqlError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(SqlError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of an executed statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Id of the last inserted row, for drivers that report one.
    pub last_insert_id: Option<i64>,
}

/// A fully materialized result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn new<S: AsRef<str>>(columns: &[S], rows: Vec<Vec<Value>>) -> Self {
        Rows {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns the first column of the single row as an integer, the shape
    /// of COUNT and EXISTS queries.
    pub fn scalar_i64(&self) -> Result<i64, SqlError> {
        match self.rows.as_slice() {
            [row] => row
                .first()
                .and_then(Value::as_i64)
                .ok_or_else(|| SqlError::Mismatch(format!("expected an integer, got {row:?}"))),
            rows => Err(SqlError::Mismatch(format!(
                "expected exactly 1 row, got {}",
                rows.len()
            ))),
        }
    }

    /// Returns the first column of every row.
    pub fn first_column(&self) -> Vec<Value> {
        self.rows
            .iter()
            .filter_map(|row| row.first().cloned())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Executes statements and queries.
pub trait ExecQuerier {
    /// Executes a statement that returns no rows.
    fn exec(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, SqlError>;

    /// Executes a statement that returns rows.
    fn query(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, SqlError>;
}

/// A transaction. Dropping it without committing rolls it back.
pub trait Tx: ExecQuerier {
    fn commit(self: Box<Self>) -> Result<(), SqlError>;
    fn rollback(self: Box<Self>) -> Result<(), SqlError>;
}

/// A database connection that can open transactions.
pub trait Driver: ExecQuerier {
    /// Opens a transaction that borrows the driver until it ends.
    fn tx<'a>(&'a mut self, ctx: &Context) -> Result<Box<dyn Tx + 'a>, SqlError>;

    fn dialect(&self) -> Dialect;
}

impl<E: ExecQuerier + ?Sized> ExecQuerier for &mut E {
    fn exec(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, SqlError> {
        (**self).exec(ctx, query, args)
    }

    fn query(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, SqlError> {
        (**self).query(ctx, query, args)
    }
}

impl<D: Driver + ?Sized> Driver for &mut D {
    fn tx<'a>(&'a mut self, ctx: &Context) -> Result<Box<dyn Tx + 'a>, SqlError> {
        (**self).tx(ctx)
    }

    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_context_is_shared_by_clones() {
        let ctx = Context::background();
        let clone = ctx.clone();
        assert!(ctx.err().is_ok());
        clone.cancel();
        assert!(matches!(ctx.err(), Err(SqlError::Canceled)));
    }

    #[test]
    fn expired_deadline() {
        let ctx = Context::with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(matches!(ctx.err(), Err(SqlError::DeadlineExceeded)));
        let ctx = Context::with_timeout(Duration::from_secs(60));
        assert!(ctx.err().is_ok());
    }

    #[test]
    fn scalar_shapes() {
        let rows = Rows::new(&["count"], vec![vec![Value::from(3)]]);
        assert_eq!(rows.scalar_i64().unwrap(), 3);
        let empty = Rows::new(&["count"], vec![]);
        assert!(matches!(empty.scalar_i64(), Err(SqlError::Mismatch(_))));
    }
}
