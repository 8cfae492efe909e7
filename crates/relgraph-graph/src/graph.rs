//! Statement execution inside one engine call.
//!
//! Every mutating entry point opens a transaction, wraps it in a
//! [`GraphTx`] and hands the outcome to [`finish`], which commits on
//! success and rolls back on failure.

use relgraph_core::Value;
use relgraph_sql::{Context, Dialect, ExecQuerier, ExecResult, Rows, Tx};

use crate::error::{with_context, GraphError};

/// Issues the statements of one engine call on a transaction.
pub(crate) struct GraphTx<'a, E: ?Sized> {
    ctx: &'a Context,
    tx: &'a mut E,
    pub dialect: Dialect,
}

impl<'a, E: ExecQuerier + ?Sized> GraphTx<'a, E> {
    pub fn new(ctx: &'a Context, tx: &'a mut E, dialect: Dialect) -> Self {
        GraphTx { ctx, tx, dialect }
    }

    /// Executes a rendered statement, wrapping failures with `context`.
    pub fn exec(
        &mut self,
        (query, args): (String, Vec<Value>),
        context: impl FnOnce() -> String,
    ) -> Result<ExecResult, GraphError> {
        self.tx
            .exec(self.ctx, &query, &args)
            .map_err(|err| GraphError::driver(context(), err))
    }

    /// Runs a rendered query, wrapping failures with `context`.
    pub fn query(
        &mut self,
        (query, args): (String, Vec<Value>),
        context: impl FnOnce() -> String,
    ) -> Result<Rows, GraphError> {
        self.tx
            .query(self.ctx, &query, &args)
            .map_err(|err| GraphError::driver(context(), err))
    }
}

/// Opens a transaction on `driver`.
pub(crate) fn begin<'d, D>(ctx: &Context, driver: &'d mut D) -> Result<Box<dyn Tx + 'd>, GraphError>
where
    D: relgraph_sql::Driver + ?Sized,
{
    driver.tx(ctx).map_err(with_context("start transaction"))
}

/// Commits `tx` when `result` is a success, rolls it back otherwise. A
/// failed rollback is reported together with the original failure.
pub(crate) fn finish<T>(tx: Box<dyn Tx + '_>, result: Result<T, GraphError>) -> Result<T, GraphError> {
    match result {
        Ok(v) => {
            tx.commit().map_err(with_context("commit"))?;
            Ok(v)
        }
        Err(err) => match tx.rollback() {
            Ok(()) => Err(err),
            Err(rollback) => Err(GraphError::Rollback {
                source: Box::new(err),
                rollback,
            }),
        },
    }
}
