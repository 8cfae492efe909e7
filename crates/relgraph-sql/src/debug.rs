//! A driver decorator that logs every statement.
//!
//! [`DebugDriver`] wraps any [`Driver`] and emits a `tracing` event under the
//! `relgraph::sql` target for each statement with its arguments, and for
//! transaction boundaries. Transactions carry a sequence number so their
//! statements can be correlated.

use relgraph_core::Value;

use crate::dialect::Dialect;
use crate::driver::{Context, Driver, ExecQuerier, ExecResult, Rows, Tx};
use crate::error::SqlError;

/// Logs statements at debug level before delegating them.
pub struct DebugDriver<D> {
    inner: D,
    tx_seq: u64,
}

impl<D: Driver> DebugDriver<D> {
    pub fn new(inner: D) -> Self {
        DebugDriver { inner, tx_seq: 0 }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: Driver> ExecQuerier for DebugDriver<D> {
    fn exec(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, SqlError> {
        tracing::debug!(target: "relgraph::sql", query, ?args, "driver.exec");
        self.inner.exec(ctx, query, args)
    }

    fn query(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, SqlError> {
        tracing::debug!(target: "relgraph::sql", query, ?args, "driver.query");
        self.inner.query(ctx, query, args)
    }
}

impl<D: Driver> Driver for DebugDriver<D> {
    fn tx<'a>(&'a mut self, ctx: &Context) -> Result<Box<dyn Tx + 'a>, SqlError> {
        self.tx_seq += 1;
        let id = self.tx_seq;
        let inner = self.inner.tx(ctx)?;
        tracing::trace!(target: "relgraph::sql", tx = id, "driver.tx: started");
        Ok(Box::new(DebugTx { id, inner }))
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }
}

struct DebugTx<'a> {
    id: u64,
    inner: Box<dyn Tx + 'a>,
}

impl ExecQuerier for DebugTx<'_> {
    fn exec(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, SqlError> {
        tracing::debug!(target: "relgraph::sql", tx = self.id, query, ?args, "tx.exec");
        self.inner.exec(ctx, query, args)
    }

    fn query(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, SqlError> {
        tracing::debug!(target: "relgraph::sql", tx = self.id, query, ?args, "tx.query");
        self.inner.query(ctx, query, args)
    }
}

impl Tx for DebugTx<'_> {
    fn commit(self: Box<Self>) -> Result<(), SqlError> {
        tracing::trace!(target: "relgraph::sql", tx = self.id, "tx.commit");
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> Result<(), SqlError> {
        tracing::trace!(target: "relgraph::sql", tx = self.id, "tx.rollback");
        self.inner.rollback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Event, MockDriver};

    #[test]
    fn delegates_to_inner_driver() {
        let mut d = DebugDriver::new(MockDriver::new(Dialect::Postgres));
        let ctx = Context::background();
        assert_eq!(d.dialect(), Dialect::Postgres);
        {
            let mut tx = d.tx(&ctx).unwrap();
            tx.exec(&ctx, "DELETE FROM \"users\"", &[]).unwrap();
            tx.commit().unwrap();
        }
        assert_eq!(
            d.inner().events(),
            &[
                Event::Begin,
                Event::Exec {
                    query: "DELETE FROM \"users\"".to_string(),
                    args: vec![],
                },
                Event::Commit,
            ]
        );
    }
}
