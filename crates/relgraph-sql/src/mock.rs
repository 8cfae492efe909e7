//! A scripted in-memory driver for statement-level tests.
//!
//! [`MockDriver`] records every statement it receives as an [`Event`] and
//! answers from two queues of scripted results, one for `exec` and one for
//! `query`. An empty queue answers with zero affected rows or an empty
//! result set.

use std::collections::VecDeque;

use relgraph_core::Value;

use crate::dialect::Dialect;
use crate::driver::{Context, Driver, ExecQuerier, ExecResult, Rows, Tx};
use crate::error::SqlError;

/// A call observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Begin,
    Exec { query: String, args: Vec<Value> },
    Query { query: String, args: Vec<Value> },
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
pub struct MockDriver {
    dialect: Dialect,
    events: Vec<Event>,
    execs: VecDeque<Result<ExecResult, String>>,
    queries: VecDeque<Result<Rows, String>>,
    rollback_err: Option<String>,
}

impl MockDriver {
    pub fn new(dialect: Dialect) -> Self {
        MockDriver {
            dialect,
            ..MockDriver::default()
        }
    }

    /// Scripts the result of the next unanswered `exec`.
    pub fn expect_exec(&mut self, result: ExecResult) -> &mut Self {
        self.execs.push_back(Ok(result));
        self
    }

    /// Scripts `exec` results that affect `n` rows.
    pub fn expect_affected(&mut self, n: u64) -> &mut Self {
        self.expect_exec(ExecResult {
            rows_affected: n,
            last_insert_id: None,
        })
    }

    /// Scripts the result of the next unanswered `query`.
    pub fn expect_query(&mut self, rows: Rows) -> &mut Self {
        self.queries.push_back(Ok(rows));
        self
    }

    /// Scripts a failure of the next unanswered `exec`.
    pub fn fail_exec(&mut self, msg: &str) -> &mut Self {
        self.execs.push_back(Err(msg.to_string()));
        self
    }

    /// Scripts a failure of the next unanswered `query`.
    pub fn fail_query(&mut self, msg: &str) -> &mut Self {
        self.queries.push_back(Err(msg.to_string()));
        self
    }

    /// Makes the next rollback fail with `msg`.
    pub fn fail_rollback(&mut self, msg: &str) -> &mut Self {
        self.rollback_err = Some(msg.to_string());
        self
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Returns the text of every executed or queried statement, in order.
    pub fn statements(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Exec { query, .. } | Event::Query { query, .. } => Some(query.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Reports whether every scripted result was consumed.
    pub fn is_drained(&self) -> bool {
        self.execs.is_empty() && self.queries.is_empty()
    }

    fn record_exec(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, SqlError> {
        ctx.err()?;
        self.events.push(Event::Exec {
            query: query.to_string(),
            args: args.to_vec(),
        });
        match self.execs.pop_front() {
            Some(result) => result.map_err(SqlError::Driver),
            None => Ok(ExecResult::default()),
        }
    }

    fn record_query(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, SqlError> {
        ctx.err()?;
        self.events.push(Event::Query {
            query: query.to_string(),
            args: args.to_vec(),
        });
        match self.queries.pop_front() {
            Some(result) => result.map_err(SqlError::Driver),
            None => Ok(Rows::default()),
        }
    }
}

impl ExecQuerier for MockDriver {
    fn exec(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, SqlError> {
        self.record_exec(ctx, query, args)
    }

    fn query(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, SqlError> {
        self.record_query(ctx, query, args)
    }
}

impl Driver for MockDriver {
    fn tx<'a>(&'a mut self, ctx: &Context) -> Result<Box<dyn Tx + 'a>, SqlError> {
        ctx.err()?;
        self.events.push(Event::Begin);
        Ok(Box::new(MockTx { driver: self }))
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }
}

struct MockTx<'a> {
    driver: &'a mut MockDriver,
}

impl ExecQuerier for MockTx<'_> {
    fn exec(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, SqlError> {
        self.driver.record_exec(ctx, query, args)
    }

    fn query(&mut self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, SqlError> {
        self.driver.record_query(ctx, query, args)
    }
}

impl Tx for MockTx<'_> {
    fn commit(self: Box<Self>) -> Result<(), SqlError> {
        self.driver.events.push(Event::Commit);
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), SqlError> {
        self.driver.events.push(Event::Rollback);
        match self.driver.rollback_err.take() {
            Some(msg) => Err(SqlError::Driver(msg)),
            None => Ok(()),
        }
    }
}
