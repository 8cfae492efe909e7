//! Node and edge queries.
//!
//! Queries run directly on the driver, outside a transaction. Rows are
//! passed to the spec's `assign` callback in the order they are read.

use relgraph_sql::{Context, Dialect, Driver, Selector, Table, MAX_LIMIT};

use crate::error::{with_context, GraphError};
use crate::spec::{EdgeQuerySpec, QuerySpec};

impl QuerySpec<'_> {
    /// Builds the SELECT of the query: columns, predicate, order, paging,
    /// DISTINCT, then the modifiers.
    pub fn selector(&self, dialect: Dialect) -> Selector {
        let mut selector = match &self.from {
            Some(from) => from.clone(),
            None => Selector::from_table(dialect, self.node.table_ref()),
        };
        let columns = selector.columns(&self.node.columns);
        selector.select(&columns);
        if let Some(pred) = &self.predicate {
            pred(&mut selector);
        }
        if let Some(order) = &self.order {
            order(&mut selector);
        }
        if let Some(offset) = self.offset {
            // An OFFSET needs a LIMIT on MySQL and SQLite.
            selector.offset(to_i64(offset)).limit(MAX_LIMIT);
        }
        if let Some(limit) = self.limit {
            selector.limit(to_i64(limit));
        }
        if self.unique {
            selector.distinct(true);
        }
        for modify in &self.modifiers {
            modify(&mut selector);
        }
        selector
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(MAX_LIMIT)
}

/// Selects the nodes described by `spec` and passes each row to
/// `spec.assign`.
pub fn query_nodes<D>(ctx: &Context, driver: &mut D, spec: &mut QuerySpec<'_>) -> Result<(), GraphError>
where
    D: Driver + ?Sized,
{
    tracing::debug!(table = %spec.node.table, limit = ?spec.limit, offset = ?spec.offset, "query nodes");
    let (query, args) = spec.selector(driver.dialect()).query();
    let rows = driver
        .query(ctx, &query, &args)
        .map_err(with_context(format!("query nodes of table {:?}", spec.node.table)))?;
    if let Some(assign) = spec.assign.as_mut() {
        for row in &rows.rows {
            assign(rows.columns.as_slice(), row.as_slice())?;
        }
    }
    Ok(())
}

/// Counts the nodes described by `spec`: the listed columns, or the id
/// column, `COUNT(DISTINCT ..)` when `spec.unique` is set.
pub fn count_nodes<D>(ctx: &Context, driver: &mut D, spec: &QuerySpec<'_>) -> Result<i64, GraphError>
where
    D: Driver + ?Sized,
{
    tracing::debug!(table = %spec.node.table, "count nodes");
    let mut selector = spec.selector(driver.dialect());
    selector.clear_order();
    let columns = if spec.node.columns.is_empty() {
        vec![selector.c(spec.node.id_column())]
    } else {
        selector.columns(&spec.node.columns)
    };
    selector.count(&columns, spec.unique);
    let (query, args) = selector.query();
    let context = format!("count nodes of table {:?}", spec.node.table);
    driver
        .query(ctx, &query, &args)
        .and_then(|rows| rows.scalar_i64())
        .map_err(with_context(context))
}

/// Selects the `(out, in)` pairs of an edge table and passes each to
/// `spec.assign`.
pub fn query_edges<D>(ctx: &Context, driver: &mut D, spec: &mut EdgeQuerySpec<'_>) -> Result<(), GraphError>
where
    D: Driver + ?Sized,
{
    let edge = &spec.edge;
    tracing::debug!(table = %edge.table, rel = %edge.rel, "query edges");
    let [out, in_] = edge.columns.as_slice() else {
        return Err(GraphError::Invalid(
            "edge query requires 2 columns (out, in)".into(),
        ));
    };
    let (out, in_) = if edge.inverse { (in_, out) } else { (out, in_) };
    let table = Table::new(&edge.table).schema(&edge.schema);
    let mut selector = Selector::from_table(driver.dialect(), table.clone());
    selector.select(&[table.c(out), table.c(in_)]);
    if let Some(pred) = &spec.predicate {
        pred(&mut selector);
    }
    let (query, args) = selector.query();
    let rows = driver
        .query(ctx, &query, &args)
        .map_err(with_context(format!("query edges of table {:?}", edge.table)))?;
    let Some(assign) = spec.assign.as_mut() else {
        return Ok(());
    };
    for row in rows.rows {
        let mut values = row.into_iter();
        match (values.next(), values.next()) {
            (Some(out), Some(in_)) => assign(out, in_)?,
            _ => {
                return Err(GraphError::Assign(format!(
                    "edge row of table {:?} has fewer than 2 columns",
                    spec.edge.table
                )))
            }
        }
    }
    Ok(())
}
