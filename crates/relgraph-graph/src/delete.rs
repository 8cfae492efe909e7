//! Node deletion.

use relgraph_sql::{Context, DeleteBuilder, Driver, ExecQuerier, Selector};

use crate::error::GraphError;
use crate::graph::{begin, finish, GraphTx};
use crate::spec::DeleteSpec;

/// Deletes the nodes matching `spec.predicate`, or every node of the table
/// without one. Returns the number of deleted rows.
pub fn delete_nodes<D>(ctx: &Context, driver: &mut D, spec: &DeleteSpec<'_>) -> Result<usize, GraphError>
where
    D: Driver + ?Sized,
{
    tracing::debug!(table = %spec.node.table, "delete nodes");
    let dialect = driver.dialect();
    let mut tx = begin(ctx, driver)?;
    let result = GraphTx::new(ctx, tx.as_mut(), dialect).delete_nodes(spec);
    finish(tx, result)
}

impl<E: ExecQuerier + ?Sized> GraphTx<'_, E> {
    fn delete_nodes(&mut self, spec: &DeleteSpec<'_>) -> Result<usize, GraphError> {
        let node = &spec.node;
        let mut selector = Selector::from_table(self.dialect, node.table_ref());
        if let Some(pred) = &spec.predicate {
            pred(&mut selector);
        }
        let mut delete = DeleteBuilder::new(self.dialect, &node.table).schema(&node.schema);
        delete.from_select(&selector);
        let res = self.exec(delete.query(), || {
            format!("delete nodes of table {:?}", node.table)
        })?;
        Ok(res.rows_affected as usize)
    }
}
