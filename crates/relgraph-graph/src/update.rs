//! Node updates.
//!
//! The own-table UPDATE is planned in one pass: NULLs for cleared fields
//! and cleared own-row FK edges (unless the same column is re-set by an
//! added edge), then `set` fields, `add` fields and added own-row FK edges.
//! External edges follow, see [`edges`](crate::edges).

use std::collections::HashSet;

use relgraph_core::Value;
use relgraph_sql::predicate::{and, eq, exists, Predicate};
use relgraph_sql::{Context, Driver, ExecQuerier, Selector, UpdateBuilder};

use crate::edges::match_id;
use crate::error::{GraphError, NotFoundError};
use crate::graph::{begin, finish, GraphTx};
use crate::spec::{EdgeGroups, FieldMut, NodeSpec, UpdateModifier, UpdateSpec};

/// Updates the node identified by `spec.node.id` (or its composite id).
///
/// When a predicate is set and nothing was updated, the node is checked
/// for existence so a missing node is reported as [`NotFoundError`]. When
/// `assign` is set, the updated row is read back and passed to it.
pub fn update_node<D>(ctx: &Context, driver: &mut D, spec: &mut UpdateSpec<'_>) -> Result<(), GraphError>
where
    D: Driver + ?Sized,
{
    tracing::debug!(table = %spec.node.table, "update node");
    let dialect = driver.dialect();
    let mut tx = begin(ctx, driver)?;
    let result = GraphTx::new(ctx, tx.as_mut(), dialect).update_node(spec);
    finish(tx, result)
}

/// Updates every node matching `spec.predicate` and returns how many were
/// updated.
pub fn update_nodes<D>(ctx: &Context, driver: &mut D, spec: &UpdateSpec<'_>) -> Result<usize, GraphError>
where
    D: Driver + ?Sized,
{
    tracing::debug!(table = %spec.node.table, "update nodes");
    let dialect = driver.dialect();
    let mut tx = begin(ctx, driver)?;
    let result = GraphTx::new(ctx, tx.as_mut(), dialect).update_nodes(spec);
    finish(tx, result)
}

/// The predicate selecting one node, and the id values it matches.
fn id_predicate(node: &NodeSpec) -> Result<(Predicate, Vec<Value>), GraphError> {
    if let Some(id) = &node.id {
        return Ok((eq(&id.column, id.value.clone()), vec![id.value.clone()]));
    }
    match node.composite_id.as_slice() {
        [a, b] => Ok((
            and(vec![eq(&a.column, a.value.clone()), eq(&b.column, b.value.clone())]),
            vec![a.value.clone(), b.value.clone()],
        )),
        [] => Err(GraphError::Invalid(format!(
            "missing node id for update table {:?}",
            node.table
        ))),
        _ => Err(GraphError::Invalid(format!(
            "invalid composite id for update table {:?}",
            node.table
        ))),
    }
}

/// Adds the own-table assignments to `update`.
fn set_table_columns(
    update: &mut UpdateBuilder,
    fields: &FieldMut,
    add: &EdgeGroups<'_>,
    clear: &EdgeGroups<'_>,
) -> Result<(), GraphError> {
    let set_edges: HashSet<&str> = add
        .own_fk_edges()
        .map(|e| e.columns[0].as_str())
        .collect();
    for field in &fields.clear {
        update.set_null(&field.column);
    }
    for edge in clear.own_fk_edges() {
        if !set_edges.contains(edge.columns[0].as_str()) {
            update.set_null(&edge.columns[0]);
        }
    }
    for field in &fields.set {
        update.set(&field.column, field.bind_value()?);
    }
    for field in &fields.add {
        update.add(&field.column, field.bind_value()?);
    }
    for edge in add.own_fk_edges() {
        update.set(&edge.columns[0], edge.first_target()?.clone());
    }
    Ok(())
}

impl<E: ExecQuerier + ?Sized> GraphTx<'_, E> {
    fn update_node(&mut self, spec: &mut UpdateSpec<'_>) -> Result<(), GraphError> {
        let add = EdgeGroups::new(&spec.edges.add)?;
        let clear = EdgeGroups::new(&spec.edges.clear)?;
        let node = &spec.node;
        let (idp, id_values) = id_predicate(node)?;

        let mut update = UpdateBuilder::new(self.dialect, &node.table).schema(&node.schema);
        update.where_(idp.clone());
        if let Some(pred) = &spec.predicate {
            let mut selector = Selector::from_table(self.dialect, node.table_ref());
            pred(&mut selector);
            update.from_select(&selector);
        }
        set_table_columns(&mut update, &spec.fields, &add, &clear)?;
        for modify in &spec.modifiers {
            modify(&mut update);
        }
        if !update.is_empty() {
            let res = self.exec(update.query(), || {
                format!("update node of table {:?}", node.table)
            })?;
            if res.rows_affected == 0 {
                if let Some(pred) = &spec.predicate {
                    self.ensure_exists(node, idp.clone(), pred, &id_values)?;
                }
            }
        }
        if let Some(id) = &node.id {
            self.set_external_edges(std::slice::from_ref(&id.value), &add, &clear)?;
        }
        let Some(assign) = spec.assign.as_mut() else {
            return Ok(());
        };
        let mut selector = Selector::from_table(self.dialect, node.table_ref());
        selector.select(&node.columns).where_(idp);
        let rows = self.query(selector.query(), || {
            format!("select updated node of table {:?}", node.table)
        })?;
        match rows.rows.first() {
            Some(row) => assign(rows.columns.as_slice(), row.as_slice()),
            None => Err(NotFoundError {
                table: node.table.clone(),
                id: id_values,
            }
            .into()),
        }
    }

    /// Tells "not found" from "not changed" after an UPDATE under a
    /// predicate affected no rows.
    fn ensure_exists(
        &mut self,
        node: &NodeSpec,
        idp: Predicate,
        pred: &dyn Fn(&mut Selector),
        id_values: &[Value],
    ) -> Result<(), GraphError> {
        let mut selector = Selector::from_table(self.dialect, node.table_ref());
        selector.where_(idp);
        pred(&mut selector);
        let (inner, args) = exists(selector).query(self.dialect);
        let rows = self.query((format!("SELECT {inner}"), args), || {
            format!("check node existence in table {:?}", node.table)
        })?;
        let found = rows
            .scalar_i64()
            .map_err(|err| GraphError::driver(format!("check node existence in table {:?}", node.table), err))?;
        if found == 0 {
            return Err(NotFoundError {
                table: node.table.clone(),
                id: id_values.to_vec(),
            }
            .into());
        }
        Ok(())
    }

    fn update_nodes(&mut self, spec: &UpdateSpec<'_>) -> Result<usize, GraphError> {
        let add = EdgeGroups::new(&spec.edges.add)?;
        let clear = EdgeGroups::new(&spec.edges.clear)?;
        let node = &spec.node;
        let external = add.has_external() || clear.has_external();
        if node.id.is_none() && !node.composite_id.is_empty() && external {
            return Err(GraphError::Invalid(format!(
                "update edge schema table {:?} cannot update external tables",
                node.table
            )));
        }
        let id_column = node.id_column();

        let mut selector = Selector::from_table(self.dialect, node.table_ref());
        let qualified = selector.c(id_column);
        selector.select(&[qualified]);
        if let Some(pred) = &spec.predicate {
            pred(&mut selector);
        }
        let mut update = UpdateBuilder::new(self.dialect, &node.table).schema(&node.schema);
        set_table_columns(&mut update, &spec.fields, &add, &clear)?;

        if !external {
            update.from_select(&selector);
            return self.update_table(update, &spec.modifiers, &node.table);
        }
        let rows = self.query(selector.query(), || format!("querying table {}", node.table))?;
        let ids = rows.first_column();
        if ids.is_empty() {
            return Ok(0);
        }
        update.where_(match_id(id_column, &ids));
        self.update_table(update, &spec.modifiers, &node.table)?;
        self.set_external_edges(&ids, &add, &clear)?;
        Ok(ids.len())
    }

    /// Applies the modifiers and executes the own-table UPDATE, if it
    /// assigns anything.
    fn update_table(
        &mut self,
        mut update: UpdateBuilder,
        modifiers: &[UpdateModifier<'_>],
        table: &str,
    ) -> Result<usize, GraphError> {
        for modify in modifiers {
            modify(&mut update);
        }
        if update.is_empty() {
            return Ok(0);
        }
        let res = self.exec(update.query(), || format!("update nodes of table {table:?}"))?;
        Ok(res.rows_affected as usize)
    }
}
