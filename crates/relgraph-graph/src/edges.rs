//! Adding and clearing edges stored outside the node's own row.
//!
//! M2M edges are rows of a join table. O2M edges, and the non-inverse side
//! of O2O edges, are FK columns on the target rows. Both are written after
//! the node's own row, in a fixed order: clear M2M, add M2M, clear FK,
//! add FK.

use std::collections::BTreeMap;

use relgraph_core::value::display_list;
use relgraph_core::{Rel, Value};
use relgraph_sql::predicate::{and, eq, in_values, is_null, or, Predicate};
use relgraph_sql::{DeleteBuilder, ExecQuerier, InsertBuilder, OnConflict, UpdateBuilder};

use crate::error::{ConstraintError, GraphError};
use crate::graph::GraphTx;
use crate::spec::{group_table, EdgeGroups, EdgeSpec};

/// `column = id` for a single id, `column IN (ids)` otherwise.
pub(crate) fn match_id(column: &str, ids: &[Value]) -> Predicate {
    match ids {
        [id] => eq(column, id.clone()),
        _ => in_values(column, ids.to_vec()),
    }
}

/// Both columns match their id sets.
pub(crate) fn match_ids(col1: &str, ids1: &[Value], col2: &str, ids2: &[Value]) -> Predicate {
    and(vec![match_id(col1, ids1), match_id(col2, ids2)])
}

/// Every `(a, b)` pair with `a` from `xs` and `b` from `ys`.
fn product<'v>(xs: &'v [Value], ys: &'v [Value]) -> impl Iterator<Item = (&'v Value, &'v Value)> {
    xs.iter().flat_map(move |x| ys.iter().map(move |y| (x, y)))
}

/// Join-table rows for `edge` from the nodes `ids`, mirrored when bidi.
fn m2m_rows(ids: &[Value], edge: &EdgeSpec) -> Result<Vec<Vec<Value>>, GraphError> {
    let fields = edge
        .target
        .fields
        .iter()
        .map(|f| f.bind_value())
        .collect::<Result<Vec<_>, _>>()?;
    let (pk1, pk2) = if edge.inverse {
        (edge.target.nodes.as_slice(), ids)
    } else {
        (ids, edge.target.nodes.as_slice())
    };
    let mut rows = Vec::new();
    for (a, b) in product(pk1, pk2) {
        let mut row = vec![a.clone(), b.clone()];
        row.extend(fields.iter().cloned());
        if edge.bidi {
            let mut mirrored = vec![b.clone(), a.clone()];
            mirrored.extend(fields.iter().cloned());
            rows.push(row);
            rows.push(mirrored);
        } else {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Columns of a join-table INSERT: the two keys, then the extra fields.
fn m2m_columns(edge: &EdgeSpec) -> Vec<String> {
    edge.columns
        .iter()
        .cloned()
        .chain(edge.target.fields.iter().map(|f| f.column.clone()))
        .collect()
}

impl<E: ExecQuerier + ?Sized> GraphTx<'_, E> {
    /// Writes the external edges of the nodes `ids`.
    pub(crate) fn set_external_edges(
        &mut self,
        ids: &[Value],
        add: &EdgeGroups<'_>,
        clear: &EdgeGroups<'_>,
    ) -> Result<(), GraphError> {
        self.clear_m2m_edges(ids, &clear.m2m)?;
        self.add_m2m_edges(ids, &add.m2m)?;
        self.clear_fk_edges(ids, &clear.fk_edges())?;
        self.add_fk_edges(ids, &add.fk_edges())?;
        Ok(())
    }

    /// Deletes join-table rows, one DELETE per table.
    pub(crate) fn clear_m2m_edges(&mut self, ids: &[Value], edges: &[&EdgeSpec]) -> Result<(), GraphError> {
        for (table, edges) in group_table(edges) {
            let mut preds = Vec::with_capacity(edges.len());
            for edge in &edges {
                let (from_c, to_c) = if edge.inverse {
                    (&edge.columns[1], &edge.columns[0])
                } else {
                    (&edge.columns[0], &edge.columns[1])
                };
                let targets = &edge.target.nodes;
                if targets.is_empty() {
                    preds.push(match_id(from_c, ids));
                    if edge.bidi {
                        preds.push(match_id(to_c, ids));
                    }
                } else {
                    preds.push(match_ids(from_c, ids, to_c, targets));
                    if edge.bidi {
                        preds.push(match_ids(to_c, ids, from_c, targets));
                    }
                }
            }
            let mut delete = DeleteBuilder::new(self.dialect, table).schema(&edges[0].schema);
            delete.where_(or(preds));
            self.exec(delete.query(), || format!("remove m2m edge for table {table}"))?;
        }
        Ok(())
    }

    /// Inserts join-table rows, one INSERT per table.
    pub(crate) fn add_m2m_edges(&mut self, ids: &[Value], edges: &[&EdgeSpec]) -> Result<(), GraphError> {
        for (table, edges) in group_table(edges) {
            let first = edges[0];
            let mut insert = InsertBuilder::new(self.dialect, table).schema(&first.schema);
            insert.columns(&m2m_columns(first));
            for edge in &edges {
                for row in m2m_rows(ids, edge)? {
                    insert.values(row);
                }
            }
            if insert.row_count() == 0 {
                continue;
            }
            if edges.iter().all(|e| e.target.fields.is_empty()) {
                insert.on_conflict(OnConflict::do_nothing());
            }
            let context = format!("add m2m edge for table {table}");
            let query = insert
                .query()
                .map_err(|err| GraphError::driver(context.clone(), err))?;
            self.exec(query, || context)?;
        }
        Ok(())
    }

    /// Inserts the join-table rows of a batch, one INSERT per table for all
    /// nodes. A node may carry at most one edge per join table.
    pub(crate) fn batch_add_m2m(&mut self, nodes: &[(&Value, Vec<&EdgeSpec>)]) -> Result<(), GraphError> {
        let mut tables: BTreeMap<&str, (InsertBuilder, bool)> = BTreeMap::new();
        for (id, edges) in nodes {
            for (table, edges) in group_table(edges) {
                let [edge] = edges.as_slice() else {
                    return Err(GraphError::Invalid(format!(
                        "expect exactly 1 edge-spec per table, but got {}",
                        edges.len()
                    )));
                };
                let (insert, no_fields) = tables.entry(table).or_insert_with(|| {
                    let mut insert = InsertBuilder::new(self.dialect, table).schema(&edge.schema);
                    insert.columns(&m2m_columns(edge));
                    (insert, true)
                });
                *no_fields &= edge.target.fields.is_empty();
                for row in m2m_rows(std::slice::from_ref(*id), edge)? {
                    insert.values(row);
                }
            }
        }
        for (table, (mut insert, no_fields)) in tables {
            if insert.row_count() == 0 {
                continue;
            }
            if no_fields {
                insert.on_conflict(OnConflict::do_nothing());
            }
            let context = format!("add m2m edge for table {table}");
            let query = insert
                .query()
                .map_err(|err| GraphError::driver(context.clone(), err))?;
            self.exec(query, || context)?;
        }
        Ok(())
    }

    /// Sets the FK columns of the cleared edges to NULL. Inverse O2O edges
    /// live on the node's own row and are skipped.
    pub(crate) fn clear_fk_edges(&mut self, ids: &[Value], edges: &[&EdgeSpec]) -> Result<(), GraphError> {
        for edge in edges {
            if edge.rel == Rel::O2O && edge.inverse {
                continue;
            }
            let column = &edge.columns[0];
            let pred = if edge.target.nodes.is_empty() {
                match_id(column, ids)
            } else {
                match_ids(edge.target.id_column(), &edge.target.nodes, column, ids)
            };
            let mut update = UpdateBuilder::new(self.dialect, &edge.table).schema(&edge.schema);
            update.set_null(column).where_(pred);
            self.exec(update.query(), || {
                format!("clear {} edge for table {}", edge.rel, edge.table)
            })?;
        }
        Ok(())
    }

    /// Points the FK column of every target at the node. Targets already
    /// linked to another node fail the whole call.
    pub(crate) fn add_fk_edges(&mut self, ids: &[Value], edges: &[&EdgeSpec]) -> Result<(), GraphError> {
        if ids.len() > 1 && !edges.is_empty() {
            return Err(GraphError::Invalid(format!(
                "unable to link FK edge to more than 1 node: {}",
                display_list(ids)
            )));
        }
        let Some(id) = ids.first() else {
            return Ok(());
        };
        for edge in edges {
            if edge.rel == Rel::O2O && edge.inverse {
                continue;
            }
            let targets = &edge.target.nodes;
            if targets.is_empty() {
                continue;
            }
            let column = &edge.columns[0];
            let mut update = UpdateBuilder::new(self.dialect, &edge.table).schema(&edge.schema);
            update
                .set(column, id.clone())
                .where_(match_id(edge.target.id_column(), targets))
                .where_(is_null(column));
            let res = self.exec(update.query(), || {
                format!("add {} edge for table {}", edge.rel, edge.table)
            })?;
            if res.rows_affected < targets.len() as u64 {
                return Err(ConstraintError::linked(format!(
                    "one of {} is already connected to a different {column}",
                    display_list(targets)
                ))
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use relgraph_sql::{Context, Dialect, Driver, MockDriver};

    use super::*;
    use crate::error::ConstraintKind;

    fn run<T>(
        drv: &mut MockDriver,
        f: impl FnOnce(&mut GraphTx<'_, MockDriver>) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let ctx = Context::background();
        let dialect = drv.dialect();
        f(&mut GraphTx::new(&ctx, drv, dialect))
    }

    #[test]
    fn match_id_shapes() {
        let (q, _) = match_id("id", &[Value::from(1)]).query(Dialect::MySQL);
        assert_eq!(q, "`id` = ?");
        let (q, args) = match_id("id", &[Value::from(1), Value::from(2)]).query(Dialect::MySQL);
        assert_eq!(q, "`id` IN (?, ?)");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn m2m_rows_are_a_product_mirrored_when_bidi() {
        let ids = [Value::from(1)];
        let edge = EdgeSpec::new(Rel::M2M, "user_friends", &["user_id", "friend_id"])
            .bidi(true)
            .targets(vec![Value::from(2), Value::from(3)]);
        let rows = m2m_rows(&ids, &edge).unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::from(1), Value::from(2)],
                vec![Value::from(2), Value::from(1)],
                vec![Value::from(1), Value::from(3)],
                vec![Value::from(3), Value::from(1)],
            ]
        );
        let inverse = EdgeSpec::new(Rel::M2M, "group_users", &["group_id", "user_id"])
            .inverse(true)
            .targets(vec![Value::from(7)]);
        assert_eq!(
            m2m_rows(&ids, &inverse).unwrap(),
            vec![vec![Value::from(7), Value::from(1)]]
        );
    }

    #[test]
    fn add_m2m_groups_by_table() {
        let mut drv = MockDriver::new(Dialect::MySQL);
        let groups = EdgeSpec::new(Rel::M2M, "group_users", &["group_id", "user_id"])
            .inverse(true)
            .targets(vec![Value::from(2)]);
        let friends = EdgeSpec::new(Rel::M2M, "user_friends", &["user_id", "friend_id"])
            .bidi(true)
            .targets(vec![Value::from(3)]);
        run(&mut drv, |g| g.add_m2m_edges(&[Value::from(1)], &[&groups, &friends])).unwrap();
        assert_eq!(
            drv.statements(),
            vec![
                "INSERT INTO `group_users` (`group_id`, `user_id`) VALUES (?, ?) ON DUPLICATE KEY UPDATE `group_id` = `group_id`",
                "INSERT INTO `user_friends` (`user_id`, `friend_id`) VALUES (?, ?), (?, ?) ON DUPLICATE KEY UPDATE `user_id` = `user_id`",
            ]
        );
    }

    #[test]
    fn clear_m2m_ors_edges_of_one_table() {
        let mut drv = MockDriver::new(Dialect::Postgres);
        let all = EdgeSpec::new(Rel::M2M, "user_friends", &["user_id", "friend_id"]).bidi(true);
        let some = EdgeSpec::new(Rel::M2M, "user_groups", &["user_id", "group_id"])
            .targets(vec![Value::from(5), Value::from(6)]);
        run(&mut drv, |g| g.clear_m2m_edges(&[Value::from(1)], &[&some, &all])).unwrap();
        assert_eq!(
            drv.statements(),
            vec![
                r#"DELETE FROM "user_friends" WHERE "user_id" = $1 OR "friend_id" = $2"#,
                r#"DELETE FROM "user_groups" WHERE "user_id" = $1 AND "group_id" IN ($2, $3)"#,
            ]
        );
    }

    #[test]
    fn add_fk_checks_exclusivity() {
        let mut drv = MockDriver::new(Dialect::SQLite);
        drv.expect_affected(2);
        let pets = EdgeSpec::new(Rel::O2M, "pets", &["owner_id"])
            .targets(vec![Value::from(1), Value::from(2), Value::from(3)]);
        let err = run(&mut drv, |g| g.add_fk_edges(&[Value::from(9)], &[&pets])).unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Linked));
        assert_eq!(
            err.to_string(),
            "one of [1 2 3] is already connected to a different owner_id"
        );
        assert_eq!(
            drv.statements(),
            vec!["UPDATE `pets` SET `owner_id` = ? WHERE `id` IN (?, ?, ?) AND `owner_id` IS NULL"]
        );
    }

    #[test]
    fn add_fk_rejects_many_owners() {
        let mut drv = MockDriver::new(Dialect::SQLite);
        let pets = EdgeSpec::new(Rel::O2M, "pets", &["owner_id"]).targets(vec![Value::from(1)]);
        let err = run(&mut drv, |g| {
            g.add_fk_edges(&[Value::from(1), Value::from(2)], &[&pets])
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unable to link FK edge to more than 1 node: [1 2]"
        );
        assert!(drv.statements().is_empty());
    }

    #[test]
    fn clear_fk_skips_inverse_o2o() {
        let mut drv = MockDriver::new(Dialect::SQLite);
        let spouse = EdgeSpec::new(Rel::O2O, "users", &["spouse_id"]).inverse(true);
        let card = EdgeSpec::new(Rel::O2O, "cards", &["owner_id"]).targets(vec![Value::from(4)]);
        run(&mut drv, |g| g.clear_fk_edges(&[Value::from(1)], &[&spouse, &card])).unwrap();
        assert_eq!(
            drv.statements(),
            vec!["UPDATE `cards` SET `owner_id` = NULL WHERE `id` = ? AND `owner_id` = ?"]
        );
    }

    #[test]
    fn batch_m2m_rejects_two_edges_per_table() {
        let mut drv = MockDriver::new(Dialect::SQLite);
        let a = EdgeSpec::new(Rel::M2M, "user_groups", &["user_id", "group_id"]).targets(vec![Value::from(1)]);
        let b = a.clone();
        let id = Value::from(1);
        let err = run(&mut drv, |g| g.batch_add_m2m(&[(&id, vec![&a, &b])])).unwrap_err();
        assert_eq!(err.to_string(), "expect exactly 1 edge-spec per table, but got 2");
    }

    proptest::proptest! {
        #[test]
        fn m2m_row_count_is_the_product(ids in 1usize..5, targets in 0usize..5, bidi: bool) {
            let ids: Vec<Value> = (0..ids as i64).map(Value::from).collect();
            let edge = EdgeSpec::new(Rel::M2M, "t", &["a", "b"])
                .bidi(bidi)
                .targets((100..100 + targets as i64).map(Value::from).collect());
            let rows = m2m_rows(&ids, &edge).unwrap();
            let factor = if bidi { 2 } else { 1 };
            proptest::prop_assert_eq!(rows.len(), ids.len() * targets * factor);
        }
    }
}
