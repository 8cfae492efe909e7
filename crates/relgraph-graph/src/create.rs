//! Node creation.
//!
//! [`create_node`] inserts one row and its edges; [`batch_create`] inserts
//! many rows of one table in a single statement. Generated identifiers are
//! returned to the caller, in input order.

use std::collections::{BTreeMap, BTreeSet};

use relgraph_core::Value;
use relgraph_sql::{Context, Dialect, Driver, ExecQuerier, InsertBuilder, OnConflict, SqlError};

use crate::error::GraphError;
use crate::graph::{begin, finish, GraphTx};
use crate::spec::{BatchCreateSpec, CreateSpec, EdgeGroups, FieldSpec};

/// Creates a node and its edges in one transaction. Returns the node id:
/// the supplied one, or the one generated by the database. Nodes without
/// an id spec (edge-schema rows) return `None`.
pub fn create_node<D>(ctx: &Context, driver: &mut D, spec: &CreateSpec) -> Result<Option<Value>, GraphError>
where
    D: Driver + ?Sized,
{
    tracing::debug!(table = %spec.table, fields = spec.fields.len(), edges = spec.edges.len(), "create node");
    let edges = EdgeGroups::new(&spec.edges)?;
    let dialect = driver.dialect();
    let mut tx = begin(ctx, driver)?;
    let result = GraphTx::new(ctx, tx.as_mut(), dialect).create_node(spec, &edges);
    finish(tx, result)
}

/// Creates the nodes of one table with a single INSERT, then their edges.
pub fn batch_create<D>(ctx: &Context, driver: &mut D, spec: &BatchCreateSpec) -> Result<Vec<Option<Value>>, GraphError>
where
    D: Driver + ?Sized,
{
    let Some(first) = spec.nodes.first() else {
        return Ok(Vec::new());
    };
    tracing::debug!(table = %first.table, nodes = spec.nodes.len(), "batch create");
    if let Some(other) = spec.nodes.iter().find(|n| n.table != first.table) {
        return Err(GraphError::Invalid(format!(
            "more than 1 table for batch insert: {:?} != {:?}",
            first.table, other.table
        )));
    }
    let edges = spec
        .nodes
        .iter()
        .map(|n| EdgeGroups::new(&n.edges))
        .collect::<Result<Vec<_>, _>>()?;
    let dialect = driver.dialect();
    let mut tx = begin(ctx, driver)?;
    let result = GraphTx::new(ctx, tx.as_mut(), dialect).batch_create(spec, &edges);
    finish(tx, result)
}

fn insert_context(table: &str) -> String {
    format!("insert node to table {table:?}")
}

/// Converts a returned id to the id type: numeric ids are read as integers.
fn scan_id(id_spec: &FieldSpec, v: &Value) -> Value {
    if id_spec.field_type.numeric() {
        if let Some(i) = v.as_i64() {
            return Value::Int(i);
        }
    }
    v.clone()
}

fn missing_id(table: &str) -> GraphError {
    GraphError::driver(
        insert_context(table),
        SqlError::Mismatch("insert returned no id".into()),
    )
}

impl<E: ExecQuerier + ?Sized> GraphTx<'_, E> {
    fn create_node(&mut self, spec: &CreateSpec, edges: &EdgeGroups<'_>) -> Result<Option<Value>, GraphError> {
        let mut insert = InsertBuilder::new(self.dialect, &spec.table)
            .schema(&spec.schema)
            .default_values();
        if let Some(id) = spec.id.as_ref().filter(|id| !id.value.is_null()) {
            insert.set(&id.column, id.value.clone());
        }
        for field in &spec.fields {
            insert.set(&field.column, field.bind_value()?);
        }
        for edge in edges.own_fk_edges() {
            insert.set(&edge.columns[0], edge.first_target()?.clone());
        }
        let Some(id_spec) = &spec.id else {
            if let Some(conflict) = &spec.on_conflict {
                insert.on_conflict(conflict.clone());
            }
            let query = insert
                .query()
                .map_err(|err| GraphError::driver(insert_context(&spec.table), err))?;
            self.exec(query, || insert_context(&spec.table))?;
            return Ok(None);
        };
        let id = self.insert_node(insert, spec, id_spec)?;
        let ids = [id];
        self.add_m2m_edges(&ids, &edges.m2m)?;
        self.add_fk_edges(&ids, &edges.fk_edges())?;
        let [id] = ids;
        Ok(Some(id))
    }

    /// Executes the INSERT of a node with an id column and returns the id.
    fn insert_node(
        &mut self,
        mut insert: InsertBuilder,
        spec: &CreateSpec,
        id_spec: &FieldSpec,
    ) -> Result<Value, GraphError> {
        let table = spec.table.as_str();
        let supplied = !id_spec.value.is_null();
        if let Some(conflict) = &spec.on_conflict {
            insert.on_conflict(self.upsert_conflict(conflict, &spec.table, id_spec, supplied));
        }
        let build = |insert: &InsertBuilder| {
            insert
                .query()
                .map_err(|err| GraphError::driver(insert_context(table), err))
        };
        if supplied && spec.on_conflict.is_none() {
            self.exec(build(&insert)?, || insert_context(table))?;
            return Ok(id_spec.value.clone());
        }
        if self.dialect.supports_returning() {
            insert.returning(&[&id_spec.column]);
            let rows = self.query(build(&insert)?, || insert_context(table))?;
            if supplied {
                return Ok(id_spec.value.clone());
            }
            return match rows.rows.first().and_then(|row| row.first()) {
                Some(v) => Ok(scan_id(id_spec, v)),
                None => Err(missing_id(table)),
            };
        }
        let res = self.exec(build(&insert)?, || insert_context(table))?;
        if supplied {
            return Ok(id_spec.value.clone());
        }
        res.last_insert_id
            .map(Value::Int)
            .ok_or_else(|| missing_id(table))
    }

    /// On MySQL, an upsert of a generated numeric id reports the id of the
    /// existing row only when it is assigned through `LAST_INSERT_ID`.
    fn upsert_conflict(&self, conflict: &OnConflict, table: &str, id_spec: &FieldSpec, supplied: bool) -> OnConflict {
        let conflict = conflict.clone();
        if self.dialect != Dialect::MySQL || supplied || !id_spec.field_type.numeric() {
            return conflict;
        }
        if conflict.raw_sets.iter().any(|(c, _)| *c == id_spec.column) {
            return conflict;
        }
        let column = self
            .dialect
            .quote_ident(&format!("{table}.{}", id_spec.column));
        conflict.set_raw(&id_spec.column, &format!("LAST_INSERT_ID({column})"))
    }

    fn batch_create(&mut self, spec: &BatchCreateSpec, edges: &[EdgeGroups<'_>]) -> Result<Vec<Option<Value>>, GraphError> {
        let first = &spec.nodes[0];
        let table = first.table.as_str();
        let id_column = first.id.as_ref().map(|id| id.column.as_str());

        let mut columns: BTreeSet<&str> = BTreeSet::new();
        let mut values: Vec<BTreeMap<&str, Value>> = Vec::with_capacity(spec.nodes.len());
        for (node, groups) in spec.nodes.iter().zip(edges) {
            let mut row = BTreeMap::new();
            if let Some(id) = node.id.as_ref().filter(|id| !id.value.is_null()) {
                row.insert(id.column.as_str(), id.value.clone());
            }
            for field in &node.fields {
                row.insert(field.column.as_str(), field.bind_value()?);
            }
            for edge in groups.own_fk_edges() {
                row.insert(edge.columns[0].as_str(), edge.first_target()?.clone());
            }
            columns.extend(row.keys().copied());
            values.push(row);
        }
        let columns: Vec<&str> = columns.into_iter().collect();
        if columns.is_empty() && spec.nodes.len() > 1 {
            return Err(GraphError::Invalid(format!(
                "batch insert of {} nodes to table {table:?} has no columns",
                spec.nodes.len()
            )));
        }

        let mut insert = InsertBuilder::new(self.dialect, table)
            .schema(&first.schema)
            .default_values();
        insert.columns(&columns);
        for row in &values {
            let mut bound = Vec::with_capacity(columns.len());
            for column in &columns {
                match row.get(column) {
                    Some(v) => bound.push(v.clone()),
                    None if Some(*column) == id_column => {
                        return Err(GraphError::Invalid("inconsistent id values for batch insert".into()));
                    }
                    None => bound.push(Value::Null),
                }
            }
            if !bound.is_empty() {
                insert.values(bound);
            }
        }
        if let Some(conflict) = &spec.on_conflict {
            insert.on_conflict(conflict.clone());
        }
        let build = |insert: &InsertBuilder| {
            insert
                .query()
                .map_err(|err| GraphError::driver(format!("insert nodes to table {table:?}"), err))
        };

        let Some(id_spec) = &first.id else {
            self.exec(build(&insert)?, || format!("insert nodes to table {table:?}"))?;
            return Ok(vec![None; spec.nodes.len()]);
        };
        let supplied: Option<Vec<Value>> = id_column
            .filter(|c| columns.contains(c))
            .map(|c| values.iter().map(|row| row.get(c).cloned().unwrap_or_default()).collect());

        let context = || format!("insert nodes to table {table:?}");
        let ids = if supplied.is_some() && spec.on_conflict.is_none() {
            self.exec(build(&insert)?, context)?;
            supplied.unwrap_or_default()
        } else if self.dialect.supports_returning() {
            insert.returning(&[&id_spec.column]);
            let rows = self.query(build(&insert)?, context)?;
            match supplied {
                Some(ids) => ids,
                None if rows.len() == spec.nodes.len() => rows
                    .first_column()
                    .iter()
                    .map(|v| scan_id(id_spec, v))
                    .collect(),
                None => {
                    return Err(GraphError::driver(
                        context(),
                        SqlError::Mismatch(format!(
                            "expected {} ids, got {}",
                            spec.nodes.len(),
                            rows.len()
                        )),
                    ))
                }
            }
        } else {
            let res = self.exec(build(&insert)?, context)?;
            match supplied {
                Some(ids) => ids,
                None => {
                    let last = res.last_insert_id.ok_or_else(|| missing_id(table))?;
                    (0..spec.nodes.len() as i64).map(|i| Value::Int(last + i)).collect()
                }
            }
        };

        let m2m: Vec<(&Value, Vec<_>)> = ids
            .iter()
            .zip(edges)
            .map(|(id, groups)| (id, groups.m2m.clone()))
            .collect();
        self.batch_add_m2m(&m2m)?;
        for (id, groups) in ids.iter().zip(edges) {
            self.add_fk_edges(std::slice::from_ref(id), &groups.fk_edges())?;
        }
        Ok(ids.into_iter().map(Some).collect())
    }
}

#[cfg(test)]
mod tests {
    use relgraph_core::{FieldType, Rel};
    use relgraph_sql::mock::Event;
    use relgraph_sql::{ExecResult, MockDriver, Rows};

    use super::*;
    use crate::spec::EdgeSpec;

    fn user(name: &str) -> CreateSpec {
        let mut spec = CreateSpec::new("users", Some(FieldSpec::new("id", FieldType::Int)));
        spec.set_field("name", FieldType::String, name);
        spec
    }

    #[test]
    fn create_with_generated_id_uses_returning() {
        let mut drv = MockDriver::new(Dialect::Postgres);
        drv.expect_query(Rows::new(&["id"], vec![vec![Value::from(7)]]));
        let mut spec = user("a8m");
        spec.set_field("meta", FieldType::Json, serde_json::json!({"k": 1}));
        let id = create_node(&Context::background(), &mut drv, &spec).unwrap();
        assert_eq!(id, Some(Value::Int(7)));
        assert_eq!(
            drv.events(),
            &[
                Event::Begin,
                Event::Query {
                    query: r#"INSERT INTO "users" ("name", "meta") VALUES ($1, $2) RETURNING "id""#.into(),
                    args: vec![Value::from("a8m"), Value::from(r#"{"k":1}"#)],
                },
                Event::Commit,
            ]
        );
    }

    #[test]
    fn create_on_mysql_reads_last_insert_id() {
        let mut drv = MockDriver::new(Dialect::MySQL);
        drv.expect_exec(ExecResult {
            rows_affected: 1,
            last_insert_id: Some(42),
        });
        let id = create_node(&Context::background(), &mut drv, &user("a8m")).unwrap();
        assert_eq!(id, Some(Value::Int(42)));
        assert_eq!(drv.statements(), vec!["INSERT INTO `users` (`name`) VALUES (?)"]);
    }

    #[test]
    fn mysql_upsert_injects_last_insert_id() {
        let mut drv = MockDriver::new(Dialect::MySQL);
        drv.expect_exec(ExecResult {
            rows_affected: 2,
            last_insert_id: Some(3),
        });
        let mut spec = user("a8m");
        spec.on_conflict(OnConflict::update_new_values());
        create_node(&Context::background(), &mut drv, &spec).unwrap();
        insta::assert_snapshot!(
            drv.statements()[0],
            @"INSERT INTO `users` (`name`) VALUES (?) ON DUPLICATE KEY UPDATE `name` = VALUES(`name`), `id` = LAST_INSERT_ID(`users`.`id`)"
        );
    }

    #[test]
    fn create_with_edges_orders_statements() {
        let mut drv = MockDriver::new(Dialect::SQLite);
        drv.expect_exec(ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        });
        drv.expect_exec(ExecResult::default());
        drv.expect_affected(1);
        let mut spec = CreateSpec::new("users", Some(FieldSpec::with_value("id", FieldType::Int, 1)));
        spec.add_edge(EdgeSpec::new(Rel::O2M, "pets", &["owner_id"]).targets(vec![Value::from(2)]));
        spec.add_edge(
            EdgeSpec::new(Rel::M2M, "user_groups", &["user_id", "group_id"]).targets(vec![Value::from(3)]),
        );
        spec.add_edge(EdgeSpec::new(Rel::M2O, "users", &["team_id"]).inverse(true).targets(vec![Value::from(4)]));
        let id = create_node(&Context::background(), &mut drv, &spec).unwrap();
        assert_eq!(id, Some(Value::from(1)));
        assert_eq!(
            drv.statements(),
            vec![
                "INSERT INTO `users` (`id`, `team_id`) VALUES (?, ?)",
                "INSERT INTO `user_groups` (`user_id`, `group_id`) VALUES (?, ?) ON CONFLICT DO NOTHING",
                "UPDATE `pets` SET `owner_id` = ? WHERE `id` = ? AND `owner_id` IS NULL",
            ]
        );
    }

    #[test]
    fn edge_schema_rows_have_no_id() {
        let mut drv = MockDriver::new(Dialect::SQLite);
        let mut spec = CreateSpec::new("friendships", None);
        spec.set_field("user_id", FieldType::Int, 1);
        spec.set_field("friend_id", FieldType::Int, 2);
        spec.on_conflict(OnConflict::do_nothing());
        let id = create_node(&Context::background(), &mut drv, &spec).unwrap();
        assert_eq!(id, None);
        assert_eq!(
            drv.statements(),
            vec!["INSERT INTO `friendships` (`user_id`, `friend_id`) VALUES (?, ?) ON CONFLICT DO NOTHING"]
        );
    }

    #[test]
    fn failed_edge_rolls_back() {
        let mut drv = MockDriver::new(Dialect::SQLite);
        drv.expect_query(Rows::new(&["id"], vec![vec![Value::from(1)]]));
        drv.expect_affected(0);
        let mut spec = user("a8m");
        spec.add_edge(EdgeSpec::new(Rel::O2M, "pets", &["owner_id"]).targets(vec![Value::from(2)]));
        let err = create_node(&Context::background(), &mut drv, &spec).unwrap_err();
        assert!(crate::error::is_constraint_error(&err));
        assert_eq!(drv.events().last(), Some(&Event::Rollback));
    }

    #[test]
    fn batch_rejects_mixed_tables_and_ids() {
        let mut drv = MockDriver::new(Dialect::SQLite);
        let ctx = Context::background();
        let spec = BatchCreateSpec::new(vec![user("a"), CreateSpec::new("pets", None)]);
        let err = batch_create(&ctx, &mut drv, &spec).unwrap_err();
        assert_eq!(
            err.to_string(),
            "more than 1 table for batch insert: \"users\" != \"pets\""
        );

        let mut with_id = user("b");
        with_id.id = Some(FieldSpec::with_value("id", FieldType::Int, 10));
        let spec = BatchCreateSpec::new(vec![user("a"), with_id]);
        let err = batch_create(&ctx, &mut drv, &spec).unwrap_err();
        assert_eq!(err.to_string(), "inconsistent id values for batch insert");
        assert!(batch_create(&ctx, &mut drv, &BatchCreateSpec::new(vec![])).unwrap().is_empty());
    }

    #[test]
    fn batch_unions_columns_and_splits_mysql_ids() {
        let mut drv = MockDriver::new(Dialect::MySQL);
        drv.expect_exec(ExecResult {
            rows_affected: 2,
            last_insert_id: Some(10),
        });
        let mut a = user("a");
        a.set_field("age", FieldType::Int, 30);
        let b = user("b");
        let ids = batch_create(&Context::background(), &mut drv, &BatchCreateSpec::new(vec![a, b])).unwrap();
        assert_eq!(ids, vec![Some(Value::Int(10)), Some(Value::Int(11))]);
        let Event::Exec { query, args } = &drv.events()[1] else {
            panic!("expected an exec, got {:?}", drv.events());
        };
        assert_eq!(query, "INSERT INTO `users` (`age`, `name`) VALUES (?, ?), (?, ?)");
        assert_eq!(
            args,
            &vec![Value::from(30), Value::from("a"), Value::Null, Value::from("b")]
        );
    }
}
