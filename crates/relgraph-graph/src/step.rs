//! Path steps and neighbor resolution.
//!
//! A [`Step`] describes one hop over an edge: the source vertex (a single
//! id or a set produced by a selector), the edge storage and the target
//! table. The resolvers turn a step into a selector over the neighbors, or
//! constrain an existing selector to vertices that have neighbors.
//!
//! The edge storage decides the shape of the statement:
//!
//! - M2M: through the join table, `columns[0]` holding the owner side.
//! - M2O, and inverse O2O: the FK sits on the source row.
//! - O2M, and non-inverse O2O: the FK sits on the target row.

use relgraph_core::{Rel, Value};
use relgraph_sql::predicate::{eq, in_query, not_null};
use relgraph_sql::{Dialect, Selector, Table};

use crate::error::GraphError;
use crate::spec::EdgeColumns;

/// Alias given to the first joined view.
const JOIN_ALIAS: &str = "t1";

/// The source of a step.
#[derive(Debug, Clone)]
pub enum Vertex {
    /// One vertex, by id.
    Value(Value),
    /// The vertices selected by a pre-processed step.
    Set(Selector),
}

#[derive(Debug, Clone, Default)]
pub struct StepFrom {
    pub vertex: Option<Vertex>,
    pub table: String,
    /// Column to join with, usually the id.
    pub column: String,
}

#[derive(Debug, Clone, Default)]
pub struct StepEdge {
    pub rel: Rel,
    pub schema: String,
    /// Table holding the edge columns.
    pub table: String,
    /// The FK column, or the two join-table columns of M2M.
    pub columns: EdgeColumns,
    pub inverse: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StepTo {
    pub table: String,
    pub schema: String,
    /// Column to join with, usually the id.
    pub column: String,
}

/// One traversal hop.
#[derive(Debug, Clone, Default)]
pub struct Step {
    pub from: StepFrom,
    pub edge: StepEdge,
    pub to: StepTo,
}

impl Step {
    pub fn new() -> Self {
        Step::default()
    }

    /// Sets the source table and join column, without a vertex.
    pub fn from(mut self, table: &str, column: &str) -> Self {
        self.from.table = table.to_string();
        self.from.column = column.to_string();
        self
    }

    /// Sets the source to a single vertex.
    pub fn from_value(self, table: &str, column: &str, v: impl Into<Value>) -> Self {
        let mut step = self.from(table, column);
        step.from.vertex = Some(Vertex::Value(v.into()));
        step
    }

    /// Sets the source to the vertices selected by `set`.
    pub fn from_set(self, table: &str, column: &str, set: Selector) -> Self {
        let mut step = self.from(table, column);
        step.from.vertex = Some(Vertex::Set(set));
        step
    }

    pub fn to(mut self, table: &str, column: &str) -> Self {
        self.to.table = table.to_string();
        self.to.column = column.to_string();
        self
    }

    pub fn to_schema(mut self, schema: &str) -> Self {
        self.to.schema = schema.to_string();
        self
    }

    pub fn edge<S: AsRef<str>>(mut self, rel: Rel, inverse: bool, table: &str, columns: &[S]) -> Self {
        self.edge.rel = rel;
        self.edge.inverse = inverse;
        self.edge.table = table.to_string();
        self.edge.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn edge_schema(mut self, schema: &str) -> Self {
        self.edge.schema = schema.to_string();
        self
    }

    fn to_table(&self) -> Table {
        Table::new(&self.to.table).schema(&self.to.schema)
    }

    fn edge_table(&self) -> Table {
        Table::new(&self.edge.table).schema(&self.edge.schema)
    }

    /// Classifies the edge storage, checking the column count.
    fn kind(&self) -> Result<Storage, GraphError> {
        let cols = &self.edge.columns;
        let storage = match self.edge.rel {
            Rel::M2M => Storage::JoinTable,
            Rel::M2O => Storage::SourceFk,
            Rel::O2O if self.edge.inverse => Storage::SourceFk,
            Rel::O2O | Rel::O2M => Storage::TargetFk,
            Rel::Unknown => {
                return Err(GraphError::Invalid(format!(
                    "step over table {:?} has an unknown relation",
                    self.edge.table
                )))
            }
        };
        let want = if storage == Storage::JoinTable { 2 } else { 1 };
        if cols.len() != want {
            return Err(GraphError::Invalid(format!(
                "{} step over table {:?} requires {want} column(s), got {}",
                self.edge.rel,
                self.edge.table,
                cols.len()
            )));
        }
        Ok(storage)
    }

    /// Join-table columns `(pk1, pk2)`: `pk1` points at the target, `pk2`
    /// at the source.
    fn join_columns(&self) -> (&str, &str) {
        let cols = &self.edge.columns;
        if self.edge.inverse {
            (&cols[0], &cols[1])
        } else {
            (&cols[1], &cols[0])
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    JoinTable,
    SourceFk,
    TargetFk,
}

// ---------------------------------------------------------------------------
// Resolvers
// ---------------------------------------------------------------------------

/// Returns a selector over the neighbors of the single source vertex.
pub fn neighbors(dialect: Dialect, step: &Step) -> Result<Selector, GraphError> {
    let storage = step.kind()?;
    let v = match &step.from.vertex {
        Some(Vertex::Value(v)) => v.clone(),
        Some(Vertex::Set(_)) => return set_neighbors(dialect, step),
        None => {
            return Err(GraphError::Invalid(format!(
                "step from table {:?} has no source vertex",
                step.from.table
            )))
        }
    };
    let to = step.to_table();
    let mut q = Selector::from_table(dialect, to.clone());
    match storage {
        Storage::JoinTable => {
            let (pk1, pk2) = step.join_columns();
            let join = step.edge_table();
            let mut matches = Selector::from_table(dialect, join.clone());
            matches
                .select(&[join.c(pk1)])
                .where_(eq(&join.c(pk2), v))
                .alias(JOIN_ALIAS);
            let on = matches.c(pk1);
            q.join(matches).on(&to.c(&step.to.column), &on);
        }
        Storage::SourceFk => {
            let fk = &step.edge.columns[0];
            let mut t2 = Selector::from_table(dialect, step.edge_table());
            t2.select(&[fk])
                .where_(eq(&step.from.column, v))
                .alias(JOIN_ALIAS);
            let on = t2.c(fk);
            q.join(t2).on(&to.c(&step.to.column), &on);
        }
        Storage::TargetFk => {
            q.where_(eq(&step.edge.columns[0], v));
        }
    }
    Ok(q)
}

/// Returns a selector over the neighbors of every vertex in the source set.
pub fn set_neighbors(dialect: Dialect, step: &Step) -> Result<Selector, GraphError> {
    let storage = step.kind()?;
    let mut set = match &step.from.vertex {
        Some(Vertex::Set(set)) => set.clone(),
        _ => {
            return Err(GraphError::Invalid(format!(
                "step from table {:?} has no source set",
                step.from.table
            )))
        }
    };
    let to = step.to_table();
    let mut q = Selector::from_table(dialect, to.clone());
    match storage {
        Storage::JoinTable => {
            let (pk1, pk2) = step.join_columns();
            let from_col = set.c(&step.from.column);
            set.select(&[from_col]);
            alias_set(&mut set);
            let on_set = set.c(&step.from.column);
            let join = step.edge_table();
            let mut matches = Selector::from_table(dialect, join.clone());
            matches.select(&[join.c(pk1)]);
            matches.join(set).on(&join.c(pk2), &on_set);
            matches.alias(JOIN_ALIAS);
            let on = matches.c(pk1);
            q.join(matches).on(&to.c(&step.to.column), &on);
        }
        Storage::SourceFk => {
            let fk = &step.edge.columns[0];
            let fk_col = set.c(fk);
            set.select(&[fk_col]);
            alias_set(&mut set);
            let on = set.c(fk);
            q.join(set).on(&to.c(&step.to.column), &on);
        }
        Storage::TargetFk => {
            let from_col = set.c(&step.from.column);
            set.select(&[from_col]);
            alias_set(&mut set);
            let on = set.c(&step.from.column);
            q.join(set).on(&to.c(&step.edge.columns[0]), &on);
        }
    }
    Ok(q)
}

/// Keeps the alias of a set that has one, or names it as the first join.
fn alias_set(set: &mut Selector) {
    if set.alias_name().is_none() {
        set.alias(JOIN_ALIAS);
    }
}

/// Restricts `q` to vertices with at least one neighbor over the edge.
pub fn has_neighbors(q: &mut Selector, step: &Step) -> Result<(), GraphError> {
    let dialect = q.dialect();
    match step.kind()? {
        Storage::JoinTable => {
            let pk1 = if step.edge.inverse {
                &step.edge.columns[1]
            } else {
                &step.edge.columns[0]
            };
            let join = step.edge_table();
            let mut matches = Selector::from_table(dialect, join.clone());
            matches.select(&[join.c(pk1)]);
            let column = q.c(&step.from.column);
            q.where_(in_query(&column, matches));
        }
        Storage::SourceFk => {
            let column = q.c(&step.edge.columns[0]);
            q.where_(not_null(&column));
        }
        Storage::TargetFk => {
            let edge = step.edge_table();
            let fk = edge.c(&step.edge.columns[0]);
            let mut matches = Selector::from_table(dialect, edge);
            matches.select(&[fk.as_str()]).where_(not_null(&fk));
            let column = q.c(&step.from.column);
            q.where_(in_query(&column, matches));
        }
    }
    Ok(())
}

/// Restricts `q` to vertices with at least one neighbor matching `pred`.
/// `pred` filters a selector over the target table.
pub fn has_neighbors_with<F>(q: &mut Selector, step: &Step, pred: F) -> Result<(), GraphError>
where
    F: FnOnce(&mut Selector) -> Result<(), GraphError>,
{
    let dialect = q.dialect();
    match step.kind()? {
        Storage::JoinTable => {
            let (pk1, pk2) = step.join_columns();
            let to = step.to_table().alias(JOIN_ALIAS);
            let edge = step.edge_table();
            let mut join = Selector::from_table(dialect, edge.clone());
            join.select(&[edge.c(pk2)])
                .join(to.clone())
                .on(&edge.c(pk1), &to.c(&step.to.column));
            let mut matches = Selector::from_table(dialect, to);
            pred(&mut matches)?;
            join.set_p(matches.take_p());
            let column = q.c(&step.from.column);
            q.where_(in_query(&column, join));
        }
        Storage::SourceFk => {
            let to = step.to_table();
            let mut matches = Selector::from_table(dialect, to.clone());
            matches.select(&[to.c(&step.to.column)]);
            pred(&mut matches)?;
            let column = q.c(&step.edge.columns[0]);
            q.where_(in_query(&column, matches));
        }
        Storage::TargetFk => {
            let edge = step.edge_table();
            let mut matches = Selector::from_table(dialect, edge.clone());
            matches.select(&[edge.c(&step.edge.columns[0])]);
            pred(&mut matches)?;
            let column = q.c(&step.from.column);
            q.where_(in_query(&column, matches));
        }
    }
    Ok(())
}
