//! INSERT, UPDATE and DELETE statement builders.

use relgraph_core::Value;

use crate::builder::Builder;
use crate::dialect::Dialect;
use crate::error::SqlError;
use crate::predicate::{self, Predicate};
use crate::select::{Selector, Table};

// ---------------------------------------------------------------------------
// Conflict resolution
// ---------------------------------------------------------------------------

/// What an INSERT does when a row conflicts with an existing one.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    /// Keep the existing row.
    DoNothing,
    /// Overwrite the existing row with the inserted values.
    UpdateNewValues,
}

/// The `ON CONFLICT` (or MySQL `ON DUPLICATE KEY UPDATE`) clause.
#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    /// Conflict target columns. Postgres requires them for updates.
    pub target: Vec<String>,
    pub action: ConflictAction,
    /// Extra raw assignments appended to the update list.
    pub raw_sets: Vec<(String, String)>,
}

impl OnConflict {
    pub fn do_nothing() -> Self {
        OnConflict {
            target: Vec::new(),
            action: ConflictAction::DoNothing,
            raw_sets: Vec::new(),
        }
    }

    pub fn update_new_values() -> Self {
        OnConflict {
            target: Vec::new(),
            action: ConflictAction::UpdateNewValues,
            raw_sets: Vec::new(),
        }
    }

    pub fn target<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.target = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Appends `column = expr`, `expr` written as is.
    pub fn set_raw(mut self, column: &str, expr: &str) -> Self {
        self.raw_sets.push((column.to_string(), expr.to_string()));
        self
    }

    fn render(&self, b: &mut Builder, columns: &[String]) {
        match b.dialect() {
            Dialect::MySQL => {
                b.write(" ON DUPLICATE KEY UPDATE ");
                let mut sets: Vec<String> = Vec::new();
                let q = |c: &str| Dialect::MySQL.quote_ident(c);
                match self.action {
                    ConflictAction::DoNothing => {
                        if let Some(first) = columns.first() {
                            sets.push(format!("{} = {}", q(first), q(first)));
                        }
                    }
                    ConflictAction::UpdateNewValues => {
                        for c in columns {
                            sets.push(format!("{} = VALUES({})", q(c), q(c)));
                        }
                    }
                }
                for (c, expr) in &self.raw_sets {
                    sets.retain(|s| !s.starts_with(&format!("{} =", q(c))));
                    sets.push(format!("{} = {expr}", q(c)));
                }
                b.write(&sets.join(", "));
            }
            Dialect::SQLite | Dialect::Postgres => {
                b.write(" ON CONFLICT");
                if !self.target.is_empty() {
                    b.write(" (").idents(&self.target).write(")");
                }
                let updates: Vec<&String> = match self.action {
                    ConflictAction::DoNothing => Vec::new(),
                    ConflictAction::UpdateNewValues => columns
                        .iter()
                        .filter(|c| !self.target.contains(*c))
                        .collect(),
                };
                if updates.is_empty() && self.raw_sets.is_empty() {
                    b.write(" DO NOTHING");
                    return;
                }
                b.write(" DO UPDATE SET ");
                let mut first = true;
                for c in updates {
                    if !first {
                        b.write(", ");
                    }
                    first = false;
                    b.ident(c).write(" = excluded.").ident(c);
                }
                for (c, expr) in &self.raw_sets {
                    if !first {
                        b.write(", ");
                    }
                    first = false;
                    b.ident(c).write(" = ").write(expr);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// INSERT
// ---------------------------------------------------------------------------

/// An INSERT statement builder.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    dialect: Dialect,
    table: Table,
    columns: Vec<String>,
    values: Vec<Vec<Value>>,
    default_values: bool,
    returning: Vec<String>,
    conflict: Option<OnConflict>,
}

impl InsertBuilder {
    pub fn new(dialect: Dialect, table: &str) -> Self {
        InsertBuilder {
            dialect,
            table: Table::new(table),
            columns: Vec::new(),
            values: Vec::new(),
            default_values: false,
            returning: Vec::new(),
            conflict: None,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.table = self.table.schema(schema);
        self
    }

    /// Inserts a row of default values when no column is set.
    pub fn default_values(mut self) -> Self {
        self.default_values = true;
        self
    }

    /// Sets a column on the single row of the statement.
    pub fn set(&mut self, column: &str, value: Value) -> &mut Self {
        self.columns.push(column.to_string());
        match self.values.first_mut() {
            Some(row) => row.push(value),
            None => self.values.push(vec![value]),
        }
        self
    }

    /// Sets the column list of a multi-row statement.
    pub fn columns<S: AsRef<str>>(&mut self, columns: &[S]) -> &mut Self {
        self.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Appends a row of values.
    pub fn values(&mut self, row: Vec<Value>) -> &mut Self {
        self.values.push(row);
        self
    }

    pub fn row_count(&self) -> usize {
        self.values.len()
    }

    pub fn returning<S: AsRef<str>>(&mut self, columns: &[S]) -> &mut Self {
        self.returning = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Reports whether the rendered statement carries a RETURNING clause.
    pub fn has_returning(&self) -> bool {
        !self.returning.is_empty() && self.dialect.supports_returning()
    }

    pub fn on_conflict(&mut self, conflict: OnConflict) -> &mut Self {
        self.conflict = Some(conflict);
        self
    }

    /// Renders the statement. Fails when a row does not match the column
    /// list.
    pub fn query(&self) -> Result<(String, Vec<Value>), SqlError> {
        let mut b = Builder::new(self.dialect);
        b.write("INSERT INTO ").ident(&self.table.reference());
        if self.columns.is_empty() {
            if !self.default_values {
                return Err(SqlError::Build(format!(
                    "insert into {:?} has no columns",
                    self.table.name()
                )));
            }
            match self.dialect {
                Dialect::MySQL => b.write(" VALUES ()"),
                Dialect::SQLite | Dialect::Postgres => b.write(" DEFAULT VALUES"),
            };
        } else {
            b.write(" (").idents(&self.columns).write(") VALUES ");
            for (i, row) in self.values.iter().enumerate() {
                if row.len() != self.columns.len() {
                    return Err(SqlError::Build(format!(
                        "row {i} of insert into {:?} has {} values for {} columns",
                        self.table.name(),
                        row.len(),
                        self.columns.len()
                    )));
                }
                if i > 0 {
                    b.write(", ");
                }
                b.write("(").args(row).write(")");
            }
        }
        if let Some(conflict) = &self.conflict {
            conflict.render(&mut b, &self.columns);
        }
        if self.has_returning() {
            b.write(" RETURNING ").idents(&self.returning);
        }
        Ok(b.finish())
    }
}

// ---------------------------------------------------------------------------
// UPDATE
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Assignment {
    Set(Value),
    Add(Value),
}

/// An UPDATE statement builder. NULL assignments render before the others.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    dialect: Dialect,
    table: Table,
    nulls: Vec<String>,
    sets: Vec<(String, Assignment)>,
    predicate: Option<Predicate>,
}

impl UpdateBuilder {
    pub fn new(dialect: Dialect, table: &str) -> Self {
        UpdateBuilder {
            dialect,
            table: Table::new(table),
            nulls: Vec::new(),
            sets: Vec::new(),
            predicate: None,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.table = self.table.schema(schema);
        self
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// `column = value`.
    pub fn set(&mut self, column: &str, value: Value) -> &mut Self {
        self.sets.push((column.to_string(), Assignment::Set(value)));
        self
    }

    /// `column = COALESCE(column, 0) + value`.
    pub fn add(&mut self, column: &str, value: Value) -> &mut Self {
        self.sets.push((column.to_string(), Assignment::Add(value)));
        self
    }

    /// `column = NULL`.
    pub fn set_null(&mut self, column: &str) -> &mut Self {
        self.nulls.push(column.to_string());
        self
    }

    /// ANDs `p` with the current predicate.
    pub fn where_(&mut self, p: Predicate) -> &mut Self {
        self.predicate = Some(match self.predicate.take() {
            Some(current) => predicate::and(vec![current, p]),
            None => p,
        });
        self
    }

    /// Takes the predicate and table of a selector.
    pub fn from_select(&mut self, selector: &Selector) -> &mut Self {
        if let Some(p) = selector.p() {
            self.where_(p.clone());
        }
        if let Some(table) = selector.table() {
            self.table = Table::new(table.name()).schema(table.schema_name().unwrap_or(""));
        }
        self
    }

    /// Reports whether no column is assigned.
    pub fn is_empty(&self) -> bool {
        self.nulls.is_empty() && self.sets.is_empty()
    }

    /// Returns the assigned columns in render order.
    pub fn assigned_columns(&self) -> Vec<&str> {
        self.nulls
            .iter()
            .map(String::as_str)
            .chain(self.sets.iter().map(|(c, _)| c.as_str()))
            .collect()
    }

    pub fn query(&self) -> (String, Vec<Value>) {
        let mut b = Builder::new(self.dialect);
        b.write("UPDATE ").ident(&self.table.reference()).write(" SET ");
        let mut first = true;
        for c in &self.nulls {
            if !first {
                b.write(", ");
            }
            first = false;
            b.ident(c).write(" = NULL");
        }
        for (c, assignment) in &self.sets {
            if !first {
                b.write(", ");
            }
            first = false;
            b.ident(c).write(" = ");
            match assignment {
                Assignment::Set(v) => {
                    b.arg(v.clone());
                }
                Assignment::Add(v) => {
                    b.write("COALESCE(").ident(c).write(", 0) + ").arg(v.clone());
                }
            }
        }
        if let Some(p) = &self.predicate {
            b.write(" WHERE ");
            p.render(&mut b, 0);
        }
        b.finish()
    }
}

// ---------------------------------------------------------------------------
// DELETE
// ---------------------------------------------------------------------------

/// A DELETE statement builder.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    dialect: Dialect,
    table: Table,
    predicate: Option<Predicate>,
}

impl DeleteBuilder {
    pub fn new(dialect: Dialect, table: &str) -> Self {
        DeleteBuilder {
            dialect,
            table: Table::new(table),
            predicate: None,
        }
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.table = self.table.schema(schema);
        self
    }

    pub fn where_(&mut self, p: Predicate) -> &mut Self {
        self.predicate = Some(match self.predicate.take() {
            Some(current) => predicate::and(vec![current, p]),
            None => p,
        });
        self
    }

    /// Takes the predicate and table of a selector.
    pub fn from_select(&mut self, selector: &Selector) -> &mut Self {
        if let Some(p) = selector.p() {
            self.where_(p.clone());
        }
        if let Some(table) = selector.table() {
            self.table = Table::new(table.name()).schema(table.schema_name().unwrap_or(""));
        }
        self
    }

    pub fn query(&self) -> (String, Vec<Value>) {
        let mut b = Builder::new(self.dialect);
        b.write("DELETE FROM ").ident(&self.table.reference());
        if let Some(p) = &self.predicate {
            b.write(" WHERE ");
            p.render(&mut b, 0);
        }
        b.finish()
    }
}
