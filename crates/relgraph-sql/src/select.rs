//! SELECT statements, tables and joins.
//!
//! A [`Selector`] doubles as a table view: it can be the source of another
//! selector, joined into one, or embedded as an `IN (SELECT ...)` operand.
//! Joined views without an alias are named `t1`, `t2`, ... by their
//! position in the join list.

use relgraph_core::Value;

use crate::builder::Builder;
use crate::dialect::Dialect;
use crate::predicate::{self, Predicate};

/// Value used as LIMIT when only an OFFSET is requested.
pub const MAX_LIMIT: i64 = i32::MAX as i64;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// A table reference, optionally schema-qualified and aliased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    schema: Option<String>,
    alias: Option<String>,
}

impl Table {
    pub fn new(name: &str) -> Self {
        Table {
            name: name.to_string(),
            schema: None,
            alias: None,
        }
    }

    /// Sets the schema (database) the table lives in. Empty means none.
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = (!schema.is_empty()).then(|| schema.to_string());
        self
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Returns the column qualified by the alias, or by the (schema-qualified)
    /// table name.
    pub fn c(&self, column: &str) -> String {
        if column.contains('.') {
            return column.to_string();
        }
        match (&self.alias, &self.schema) {
            (Some(alias), _) => format!("{alias}.{column}"),
            (None, Some(schema)) => format!("{schema}.{}.{column}", self.name),
            (None, None) => format!("{}.{column}", self.name),
        }
    }

    /// The table reference as it appears in FROM, without the alias.
    pub fn reference(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }

    fn render(&self, b: &mut Builder) {
        b.ident(&self.reference());
        if let Some(alias) = &self.alias {
            b.write(" AS ").ident(alias);
        }
    }
}

/// Anything that can appear in FROM or JOIN.
#[derive(Debug, Clone)]
pub enum TableView {
    Table(Table),
    Select(Box<Selector>),
}

impl TableView {
    fn alias(&self) -> Option<&str> {
        match self {
            TableView::Table(t) => t.alias.as_deref(),
            TableView::Select(s) => s.alias.as_deref(),
        }
    }

    fn set_alias(&mut self, alias: String) {
        match self {
            TableView::Table(t) => t.alias = Some(alias),
            TableView::Select(s) => s.alias = Some(alias),
        }
    }

    fn render(&self, b: &mut Builder) {
        match self {
            TableView::Table(t) => t.render(b),
            TableView::Select(s) => {
                b.write("(");
                s.render(b);
                b.write(")");
                if let Some(alias) = &s.alias {
                    b.write(" AS ").ident(alias);
                }
            }
        }
    }
}

impl From<Table> for TableView {
    fn from(t: Table) -> Self {
        TableView::Table(t)
    }
}

impl From<Selector> for TableView {
    fn from(s: Selector) -> Self {
        TableView::Select(Box::new(s))
    }
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Join {
    view: TableView,
    on: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderTerm {
    column: String,
    desc: bool,
}

/// A SELECT statement builder.
#[derive(Debug, Clone)]
pub struct Selector {
    dialect: Dialect,
    columns: Vec<String>,
    from: Option<TableView>,
    joins: Vec<Join>,
    predicate: Option<Predicate>,
    distinct: bool,
    order: Vec<OrderTerm>,
    limit: Option<i64>,
    offset: Option<i64>,
    alias: Option<String>,
}

impl Selector {
    /// Starts a `SELECT *` statement.
    pub fn new(dialect: Dialect) -> Self {
        Selector {
            dialect,
            columns: Vec::new(),
            from: None,
            joins: Vec::new(),
            predicate: None,
            distinct: false,
            order: Vec::new(),
            limit: None,
            offset: None,
            alias: None,
        }
    }

    /// Starts a `SELECT *` statement from `table`.
    pub fn from_table(dialect: Dialect, table: Table) -> Self {
        let mut s = Selector::new(dialect);
        s.from(table);
        s
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Replaces the projection. An empty list selects `*`.
    pub fn select<S: AsRef<str>>(&mut self, columns: &[S]) -> &mut Self {
        self.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn from(&mut self, view: impl Into<TableView>) -> &mut Self {
        self.from = Some(view.into());
        self
    }

    /// Returns the FROM table, if the source is a plain table.
    pub fn table(&self) -> Option<&Table> {
        match &self.from {
            Some(TableView::Table(t)) => Some(t),
            _ => None,
        }
    }

    /// Sets the alias used when this selector is a sub-query.
    pub fn alias(&mut self, alias: &str) -> &mut Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn alias_name(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Appends a JOIN. Views without an alias get `t{n}`, `n` being the
    /// 1-based position in the join list.
    pub fn join(&mut self, view: impl Into<TableView>) -> &mut Self {
        let mut view = view.into();
        if view.alias().is_none() {
            view.set_alias(format!("t{}", self.joins.len() + 1));
        }
        self.joins.push(Join { view, on: None });
        self
    }

    /// Sets the ON condition of the last join.
    pub fn on(&mut self, left: &str, right: &str) -> &mut Self {
        if let Some(join) = self.joins.last_mut() {
            join.on = Some((left.to_string(), right.to_string()));
        }
        self
    }

    /// Returns the column qualified by this selector: its alias, or its FROM
    /// table, or the alias of its FROM sub-query. Qualified columns are
    /// returned unchanged.
    pub fn c(&self, column: &str) -> String {
        if column.contains('.') {
            return column.to_string();
        }
        if let Some(alias) = &self.alias {
            return format!("{alias}.{column}");
        }
        match &self.from {
            Some(TableView::Table(t)) => t.c(column),
            Some(TableView::Select(s)) => match &s.alias {
                Some(alias) => format!("{alias}.{column}"),
                None => column.to_string(),
            },
            None => column.to_string(),
        }
    }

    /// Qualifies every column with [`Selector::c`].
    pub fn columns<S: AsRef<str>>(&self, columns: &[S]) -> Vec<String> {
        columns.iter().map(|c| self.c(c.as_ref())).collect()
    }

    /// ANDs `p` with the current predicate.
    pub fn where_(&mut self, p: Predicate) -> &mut Self {
        self.predicate = Some(match self.predicate.take() {
            Some(current) => predicate::and(vec![current, p]),
            None => p,
        });
        self
    }

    /// Returns the current predicate.
    pub fn p(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Replaces the current predicate.
    pub fn set_p(&mut self, p: Option<Predicate>) -> &mut Self {
        self.predicate = p;
        self
    }

    /// Takes the current predicate out of the selector.
    pub fn take_p(&mut self) -> Option<Predicate> {
        self.predicate.take()
    }

    pub fn distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    pub fn order_asc(&mut self, column: &str) -> &mut Self {
        self.order.push(OrderTerm {
            column: column.to_string(),
            desc: false,
        });
        self
    }

    pub fn order_desc(&mut self, column: &str) -> &mut Self {
        self.order.push(OrderTerm {
            column: column.to_string(),
            desc: true,
        });
        self
    }

    pub fn clear_order(&mut self) -> &mut Self {
        self.order.clear();
        self
    }

    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: i64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Projects `COUNT(columns)`, or `COUNT(DISTINCT columns)`, or
    /// `COUNT(*)` when `columns` is empty.
    pub fn count<S: AsRef<str>>(&mut self, columns: &[S], distinct: bool) -> &mut Self {
        let inner = if columns.is_empty() {
            "*".to_string()
        } else {
            columns
                .iter()
                .map(|c| self.dialect.quote_ident(c.as_ref()))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let expr = if distinct {
            format!("COUNT(DISTINCT {inner})")
        } else {
            format!("COUNT({inner})")
        };
        self.columns = vec![expr];
        self.distinct = false;
        self
    }

    pub(crate) fn render(&self, b: &mut Builder) {
        b.write("SELECT ");
        if self.distinct {
            b.write("DISTINCT ");
        }
        if self.columns.is_empty() {
            b.write("*");
        } else {
            b.idents(&self.columns);
        }
        if let Some(from) = &self.from {
            b.write(" FROM ");
            from.render(b);
        }
        for join in &self.joins {
            b.write(" JOIN ");
            join.view.render(b);
            if let Some((left, right)) = &join.on {
                b.write(" ON ").ident(left).write(" = ").ident(right);
            }
        }
        if let Some(p) = &self.predicate {
            b.write(" WHERE ");
            p.render(b, 0);
        }
        if !self.order.is_empty() {
            b.write(" ORDER BY ");
            for (i, term) in self.order.iter().enumerate() {
                if i > 0 {
                    b.write(", ");
                }
                b.ident(&term.column);
                if term.desc {
                    b.write(" DESC");
                }
            }
        }
        if let Some(limit) = self.limit {
            b.write(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            b.write(&format!(" OFFSET {offset}"));
        }
    }

    /// Renders the statement.
    pub fn query(&self) -> (String, Vec<Value>) {
        let mut b = Builder::new(self.dialect);
        self.render(&mut b);
        b.finish()
    }
}
