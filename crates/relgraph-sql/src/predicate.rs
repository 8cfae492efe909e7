//! Boolean predicates for WHERE clauses.
//!
//! A [`Predicate`] is a tree rendered on demand. Column names are written
//! as given (qualify them with [`Selector::c`](crate::select::Selector::c)
//! or [`Table::c`](crate::select::Table::c) when needed) and quoted at
//! render time. Nested `AND`/`OR` groups with more than one operand are
//! wrapped in parentheses; the top level is not.

use relgraph_core::Value;

use crate::builder::{Builder, Op};
use crate::dialect::Dialect;
use crate::select::Selector;

/// The right side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A bound argument.
    Arg(Value),
    /// Another column.
    Column(String),
}

/// A boolean SQL predicate.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// `column op operand`.
    Compare {
        column: String,
        op: Op,
        right: Operand,
    },
    /// `column` or `NOT column`, the short form of comparing with a boolean.
    Bool { column: String, value: bool },
    /// `column [NOT] IN (v1, v2, ...)`.
    InValues {
        column: String,
        negate: bool,
        values: Vec<Value>,
    },
    /// `column [NOT] IN (SELECT ...)`.
    InQuery {
        column: String,
        negate: bool,
        query: Box<Selector>,
    },
    /// `column IS [NOT] NULL`.
    Null { column: String, negate: bool },
    /// `LOWER(column) = ?` with the value lower-cased.
    EqualFold { column: String, value: String },
    /// Case-insensitive substring match, rendered per dialect.
    ContainsFold { column: String, value: String },
    /// `EXISTS (SELECT ...)`.
    Exists(Box<Selector>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

fn compare(column: &str, op: Op, value: Value) -> Predicate {
    Predicate::Compare {
        column: column.to_string(),
        op,
        right: Operand::Arg(value),
    }
}

/// `column = value`. Boolean values render without an argument.
pub fn eq(column: &str, value: impl Into<Value>) -> Predicate {
    match value.into() {
        Value::Bool(b) => Predicate::Bool {
            column: column.to_string(),
            value: b,
        },
        v => compare(column, Op::Eq, v),
    }
}

pub fn neq(column: &str, value: impl Into<Value>) -> Predicate {
    compare(column, Op::Neq, value.into())
}

pub fn gt(column: &str, value: impl Into<Value>) -> Predicate {
    compare(column, Op::Gt, value.into())
}

pub fn gte(column: &str, value: impl Into<Value>) -> Predicate {
    compare(column, Op::Gte, value.into())
}

pub fn lt(column: &str, value: impl Into<Value>) -> Predicate {
    compare(column, Op::Lt, value.into())
}

pub fn lte(column: &str, value: impl Into<Value>) -> Predicate {
    compare(column, Op::Lte, value.into())
}

/// Compares a column with an arbitrary operand.
pub fn compare_op(column: &str, op: Op, right: Operand) -> Predicate {
    Predicate::Compare {
        column: column.to_string(),
        op,
        right,
    }
}

/// `column IN (values...)`.
pub fn in_values(column: &str, values: Vec<Value>) -> Predicate {
    Predicate::InValues {
        column: column.to_string(),
        negate: false,
        values,
    }
}

/// `column NOT IN (values...)`.
pub fn not_in_values(column: &str, values: Vec<Value>) -> Predicate {
    Predicate::InValues {
        column: column.to_string(),
        negate: true,
        values,
    }
}

/// `column IN (SELECT ...)`.
pub fn in_query(column: &str, query: Selector) -> Predicate {
    Predicate::InQuery {
        column: column.to_string(),
        negate: false,
        query: Box::new(query),
    }
}

pub fn is_null(column: &str) -> Predicate {
    Predicate::Null {
        column: column.to_string(),
        negate: false,
    }
}

pub fn not_null(column: &str) -> Predicate {
    Predicate::Null {
        column: column.to_string(),
        negate: true,
    }
}

pub fn has_prefix(column: &str, prefix: &str) -> Predicate {
    compare(column, Op::Like, Value::Text(format!("{prefix}%")))
}

pub fn has_suffix(column: &str, suffix: &str) -> Predicate {
    compare(column, Op::Like, Value::Text(format!("%{suffix}")))
}

pub fn contains(column: &str, substr: &str) -> Predicate {
    compare(column, Op::Like, Value::Text(format!("%{substr}%")))
}

pub fn equal_fold(column: &str, value: &str) -> Predicate {
    Predicate::EqualFold {
        column: column.to_string(),
        value: value.to_string(),
    }
}

pub fn contains_fold(column: &str, substr: &str) -> Predicate {
    Predicate::ContainsFold {
        column: column.to_string(),
        value: substr.to_string(),
    }
}

pub fn exists(query: Selector) -> Predicate {
    Predicate::Exists(Box::new(query))
}

pub fn and(preds: Vec<Predicate>) -> Predicate {
    Predicate::And(preds)
}

pub fn or(preds: Vec<Predicate>) -> Predicate {
    Predicate::Or(preds)
}

pub fn not(pred: Predicate) -> Predicate {
    Predicate::Not(Box::new(pred))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

impl Predicate {
    /// Renders the predicate into `b`. `depth` is the nesting level; groups
    /// below the top level are parenthesized.
    pub(crate) fn render(&self, b: &mut Builder, depth: usize) {
        match self {
            Predicate::Compare { column, op, right } => {
                b.ident(column).op(*op);
                match right {
                    Operand::Arg(v) => b.arg(v.clone()),
                    Operand::Column(c) => b.ident(c),
                };
            }
            Predicate::Bool { column, value } => {
                if !value {
                    b.write("NOT ");
                }
                b.ident(column);
            }
            Predicate::InValues {
                column,
                negate,
                values,
            } => {
                if values.is_empty() {
                    // An empty set matches nothing, its negation everything.
                    b.write(if *negate { "TRUE" } else { "FALSE" });
                    return;
                }
                b.ident(column)
                    .op(if *negate { Op::NotIn } else { Op::In })
                    .write("(")
                    .args(values)
                    .write(")");
            }
            Predicate::InQuery {
                column,
                negate,
                query,
            } => {
                b.ident(column)
                    .op(if *negate { Op::NotIn } else { Op::In })
                    .write("(");
                query.render(b);
                b.write(")");
            }
            Predicate::Null { column, negate } => {
                b.ident(column)
                    .write(if *negate { " IS NOT NULL" } else { " IS NULL" });
            }
            Predicate::EqualFold { column, value } => {
                b.write("LOWER(")
                    .ident(column)
                    .write(") = ")
                    .arg(Value::Text(value.to_lowercase()));
            }
            Predicate::ContainsFold { column, value } => {
                let pattern = Value::Text(format!("%{}%", value.to_lowercase()));
                match b.dialect() {
                    Dialect::MySQL => {
                        b.ident(column)
                            .write(" COLLATE utf8mb4_general_ci LIKE ")
                            .arg(pattern);
                    }
                    Dialect::Postgres => {
                        b.ident(column).write(" ILIKE ").arg(pattern);
                    }
                    Dialect::SQLite => {
                        b.write("LOWER(").ident(column).write(") LIKE ").arg(pattern);
                    }
                }
            }
            Predicate::Exists(query) => {
                b.write("EXISTS (");
                query.render(b);
                b.write(")");
            }
            Predicate::And(preds) => render_group(b, preds, "AND", depth),
            Predicate::Or(preds) => render_group(b, preds, "OR", depth),
            Predicate::Not(pred) => {
                b.write("NOT (");
                pred.render(b, 0);
                b.write(")");
            }
        }
    }

    /// Renders the predicate on its own.
    pub fn query(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut b = Builder::new(dialect);
        self.render(&mut b, 0);
        b.finish()
    }
}

fn render_group(b: &mut Builder, preds: &[Predicate], op: &str, depth: usize) {
    match preds {
        [] => {
            b.write(if op == "AND" { "TRUE" } else { "FALSE" });
        }
        [only] => only.render(b, depth),
        _ => {
            if depth > 0 {
                b.write("(");
            }
            for (i, p) in preds.iter().enumerate() {
                if i > 0 {
                    b.write(" ").write(op).write(" ");
                }
                p.render(b, depth + 1);
            }
            if depth > 0 {
                b.write(")");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(p: &Predicate, d: Dialect) -> (String, Vec<Value>) {
        p.query(d)
    }

    #[test]
    fn comparisons() {
        let (q, args) = render(&eq("name", "a8m"), Dialect::MySQL);
        assert_eq!(q, "`name` = ?");
        assert_eq!(args, vec![Value::from("a8m")]);
        let (q, _) = render(&gte("age", 30), Dialect::Postgres);
        assert_eq!(q, "\"age\" >= $1");
        let (q, args) = render(&eq("active", true), Dialect::SQLite);
        assert_eq!(q, "`active`");
        assert!(args.is_empty());
        let (q, _) = render(&eq("active", false), Dialect::SQLite);
        assert_eq!(q, "NOT `active`");
    }

    #[test]
    fn nested_groups_are_wrapped() {
        let p = and(vec![
            eq("foo", "bar"),
            or(vec![eq("name", "foo"), eq("name", "baz")]),
        ]);
        let (q, args) = render(&p, Dialect::Postgres);
        assert_eq!(q, "\"foo\" = $1 AND (\"name\" = $2 OR \"name\" = $3)");
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn single_operand_group_is_not_wrapped() {
        let p = and(vec![eq("a", 1), and(vec![eq("b", 2)])]);
        let (q, _) = render(&p, Dialect::MySQL);
        assert_eq!(q, "`a` = ? AND `b` = ?");
    }

    #[test]
    fn like_patterns() {
        let (_, args) = render(&has_prefix("name", "a"), Dialect::MySQL);
        assert_eq!(args, vec![Value::from("a%")]);
        let (_, args) = render(&has_suffix("name", "a"), Dialect::MySQL);
        assert_eq!(args, vec![Value::from("%a")]);
        let (q, args) = render(&contains("name", "a"), Dialect::MySQL);
        assert_eq!(q, "`name` LIKE ?");
        assert_eq!(args, vec![Value::from("%a%")]);
    }

    #[test]
    fn fold_predicates_per_dialect() {
        let (q, args) = render(&equal_fold("name", "A8M"), Dialect::SQLite);
        assert_eq!(q, "LOWER(`name`) = ?");
        assert_eq!(args, vec![Value::from("a8m")]);

        let p = contains_fold("name", "A");
        assert_eq!(render(&p, Dialect::Postgres).0, "\"name\" ILIKE $1");
        assert_eq!(render(&p, Dialect::SQLite).0, "LOWER(`name`) LIKE ?");
        assert_eq!(
            render(&p, Dialect::MySQL).0,
            "`name` COLLATE utf8mb4_general_ci LIKE ?"
        );
    }

    #[test]
    fn null_in_and_not() {
        let p = and(vec![
            is_null("a"),
            not_null("b"),
            in_values("id", vec![Value::from(1), Value::from(2)]),
        ]);
        let (q, args) = render(&p, Dialect::Postgres);
        assert_eq!(q, "\"a\" IS NULL AND \"b\" IS NOT NULL AND \"id\" IN ($1, $2)");
        assert_eq!(args.len(), 2);

        let (q, _) = render(&not(or(vec![eq("a", 1), eq("b", 2)])), Dialect::MySQL);
        assert_eq!(q, "NOT (`a` = ? OR `b` = ?)");
    }

    #[test]
    fn empty_groups_are_constants() {
        assert_eq!(render(&and(vec![]), Dialect::SQLite).0, "TRUE");
        assert_eq!(render(&or(vec![]), Dialect::Postgres).0, "FALSE");
        let (q, _) = render(&and(vec![eq("a", 1), or(vec![])]), Dialect::MySQL);
        assert_eq!(q, "`a` = ? AND FALSE");
    }

    #[test]
    fn empty_in_set() {
        assert_eq!(render(&in_values("id", vec![]), Dialect::MySQL).0, "FALSE");
        assert_eq!(render(&not_in_values("id", vec![]), Dialect::MySQL).0, "TRUE");
    }
}
