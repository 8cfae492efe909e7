//! A portable predicate language over the node graph.
//!
//! Expressions are built from fields, edges and values and composed with
//! logical connectives and a small set of builtin functions:
//!
//! ```text
//! name == "a8m" && has_edge(pets, age > 1)
//! ```
//!
//! The tree is storage independent. The relgraph-graph crate compiles it to
//! SQL predicates against a schema of nodes and edges.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

// ---------------------------------------------------------------------------
// Operators and functions
// ---------------------------------------------------------------------------

/// Operator of a unary, binary or n-ary expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    And,
    Or,
    Not,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::And => "&&",
            Op::Or => "||",
            Op::Not => "!",
            Op::Eq => "==",
            Op::Neq => "!=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::In => "in",
            Op::NotIn => "not in",
        };
        f.write_str(s)
    }
}

/// A callable function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Func {
    /// Case-insensitive equality.
    EqualFold,
    /// Substring match.
    Contains,
    /// Case-insensitive substring match.
    ContainsFold,
    /// Prefix match.
    HasPrefix,
    /// Suffix match.
    HasSuffix,
    /// Edge existence, optionally with conditions on the neighbors.
    HasEdge,
    /// Applies a storage-specific selector function carried as a
    /// [`Foreign`] argument.
    Selector,
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Func::EqualFold => "equal_fold",
            Func::Contains => "contains",
            Func::ContainsFold => "contains_fold",
            Func::HasPrefix => "has_prefix",
            Func::HasSuffix => "has_suffix",
            Func::HasEdge => "has_edge",
            Func::Selector => "func_selector",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// An opaque payload carried through the tree for a specific backend.
#[derive(Clone)]
pub struct Foreign(pub Arc<dyn Any + Send + Sync>);

impl Foreign {
    /// Returns the payload if it is of type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Foreign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Foreign(..)")
    }
}

/// An expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// `x op y`.
    Binary {
        op: Op,
        x: Box<Expr>,
        y: Box<Expr>,
    },
    /// `op(x)`. Only [`Op::Not`] is unary.
    Unary { op: Op, x: Box<Expr> },
    /// `(x op y op ...)` for [`Op::And`] and [`Op::Or`].
    Nary { op: Op, xs: Vec<Expr> },
    /// `func(args...)`.
    Call { func: Func, args: Vec<Expr> },
    /// A node field.
    Field(String),
    /// A named edge of the node.
    Edge(String),
    /// A single value.
    Value(Value),
    /// A list of values, the right side of `in` and `not in`.
    Values(Vec<Value>),
    /// The typed nil sentinel. Comparing a field to it tests for NULL.
    Nil,
    /// Backend-specific payload.
    Foreign(Foreign),
}

impl Expr {
    /// Returns the logical negation of this predicate.
    pub fn negate(self) -> Expr {
        not(self)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Binary { op, x, y } => write!(f, "{x} {op} {y}"),
            Expr::Unary { op, x } => write!(f, "{op}({x})"),
            Expr::Nary { op, xs } => {
                f.write_str("(")?;
                for (i, x) in xs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {op} ")?;
                    }
                    write!(f, "{x}")?;
                }
                f.write_str(")")
            }
            Expr::Call { func, args } => {
                write!(f, "{func}(")?;
                for (i, x) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{x}")?;
                }
                f.write_str(")")
            }
            Expr::Field(name) | Expr::Edge(name) => f.write_str(name),
            Expr::Value(v) => write_json(f, v),
            Expr::Values(vs) => match serde_json::to_string(vs) {
                Ok(s) => f.write_str(&s),
                Err(_) => write!(f, "{vs:?}"),
            },
            Expr::Nil => f.write_str("nil"),
            Expr::Foreign(_) => f.write_str("func"),
        }
    }
}

fn write_json(f: &mut fmt::Formatter<'_>, v: &Value) -> fmt::Result {
    match serde_json::to_string(v) {
        Ok(s) => f.write_str(&s),
        Err(_) => write!(f, "{v}"),
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

fn binary(op: Op, x: Expr, y: Expr) -> Expr {
    Expr::Binary {
        op,
        x: Box::new(x),
        y: Box::new(y),
    }
}

fn field_call(func: Func, name: &str, v: &str) -> Expr {
    Expr::Call {
        func,
        args: vec![f(name), Expr::Value(Value::from(v))],
    }
}

/// Returns the logical negation of `x`.
pub fn not(x: Expr) -> Expr {
    Expr::Unary {
        op: Op::Not,
        x: Box::new(x),
    }
}

/// Logical AND. Two operands build a binary expression, any other count an
/// n-ary one.
pub fn and(xs: Vec<Expr>) -> Expr {
    connective(Op::And, xs)
}

/// Logical OR. Same shape rules as [`and`].
pub fn or(xs: Vec<Expr>) -> Expr {
    connective(Op::Or, xs)
}

fn connective(op: Op, mut xs: Vec<Expr>) -> Expr {
    if xs.len() == 2 {
        let y = xs.pop();
        let x = xs.pop();
        if let (Some(x), Some(y)) = (x, y) {
            return binary(op, x, y);
        }
    }
    Expr::Nary { op, xs }
}

/// A field reference.
pub fn f(name: &str) -> Expr {
    Expr::Field(name.to_string())
}

/// A value literal.
pub fn v(value: impl Into<Value>) -> Expr {
    Expr::Value(value.into())
}

pub fn eq(x: Expr, y: Expr) -> Expr {
    binary(Op::Eq, x, y)
}

pub fn neq(x: Expr, y: Expr) -> Expr {
    binary(Op::Neq, x, y)
}

pub fn gt(x: Expr, y: Expr) -> Expr {
    binary(Op::Gt, x, y)
}

pub fn gte(x: Expr, y: Expr) -> Expr {
    binary(Op::Gte, x, y)
}

pub fn lt(x: Expr, y: Expr) -> Expr {
    binary(Op::Lt, x, y)
}

pub fn lte(x: Expr, y: Expr) -> Expr {
    binary(Op::Lte, x, y)
}

pub fn field_eq(name: &str, value: impl Into<Value>) -> Expr {
    eq(f(name), v(value))
}

pub fn field_neq(name: &str, value: impl Into<Value>) -> Expr {
    neq(f(name), v(value))
}

pub fn field_gt(name: &str, value: impl Into<Value>) -> Expr {
    gt(f(name), v(value))
}

pub fn field_gte(name: &str, value: impl Into<Value>) -> Expr {
    gte(f(name), v(value))
}

pub fn field_lt(name: &str, value: impl Into<Value>) -> Expr {
    lt(f(name), v(value))
}

pub fn field_lte(name: &str, value: impl Into<Value>) -> Expr {
    lte(f(name), v(value))
}

pub fn field_contains(name: &str, substr: &str) -> Expr {
    field_call(Func::Contains, name, substr)
}

pub fn field_contains_fold(name: &str, substr: &str) -> Expr {
    field_call(Func::ContainsFold, name, substr)
}

pub fn field_equal_fold(name: &str, value: &str) -> Expr {
    field_call(Func::EqualFold, name, value)
}

pub fn field_has_prefix(name: &str, prefix: &str) -> Expr {
    field_call(Func::HasPrefix, name, prefix)
}

pub fn field_has_suffix(name: &str, suffix: &str) -> Expr {
    field_call(Func::HasSuffix, name, suffix)
}

/// The field value matches any value in `values`.
pub fn field_in(name: &str, values: Vec<Value>) -> Expr {
    binary(Op::In, f(name), Expr::Values(values))
}

/// The field value matches none of `values`.
pub fn field_not_in(name: &str, values: Vec<Value>) -> Expr {
    binary(Op::NotIn, f(name), Expr::Values(values))
}

/// The field is NULL.
pub fn field_nil(name: &str) -> Expr {
    binary(Op::Eq, f(name), Expr::Nil)
}

/// The field is not NULL.
pub fn field_not_nil(name: &str) -> Expr {
    binary(Op::Neq, f(name), Expr::Nil)
}

/// The node has at least one neighbor over the edge.
pub fn has_edge(name: &str) -> Expr {
    Expr::Call {
        func: Func::HasEdge,
        args: vec![Expr::Edge(name.to_string())],
    }
}

/// The node has at least one neighbor over the edge that matches every
/// predicate in `preds`.
pub fn has_edge_with(name: &str, preds: Vec<Expr>) -> Expr {
    let mut args = Vec::with_capacity(preds.len() + 1);
    args.push(Expr::Edge(name.to_string()));
    args.extend(preds);
    Expr::Call {
        func: Func::HasEdge,
        args,
    }
}
