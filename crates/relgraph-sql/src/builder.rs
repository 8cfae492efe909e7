//! The statement writer shared by every builder.
//!
//! Statements are kept as small ASTs ([`Selector`](crate::select::Selector),
//! [`Predicate`](crate::predicate::Predicate), the mutation builders) and
//! rendered once through a single [`Builder`]. Rendering in one pass keeps
//! Postgres `$n` placeholders numbered across nested sub-queries.

use std::fmt;

use relgraph_core::Value;

use crate::dialect::Dialect;

/// Comparison and set operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Like,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Eq => "=",
            Op::Neq => "<>",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::In => "IN",
            Op::NotIn => "NOT IN",
            Op::Like => "LIKE",
        };
        f.write_str(s)
    }
}

/// Accumulates SQL text and its positional arguments.
#[derive(Debug)]
pub struct Builder {
    dialect: Dialect,
    buf: String,
    args: Vec<Value>,
}

impl Builder {
    pub fn new(dialect: Dialect) -> Self {
        Builder {
            dialect,
            buf: String::new(),
            args: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Appends raw SQL text.
    pub fn write(&mut self, s: &str) -> &mut Self {
        self.buf.push_str(s);
        self
    }

    /// Appends a quoted, possibly qualified identifier.
    pub fn ident(&mut self, ident: &str) -> &mut Self {
        let quoted = self.dialect.quote_ident(ident);
        self.buf.push_str(&quoted);
        self
    }

    /// Appends a comma separated list of identifiers.
    pub fn idents(&mut self, idents: &[String]) -> &mut Self {
        for (i, ident) in idents.iter().enumerate() {
            if i > 0 {
                self.buf.push_str(", ");
            }
            self.ident(ident);
        }
        self
    }

    /// Appends a placeholder and records its argument.
    pub fn arg(&mut self, value: Value) -> &mut Self {
        self.args.push(value);
        let placeholder = self.dialect.placeholder(self.args.len());
        self.buf.push_str(&placeholder);
        self
    }

    /// Appends a comma separated list of placeholders.
    pub fn args(&mut self, values: &[Value]) -> &mut Self {
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                self.buf.push_str(", ");
            }
            self.arg(v.clone());
        }
        self
    }

    /// Appends an operator surrounded by spaces.
    pub fn op(&mut self, op: Op) -> &mut Self {
        self.buf.push(' ');
        self.buf.push_str(&op.to_string());
        self.buf.push(' ');
        self
    }

    /// Returns the SQL text and its arguments.
    pub fn finish(self) -> (String, Vec<Value>) {
        (self.buf, self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn writes_idents_and_args() {
        let mut b = Builder::new(Dialect::MySQL);
        b.ident("users.name").op(Op::Eq).arg(Value::from("a8m"));
        let (query, args) = b.finish();
        assert_eq!(query, "`users`.`name` = ?");
        assert_eq!(args, vec![Value::from("a8m")]);
    }

    proptest! {
        #[test]
        fn postgres_placeholders_are_sequential(n in 1usize..40) {
            let mut b = Builder::new(Dialect::Postgres);
            let values: Vec<Value> = (0..n as i64).map(Value::from).collect();
            b.args(&values);
            let (query, args) = b.finish();
            let expected: Vec<String> = (1..=n).map(|i| format!("${i}")).collect();
            prop_assert_eq!(query, expected.join(", "));
            prop_assert_eq!(args.len(), n);
        }
    }
}
