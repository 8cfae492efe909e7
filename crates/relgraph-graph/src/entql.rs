//! Evaluation of entql predicates against SQL storage.
//!
//! A [`Schema`] holds the storage layout of every node type and its named
//! edges. [`Schema::eval_p`] compiles an [`Expr`] into a SQL predicate and
//! ANDs it into a [`Selector`]:
//!
//! ```text
//! has_edge(pets, name == "pedro")
//!   => "users"."uid" IN (SELECT "pets"."owner_id" FROM "pets" WHERE "pets"."name" = $1)
//! ```
//!
//! Edge predicates are resolved with [`has_neighbors`] and
//! [`has_neighbors_with`], so they follow the same storage rules as the
//! traversal steps.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use relgraph_core::entql::{Expr, Foreign, Func, Op};
use relgraph_core::Value;
use relgraph_sql::predicate::{
    self, compare_op, contains, contains_fold, equal_fold, has_prefix, has_suffix, in_values,
    is_null, not_in_values, not_null, Operand,
};
use relgraph_sql::{Predicate, Selector};

use crate::error::GraphError;
use crate::spec::{EdgeSpec, FieldSpec, NodeSpec};
use crate::step::{has_neighbors, has_neighbors_with, Step};

/// A raw selector function carried through an entql expression.
#[derive(Clone)]
pub struct SelectorFunc(pub Arc<dyn Fn(&mut Selector) + Send + Sync>);

impl fmt::Debug for SelectorFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SelectorFunc(..)")
    }
}

/// Wraps a selector function in a `func_selector` call. Inside
/// `has_edge(name, ..)` the function runs on the neighbor selector.
pub fn wrap_func<F>(f: F) -> Expr
where
    F: Fn(&mut Selector) + Send + Sync + 'static,
{
    Expr::Call {
        func: Func::Selector,
        args: vec![Expr::Foreign(Foreign(Arc::new(SelectorFunc(Arc::new(f)))))],
    }
}

/// A named edge of a node type.
#[derive(Debug, Clone)]
pub struct Edge {
    pub spec: EdgeSpec,
    /// Type of the node at the other end.
    pub to: String,
}

/// The storage layout of one node type.
#[derive(Debug, Clone)]
pub struct Node {
    pub spec: NodeSpec,
    pub node_type: String,
    /// Field name to column spec.
    pub fields: IndexMap<String, FieldSpec>,
    pub edges: IndexMap<String, Edge>,
}

impl Node {
    pub fn new(node_type: &str, spec: NodeSpec) -> Self {
        Node {
            spec,
            node_type: node_type.to_string(),
            fields: IndexMap::new(),
            edges: IndexMap::new(),
        }
    }

    pub fn field(mut self, name: &str, spec: FieldSpec) -> Self {
        self.fields.insert(name.to_string(), spec);
        self
    }

    /// Resolves a field name to its column, qualified through `selector`.
    /// The id column is always a valid field.
    fn column(&self, name: &str, selector: &Selector) -> Result<String, GraphError> {
        let column = match self.fields.get(name) {
            Some(spec) => spec.column.as_str(),
            None if self.spec.id_column() == name => name,
            None => {
                return Err(eval_err(format_args!(
                    "field {name:?} was not found for node {:?}",
                    self.node_type
                )))
            }
        };
        Ok(selector.c(column))
    }
}

/// The graph of node types and edges used to evaluate predicates.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub nodes: IndexMap<String, Node>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node type, replacing any node of the same type.
    pub fn add_node(&mut self, node: Node) -> &mut Self {
        self.nodes.insert(node.node_type.clone(), node);
        self
    }

    /// Adds the edge `name` from the `from` type to the `to` type.
    ///
    /// ```text
    /// g.add_e("pets", spec, "user", "pet")
    /// g.add_e("friends", spec, "user", "user")
    /// ```
    pub fn add_e(&mut self, name: &str, spec: EdgeSpec, from: &str, to: &str) -> Result<(), GraphError> {
        if !self.nodes.contains_key(to) {
            return Err(GraphError::Invalid("from/to type was not found".into()));
        }
        let Some(node) = self.nodes.get_mut(from) else {
            return Err(GraphError::Invalid("from/to type was not found".into()));
        };
        node.edges.insert(
            name.to_string(),
            Edge {
                spec,
                to: to.to_string(),
            },
        );
        Ok(())
    }

    /// Evaluates `p` for nodes of `node_type` and ANDs the result into
    /// `selector`. On error the selector is left unchanged.
    pub fn eval_p(&self, node_type: &str, p: &Expr, selector: &mut Selector) -> Result<(), GraphError> {
        let Some(node) = self.nodes.get(node_type) else {
            return Err(GraphError::Invalid(format!(
                "node {node_type} was not found in the graph schema"
            )));
        };
        tracing::trace!(node = node_type, predicate = %p, "evaluate predicate");
        let pred = State::new(self, node, selector).eval(p)?;
        selector.where_(pred);
        Ok(())
    }
}

fn eval_err(msg: fmt::Arguments<'_>) -> GraphError {
    GraphError::Eval(format!("expect {msg}"))
}

/// Describes an operand in error messages, e.g. `field name`.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Nil => "nil".to_string(),
        Expr::Foreign(_) => kind(expr).to_string(),
        _ => format!("{} {expr}", kind(expr)),
    }
}

fn kind(expr: &Expr) -> &'static str {
    match expr {
        Expr::Binary { .. } => "binary expression",
        Expr::Unary { .. } => "unary expression",
        Expr::Nary { .. } => "n-ary expression",
        Expr::Call { .. } => "call expression",
        Expr::Field(_) => "field",
        Expr::Edge(_) => "edge",
        Expr::Value(_) => "value",
        Expr::Values(_) => "values",
        Expr::Nil => "nil",
        Expr::Foreign(_) => "foreign payload",
    }
}

fn sql_op(op: Op) -> Option<relgraph_sql::Op> {
    use relgraph_sql::Op as SqlOp;
    Some(match op {
        Op::Eq => SqlOp::Eq,
        Op::Neq => SqlOp::Neq,
        Op::Gt => SqlOp::Gt,
        Op::Gte => SqlOp::Gte,
        Op::Lt => SqlOp::Lt,
        Op::Lte => SqlOp::Lte,
        Op::In => SqlOp::In,
        Op::NotIn => SqlOp::NotIn,
        Op::And | Op::Or | Op::Not => return None,
    })
}

/// Evaluation context: the node type the expression is about and the
/// selector its fields are qualified through.
struct State<'a> {
    schema: &'a Schema,
    node: &'a Node,
    selector: &'a Selector,
}

impl<'a> State<'a> {
    fn new(schema: &'a Schema, node: &'a Node, selector: &'a Selector) -> Self {
        State {
            schema,
            node,
            selector,
        }
    }

    fn eval(&self, expr: &Expr) -> Result<Predicate, GraphError> {
        match expr {
            Expr::Binary { op, x, y } => self.eval_binary(*op, x, y),
            Expr::Unary { op: Op::Not, x } => Ok(predicate::not(self.eval(x)?)),
            Expr::Unary { op, .. } => Err(eval_err(format_args!("unary operator !, got {op}"))),
            Expr::Nary { op, xs } => {
                if !matches!(op, Op::And | Op::Or) {
                    return Err(eval_err(format_args!("n-ary operator && or ||, got {op}")));
                }
                if xs.len() < 2 {
                    return Err(eval_err(format_args!(
                        "at least 2 operands for {op}, got {}",
                        xs.len()
                    )));
                }
                let ps = xs.iter().map(|x| self.eval(x)).collect::<Result<Vec<_>, _>>()?;
                Ok(if *op == Op::And {
                    predicate::and(ps)
                } else {
                    predicate::or(ps)
                })
            }
            Expr::Call { func, args } => self.eval_call(*func, args),
            other => Err(eval_err(format_args!(
                "predicate expression, got {}",
                describe(other)
            ))),
        }
    }

    fn eval_binary(&self, op: Op, x: &Expr, y: &Expr) -> Result<Predicate, GraphError> {
        match op {
            Op::And => return Ok(predicate::and(vec![self.eval(x)?, self.eval(y)?])),
            Op::Or => return Ok(predicate::or(vec![self.eval(x)?, self.eval(y)?])),
            _ => {}
        }
        let Some(sql) = sql_op(op) else {
            return Err(eval_err(format_args!("binary operator, got {op}")));
        };
        let Expr::Field(name) = x else {
            return Err(eval_err(format_args!(
                "field on the left of {op}, got {}",
                describe(x)
            )));
        };
        let column = self.node.column(name, self.selector)?;
        match (op, y) {
            (Op::Eq, Expr::Nil) => Ok(is_null(&column)),
            (Op::Neq, Expr::Nil) => Ok(not_null(&column)),
            (_, Expr::Field(other)) => {
                let other = self.node.column(other, self.selector)?;
                Ok(compare_op(&column, sql, Operand::Column(other)))
            }
            (Op::In, Expr::Values(vs)) => Ok(in_values(&column, vs.clone())),
            (Op::NotIn, Expr::Values(vs)) => Ok(not_in_values(&column, vs.clone())),
            (Op::In, Expr::Value(v)) => Ok(in_values(&column, vec![v.clone()])),
            (Op::NotIn, Expr::Value(v)) => Ok(not_in_values(&column, vec![v.clone()])),
            (_, Expr::Value(v)) => Ok(compare_op(&column, sql, Operand::Arg(v.clone()))),
            _ => Err(eval_err(format_args!(
                "field or value on the right of {op}, got {}",
                describe(y)
            ))),
        }
    }

    fn eval_call(&self, func: Func, args: &[Expr]) -> Result<Predicate, GraphError> {
        match func {
            Func::EqualFold | Func::Contains | Func::ContainsFold | Func::HasPrefix | Func::HasSuffix => {
                let [field, value] = args else {
                    return Err(eval_err(format_args!(
                        "2 arguments for {func}, got {}",
                        args.len()
                    )));
                };
                let Expr::Field(name) = field else {
                    return Err(eval_err(format_args!(
                        "field as the first argument of {func}, got {}",
                        kind(field)
                    )));
                };
                let Expr::Value(Value::Text(s)) = value else {
                    return Err(eval_err(format_args!(
                        "string value as the second argument of {func}, got {value}"
                    )));
                };
                let column = self.node.column(name, self.selector)?;
                Ok(match func {
                    Func::EqualFold => equal_fold(&column, s),
                    Func::Contains => contains(&column, s),
                    Func::ContainsFold => contains_fold(&column, s),
                    Func::HasPrefix => has_prefix(&column, s),
                    _ => has_suffix(&column, s),
                })
            }
            Func::HasEdge => match args {
                [Expr::Edge(name), rest @ ..] => self.eval_edge(name, rest),
                [other, ..] => Err(eval_err(format_args!(
                    "edge as the first argument of {func}, got {}",
                    kind(other)
                ))),
                [] => Err(eval_err(format_args!("at least 1 argument for {func}"))),
            },
            Func::Selector => {
                let f = selector_func(args)?;
                let mut selector = self.selector.clone();
                selector.set_p(None);
                (f.0)(&mut selector);
                selector
                    .take_p()
                    .ok_or_else(|| eval_err(format_args!("{func} to add a predicate")))
            }
        }
    }

    fn eval_edge(&self, name: &str, exprs: &[Expr]) -> Result<Predicate, GraphError> {
        let Some(edge) = self.node.edges.get(name) else {
            return Err(eval_err(format_args!(
                "edge {name:?} was not found for node {:?}",
                self.node.node_type
            )));
        };
        let Some(to) = self.schema.nodes.get(&edge.to) else {
            return Err(eval_err(format_args!(
                "node {:?} of edge {name:?} in the graph schema",
                edge.to
            )));
        };
        let spec = &edge.spec;
        let step = Step::new()
            .from(&self.node.spec.table, self.node.spec.id_column())
            .to(&to.spec.table, to.spec.id_column())
            .to_schema(&to.spec.schema)
            .edge(spec.rel, spec.inverse, &spec.table, spec.columns.as_slice())
            .edge_schema(&spec.schema);
        let mut selector = self.selector.clone();
        selector.set_p(None);
        if exprs.is_empty() {
            has_neighbors(&mut selector, &step)?;
        } else {
            has_neighbors_with(&mut selector, &step, |s| {
                for expr in exprs {
                    if let Expr::Call {
                        func: Func::Selector,
                        args,
                    } = expr
                    {
                        (selector_func(args)?.0)(s);
                        continue;
                    }
                    let p = State::new(self.schema, to, s).eval(expr).map_err(|err| {
                        let msg = match err {
                            GraphError::Eval(msg) => msg,
                            other => other.to_string(),
                        };
                        eval_err(format_args!(
                            "edge evaluation to succeed for {}->{name}: {msg}",
                            self.node.node_type
                        ))
                    })?;
                    s.where_(p);
                }
                Ok(())
            })?;
        }
        selector
            .take_p()
            .ok_or_else(|| eval_err(format_args!("a predicate for edge {name:?}")))
    }
}

fn selector_func(args: &[Expr]) -> Result<&SelectorFunc, GraphError> {
    let [Expr::Foreign(foreign)] = args else {
        return Err(eval_err(format_args!(
            "1 foreign argument for {}, got {} arguments",
            Func::Selector,
            args.len()
        )));
    };
    foreign.downcast_ref::<SelectorFunc>().ok_or_else(|| {
        eval_err(format_args!(
            "a selector function as the argument of {}",
            Func::Selector
        ))
    })
}

#[cfg(test)]
mod tests {
    use relgraph_core::entql::{self as q, f, v};
    use relgraph_core::{FieldType, Rel};
    use relgraph_sql::predicate::eq;
    use relgraph_sql::{Dialect, Table};

    use super::*;

    fn node(node_type: &str, table: &str, id: &str, fields: &[&str]) -> Node {
        let spec = NodeSpec::new::<&str>(table, &[], Some(FieldSpec::new(id, FieldType::Int)));
        fields.iter().fold(Node::new(node_type, spec), |n, name| {
            n.field(name, FieldSpec::new(name, FieldType::String))
        })
    }

    fn graph() -> Schema {
        let mut g = Schema::new();
        g.add_node(node("user", "users", "uid", &["name", "last"]))
            .add_node(node("pet", "pets", "pid", &["name"]))
            .add_node(node("group", "groups", "gid", &["name"]));
        g.add_e("pets", EdgeSpec::new(Rel::O2M, "pets", &["owner_id"]), "user", "pet")
            .unwrap();
        g.add_e(
            "owner",
            EdgeSpec::new(Rel::M2O, "pets", &["owner_id"]).inverse(true),
            "pet",
            "user",
        )
        .unwrap();
        g.add_e(
            "groups",
            EdgeSpec::new(Rel::M2M, "user_groups", &["user_id", "group_id"]),
            "user",
            "group",
        )
        .unwrap();
        g.add_e(
            "users",
            EdgeSpec::new(Rel::M2M, "user_groups", &["user_id", "group_id"]).inverse(true),
            "group",
            "user",
        )
        .unwrap();
        g
    }

    fn users() -> Selector {
        Selector::from_table(Dialect::Postgres, Table::new("users"))
    }

    fn eval(node_type: &str, mut s: Selector, p: Expr) -> (String, Vec<Value>) {
        graph().eval_p(node_type, &p, &mut s).unwrap();
        s.query()
    }

    #[test]
    fn add_e_requires_both_types() {
        let mut g = graph();
        let err = g
            .add_e("groups", EdgeSpec::new(Rel::M2M, "pet_groups", &["a", "b"]), "pet", "groups")
            .unwrap_err();
        assert_eq!(err.to_string(), "from/to type was not found");
        assert!(g.add_e("owner", EdgeSpec::new(Rel::M2O, "pets", &["owner_id"]), "pet", "user").is_ok());
    }

    #[test]
    fn field_predicates() {
        let (query, args) = eval("user", users(), q::field_has_prefix("name", "a"));
        assert_eq!(query, r#"SELECT * FROM "users" WHERE "users"."name" LIKE $1"#);
        assert_eq!(args, vec![Value::from("a%")]);

        let mut s = users();
        s.where_(eq("age", 1));
        let (query, args) = eval("user", s, q::field_has_prefix("name", "a"));
        assert_eq!(
            query,
            r#"SELECT * FROM "users" WHERE "age" = $1 AND "users"."name" LIKE $2"#
        );
        assert_eq!(args, vec![Value::from(1), Value::from("a%")]);

        let (query, _) = eval("user", users(), q::eq(f("name"), f("last")));
        assert_eq!(query, r#"SELECT * FROM "users" WHERE "users"."name" = "users"."last""#);

        let (query, _) = eval(
            "user",
            users(),
            q::and(vec![q::field_nil("name"), q::field_not_nil("last")]),
        );
        assert_eq!(
            query,
            r#"SELECT * FROM "users" WHERE "users"."name" IS NULL AND "users"."last" IS NOT NULL"#
        );

        let mut s = users();
        s.where_(eq("foo", "bar"));
        let (query, args) = eval(
            "user",
            s,
            q::or(vec![q::field_eq("name", "foo"), q::field_eq("name", "baz")]),
        );
        assert_eq!(
            query,
            r#"SELECT * FROM "users" WHERE "foo" = $1 AND ("users"."name" = $2 OR "users"."name" = $3)"#
        );
        assert_eq!(args, vec![Value::from("bar"), Value::from("foo"), Value::from("baz")]);
    }

    #[test]
    fn in_and_negation() {
        let p = q::not(q::field_in("uid", vec![Value::from(1), Value::from(2)]));
        let (query, args) = eval("user", users(), p);
        assert_eq!(query, r#"SELECT * FROM "users" WHERE NOT ("users"."uid" IN ($1, $2))"#);
        assert_eq!(args, vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn has_edge() {
        let (query, _) = eval("user", users(), q::has_edge("pets"));
        assert_eq!(
            query,
            r#"SELECT * FROM "users" WHERE "users"."uid" IN (SELECT "pets"."owner_id" FROM "pets" WHERE "pets"."owner_id" IS NOT NULL)"#
        );

        let (query, _) = eval("user", users(), q::has_edge("groups"));
        assert_eq!(
            query,
            r#"SELECT * FROM "users" WHERE "users"."uid" IN (SELECT "user_groups"."user_id" FROM "user_groups")"#
        );

        let pets = Selector::from_table(Dialect::Postgres, Table::new("pets"));
        let (query, _) = eval("pet", pets, q::has_edge("owner"));
        assert_eq!(query, r#"SELECT * FROM "pets" WHERE "pets"."owner_id" IS NOT NULL"#);
    }

    #[test]
    fn has_edge_with() {
        let p = q::has_edge_with(
            "pets",
            vec![q::or(vec![q::field_eq("name", "pedro"), q::field_eq("name", "xabi")])],
        );
        let (query, args) = eval("user", users(), p);
        assert_eq!(
            query,
            r#"SELECT * FROM "users" WHERE "users"."uid" IN (SELECT "pets"."owner_id" FROM "pets" WHERE "pets"."name" = $1 OR "pets"."name" = $2)"#
        );
        assert_eq!(args, vec![Value::from("pedro"), Value::from("xabi")]);

        let mut s = users();
        s.where_(eq("active", true));
        let p = q::has_edge_with(
            "groups",
            vec![q::or(vec![q::field_eq("name", "GitHub"), q::field_eq("name", "GitLab")])],
        );
        let (query, args) = eval("user", s, p);
        assert_eq!(
            query,
            r#"SELECT * FROM "users" WHERE "active" AND "users"."uid" IN (SELECT "user_groups"."user_id" FROM "user_groups" JOIN "groups" AS "t1" ON "user_groups"."group_id" = "t1"."gid" WHERE "t1"."name" = $1 OR "t1"."name" = $2)"#
        );
        assert_eq!(args, vec![Value::from("GitHub"), Value::from("GitLab")]);
    }

    #[test]
    fn mixed_connectives() {
        let mut s = users();
        s.where_(eq("active", true));
        let p = q::and(vec![
            q::has_edge("pets"),
            q::has_edge("groups"),
            q::eq(f("name"), f("uid")),
        ]);
        let (query, args) = eval("user", s, p);
        assert_eq!(
            query,
            r#"SELECT * FROM "users" WHERE "active" AND ("users"."uid" IN (SELECT "pets"."owner_id" FROM "pets" WHERE "pets"."owner_id" IS NOT NULL) AND "users"."uid" IN (SELECT "user_groups"."user_id" FROM "user_groups") AND "users"."name" = "users"."uid")"#
        );
        assert!(args.is_empty());
    }

    #[test]
    fn selector_func_runs_on_neighbors() {
        let mut s = users();
        s.where_(eq("active", true));
        let p = q::has_edge_with(
            "pets",
            vec![
                q::field_eq("name", "pedro"),
                wrap_func(|s| {
                    s.where_(eq("owner_id", 10));
                }),
            ],
        );
        let (query, args) = eval("user", s, p);
        assert_eq!(
            query,
            r#"SELECT * FROM "users" WHERE "active" AND "users"."uid" IN (SELECT "pets"."owner_id" FROM "pets" WHERE "pets"."name" = $1 AND "owner_id" = $2)"#
        );
        assert_eq!(args, vec![Value::from("pedro"), Value::from(10)]);
    }

    #[test]
    fn inverse_m2m_with_nested_edge() {
        let groups = Selector::from_table(Dialect::Postgres, Table::new("groups"));
        let p = q::has_edge_with("users", vec![q::has_edge("pets")]);
        let (query, _) = eval("group", groups, p);
        assert_eq!(
            query,
            r#"SELECT * FROM "groups" WHERE "groups"."gid" IN (SELECT "user_groups"."group_id" FROM "user_groups" JOIN "users" AS "t1" ON "user_groups"."user_id" = "t1"."uid" WHERE "t1"."uid" IN (SELECT "pets"."owner_id" FROM "pets" WHERE "pets"."owner_id" IS NOT NULL))"#
        );
    }

    #[test]
    fn malformed_expressions() {
        let g = graph();
        let cases = [
            ("dog", q::field_eq("name", "a"), "node dog was not found in the graph schema"),
            ("user", q::field_eq("age", 1), r#"entql: expect field "age" was not found for node "user""#),
            ("user", q::has_edge("friends"), r#"entql: expect edge "friends" was not found for node "user""#),
            ("user", q::eq(v(1), f("name")), "entql: expect field on the left of ==, got value 1"),
            ("user", q::gt(f("name"), Expr::Nil), "entql: expect field or value on the right of >, got nil"),
            ("user", f("name"), "entql: expect predicate expression, got field name"),
            ("user", q::and(vec![]), "entql: expect at least 2 operands for &&, got 0"),
            ("user", q::or(vec![q::field_eq("name", "a")]), "entql: expect at least 2 operands for ||, got 1"),
            (
                "user",
                Expr::Call {
                    func: Func::HasPrefix,
                    args: vec![f("name"), v(1)],
                },
                "entql: expect string value as the second argument of has_prefix, got 1",
            ),
            (
                "user",
                q::has_edge_with("pets", vec![q::field_eq("last", "x")]),
                r#"entql: expect edge evaluation to succeed for user->pets: expect field "last" was not found for node "pet""#,
            ),
        ];
        for (node_type, p, want) in cases {
            let mut s = users();
            let err = g.eval_p(node_type, &p, &mut s).unwrap_err();
            assert_eq!(err.to_string(), want, "{p}");
            assert!(s.p().is_none(), "{p}");
        }
    }

    #[test]
    fn top_level_selector_func() {
        let (query, args) = eval(
            "user",
            users(),
            wrap_func(|s| {
                let c = s.c("name");
                s.where_(eq(&c, "a8m"));
            }),
        );
        assert_eq!(query, r#"SELECT * FROM "users" WHERE "users"."name" = $1"#);
        assert_eq!(args, vec![Value::from("a8m")]);
    }
}
