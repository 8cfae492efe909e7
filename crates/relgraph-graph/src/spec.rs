//! Spec objects describing one engine call.
//!
//! Specs are built per call and consumed by the entry points in
//! [`create`](crate::create), [`update`](crate::update),
//! [`delete`](crate::delete) and [`query`](crate::query). Callbacks borrow
//! from the caller for the lifetime `'a` of the spec.

use std::collections::BTreeMap;

use relgraph_core::{FieldType, Rel, Value};
use relgraph_sql::{OnConflict, Selector, UpdateBuilder};
use smallvec::SmallVec;

use crate::error::GraphError;

/// Receives the columns and values of one scanned row.
pub type Assign<'a> = Box<dyn FnMut(&[String], &[Value]) -> Result<(), GraphError> + 'a>;

/// Receives the `(out, in)` pair of one scanned edge row.
pub type AssignEdge<'a> = Box<dyn FnMut(Value, Value) -> Result<(), GraphError> + 'a>;

/// Applies predicates, ordering or other clauses to a selector.
pub type SelectorFn<'a> = Box<dyn Fn(&mut Selector) + 'a>;

/// Modifies an UPDATE statement before it is executed.
pub type UpdateModifier<'a> = Box<dyn Fn(&mut UpdateBuilder) + 'a>;

/// Edge columns: one foreign key, or the two join-table columns of M2M.
pub type EdgeColumns = SmallVec<[String; 2]>;

const DEFAULT_ID_COLUMN: &str = "id";

// ---------------------------------------------------------------------------
// Fields and edges
// ---------------------------------------------------------------------------

/// A column, its semantic type and the value to store.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub column: String,
    pub field_type: FieldType,
    pub value: Value,
}

impl FieldSpec {
    pub fn new(column: &str, field_type: FieldType) -> Self {
        FieldSpec {
            column: column.to_string(),
            field_type,
            value: Value::Null,
        }
    }

    pub fn with_value(column: &str, field_type: FieldType, value: impl Into<Value>) -> Self {
        FieldSpec {
            column: column.to_string(),
            field_type,
            value: value.into(),
        }
    }

    /// Returns the value as it is bound. JSON fields are marshalled to text.
    pub(crate) fn bind_value(&self) -> Result<Value, GraphError> {
        if self.field_type.is_json() {
            return self.value.to_json_text().map_err(|source| GraphError::Marshal {
                column: self.column.clone(),
                source,
            });
        }
        Ok(self.value.clone())
    }
}

/// The nodes an edge points to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeTarget {
    pub nodes: Vec<Value>,
    /// Identifier column of the target nodes, `id` when unset.
    pub id_spec: Option<FieldSpec>,
    /// Extra join-table columns, M2M only.
    pub fields: Vec<FieldSpec>,
}

impl EdgeTarget {
    pub fn new(nodes: Vec<Value>) -> Self {
        EdgeTarget {
            nodes,
            ..EdgeTarget::default()
        }
    }

    pub fn id_column(&self) -> &str {
        self.id_spec
            .as_ref()
            .map_or(DEFAULT_ID_COLUMN, |spec| spec.column.as_str())
    }
}

/// An edge to add or clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeSpec {
    pub rel: Rel,
    pub inverse: bool,
    /// Bidirectional edge: M2M rows are mirrored, O2O keeps the FK on both
    /// sides.
    pub bidi: bool,
    pub table: String,
    pub schema: String,
    pub columns: EdgeColumns,
    pub target: EdgeTarget,
}

impl EdgeSpec {
    pub fn new<S: AsRef<str>>(rel: Rel, table: &str, columns: &[S]) -> Self {
        EdgeSpec {
            rel,
            table: table.to_string(),
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            ..EdgeSpec::default()
        }
    }

    pub fn inverse(mut self, inverse: bool) -> Self {
        self.inverse = inverse;
        self
    }

    pub fn bidi(mut self, bidi: bool) -> Self {
        self.bidi = bidi;
        self
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    pub fn targets(mut self, nodes: Vec<Value>) -> Self {
        self.target.nodes = nodes;
        self
    }

    pub fn target_id(mut self, id_spec: FieldSpec) -> Self {
        self.target.id_spec = Some(id_spec);
        self
    }

    /// Adds an extra join-table column to an M2M edge.
    pub fn target_field(mut self, field: FieldSpec) -> Self {
        self.target.fields.push(field);
        self
    }

    /// Reports whether the edge is stored outside the node's own row.
    pub fn is_external(&self) -> bool {
        matches!(self.rel, Rel::M2M | Rel::O2M) || (self.rel == Rel::O2O && !self.inverse)
    }

    /// Reports whether the edge FK lives on the node's own row.
    pub(crate) fn is_own_fk(&self) -> bool {
        self.rel == Rel::M2O || (self.rel == Rel::O2O && (self.inverse || self.bidi))
    }

    /// Checks the relation kind and column count.
    pub fn validate(&self) -> Result<(), GraphError> {
        let Some(want) = self.rel.column_count() else {
            return Err(GraphError::Invalid(format!(
                "edge on table {:?} has an unknown relation",
                self.table
            )));
        };
        if self.columns.len() != want {
            return Err(GraphError::Invalid(format!(
                "{} edge on table {:?} requires {want} column(s), got {}",
                self.rel,
                self.table,
                self.columns.len()
            )));
        }
        Ok(())
    }

    /// The first target, required by edges whose FK is set to one node.
    pub(crate) fn first_target(&self) -> Result<&Value, GraphError> {
        self.target.nodes.first().ok_or_else(|| {
            GraphError::Invalid(format!(
                "{} edge {}.{} has no target nodes",
                self.rel,
                self.table,
                self.columns.join(",")
            ))
        })
    }
}

/// Edges grouped by relation kind, in spec order.
#[derive(Debug, Default)]
pub(crate) struct EdgeGroups<'e> {
    pub o2o: Vec<&'e EdgeSpec>,
    pub o2m: Vec<&'e EdgeSpec>,
    pub m2o: Vec<&'e EdgeSpec>,
    pub m2m: Vec<&'e EdgeSpec>,
}

impl<'e> EdgeGroups<'e> {
    /// Validates and groups `edges`.
    pub fn new(edges: &'e [EdgeSpec]) -> Result<Self, GraphError> {
        let mut groups = EdgeGroups::default();
        for edge in edges {
            edge.validate()?;
            match edge.rel {
                Rel::O2O => groups.o2o.push(edge),
                Rel::O2M => groups.o2m.push(edge),
                Rel::M2O => groups.m2o.push(edge),
                Rel::M2M => groups.m2m.push(edge),
                Rel::Unknown => {}
            }
        }
        Ok(groups)
    }

    /// O2M edges followed by O2O edges, the ones stored in other tables.
    pub fn fk_edges(&self) -> Vec<&'e EdgeSpec> {
        self.o2m.iter().chain(self.o2o.iter()).copied().collect()
    }

    /// Edges whose FK column is on the node's own row.
    pub fn own_fk_edges(&self) -> impl Iterator<Item = &'e EdgeSpec> + '_ {
        self.m2o
            .iter()
            .chain(&self.o2o)
            .copied()
            .filter(|e| e.is_own_fk())
    }

    /// Reports whether any edge is stored outside the node's own row.
    pub fn has_external(&self) -> bool {
        self.m2m
            .iter()
            .chain(&self.o2m)
            .chain(&self.o2o)
            .any(|e| e.is_external())
    }
}

/// Groups edges by join table, sorted by table name.
pub(crate) fn group_table<'e>(edges: &[&'e EdgeSpec]) -> BTreeMap<&'e str, Vec<&'e EdgeSpec>> {
    let mut tables: BTreeMap<&str, Vec<&EdgeSpec>> = BTreeMap::new();
    for edge in edges {
        tables.entry(edge.table.as_str()).or_default().push(edge);
    }
    tables
}

// ---------------------------------------------------------------------------
// Node specs
// ---------------------------------------------------------------------------

/// How a node type is stored and identified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSpec {
    pub table: String,
    pub schema: String,
    pub columns: Vec<String>,
    pub id: Option<FieldSpec>,
    /// Two-column primary key of an edge-schema table.
    pub composite_id: Vec<FieldSpec>,
}

impl NodeSpec {
    pub fn new<S: AsRef<str>>(table: &str, columns: &[S], id: Option<FieldSpec>) -> Self {
        NodeSpec {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            id,
            ..NodeSpec::default()
        }
    }

    pub fn id_column(&self) -> &str {
        self.id
            .as_ref()
            .map_or(DEFAULT_ID_COLUMN, |spec| spec.column.as_str())
    }

    pub(crate) fn table_ref(&self) -> relgraph_sql::Table {
        relgraph_sql::Table::new(&self.table).schema(&self.schema)
    }
}

/// Creates one node and its edges.
#[derive(Debug, Clone, Default)]
pub struct CreateSpec {
    pub table: String,
    pub schema: String,
    /// Identifier column; its value is generated by the database when
    /// `Null`. `None` for edge-schema tables with a composite key.
    pub id: Option<FieldSpec>,
    pub fields: Vec<FieldSpec>,
    pub edges: Vec<EdgeSpec>,
    pub on_conflict: Option<OnConflict>,
}

impl CreateSpec {
    pub fn new(table: &str, id: Option<FieldSpec>) -> Self {
        CreateSpec {
            table: table.to_string(),
            id,
            ..CreateSpec::default()
        }
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    pub fn set_field(&mut self, column: &str, field_type: FieldType, value: impl Into<Value>) {
        self.fields.push(FieldSpec::with_value(column, field_type, value));
    }

    pub fn add_edge(&mut self, edge: EdgeSpec) {
        self.edges.push(edge);
    }

    pub fn on_conflict(&mut self, conflict: OnConflict) {
        self.on_conflict = Some(conflict);
    }
}

/// Creates many nodes of one table in a single INSERT.
#[derive(Debug, Clone, Default)]
pub struct BatchCreateSpec {
    pub nodes: Vec<CreateSpec>,
    pub on_conflict: Option<OnConflict>,
}

impl BatchCreateSpec {
    pub fn new(nodes: Vec<CreateSpec>) -> Self {
        BatchCreateSpec {
            nodes,
            on_conflict: None,
        }
    }
}

/// Edges to add and to clear.
#[derive(Debug, Clone, Default)]
pub struct EdgeMut {
    pub add: Vec<EdgeSpec>,
    pub clear: Vec<EdgeSpec>,
}

/// Field mutations.
#[derive(Debug, Clone, Default)]
pub struct FieldMut {
    /// `column = ?`
    pub set: Vec<FieldSpec>,
    /// `column = COALESCE(column, 0) + ?`
    pub add: Vec<FieldSpec>,
    /// `column = NULL`
    pub clear: Vec<FieldSpec>,
}

/// Updates one node by id, or every node matching a predicate.
#[derive(Default)]
pub struct UpdateSpec<'a> {
    pub node: NodeSpec,
    pub edges: EdgeMut,
    pub fields: FieldMut,
    pub predicate: Option<SelectorFn<'a>>,
    pub modifiers: Vec<UpdateModifier<'a>>,
    /// Receives the updated row of a single-node update.
    pub assign: Option<Assign<'a>>,
}

impl<'a> UpdateSpec<'a> {
    /// An update of `table` identified by `id`.
    pub fn new<S: AsRef<str>>(table: &str, columns: &[S], id: FieldSpec) -> Self {
        UpdateSpec {
            node: NodeSpec::new(table, columns, Some(id)),
            ..UpdateSpec::default()
        }
    }

    /// An update of an edge-schema table identified by two columns.
    pub fn with_composite_id<S: AsRef<str>>(table: &str, columns: &[S], id: [FieldSpec; 2]) -> Self {
        let mut node = NodeSpec::new(table, columns, None);
        node.composite_id = id.into();
        UpdateSpec {
            node,
            ..UpdateSpec::default()
        }
    }

    pub fn set_field(&mut self, column: &str, field_type: FieldType, value: impl Into<Value>) {
        self.fields.set.push(FieldSpec::with_value(column, field_type, value));
    }

    pub fn add_field(&mut self, column: &str, field_type: FieldType, value: impl Into<Value>) {
        self.fields.add.push(FieldSpec::with_value(column, field_type, value));
    }

    pub fn clear_field(&mut self, column: &str, field_type: FieldType) {
        self.fields.clear.push(FieldSpec::new(column, field_type));
    }

    pub fn add_edge(&mut self, edge: EdgeSpec) {
        self.edges.add.push(edge);
    }

    pub fn clear_edge(&mut self, edge: EdgeSpec) {
        self.edges.clear.push(edge);
    }

    pub fn predicate(&mut self, p: impl Fn(&mut Selector) + 'a) {
        self.predicate = Some(Box::new(p));
    }

    pub fn add_modifier(&mut self, m: impl Fn(&mut UpdateBuilder) + 'a) {
        self.modifiers.push(Box::new(m));
    }

    pub fn assign(
        &mut self,
        f: impl FnMut(&[String], &[Value]) -> Result<(), GraphError> + 'a,
    ) {
        self.assign = Some(Box::new(f));
    }
}

/// Deletes every node of a table matching a predicate.
#[derive(Default)]
pub struct DeleteSpec<'a> {
    pub node: NodeSpec,
    pub predicate: Option<SelectorFn<'a>>,
}

impl<'a> DeleteSpec<'a> {
    pub fn new(table: &str, id: Option<FieldSpec>) -> Self {
        DeleteSpec {
            node: NodeSpec::new::<&str>(table, &[], id),
            predicate: None,
        }
    }

    pub fn predicate(&mut self, p: impl Fn(&mut Selector) + 'a) {
        self.predicate = Some(Box::new(p));
    }
}

/// Selects or counts nodes.
#[derive(Default)]
pub struct QuerySpec<'a> {
    pub node: NodeSpec,
    /// Source selector of a chained traversal. The node table when unset.
    pub from: Option<Selector>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub unique: bool,
    pub order: Option<SelectorFn<'a>>,
    pub predicate: Option<SelectorFn<'a>>,
    pub modifiers: Vec<SelectorFn<'a>>,
    pub assign: Option<Assign<'a>>,
}

impl<'a> QuerySpec<'a> {
    pub fn new<S: AsRef<str>>(table: &str, columns: &[S], id: Option<FieldSpec>) -> Self {
        QuerySpec {
            node: NodeSpec::new(table, columns, id),
            ..QuerySpec::default()
        }
    }

    pub fn predicate(&mut self, p: impl Fn(&mut Selector) + 'a) {
        self.predicate = Some(Box::new(p));
    }

    pub fn order(&mut self, o: impl Fn(&mut Selector) + 'a) {
        self.order = Some(Box::new(o));
    }

    pub fn add_modifier(&mut self, m: impl Fn(&mut Selector) + 'a) {
        self.modifiers.push(Box::new(m));
    }

    pub fn assign(
        &mut self,
        f: impl FnMut(&[String], &[Value]) -> Result<(), GraphError> + 'a,
    ) {
        self.assign = Some(Box::new(f));
    }
}

/// Selects the `(out, in)` pairs of an edge table.
pub struct EdgeQuerySpec<'a> {
    pub edge: EdgeSpec,
    pub predicate: Option<SelectorFn<'a>>,
    pub assign: Option<AssignEdge<'a>>,
}

impl<'a> EdgeQuerySpec<'a> {
    pub fn new(edge: EdgeSpec) -> Self {
        EdgeQuerySpec {
            edge,
            predicate: None,
            assign: None,
        }
    }

    pub fn predicate(&mut self, p: impl Fn(&mut Selector) + 'a) {
        self.predicate = Some(Box::new(p));
    }

    pub fn assign(&mut self, f: impl FnMut(Value, Value) -> Result<(), GraphError> + 'a) {
        self.assign = Some(Box::new(f));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fields_are_marshalled() {
        let f = FieldSpec::with_value("meta", FieldType::Json, serde_json::json!({"a": [1, 2]}));
        assert_eq!(f.bind_value().unwrap(), Value::from("{\"a\":[1,2]}"));
        let f = FieldSpec::with_value("name", FieldType::String, "a8m");
        assert_eq!(f.bind_value().unwrap(), Value::from("a8m"));
    }

    #[test]
    fn edge_validation() {
        assert!(EdgeSpec::new(Rel::M2M, "user_groups", &["user_id", "group_id"])
            .validate()
            .is_ok());
        let err = EdgeSpec::new(Rel::M2M, "user_groups", &["user_id"])
            .validate()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "M2M edge on table \"user_groups\" requires 2 column(s), got 1"
        );
        let err = EdgeSpec::new(Rel::Unknown, "pets", &["owner_id"])
            .validate()
            .unwrap_err();
        assert!(matches!(err, GraphError::Invalid(_)));
    }

    #[test]
    fn grouping() {
        let edges = vec![
            EdgeSpec::new(Rel::O2O, "cards", &["owner_id"]),
            EdgeSpec::new(Rel::O2O, "users", &["spouse_id"]).inverse(true),
            EdgeSpec::new(Rel::M2O, "pets", &["owner_id"]),
            EdgeSpec::new(Rel::M2M, "b_groups", &["user_id", "group_id"]),
            EdgeSpec::new(Rel::M2M, "a_friends", &["user_id", "friend_id"]),
        ];
        let groups = EdgeGroups::new(&edges).unwrap();
        assert!(groups.has_external());
        assert_eq!(groups.own_fk_edges().count(), 2);
        assert_eq!(groups.fk_edges().len(), 2);
        let tables: Vec<&str> = group_table(&groups.m2m).into_keys().collect();
        assert_eq!(tables, vec!["a_friends", "b_groups"]);

        let own_only = vec![EdgeSpec::new(Rel::O2O, "users", &["spouse_id"]).inverse(true)];
        assert!(!EdgeGroups::new(&own_only).unwrap().has_external());
    }

    #[test]
    fn edge_storage_side() {
        let card = EdgeSpec::new(Rel::O2O, "cards", &["owner_id"]);
        assert!(card.is_external());
        assert!(!card.is_own_fk());
        let spouse = EdgeSpec::new(Rel::O2O, "users", &["spouse_id"]).inverse(true);
        assert!(!spouse.is_external());
        assert!(spouse.is_own_fk());
        let partner = EdgeSpec::new(Rel::O2O, "users", &["partner_id"]).bidi(true);
        assert!(partner.is_external());
        assert!(partner.is_own_fk());
        let owner = EdgeSpec::new(Rel::M2O, "pets", &["owner_id"]);
        assert!(!owner.is_external());
        assert!(owner.is_own_fk());
        for rel in [Rel::O2M, Rel::M2M] {
            let edge = EdgeSpec::new(rel, "t", &["a", "b"]);
            assert!(edge.is_external());
            assert!(!edge.is_own_fk());
        }
    }

    #[test]
    fn target_id_column_defaults_to_id() {
        let edge = EdgeSpec::new(Rel::O2M, "pets", &["owner_id"]);
        assert_eq!(edge.target.id_column(), "id");
        let edge = edge.target_id(FieldSpec::new("pid", FieldType::Int));
        assert_eq!(edge.target.id_column(), "pid");
    }
}
