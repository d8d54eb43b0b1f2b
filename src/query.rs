use crate::backend::{ExecOptions, QueryResult};
use crate::command::Command;
use crate::engine::Engine;
use crate::error::{QueryError, Result};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Comparison operators for WHERE conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalOp {
    Eq,
    Ne,
    In,
    NotIn,
    Gt,
    Ge,
    Lt,
    Le,
    IsNull,
}

impl fmt::Display for ConditionalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionalOp::Eq => write!(f, "="),
            ConditionalOp::Ne => write!(f, "!="),
            ConditionalOp::In => write!(f, "in"),
            ConditionalOp::NotIn => write!(f, "not in"),
            ConditionalOp::Gt => write!(f, ">"),
            ConditionalOp::Ge => write!(f, ">="),
            ConditionalOp::Lt => write!(f, "<"),
            ConditionalOp::Le => write!(f, "<="),
            ConditionalOp::IsNull => write!(f, "is null"),
        }
    }
}

impl FromStr for ConditionalOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "=" => Ok(ConditionalOp::Eq),
            "!=" => Ok(ConditionalOp::Ne),
            "in" => Ok(ConditionalOp::In),
            "not in" => Ok(ConditionalOp::NotIn),
            ">" => Ok(ConditionalOp::Gt),
            ">=" => Ok(ConditionalOp::Ge),
            "<" => Ok(ConditionalOp::Lt),
            "<=" => Ok(ConditionalOp::Le),
            "is null" => Ok(ConditionalOp::IsNull),
            _ => Err(QueryError::InvalidConditional(format!(
                "{} is not a valid conditional",
                s
            ))),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(QueryError::InvalidOrder(format!("{} is not a valid order", s))),
        }
    }
}

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Outer,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "inner"),
            JoinType::Left => write!(f, "left"),
            JoinType::Right => write!(f, "right"),
            JoinType::Outer => write!(f, "outer"),
        }
    }
}

impl FromStr for JoinType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "inner" => Ok(JoinType::Inner),
            "left" => Ok(JoinType::Left),
            "right" => Ok(JoinType::Right),
            "outer" => Ok(JoinType::Outer),
            _ => Err(QueryError::InvalidJoin(format!("{} is not a valid join type", s))),
        }
    }
}

/// WHERE condition. The operator stays `None` when the caller omitted it and
/// is resolved to `=` only when the condition is rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub value: Value,
    pub op: Option<ConditionalOp>,
}

impl Condition {
    pub fn operator(&self) -> ConditionalOp {
        self.op.unwrap_or(ConditionalOp::Eq)
    }
}

/// SET assignment for update statements
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub field: String,
    pub value: Value,
}

/// ORDER BY entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

/// Join from one segment to the next.
///
/// `on` maps columns of the joining segment's table to columns of `table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    pub on: IndexMap<String, String>,
    pub join_type: JoinType,
}

/// Operators allowed inside a duplicate-key expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprOp {
    Add,
}

impl fmt::Display for ExprOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprOp::Add => write!(f, "+"),
        }
    }
}

/// Expression tree for a computed duplicate-key update
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateKeyExpr {
    /// The value that was about to be inserted into the named column
    Update(String),
    /// Written verbatim
    Constant(Value),
    Op {
        op: ExprOp,
        operands: Vec<DuplicateKeyExpr>,
    },
}

impl DuplicateKeyExpr {
    pub fn update(column: impl Into<String>) -> Self {
        DuplicateKeyExpr::Update(column.into())
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        DuplicateKeyExpr::Constant(value.into())
    }

    pub fn add(operands: Vec<DuplicateKeyExpr>) -> Self {
        DuplicateKeyExpr::Op {
            op: ExprOp::Add,
            operands,
        }
    }
}

/// What to do with a column when an insert hits an existing key
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateKeyPolicy {
    /// Keep the stored value; the column is left out of the update clause
    Retain,
    /// Overwrite with the value that was about to be inserted
    Update,
    /// Overwrite with a constant, written verbatim
    Constant(Value),
    /// Overwrite with a computed expression
    Expr(DuplicateKeyExpr),
}

/// Per-table slice of a query
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySegment {
    pub table: String,
    pub fields: IndexSet<String>,
    pub columns: IndexSet<String>,
    pub conditions: Vec<Condition>,
    pub assignments: Vec<Assignment>,
    pub order: Vec<OrderBy>,
    pub join: Option<Join>,
    pub insert_rows: Vec<Value>,
    pub duplicate_key: IndexMap<String, DuplicateKeyPolicy>,
}

impl QuerySegment {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: IndexSet::new(),
            columns: IndexSet::new(),
            conditions: Vec::new(),
            assignments: Vec::new(),
            order: Vec::new(),
            join: None,
            insert_rows: Vec::new(),
            duplicate_key: IndexMap::new(),
        }
    }
}

/// A single statement under construction.
///
/// Chaining methods always act on the segment under the cursor. The cursor
/// only moves forward, through [`Query::join`].
#[derive(Debug, Clone)]
pub struct Query {
    engine: Engine,
    segments: Vec<QuerySegment>,
    current: usize,
}

impl Query {
    /// Create a query against `table`, bound to `engine` for execution
    pub fn new(engine: Engine, table: impl Into<String>) -> Self {
        Self {
            engine,
            segments: vec![QuerySegment::new(table)],
            current: 0,
        }
    }

    /// Start a fresh segment for `name` at the cursor, discarding whatever
    /// the current segment had accumulated
    pub fn table(&mut self, name: impl Into<String>) -> &mut Self {
        self.segments.truncate(self.current);
        self.segments.push(QuerySegment::new(name));
        self
    }

    /// Add fields to the projection of the current table
    pub fn select<I, S>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segment = self.current_mut();
        for field in fields {
            segment.fields.insert(field.into());
        }
        self
    }

    /// Add insert target columns to the current table
    pub fn columns<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segment = self.current_mut();
        for column in columns {
            segment.columns.insert(column.into());
        }
        self
    }

    /// Add a condition with no explicit operator (rendered as `=`)
    pub fn where_eq(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.push_condition(field.into(), value.into(), None)
    }

    /// Add a condition with an operator given as text, e.g. `"not in"`
    pub fn where_op(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
        op: &str,
    ) -> Result<&mut Self> {
        let op = op.parse::<ConditionalOp>()?;
        Ok(self.push_condition(field.into(), value.into(), Some(op)))
    }

    pub fn where_in(&mut self, field: impl Into<String>, values: Vec<Value>) -> &mut Self {
        self.push_condition(field.into(), Value::Array(values), Some(ConditionalOp::In))
    }

    pub fn where_not_in(&mut self, field: impl Into<String>, values: Vec<Value>) -> &mut Self {
        self.push_condition(field.into(), Value::Array(values), Some(ConditionalOp::NotIn))
    }

    pub fn where_null(&mut self, field: impl Into<String>) -> &mut Self {
        self.push_condition(field.into(), Value::Null, Some(ConditionalOp::IsNull))
    }

    fn push_condition(&mut self, field: String, value: Value, op: Option<ConditionalOp>) -> &mut Self {
        self.current_mut().conditions.push(Condition { field, value, op });
        self
    }

    /// Add an ORDER BY entry; `direction` is `asc` or `desc` in any case
    pub fn order(&mut self, field: impl Into<String>, direction: &str) -> Result<&mut Self> {
        let direction = direction.parse::<SortDirection>()?;
        Ok(self.push_order(field.into(), direction))
    }

    pub fn order_asc(&mut self, field: impl Into<String>) -> &mut Self {
        self.push_order(field.into(), SortDirection::Asc)
    }

    pub fn order_desc(&mut self, field: impl Into<String>) -> &mut Self {
        self.push_order(field.into(), SortDirection::Desc)
    }

    fn push_order(&mut self, field: String, direction: SortDirection) -> &mut Self {
        self.current_mut().order.push(OrderBy { field, direction });
        self
    }

    /// Join `table` onto the current table and move the cursor to it.
    ///
    /// Subsequent chaining calls apply to `table`.
    pub fn join<I, K, V>(&mut self, table: impl Into<String>, on: I, join_type: &str) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let join_type = join_type.parse::<JoinType>()?;
        Ok(self.push_join(table.into(), on, join_type))
    }

    pub fn inner_join<I, K, V>(&mut self, table: impl Into<String>, on: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.push_join(table.into(), on, JoinType::Inner)
    }

    pub fn left_join<I, K, V>(&mut self, table: impl Into<String>, on: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.push_join(table.into(), on, JoinType::Left)
    }

    fn push_join<I, K, V>(&mut self, table: String, on: I, join_type: JoinType) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let on = on
            .into_iter()
            .map(|(local, target)| (local.into(), target.into()))
            .collect();
        self.current_mut().join = Some(Join {
            table: table.clone(),
            on,
            join_type,
        });
        self.current += 1;
        self.table(table)
    }

    /// Add a SET assignment for [`Query::update`]
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.current_mut().assignments.push(Assignment {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Stage insert rows on the current table without executing.
    ///
    /// `rows` is one row, or an array of rows.
    pub fn values(&mut self, rows: impl Into<Value>) -> &mut Self {
        self.current_mut().insert_rows.push(rows.into());
        self
    }

    /// Attach duplicate-key handling for a following [`Query::insert`]
    pub fn on_duplicate_key_update<I, K>(&mut self, policies: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, DuplicateKeyPolicy)>,
        K: Into<String>,
    {
        let segment = self.current_mut();
        for (column, policy) in policies {
            segment.duplicate_key.insert(column.into(), policy);
        }
        self
    }

    /// Read-only view of every segment, in statement order
    pub fn segments(&self) -> &[QuerySegment] {
        &self.segments
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn current_mut(&mut self) -> &mut QuerySegment {
        &mut self.segments[self.current]
    }

    /// Execute as a select
    pub async fn get(&self, options: ExecOptions) -> Result<QueryResult> {
        let command = self.engine.select_command(self)?;
        self.execute(command, options).await
    }

    /// Append `rows` (one row, or an array of rows) and execute as an insert
    pub async fn insert(&mut self, rows: impl Into<Value>, options: ExecOptions) -> Result<QueryResult> {
        self.values(rows);
        let command = self.engine.insert_command(self)?;
        self.execute(command, options).await
    }

    /// Execute as an update using the accumulated [`Query::set`] assignments
    pub async fn update(&self, options: ExecOptions) -> Result<QueryResult> {
        let command = self.engine.update_command(self)?;
        self.execute(command, options).await
    }

    /// Execute as a delete
    pub async fn delete(&self, options: ExecOptions) -> Result<QueryResult> {
        let command = self.engine.delete_command(self)?;
        self.execute(command, options).await
    }

    async fn execute(&self, command: Command, options: ExecOptions) -> Result<QueryResult> {
        debug!(
            kind = %command.kind(),
            payload = %command.payload(),
            params = command.params().len(),
            "built command"
        );
        self.engine.exec(&command, &options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(table: &str) -> Query {
        Engine::mock().table(table)
    }

    #[test]
    fn test_select_deduplicates_in_order() {
        let mut q = query("test");
        q.select(["b", "a"]).select(["a", "c", "b"]);

        let fields: Vec<&str> = q.segments()[0].fields.iter().map(String::as_str).collect();
        assert_eq!(fields, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_columns_deduplicate() {
        let mut q = query("test");
        q.columns(["x", "y", "x"]);

        assert_eq!(q.segments()[0].columns.len(), 2);
    }

    #[test]
    fn test_where_operator_is_case_insensitive() {
        let mut q = query("test");
        q.where_op("a", 1, "NOT IN").unwrap().where_op("b", 2, "Is Null").unwrap();

        let conditions = &q.segments()[0].conditions;
        assert_eq!(conditions[0].op, Some(ConditionalOp::NotIn));
        assert_eq!(conditions[1].op, Some(ConditionalOp::IsNull));
    }

    #[test]
    fn test_where_operator_defaults_lazily() {
        let mut q = query("test");
        q.where_eq("a", "x");

        let condition = &q.segments()[0].conditions[0];
        assert_eq!(condition.op, None);
        assert_eq!(condition.operator(), ConditionalOp::Eq);
    }

    #[test]
    fn test_invalid_conditional_leaves_query_untouched() {
        let mut q = query("test");
        q.where_eq("a", 1);

        let err = q.where_op("b", 2, "like").unwrap_err();
        assert!(matches!(err, QueryError::InvalidConditional(_)));
        assert_eq!(q.segments()[0].conditions.len(), 1);
    }

    #[test]
    fn test_order_validation() {
        let mut q = query("test");
        q.order("a", "DESC").unwrap();

        assert_eq!(q.segments()[0].order[0].direction, SortDirection::Desc);
        assert!(matches!(q.order("a", "up"), Err(QueryError::InvalidOrder(_))));
        assert_eq!(q.segments()[0].order.len(), 1);
    }

    #[test]
    fn test_join_advances_cursor() {
        let mut q = query("test");
        q.select(["a"])
            .join("test2", [("a", "b")], "LEFT")
            .unwrap()
            .select(["c"])
            .where_eq("c", 1);

        assert_eq!(q.current_index(), 1);
        let segments = q.segments();
        assert_eq!(segments.len(), 2);

        let join = segments[0].join.as_ref().unwrap();
        assert_eq!(join.table, "test2");
        assert_eq!(join.join_type, JoinType::Left);
        assert_eq!(join.on.get("a").map(String::as_str), Some("b"));

        assert_eq!(segments[0].fields.len(), 1);
        assert!(segments[0].conditions.is_empty());
        assert_eq!(segments[1].table, "test2");
        assert!(segments[1].fields.contains("c"));
        assert_eq!(segments[1].conditions.len(), 1);
    }

    #[test]
    fn test_invalid_join_does_not_advance() {
        let mut q = query("test");
        let err = q.join("test2", [("a", "b")], "cross").unwrap_err();

        assert!(matches!(err, QueryError::InvalidJoin(_)));
        assert_eq!(q.current_index(), 0);
        assert_eq!(q.segments().len(), 1);
        assert!(q.segments()[0].join.is_none());
    }

    #[test]
    fn test_table_resets_current_segment() {
        let mut q = query("test");
        q.select(["a"]).where_eq("a", 1).table("other");

        assert_eq!(q.segments().len(), 1);
        assert_eq!(q.segments()[0].table, "other");
        assert!(q.segments()[0].fields.is_empty());
        assert!(q.segments()[0].conditions.is_empty());
    }

    #[test]
    fn test_duplicate_key_policy_overwrites_in_place() {
        let mut q = query("test");
        q.on_duplicate_key_update([("a", DuplicateKeyPolicy::Update), ("b", DuplicateKeyPolicy::Retain)])
            .on_duplicate_key_update([("a", DuplicateKeyPolicy::Constant(json!(2)))]);

        let policies: Vec<_> = q.segments()[0].duplicate_key.iter().collect();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].0, "a");
        assert_eq!(policies[0].1, &DuplicateKeyPolicy::Constant(json!(2)));
    }

    #[test]
    fn test_parse_display_match() {
        for op in ["=", "!=", "in", "not in", ">", ">=", "<", "<=", "is null"] {
            assert_eq!(op.parse::<ConditionalOp>().unwrap().to_string(), op);
        }
        assert_eq!("OUTER".parse::<JoinType>().unwrap().to_string(), "outer");
    }
}
