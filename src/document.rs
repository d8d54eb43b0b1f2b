//! Document-store query builder.
//!
//! Commands are JSON documents in the shape a document database accepts as a
//! database command (`find`, `aggregate`, `insert`, `update`, `delete`).
//! Filter values are parameter names; the driver resolves them from the
//! command's params. Fields of the driving collection are addressed bare,
//! fields of joined collections as `{collection}.{field}`.
//!
//! Projections are inclusion-only. When no field of the driving collection is
//! selected the whole document is returned, joined collections included, so
//! fields selected on a joined collection alone do not narrow the result.

use crate::builder::{
    assignment_params, assignments, condition_params, conditions, driving_table,
    duplicate_key_policies, insert_columns, insert_rows, joins, orders, QueryBuilder,
};
use crate::command::{Command, CommandKind, Params, Payload};
use crate::encode::{param_name, set_param_name};
use crate::error::{QueryError, Result};
use crate::query::{Condition, ConditionalOp, JoinType, Query, QuerySegment, SortDirection};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::trace;

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentQueryBuilder;

impl DocumentQueryBuilder {
    pub fn new() -> Self {
        Self
    }
}

/// Path of `field` on `segment` as seen from the driving collection
fn address(query: &Query, segment: &QuerySegment, field: &str) -> String {
    if std::ptr::eq(segment, &query.segments()[0]) {
        field.to_string()
    } else {
        format!("{}.{}", segment.table, field)
    }
}

fn operator(op: ConditionalOp) -> &'static str {
    match op {
        ConditionalOp::Eq | ConditionalOp::IsNull => "$eq",
        ConditionalOp::Ne => "$ne",
        ConditionalOp::In => "$in",
        ConditionalOp::NotIn => "$nin",
        ConditionalOp::Gt => "$gt",
        ConditionalOp::Ge => "$gte",
        ConditionalOp::Lt => "$lt",
        ConditionalOp::Le => "$lte",
    }
}

fn clause(query: &Query, segment: &QuerySegment, condition: &Condition) -> Value {
    let op = condition.operator();
    let operand = match op {
        ConditionalOp::IsNull => Value::Null,
        _ => Value::String(param_name(&segment.table, &condition.field, &condition.value)),
    };

    let mut inner = Map::new();
    inner.insert(operator(op).to_string(), operand);
    let mut outer = Map::new();
    outer.insert(address(query, segment, &condition.field), Value::Object(inner));
    Value::Object(outer)
}

fn filter(query: &Query) -> Value {
    let mut clauses: Vec<Value> = conditions(query)
        .map(|(segment, condition)| clause(query, segment, condition))
        .collect();
    match clauses.len() {
        0 => json!({}),
        1 => clauses.remove(0),
        _ => json!({ "$and": clauses }),
    }
}

/// Sort document; a field can appear only once
fn sort(query: &Query) -> Result<Option<Value>> {
    let mut sort = Map::new();
    for (segment, order) in orders(query) {
        let direction = match order.direction {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        };
        let key = address(query, segment, &order.field);
        if sort.contains_key(&key) {
            return Err(QueryError::Unsupported(format!(
                "{} is ordered more than once",
                key
            )));
        }
        sort.insert(key, json!(direction));
    }
    Ok((!sort.is_empty()).then_some(Value::Object(sort)))
}

/// Inclusion projection, or `None` when the driving collection is unrestricted.
///
/// An unrestricted driving collection cannot be combined with an inclusion
/// list, so joined-collection fields are dropped in that case.
fn projection(query: &Query) -> Option<Value> {
    let driving = query.segments().first()?;
    if driving.fields.is_empty() {
        return None;
    }

    let mut projection = Map::new();
    for (index, segment) in query.segments().iter().enumerate() {
        if index > 0 && segment.fields.is_empty() {
            projection.insert(segment.table.clone(), json!(1));
            continue;
        }
        for field in &segment.fields {
            projection.insert(address(query, segment, field), json!(1));
        }
    }
    Some(Value::Object(projection))
}

fn lookup_stages(query: &Query) -> Result<Vec<Value>> {
    let mut stages = Vec::new();
    for (segment, join) in joins(query) {
        if join.on.len() != 1 {
            return Err(QueryError::Unsupported(format!(
                "document joins take exactly one key pair, {} has {}",
                join.table,
                join.on.len()
            )));
        }
        let preserve = match join.join_type {
            JoinType::Inner => false,
            JoinType::Left => true,
            other => {
                return Err(QueryError::Unsupported(format!(
                    "{} joins are not supported by the document builder",
                    other
                )))
            }
        };
        let (local, foreign) = join
            .on
            .first()
            .ok_or_else(|| QueryError::InvalidParams(format!("join to {} has no keys", join.table)))?;

        stages.push(json!({
            "$lookup": {
                "from": join.table,
                "localField": address(query, segment, local),
                "foreignField": foreign,
                "as": join.table,
            }
        }));
        stages.push(json!({
            "$unwind": {
                "path": format!("${}", join.table),
                "preserveNullAndEmptyArrays": preserve,
            }
        }));
    }
    Ok(stages)
}

fn reject_joins(query: &Query, operation: &str) -> Result<()> {
    if joins(query).next().is_some() {
        return Err(QueryError::Unsupported(format!(
            "{} across joined collections is not supported by the document builder",
            operation
        )));
    }
    Ok(())
}

impl QueryBuilder for DocumentQueryBuilder {
    fn name(&self) -> &'static str {
        "mongo"
    }

    fn select_command(&self, query: &Query) -> Result<Command> {
        let collection = driving_table(query);
        let filter = filter(query);
        let sort = sort(query)?;
        let lookups = lookup_stages(query)?;

        let document = if lookups.is_empty() {
            let mut document = Map::new();
            document.insert("find".to_string(), json!(collection));
            document.insert("filter".to_string(), filter);
            if let Some(projection) = projection(query) {
                document.insert("projection".to_string(), projection);
            }
            if let Some(sort) = sort {
                document.insert("sort".to_string(), sort);
            }
            Value::Object(document)
        } else {
            let mut pipeline = lookups;
            if filter.as_object().is_some_and(|f| !f.is_empty()) {
                pipeline.push(json!({ "$match": filter }));
            }
            if let Some(sort) = sort {
                pipeline.push(json!({ "$sort": sort }));
            }
            if let Some(projection) = projection(query) {
                pipeline.push(json!({ "$project": projection }));
            }
            json!({ "aggregate": collection, "pipeline": pipeline })
        };

        let mut params = IndexMap::new();
        condition_params(query, &mut params);

        trace!(%document, "rendered find");
        Ok(Command::new(CommandKind::Find, Payload::Document(document), Params::Named(params)))
    }

    fn insert_command(&self, query: &Query) -> Result<Command> {
        if duplicate_key_policies(query).next().is_some() {
            return Err(QueryError::Unsupported(
                "duplicate-key policies are not supported by the document builder".to_string(),
            ));
        }

        let columns = insert_columns(query);
        if columns.is_empty() {
            return Err(QueryError::InvalidParams(
                "document inserts require columns".to_string(),
            ));
        }

        let rows = insert_rows(query);
        if rows.is_empty() {
            return Err(QueryError::InvalidParams(
                "insert requires at least one row".to_string(),
            ));
        }

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != columns.len() {
                return Err(QueryError::InvalidParams(format!(
                    "row has {} values for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            let document: Map<String, Value> = columns
                .iter()
                .map(|column| column.to_string())
                .zip(row)
                .collect();
            documents.push(Value::Object(document));
        }

        let document = json!({ "insert": driving_table(query), "documents": documents });

        trace!(%document, "rendered insert");
        Ok(Command::new(CommandKind::Insert, Payload::Document(document), Params::empty()))
    }

    fn update_command(&self, query: &Query) -> Result<Command> {
        reject_joins(query, "update")?;

        let mut set = Map::new();
        for (segment, assignment) in assignments(query) {
            set.insert(
                assignment.field.clone(),
                json!(set_param_name(&segment.table, &assignment.field, &assignment.value)),
            );
        }
        if set.is_empty() {
            return Err(QueryError::InvalidParams(
                "update requires at least one assignment".to_string(),
            ));
        }

        let document = json!({
            "update": driving_table(query),
            "updates": [{ "q": filter(query), "u": { "$set": set }, "multi": true }],
        });

        let mut params = IndexMap::new();
        assignment_params(query, &mut params);
        condition_params(query, &mut params);

        trace!(%document, "rendered update");
        Ok(Command::new(CommandKind::Update, Payload::Document(document), Params::Named(params)))
    }

    fn delete_command(&self, query: &Query) -> Result<Command> {
        reject_joins(query, "delete")?;

        let document = json!({
            "delete": driving_table(query),
            "deletes": [{ "q": filter(query), "limit": 0 }],
        });

        let mut params = IndexMap::new();
        condition_params(query, &mut params);

        trace!(%document, "rendered delete");
        Ok(Command::new(CommandKind::Delete, Payload::Document(document), Params::Named(params)))
    }
}
