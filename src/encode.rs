//! Fragment encoding shared by the builders.
//!
//! Every function here is pure: it turns one condition, join, order entry or
//! duplicate-key policy into a rendered fragment, plus the name of the
//! parameter the fragment consumes where there is one.

use crate::command::Params;
use crate::error::{QueryError, Result};
use crate::query::{
    Assignment, Condition, ConditionalOp, DuplicateKeyExpr, DuplicateKeyPolicy, Join, OrderBy,
    QuerySegment,
};
use serde_json::Value;

/// A rendered fragment and the parameter it binds, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub param: Option<String>,
}

/// Whether `value` is a caller-supplied placeholder such as `:id`
pub fn is_placeholder(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.starts_with(':'))
}

/// Deterministic parameter name for `input`: `:` followed by the hex digest
pub fn hash_param(input: &str) -> String {
    format!(":{}", blake3::hash(input.as_bytes()).to_hex())
}

/// Parameter name for a value bound against `table.field`.
///
/// Placeholders pass through untouched. Anything else is named after the
/// table and field, so two auto-named values on the same column share a name.
pub fn param_name(table: &str, field: &str, value: &Value) -> String {
    match value {
        Value::String(s) if s.starts_with(':') => s.clone(),
        _ => hash_param(&format!("{}{}", table, field)),
    }
}

/// Render the projection of one segment
pub fn encode_fields(segment: &QuerySegment) -> Vec<String> {
    if segment.fields.is_empty() {
        vec![format!("{}.*", segment.table)]
    } else {
        segment
            .fields
            .iter()
            .map(|field| format!("{}.{}", segment.table, field))
            .collect()
    }
}

pub fn encode_condition(table: &str, condition: &Condition) -> Fragment {
    let op = condition.operator();
    if op == ConditionalOp::IsNull {
        return Fragment {
            text: format!("{}.{} is null", table, condition.field),
            param: None,
        };
    }

    let param = param_name(table, &condition.field, &condition.value);
    let text = match op {
        ConditionalOp::In | ConditionalOp::NotIn => {
            format!("{}.{} {} ({})", table, condition.field, op, param)
        }
        _ => format!("{}.{} {} {}", table, condition.field, op, param),
    };

    Fragment {
        text,
        param: Some(param),
    }
}

/// Parameter name for a SET value on `table.field`.
///
/// Named apart from [`param_name`] so an update that assigns and filters on
/// the same column binds both values.
pub fn set_param_name(table: &str, field: &str, value: &Value) -> String {
    match value {
        Value::String(s) if s.starts_with(':') => s.clone(),
        _ => hash_param(&format!("set{}{}", table, field)),
    }
}

pub fn encode_assignment(table: &str, assignment: &Assignment) -> Fragment {
    let param = set_param_name(table, &assignment.field, &assignment.value);
    Fragment {
        text: format!("{}.{} = {}", table, assignment.field, param),
        param: Some(param),
    }
}

/// Render a join from `table` to the next segment
pub fn encode_join(table: &str, join: &Join) -> String {
    let on = join
        .on
        .iter()
        .map(|(local, target)| format!("{}.{} = {}.{}", table, local, join.table, target))
        .collect::<Vec<_>>()
        .join(" and ");
    format!("{} join {} on {}", join.join_type, join.table, on)
}

pub fn encode_order(table: &str, order: &OrderBy) -> String {
    format!("{}.{} {}", table, order.field, order.direction)
}

/// Positional placeholder group for one row, e.g. `(?, ?, ?)`
pub fn encode_row_placeholders(arity: usize) -> String {
    format!("({})", vec!["?"; arity].join(", "))
}

/// Normalize insert input into rows.
///
/// Each supplied value is either one row or an array of rows; it counts as
/// several rows when its first element is itself an array. An empty array
/// contributes no rows.
pub fn flatten_rows(inputs: &[Value]) -> Vec<Vec<Value>> {
    let mut rows = Vec::new();
    for input in inputs {
        match input {
            Value::Array(items) if items.is_empty() => {}
            Value::Array(items) if matches!(items.first(), Some(Value::Array(_))) => {
                for item in items {
                    match item {
                        Value::Array(row) => rows.push(row.clone()),
                        other => rows.push(vec![other.clone()]),
                    }
                }
            }
            Value::Array(row) => rows.push(row.clone()),
            other => rows.push(vec![other.clone()]),
        }
    }
    rows
}

/// Render one duplicate-key clause, or `None` when the column is retained.
///
/// `upsert_fn` names the backend function that refers to the value being
/// inserted, e.g. `values` for MySQL.
pub fn encode_duplicate_key(
    column: &str,
    policy: &DuplicateKeyPolicy,
    upsert_fn: &str,
) -> Result<Option<String>> {
    let rendered = match policy {
        DuplicateKeyPolicy::Retain => return Ok(None),
        DuplicateKeyPolicy::Update => format!("{}({})", upsert_fn, column),
        DuplicateKeyPolicy::Constant(value) => raw_value(value),
        DuplicateKeyPolicy::Expr(expr) => encode_expr(expr, upsert_fn)?,
    };
    Ok(Some(format!("{} = {}", column, rendered)))
}

fn encode_expr(expr: &DuplicateKeyExpr, upsert_fn: &str) -> Result<String> {
    match expr {
        DuplicateKeyExpr::Update(column) => Ok(format!("{}({})", upsert_fn, column)),
        DuplicateKeyExpr::Constant(value) => Ok(raw_value(value)),
        DuplicateKeyExpr::Op { op, operands } => {
            if operands.len() < 2 {
                return Err(QueryError::InvalidParams(format!(
                    "operator {} needs at least two operands",
                    op
                )));
            }
            let parts = operands
                .iter()
                .map(|operand| match operand {
                    DuplicateKeyExpr::Op { .. } => encode_expr(operand, upsert_fn).map(|s| format!("({})", s)),
                    _ => encode_expr(operand, upsert_fn),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(&format!(" {} ", op)))
        }
    }
}

/// Constants are written as-is; strings are not quoted
fn raw_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rewrite `:name` placeholders into positional `?` markers.
///
/// Returns the rewritten text and the values in binding order. Array values
/// expand into one marker per element. Text between single quotes is left
/// alone. Positional params are returned unchanged.
pub fn rewrite_named(text: &str, params: &Params) -> Result<(String, Vec<Value>)> {
    let named = match params {
        Params::Positional(values) => return Ok((text.to_string(), values.clone())),
        Params::Named(named) => named,
    };

    let mut sql = String::with_capacity(text.len());
    let mut values = Vec::new();
    let mut in_quote = false;
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c == '\'' {
            in_quote = !in_quote;
        }
        if c != ':' || in_quote {
            sql.push(c);
            continue;
        }

        let mut end = start + 1;
        while let Some(&(i, next)) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                end = i + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if end == start + 1 {
            sql.push(c);
            continue;
        }

        let name = &text[start..end];
        let value = named
            .get(name)
            .ok_or_else(|| QueryError::InvalidParams(format!("no value bound for {}", name)))?;
        match value {
            Value::Array(items) if items.is_empty() => sql.push_str("null"),
            Value::Array(items) => {
                sql.push_str(&vec!["?"; items.len()].join(", "));
                values.extend(items.iter().cloned());
            }
            other => {
                sql.push('?');
                values.push(other.clone());
            }
        }
    }

    Ok((sql, values))
}
