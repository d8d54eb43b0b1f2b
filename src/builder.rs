//! Backend query builders and the segment walks they share.

use crate::command::Command;
use crate::encode::{encode_assignment, encode_condition, flatten_rows};
use crate::error::Result;
use crate::query::{Assignment, Condition, DuplicateKeyPolicy, Join, OrderBy, Query, QuerySegment};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// Translates a [`Query`] into a backend-native [`Command`]
pub trait QueryBuilder: Send + Sync + fmt::Debug {
    /// Backend name, e.g. `mysql`
    fn name(&self) -> &'static str;

    fn select_command(&self, query: &Query) -> Result<Command>;

    fn insert_command(&self, query: &Query) -> Result<Command>;

    fn update_command(&self, query: &Query) -> Result<Command>;

    fn delete_command(&self, query: &Query) -> Result<Command>;
}

/// Table the statement is driven from
pub fn driving_table(query: &Query) -> &str {
    query
        .segments()
        .first()
        .map(|segment| segment.table.as_str())
        .unwrap_or_default()
}

/// Every condition across all segments, with its table, in statement order
pub fn conditions(query: &Query) -> impl Iterator<Item = (&QuerySegment, &Condition)> {
    query
        .segments()
        .iter()
        .flat_map(|segment| segment.conditions.iter().map(move |c| (segment, c)))
}

pub fn assignments(query: &Query) -> impl Iterator<Item = (&QuerySegment, &Assignment)> {
    query
        .segments()
        .iter()
        .flat_map(|segment| segment.assignments.iter().map(move |a| (segment, a)))
}

pub fn orders(query: &Query) -> impl Iterator<Item = (&QuerySegment, &OrderBy)> {
    query
        .segments()
        .iter()
        .flat_map(|segment| segment.order.iter().map(move |o| (segment, o)))
}

/// Joins paired with the table they join from
pub fn joins(query: &Query) -> impl Iterator<Item = (&QuerySegment, &Join)> {
    query
        .segments()
        .iter()
        .filter_map(|segment| segment.join.as_ref().map(|join| (segment, join)))
}

/// Insert target columns across all segments, first-seen order
pub fn insert_columns(query: &Query) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for segment in query.segments() {
        for column in &segment.columns {
            if !columns.contains(&column.as_str()) {
                columns.push(column);
            }
        }
    }
    columns
}

/// Insert rows across all segments
pub fn insert_rows(query: &Query) -> Vec<Vec<Value>> {
    let inputs: Vec<Value> = query
        .segments()
        .iter()
        .flat_map(|segment| segment.insert_rows.iter().cloned())
        .collect();
    flatten_rows(&inputs)
}

pub fn duplicate_key_policies(query: &Query) -> impl Iterator<Item = (&String, &DuplicateKeyPolicy)> {
    query
        .segments()
        .iter()
        .flat_map(|segment| segment.duplicate_key.iter())
}

/// Named parameters for every SET assignment, in statement order
pub fn assignment_params(query: &Query, params: &mut IndexMap<String, Value>) {
    for (segment, assignment) in assignments(query) {
        if let Some(name) = encode_assignment(&segment.table, assignment).param {
            params.insert(name, assignment.value.clone());
        }
    }
}

/// Named parameters for every condition, in statement order.
///
/// A name already present is overwritten in place.
pub fn condition_params(query: &Query, params: &mut IndexMap<String, Value>) {
    for (segment, condition) in conditions(query) {
        if let Some(name) = encode_condition(&segment.table, condition).param {
            params.insert(name, condition.value.clone());
        }
    }
}
