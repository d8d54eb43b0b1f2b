use crate::command::Command;
use crate::error::{QueryError, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// Row from a query result
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRow {
    pub columns: IndexMap<String, Value>,
}

impl QueryRow {
    pub fn new() -> Self {
        Self {
            columns: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.columns.insert(key, value);
    }

    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.columns
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.columns
            .get(key)
            .and_then(|v| v.as_str().map(String::from))
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.columns.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.columns.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.columns.get(key).and_then(|v| v.as_bool())
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for QueryRow {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Result of executing a command.
///
/// `count` is the number of rows returned for a find and the number of
/// affected rows otherwise.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    rows: Vec<QueryRow>,
    count: u64,
}

impl QueryResult {
    pub fn from_rows(rows: Vec<QueryRow>) -> Self {
        let count = rows.len() as u64;
        Self { rows, count }
    }

    pub fn affected(count: u64) -> Self {
        Self {
            rows: Vec::new(),
            count,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn as_array(&self) -> &[QueryRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryRow> {
        self.rows.iter()
    }

    pub fn into_rows(self) -> Vec<QueryRow> {
        self.rows
    }
}

impl IntoIterator for QueryResult {
    type Item = QueryRow;
    type IntoIter = std::vec::IntoIter<QueryRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a QueryRow;
    type IntoIter = std::slice::Iter<'a, QueryRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Runtime options for executing a command.
///
/// `offset` and `limit` are handed to the driver untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOptions {
    pub params: IndexMap<String, Value>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a runtime value for a named placeholder
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Executes commands against a backend
#[async_trait]
pub trait Driver: Send + Sync + fmt::Debug {
    /// Backend name, e.g. `mysql`
    fn name(&self) -> &'static str;

    /// Establish the connection
    async fn connect(&self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Execute a command, merging `options.params` into its parameters
    async fn exec(&self, command: &Command, options: &ExecOptions) -> Result<QueryResult>;
}

/// Driver for a backend whose client is not available in this build
#[derive(Debug, Clone)]
pub struct UnavailableDriver {
    name: &'static str,
    reason: String,
}

impl UnavailableDriver {
    pub fn new(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            reason: reason.into(),
        }
    }

    fn error(&self) -> QueryError {
        QueryError::MissingDependency(format!("{} driver: {}", self.name, self.reason))
    }
}

#[async_trait]
impl Driver for UnavailableDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn connect(&self) -> Result<()> {
        Err(self.error())
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn exec(&self, _command: &Command, _options: &ExecOptions) -> Result<QueryResult> {
        Err(self.error())
    }
}
