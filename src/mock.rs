//! In-memory builder and driver.
//!
//! The mock builder renders a short description instead of a statement and
//! the mock driver records what it was asked to run.

use crate::backend::{Driver, ExecOptions, QueryResult, QueryRow};
use crate::builder::{assignment_params, condition_params, insert_rows, QueryBuilder};
use crate::command::{Command, CommandKind, Params, Payload};
use crate::error::{QueryError, Result};
use crate::query::Query;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

#[derive(Debug, Clone, Copy, Default)]
pub struct MockQueryBuilder;

impl MockQueryBuilder {
    pub fn new() -> Self {
        Self
    }

    fn describe(kind: CommandKind, query: &Query) -> Payload {
        let tables: Vec<&str> = query.segments().iter().map(|s| s.table.as_str()).collect();
        Payload::Text(format!("{} {}", kind, tables.join(", ")))
    }
}

impl QueryBuilder for MockQueryBuilder {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn select_command(&self, query: &Query) -> Result<Command> {
        let mut params = IndexMap::new();
        condition_params(query, &mut params);
        Ok(Command::new(
            CommandKind::Find,
            Self::describe(CommandKind::Find, query),
            Params::Named(params),
        ))
    }

    fn insert_command(&self, query: &Query) -> Result<Command> {
        let rows = insert_rows(query);
        if rows.is_empty() {
            return Err(QueryError::InvalidParams(
                "insert requires at least one row".to_string(),
            ));
        }
        Ok(Command::new(
            CommandKind::Insert,
            Self::describe(CommandKind::Insert, query),
            Params::Positional(rows.into_iter().flatten().collect()),
        ))
    }

    fn update_command(&self, query: &Query) -> Result<Command> {
        let mut params = IndexMap::new();
        assignment_params(query, &mut params);
        condition_params(query, &mut params);
        Ok(Command::new(
            CommandKind::Update,
            Self::describe(CommandKind::Update, query),
            Params::Named(params),
        ))
    }

    fn delete_command(&self, query: &Query) -> Result<Command> {
        let mut params = IndexMap::new();
        condition_params(query, &mut params);
        Ok(Command::new(
            CommandKind::Delete,
            Self::describe(CommandKind::Delete, query),
            Params::Named(params),
        ))
    }
}

/// A command as the mock driver received it
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedCommand {
    pub command: Command,
    /// Command params merged with the runtime params
    pub params: Params,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug)]
pub struct MockDriver {
    connected: AtomicBool,
    executed: Mutex<Vec<ExecutedCommand>>,
    rows: Vec<QueryRow>,
    affected: u64,
    connect_error: Option<String>,
    exec_error: Option<String>,
}

impl MockDriver {
    pub fn new() -> Self {
        let rows = (1..=2)
            .map(|i| {
                [
                    ("id", Value::String(i.to_string())),
                    ("value", Value::String(format!("row{}", i))),
                ]
                .into_iter()
                .collect()
            })
            .collect();

        Self {
            connected: AtomicBool::new(false),
            executed: Mutex::new(Vec::new()),
            rows,
            affected: 1,
            connect_error: None,
            exec_error: None,
        }
    }

    /// Rows returned for every find
    pub fn with_rows(mut self, rows: Vec<QueryRow>) -> Self {
        self.rows = rows;
        self
    }

    /// Affected count reported for inserts, updates and deletes
    pub fn with_affected(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    pub fn with_connect_error(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }

    pub fn with_exec_error(mut self, message: impl Into<String>) -> Self {
        self.exec_error = Some(message.into());
        self
    }

    /// Everything executed so far, oldest first
    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.log().clone()
    }

    fn log(&self) -> MutexGuard<'_, Vec<ExecutedCommand>> {
        self.executed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self) -> Result<()> {
        if let Some(message) = &self.connect_error {
            return Err(QueryError::Connection(message.clone()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn exec(&self, command: &Command, options: &ExecOptions) -> Result<QueryResult> {
        if let Some(message) = &self.exec_error {
            return Err(QueryError::Database(message.clone()));
        }

        let params = command.params().merged(&options.params);
        trace!(kind = %command.kind(), params = params.len(), "mock exec");
        self.log().push(ExecutedCommand {
            command: command.clone(),
            params,
            offset: options.offset,
            limit: options.limit,
        });

        match command.kind() {
            CommandKind::Find => {
                let offset = options.offset.unwrap_or(0) as usize;
                let limit = options.limit.map_or(usize::MAX, |l| l as usize);
                let rows = self.rows.iter().skip(offset).take(limit).cloned().collect();
                Ok(QueryResult::from_rows(rows))
            }
            _ => Ok(QueryResult::affected(self.affected)),
        }
    }
}
