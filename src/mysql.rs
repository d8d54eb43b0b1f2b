use crate::backend::{Driver, ExecOptions, QueryResult, QueryRow};
use crate::command::{Command, CommandKind};
use crate::config::ConnectionConfig;
use crate::encode::rewrite_named;
use crate::error::{QueryError, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::query::Query as SqlxQuery;
use sqlx::{Column, Connection, Row};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

const DEFAULT_PORT: u16 = 3306;
const DEFAULT_USER: &str = "root";
const DEFAULT_CHARSET: &str = "utf8mb4";

/// MySQL driver over a single connection
pub struct MySqlDriver {
    options: MySqlConnectOptions,
    host: String,
    db: String,
    conn: Mutex<Option<MySqlConnection>>,
    connected: AtomicBool,
}

impl fmt::Debug for MySqlDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlDriver")
            .field("host", &self.host)
            .field("db", &self.db)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl MySqlDriver {
    /// Prepare a driver; the connection is opened by [`Driver::connect`]
    pub fn new(config: &ConnectionConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port.unwrap_or(DEFAULT_PORT))
            .username(config.username.as_deref().unwrap_or(DEFAULT_USER))
            .password(config.password.as_deref().unwrap_or_default())
            .database(&config.db)
            .charset(config.charset.as_deref().unwrap_or(DEFAULT_CHARSET));

        Self {
            options,
            host: config.host.clone(),
            db: config.db.clone(),
            conn: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Convert MySQL row to QueryRow
    fn convert_row(row: &MySqlRow) -> QueryRow {
        let mut query_row = QueryRow::new();

        for column in row.columns() {
            let name = column.name();

            let value = if let Ok(value) = row.try_get::<String, _>(name) {
                Value::String(value)
            } else if let Ok(value) = row.try_get::<i64, _>(name) {
                Value::Number(value.into())
            } else if let Ok(value) = row.try_get::<u64, _>(name) {
                Value::Number(value.into())
            } else if let Ok(value) = row.try_get::<f64, _>(name) {
                serde_json::Number::from_f64(value)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            } else if let Ok(value) = row.try_get::<bool, _>(name) {
                Value::Bool(value)
            } else {
                Value::Null
            };
            query_row.insert(name.to_string(), value);
        }

        query_row
    }
}

fn bind_value<'q>(
    query: SqlxQuery<'q, MySql, MySqlArguments>,
    value: &Value,
) -> SqlxQuery<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u)
            } else {
                query.bind(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// Append `limit`/`offset` to a select
fn paginate(sql: &mut String, options: &ExecOptions) {
    match (options.limit, options.offset) {
        (Some(limit), Some(offset)) => sql.push_str(&format!(" limit {} offset {}", limit, offset)),
        (Some(limit), None) => sql.push_str(&format!(" limit {}", limit)),
        // MySQL has no offset without limit
        (None, Some(offset)) => sql.push_str(&format!(" limit {} offset {}", u64::MAX, offset)),
        (None, None) => {}
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn connect(&self) -> Result<()> {
        let mut conn = self.conn.lock().await;
        if conn.is_some() {
            return Ok(());
        }

        let connection = MySqlConnection::connect_with(&self.options)
            .await
            .map_err(|e| QueryError::Connection(e.to_string()))?;
        *conn = Some(connection);
        self.connected.store(true, Ordering::SeqCst);

        info!(host = %self.host, db = %self.db, "connected to mysql");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn exec(&self, command: &Command, options: &ExecOptions) -> Result<QueryResult> {
        let text = command.payload().as_text().ok_or_else(|| {
            QueryError::Unsupported("mysql driver executes text commands only".to_string())
        })?;

        let params = command.params().merged(&options.params);
        let (mut sql, values) = rewrite_named(text, &params)?;
        if command.kind() == CommandKind::Find {
            paginate(&mut sql, options);
        }
        debug!(sql = %sql, binds = values.len(), "mysql exec");

        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| QueryError::Connection("not connected".to_string()))?;

        let mut query = sqlx::query(&sql);
        for value in &values {
            query = bind_value(query, value);
        }

        match command.kind() {
            CommandKind::Find => {
                let rows = query.fetch_all(&mut *conn).await?;
                Ok(QueryResult::from_rows(rows.iter().map(Self::convert_row).collect()))
            }
            _ => {
                let result = query.execute(&mut *conn).await?;
                Ok(QueryResult::affected(result.rows_affected()))
            }
        }
    }
}
