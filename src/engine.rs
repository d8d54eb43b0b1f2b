use crate::backend::{Driver, ExecOptions, QueryResult, UnavailableDriver};
use crate::builder::QueryBuilder;
use crate::command::Command;
use crate::config::ConnectionConfig;
use crate::document::DocumentQueryBuilder;
use crate::error::{QueryError, Result};
use crate::mock::{MockDriver, MockQueryBuilder};
use crate::query::Query;
use crate::sql::SqlQueryBuilder;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Backend family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    MySql,
    Mongo,
    Mock,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::MySql => write!(f, "mysql"),
            EngineKind::Mongo => write!(f, "mongo"),
            EngineKind::Mock => write!(f, "mock"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(EngineKind::MySql),
            "mongo" => Ok(EngineKind::Mongo),
            "mock" => Ok(EngineKind::Mock),
            _ => Err(QueryError::InvalidDriver(format!("{} is not a supported engine", s))),
        }
    }
}

/// A query builder paired with the driver that executes its commands
#[derive(Clone)]
pub struct Engine {
    kind: EngineKind,
    builder: Arc<dyn QueryBuilder>,
    driver: Arc<dyn Driver>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("kind", &self.kind)
            .field("builder", &self.builder.name())
            .field("driver", &self.driver.name())
            .finish()
    }
}

impl Engine {
    pub fn new(kind: EngineKind, builder: Arc<dyn QueryBuilder>, driver: Arc<dyn Driver>) -> Self {
        Self {
            kind,
            builder,
            driver,
        }
    }

    /// Build the engine a connection config describes.
    ///
    /// Nothing is opened here; the driver connects on first use.
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let kind = config.engine_kind()?;

        let engine = match kind {
            EngineKind::MySql => Self::new(kind, Arc::new(SqlQueryBuilder::new()), mysql_driver(config)),
            EngineKind::Mongo => Self::new(
                kind,
                Arc::new(DocumentQueryBuilder::new()),
                Arc::new(UnavailableDriver::new("mongo", "no document store client is bundled")),
            ),
            EngineKind::Mock => Self::mock(),
        };

        debug!(engine = %kind, host = %config.host, db = %config.db, "engine configured");
        Ok(engine)
    }

    /// In-memory engine for tests and dry runs
    pub fn mock() -> Self {
        Self::new(
            EngineKind::Mock,
            Arc::new(MockQueryBuilder::new()),
            Arc::new(MockDriver::new()),
        )
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn builder(&self) -> &Arc<dyn QueryBuilder> {
        &self.builder
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Start a query against `name`
    pub fn table(&self, name: impl Into<String>) -> Query {
        Query::new(self.clone(), name)
    }

    pub async fn connect(&self) -> Result<()> {
        self.driver.connect().await
    }

    /// Execute a built command, connecting first if needed
    pub async fn exec(&self, command: &Command, options: &ExecOptions) -> Result<QueryResult> {
        if !self.driver.is_connected() {
            debug!(driver = self.driver.name(), "connecting on first use");
            self.driver.connect().await?;
        }
        self.driver.exec(command, options).await
    }

    pub fn select_command(&self, query: &Query) -> Result<Command> {
        self.builder.select_command(query)
    }

    pub fn insert_command(&self, query: &Query) -> Result<Command> {
        self.builder.insert_command(query)
    }

    pub fn update_command(&self, query: &Query) -> Result<Command> {
        self.builder.update_command(query)
    }

    pub fn delete_command(&self, query: &Query) -> Result<Command> {
        self.builder.delete_command(query)
    }
}

#[cfg(feature = "mysql")]
fn mysql_driver(config: &ConnectionConfig) -> Arc<dyn Driver> {
    Arc::new(crate::mysql::MySqlDriver::new(config))
}

#[cfg(not(feature = "mysql"))]
fn mysql_driver(_config: &ConnectionConfig) -> Arc<dyn Driver> {
    Arc::new(UnavailableDriver::new("mysql", "built without the `mysql` feature"))
}
