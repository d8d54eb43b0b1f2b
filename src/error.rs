use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid conditional: {0}")]
    InvalidConditional(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Invalid join: {0}")]
    InvalidJoin(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid driver: {0}")]
    InvalidDriver(String),

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<toml::de::Error> for QueryError {
    fn from(err: toml::de::Error) -> Self {
        QueryError::Config(err.to_string())
    }
}

#[cfg(feature = "mysql")]
impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => QueryError::Connection(err.to_string()),
            _ => QueryError::Database(err.to_string()),
        }
    }
}
