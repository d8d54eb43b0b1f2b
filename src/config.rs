use crate::engine::EngineKind;
use crate::error::{QueryError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Connection settings for a single backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Backend identifier: `mysql`, `mongo` or `mock`
    pub engine: String,
    pub host: String,
    pub db: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub charset: Option<String>,
    /// Registry name; the entry's position is used when absent
    #[serde(default)]
    pub name: Option<String>,
    /// Serve as the registry default
    #[serde(default)]
    pub default: bool,
}

impl ConnectionConfig {
    pub fn new(engine: impl Into<String>, host: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            host: host.into(),
            db: db.into(),
            port: None,
            username: None,
            password: None,
            charset: None,
            name: None,
            default: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    /// Check required fields and the engine identifier
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [("engine", &self.engine), ("host", &self.host), ("db", &self.db)] {
            if value.trim().is_empty() {
                return Err(QueryError::InvalidParams(format!(
                    "connection config is missing '{}'",
                    key
                )));
            }
        }
        self.engine_kind().map(|_| ())
    }

    pub fn engine_kind(&self) -> Result<EngineKind> {
        self.engine.parse()
    }
}

/// Top-level configuration file.
///
/// ```toml
/// [[connections]]
/// name = "primary"
/// engine = "mysql"
/// host = "localhost"
/// db = "app"
/// default = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

impl RegistryConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }
}
