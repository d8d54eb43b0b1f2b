use crate::config::{ConnectionConfig, RegistryConfig};
use crate::engine::Engine;
use crate::error::{QueryError, Result};
use indexmap::IndexMap;
use std::path::Path;
use tracing::info;

/// Named set of configured engines.
///
/// The first entry is the default. Entries marked `default = true` are moved
/// to the front in turn, so the last of them ends up first. Unnamed entries
/// are registered under their position in the configuration list.
#[derive(Debug, Clone)]
pub struct Registry {
    engines: IndexMap<String, Engine>,
}

impl Registry {
    pub fn new(configs: Vec<ConnectionConfig>) -> Result<Self> {
        if configs.is_empty() {
            return Err(QueryError::InvalidParams(
                "at least one connection must be configured".to_string(),
            ));
        }

        let mut engines = IndexMap::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            let name = config.name.clone().unwrap_or_else(|| index.to_string());
            let engine = Engine::from_config(config)?;
            let (position, _) = engines.insert_full(name, engine);
            // each default goes to the front, so the last one listed wins
            if config.default {
                engines.move_index(position, 0);
            }
        }

        info!(connections = engines.len(), "registry initialized");
        Ok(Self { engines })
    }

    pub fn from_config(config: RegistryConfig) -> Result<Self> {
        Self::new(config.connections)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Self::from_config(RegistryConfig::from_toml_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_config(RegistryConfig::load(path)?)
    }

    pub fn default_engine(&self) -> &Engine {
        // never empty after construction
        &self.engines[0]
    }

    /// Look up by position for all-digit keys, by name otherwise
    pub fn get(&self, name: &str) -> Result<&Engine> {
        let engine = if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
            name.parse().ok().and_then(|i| self.get_index(i))
        } else {
            self.engines.get(name)
        };
        engine.ok_or_else(|| QueryError::InvalidConnection(format!("no connection named {}", name)))
    }

    pub fn get_index(&self, index: usize) -> Option<&Engine> {
        self.engines.get_index(index).map(|(_, engine)| engine)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
