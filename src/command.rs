use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Kind of statement a command carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Find,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Find => write!(f, "find"),
            CommandKind::Insert => write!(f, "insert"),
            CommandKind::Update => write!(f, "update"),
            CommandKind::Delete => write!(f, "delete"),
        }
    }
}

/// Backend-native statement body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Document(Value),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Document(_) => None,
        }
    }

    pub fn as_document(&self) -> Option<&Value> {
        match self {
            Payload::Text(_) => None,
            Payload::Document(doc) => Some(doc),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => write!(f, "{}", text),
            Payload::Document(doc) => write!(f, "{}", doc),
        }
    }
}

/// Parameter bag bound alongside a payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Params {
    /// Keyed by placeholder name, leading `:` included
    Named(IndexMap<String, Value>),
    /// In placeholder order
    Positional(Vec<Value>),
}

impl Params {
    pub fn empty() -> Self {
        Params::Named(IndexMap::new())
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Named(named) => named.len(),
            Params::Positional(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a named parameter
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Params::Named(named) => named.get(name),
            Params::Positional(_) => None,
        }
    }

    pub fn positional(&self) -> Option<&[Value]> {
        match self {
            Params::Named(_) => None,
            Params::Positional(values) => Some(values),
        }
    }

    /// Combine with runtime parameters supplied at execution time.
    ///
    /// Named entries in `extra` override or extend the bag. Positional bags
    /// have nothing to bind names to and come back unchanged.
    pub fn merged(&self, extra: &IndexMap<String, Value>) -> Params {
        match self {
            Params::Named(named) => {
                let mut merged = named.clone();
                for (name, value) in extra {
                    merged.insert(name.clone(), value.clone());
                }
                Params::Named(merged)
            }
            Params::Positional(values) => {
                if !extra.is_empty() {
                    warn!(count = extra.len(), "ignoring named params for positional command");
                }
                Params::Positional(values.clone())
            }
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::empty()
    }
}

/// A rendered statement ready to hand to a driver
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    kind: CommandKind,
    payload: Payload,
    params: Params,
}

impl Command {
    pub fn new(kind: CommandKind, payload: Payload, params: Params) -> Self {
        Self {
            kind,
            payload,
            params,
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_command_accessors() {
        let mut params = IndexMap::new();
        params.insert(":bananas".to_string(), json!("delicious"));
        let command = Command::new(
            CommandKind::Find,
            Payload::Text("SELECT bananas FROM monkeys WHERE bananas = :bananas".to_string()),
            Params::Named(params),
        );

        assert_eq!(command.kind(), CommandKind::Find);
        assert_eq!(
            command.payload().as_text(),
            Some("SELECT bananas FROM monkeys WHERE bananas = :bananas")
        );
        assert_eq!(command.params().get(":bananas"), Some(&json!("delicious")));
    }

    #[test]
    fn test_merge_overrides_named() {
        let mut params = IndexMap::new();
        params.insert(":a".to_string(), json!(":a"));
        params.insert(":b".to_string(), json!(2));
        let mut extra = IndexMap::new();
        extra.insert(":a".to_string(), json!(1));
        extra.insert(":c".to_string(), json!(3));

        let merged = Params::Named(params).merged(&extra);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get(":a"), Some(&json!(1)));
        assert_eq!(merged.get(":c"), Some(&json!(3)));
    }

    #[test]
    fn test_merge_keeps_positional() {
        let mut extra = IndexMap::new();
        extra.insert(":a".to_string(), json!(1));

        let merged = Params::Positional(vec![json!(1), json!(2)]).merged(&extra);
        assert_eq!(merged.positional(), Some(&[json!(1), json!(2)][..]));
    }

    #[test]
    fn test_serialize() {
        let command = Command::new(
            CommandKind::Insert,
            Payload::Text("insert into t values (?)".to_string()),
            Params::Positional(vec![json!(1)]),
        );
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(
            value,
            json!({"kind": "insert", "payload": "insert into t values (?)", "params": [1]})
        );
    }
}
