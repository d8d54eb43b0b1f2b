//! polyquery - Backend-agnostic query construction
//!
//! polyquery lets application code describe a select, insert, update or delete
//! once through a fluent [`Query`] and have it rendered for whichever backend
//! the connection is configured for.
//!
//! # Architecture
//!
//! - **Query → Command**: A backend-specific [`QueryBuilder`] turns the query
//!   model into a [`Command`] (payload plus parameters)
//! - **Command → Driver**: A [`Driver`] executes the command and returns rows
//!   or an affected count
//! - **Engine**: Pairs a builder with its driver; one per configured connection
//! - **Registry**: Named engines loaded from configuration, first one default
//!
//! # Features
//!
//! - **Multi-table queries**: Joins move the cursor so later calls apply to the
//!   joined table
//! - **Deterministic parameters**: Placeholder names derive from table and
//!   column; values that already look like `:name` pass through untouched
//! - **Upserts**: Per-column duplicate-key policies, including computed
//!   expressions
//! - **Document stores**: The same query renders as a JSON command document
//!
//! # Example
//!
//! ```rust,no_run
//! use polyquery::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let registry = Registry::from_toml_str(
//!         r#"
//!         [[connections]]
//!         engine = "mock"
//!         host = "localhost"
//!         db = "app"
//!         "#,
//!     )?;
//!     let engine = registry.default_engine();
//!
//!     let mut query = engine.table("users");
//!     query
//!         .select(["id", "name"])
//!         .where_op("age", 18, ">=")?
//!         .order_desc("age");
//!
//!     let rows = query.get(ExecOptions::new().limit(10)).await?;
//!     println!("Adults: {:?}", rows);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backend Support
//!
//! The MySQL driver is enabled via a Cargo feature:
//!
//! ```toml
//! [dependencies]
//! polyquery = { version = "0.1", features = ["mysql"] }
//! ```
//!
//! Without it, MySQL connections still build statements but report a missing
//! dependency when executed.

pub mod backend;
pub mod builder;
pub mod command;
pub mod config;
pub mod document;
pub mod encode;
pub mod engine;
pub mod error;
pub mod mock;
pub mod query;
pub mod registry;
pub mod sql;

#[cfg(feature = "mysql")]
pub mod mysql;

pub use backend::{Driver, ExecOptions, QueryResult, QueryRow, UnavailableDriver};
pub use builder::QueryBuilder;
pub use command::{Command, CommandKind, Params, Payload};
pub use config::{ConnectionConfig, RegistryConfig};
pub use document::DocumentQueryBuilder;
pub use engine::{Engine, EngineKind};
pub use error::{QueryError, Result};
pub use mock::{ExecutedCommand, MockDriver, MockQueryBuilder};
pub use query::{
    Condition, ConditionalOp, DuplicateKeyExpr, DuplicateKeyPolicy, ExprOp, Join, JoinType,
    Query, QuerySegment, SortDirection,
};
pub use registry::Registry;
pub use sql::SqlQueryBuilder;

#[cfg(feature = "mysql")]
pub use mysql::MySqlDriver;

/// Prelude for common imports
pub mod prelude {
    pub use crate::backend::{ExecOptions, QueryResult, QueryRow};
    pub use crate::engine::{Engine, EngineKind};
    pub use crate::error::{QueryError, Result};
    pub use crate::query::{DuplicateKeyExpr, DuplicateKeyPolicy, Query};
    pub use crate::registry::Registry;

    #[cfg(feature = "mysql")]
    pub use crate::mysql::MySqlDriver;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _engine = Engine::mock();
        let _op = ConditionalOp::Eq;
        let _join = JoinType::Left;
        let _policy = DuplicateKeyPolicy::Retain;
        let _params = Params::empty();
    }
}
