//! # dbmigrate
//!
//! Configuration-driven schema migration for blocking Rust services.
//!
//! A [`MigrationAdapter`] reads `driver`, `url`, `user` and `passwd` for a logical
//! database name from a [`ConfigurationSource`], loads the driver into the
//! process-wide [`DriverRegistry`], checks that the database is reachable and then
//! hands an [`EngineConfig`] to a [`MigrationEngine`]. The crate ships one engine,
//! [`ScriptEngine`], which applies Flyway-style `V<version>__<name>.sql` scripts.
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use dbmigrate::{ErrorContext, MigrationAdapter};
//!
//! let mut settings = HashMap::new();
//! settings.insert("app.driver".to_string(), "sqlite".to_string());
//! settings.insert("app.url".to_string(), "sqlite:app.db".to_string());
//! settings.insert("app.user".to_string(), String::new());
//! settings.insert("app.passwd".to_string(), String::new());
//!
//! let context = Arc::new(ErrorContext::new(100, "database migration failed"));
//! let mut adapter = MigrationAdapter::new(Arc::new(settings), "app", context);
//! adapter.add_file_location("db/patches", true);
//! let outcome = adapter.migrate_db(true)?;
//! println!("applied {} script(s)", outcome.migrations_executed());
//! # Ok::<(), dbmigrate::MigrateError>(())
//! ```

pub mod adapter;
pub mod config;
pub mod connection;
pub mod driver;
pub mod engine;
pub mod error;
pub mod hook;
pub mod location;

mod macros;
#[cfg(test)]
mod test_support;

pub use adapter::MigrationAdapter;
pub use config::ConfigurationSource;
pub use connection::{Connection, ConnectionSlot, DbError, Row};
pub use driver::{Driver, DriverError, DriverRegistry};
pub use engine::{
    DataSource, EngineConfig, EngineError, MigrationEngine, MigrationOutcome, ScriptEngine,
};
pub use error::{ErrorContext, ErrorKind, MigrateError};
pub use hook::{HookContext, HookEvent, LifecycleHook};
pub use location::{Location, LocationKind, LocationRegistry};
