//! Migration engine contract and the bundled script engine
//!
//! The adapter talks to an engine through one call:
//! [`MigrationEngine::migrate`] receives an [`EngineConfig`] (datasource,
//! locations, hooks, encoding) and either returns a [`MigrationOutcome`] or an
//! [`EngineError`]. [`ScriptEngine`] is the implementation shipped with this
//! crate; applications may plug in their own.

pub mod checksum;
pub mod history;
pub mod lock;
pub mod migrator;
pub mod resources;
pub mod script;
pub mod status;

use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::connection::DbError;
use crate::driver::DriverError;
use crate::hook::{HookEvent, LifecycleHook};
use crate::location::Location;

pub use migrator::ScriptEngine;
pub use status::MigrationStatus;

/// Script encoding handed to the engine
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Credentials the engine opens its own connection with
#[derive(Clone, PartialEq, Eq)]
pub struct DataSource {
    pub url: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("url", &crate::connection::sanitize_url(&self.url))
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Everything an engine needs for one migration run
#[derive(Clone)]
pub struct EngineConfig {
    pub datasource: DataSource,
    pub locations: Vec<Location>,
    pub hooks: Vec<Arc<dyn LifecycleHook>>,
    pub encoding: String,
}

impl EngineConfig {
    pub fn new(datasource: DataSource) -> Self {
        Self {
            datasource,
            locations: Vec::new(),
            hooks: Vec::new(),
            encoding: DEFAULT_ENCODING.to_string(),
        }
    }

    pub fn with_locations(mut self, locations: impl IntoIterator<Item = Location>) -> Self {
        self.locations.extend(locations);
        self
    }

    pub fn with_hooks(mut self, hooks: impl IntoIterator<Item = Arc<dyn LifecycleHook>>) -> Self {
        self.hooks.extend(hooks);
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks: Vec<&str> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("EngineConfig")
            .field("datasource", &self.datasource)
            .field("locations", &self.locations)
            .field("hooks", &hooks)
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// A script applied during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedScript {
    pub version: String,
    pub description: String,
    pub script: String,
    pub execution_time_ms: i64,
}

/// Result of a successful migration run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
    /// Scripts applied by this run, in order
    pub applied: Vec<AppliedScript>,
    /// Schema version after the run (`None` for an empty history)
    pub target_version: Option<String>,
}

impl MigrationOutcome {
    pub fn migrations_executed(&self) -> usize {
        self.applied.len()
    }
}

/// An external migration engine
pub trait MigrationEngine {
    fn migrate(&self, config: &EngineConfig) -> Result<MigrationOutcome, EngineError>;
}

/// Migration engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not open its datasource
    #[error("Datasource error: {0}")]
    Driver(#[from] DriverError),

    /// Database execution error
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Unsupported script encoding '{0}', only utf-8 is supported")]
    UnsupportedEncoding(String),

    #[error("Script {script} is not valid {encoding}")]
    InvalidEncoding { script: String, encoding: String },

    #[error("Unable to read location {location}: {reason}")]
    LocationUnreadable { location: String, reason: String },

    #[error("Found more than one script with version {version}: {first} and {second}")]
    DuplicateVersion {
        version: String,
        first: String,
        second: String,
    },

    #[error(
        "Script {script} (version {version}) has been modified after being applied.\n\
         Stored checksum: {stored}\n\
         Current checksum: {current}"
    )]
    ChecksumMismatch {
        version: String,
        script: String,
        stored: String,
        current: String,
    },

    #[error(
        "Applied migration {version} ({script}) was not found in any location.\n\
         Suggestion: Ensure all script locations are configured"
    )]
    MissingScript { version: String, script: String },

    #[error("Script version {version} is older than the latest applied version {latest}")]
    OutOfOrder { version: String, latest: String },

    #[error(
        "Migration lock timeout: {0}\n\
         Another process may be running migrations. If this persists, check for:\n\
         - Stuck migration process\n\
         - Manual lock row in flyway_schema_history (installed_rank = -1)"
    )]
    LockTimeout(String),

    #[error("Script {script} (version {version}) failed during execution: {source}")]
    ExecutionFailed {
        version: String,
        script: String,
        #[source]
        source: DbError,
    },

    #[error("Hook '{hook}' failed during {event}: {source}")]
    Hook {
        hook: String,
        event: HookEvent,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("Invalid history entry: {0}")]
    InvalidHistory(String),

    /// Failure reported by an external engine implementation
    #[error("{0}")]
    Engine(Box<dyn Error + Send + Sync>),
}
