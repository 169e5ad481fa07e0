//! Adapter-level error type
//!
//! Every failure inside the adapter is wrapped at its origin into a
//! [`MigrateError`]. The variant tells the caller which step failed, the
//! `source` chain carries the underlying cause, and every variant holds the
//! shared [`ErrorContext`] the adapter was constructed with.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::connection::DbError;
use crate::driver::DriverError;
use crate::engine::EngineError;

/// Error-reporting context shared by all errors of one adapter instance
///
/// Applications use it to tag failures with their own error code and a
/// human-readable description of the operation that was running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    code: i32,
    text: String,
}

impl ErrorContext {
    /// Create a new context
    pub fn new(code: i32, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    /// Application error code
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Description of the failing operation
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.text)
    }
}

/// Which step of the adapter failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A configuration key is missing
    Config,
    /// The driver could not be resolved, constructed or registered
    Driver,
    /// Opening or closing the adapter connection failed
    Connection,
    /// The diagnostic history-table query failed
    Probe,
    /// The migration engine reported a failure
    Migration,
}

/// Error returned by every fallible [`MigrationAdapter`](crate::MigrationAdapter) operation
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("{context}: configuration key '{key}' is not set")]
    Config {
        key: String,
        context: Arc<ErrorContext>,
    },

    #[error("{context}: failed to load driver '{driver}': {source}")]
    Driver {
        driver: String,
        #[source]
        source: DriverError,
        context: Arc<ErrorContext>,
    },

    #[error("{context}: connection to '{url}' failed: {source}")]
    Connection {
        url: String,
        #[source]
        source: DriverError,
        context: Arc<ErrorContext>,
    },

    #[error("{context}: migration history probe failed: {source}")]
    Probe {
        #[source]
        source: DbError,
        context: Arc<ErrorContext>,
    },

    #[error("{context}: migration failed: {source}")]
    Migration {
        #[source]
        source: EngineError,
        context: Arc<ErrorContext>,
    },
}

impl MigrateError {
    /// The step that failed
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrateError::Config { .. } => ErrorKind::Config,
            MigrateError::Driver { .. } => ErrorKind::Driver,
            MigrateError::Connection { .. } => ErrorKind::Connection,
            MigrateError::Probe { .. } => ErrorKind::Probe,
            MigrateError::Migration { .. } => ErrorKind::Migration,
        }
    }

    /// The shared context the adapter was created with
    pub fn context(&self) -> &Arc<ErrorContext> {
        match self {
            MigrateError::Config { context, .. }
            | MigrateError::Driver { context, .. }
            | MigrateError::Connection { context, .. }
            | MigrateError::Probe { context, .. }
            | MigrateError::Migration { context, .. } => context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn context() -> Arc<ErrorContext> {
        Arc::new(ErrorContext::new(4711, "schema update"))
    }

    #[test]
    fn test_context_display() {
        assert_eq!(context().to_string(), "[4711] schema update");
    }

    #[test]
    fn test_config_error_names_key() {
        let err = MigrateError::Config {
            key: "mydb.url".to_string(),
            context: context(),
        };
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("mydb.url"));
        assert!(err.to_string().starts_with("[4711] schema update"));
    }

    #[test]
    fn test_driver_error_keeps_cause() {
        let err = MigrateError::Driver {
            driver: "com.example.Missing".to_string(),
            source: DriverError::UnknownDriver("com.example.Missing".to_string()),
            context: context(),
        };
        assert_eq!(err.kind(), ErrorKind::Driver);
        let cause = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(cause.contains("com.example.Missing"));
    }

    #[test]
    fn test_all_kinds_share_context() {
        let shared = context();
        let errors = vec![
            MigrateError::Probe {
                source: DbError::Query("no such table".to_string()),
                context: Arc::clone(&shared),
            },
            MigrateError::Migration {
                source: EngineError::LockTimeout("busy".to_string()),
                context: Arc::clone(&shared),
            },
        ];

        for err in &errors {
            assert!(Arc::ptr_eq(err.context(), &shared));
        }
        assert_eq!(errors[0].kind(), ErrorKind::Probe);
        assert_eq!(errors[1].kind(), ErrorKind::Migration);
    }
}
