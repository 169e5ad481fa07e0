//! In-memory driver and engine doubles shared by the unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::ConfigurationSource;
use crate::connection::{Connection, DbError, Row};
use crate::driver::Driver;
use crate::engine::{EngineConfig, EngineError, MigrationEngine, MigrationOutcome};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// A name no other test uses, for entries in the process-wide driver registry
pub fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, NEXT_ID.fetch_add(1, Ordering::SeqCst))
}

/// Configuration for `database` with user `sa` and an empty password
pub fn settings(database: &str, driver: &str, url: &str) -> Arc<dyn ConfigurationSource> {
    let mut values = HashMap::new();
    values.insert(format!("{database}.driver"), driver.to_string());
    values.insert(format!("{database}.url"), url.to_string());
    values.insert(format!("{database}.user"), "sa".to_string());
    values.insert(format!("{database}.passwd"), String::new());
    Arc::new(values)
}

#[derive(Debug, Default)]
pub struct MemoryLog {
    statements: Mutex<Vec<String>>,
    closed: AtomicUsize,
}

impl MemoryLog {
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, sql: &str) {
        if let Ok(mut statements) = self.statements.lock() {
            statements.push(sql.to_string());
        }
    }
}

/// Connection that records statements instead of running them
#[derive(Default)]
pub struct MemoryConnection {
    log: Arc<MemoryLog>,
    has_history_table: bool,
}

impl MemoryConnection {
    pub fn executed(&self) -> Vec<String> {
        self.log.statements()
    }
}

impl Connection for MemoryConnection {
    fn execute(&mut self, sql: &str) -> Result<u64, DbError> {
        self.log.record(sql);
        Ok(1)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        self.log.record(sql);
        Ok(())
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>, DbError> {
        self.log.record(sql);
        if sql.contains("flyway_schema_history") && !self.has_history_table {
            return Err(DbError::Query(
                "relation \"flyway_schema_history\" does not exist".to_string(),
            ));
        }
        Ok(Vec::new())
    }

    fn close(self: Box<Self>) -> Result<(), DbError> {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Driver handing out [`MemoryConnection`]s for URLs starting with its prefix
pub struct MemoryDriver {
    name: String,
    url_prefix: String,
    opened: Arc<AtomicUsize>,
    log: Arc<MemoryLog>,
    refuse_connections: bool,
    has_history_table: bool,
}

impl MemoryDriver {
    pub fn new(name: impl Into<String>, url_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_prefix: url_prefix.into(),
            opened: Arc::new(AtomicUsize::new(0)),
            log: Arc::new(MemoryLog::default()),
            refuse_connections: false,
            has_history_table: false,
        }
    }

    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    pub fn with_history_table(mut self) -> Self {
        self.has_history_table = true;
        self
    }

    /// Number of connection attempts, successful or not
    pub fn opened(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opened)
    }

    pub fn log(&self) -> Arc<MemoryLog> {
        Arc::clone(&self.log)
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts_url(&self, url: &str) -> bool {
        url.starts_with(&self.url_prefix)
    }

    fn connect(&self, _url: &str, _user: &str, _password: &str) -> Result<Box<dyn Connection>, DbError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connections {
            return Err(DbError::Other("connection refused".to_string()));
        }
        Ok(Box::new(MemoryConnection {
            log: Arc::clone(&self.log),
            has_history_table: self.has_history_table,
        }))
    }
}

/// Engine that records the configuration it was called with
#[derive(Clone, Default)]
pub struct RecordingEngine {
    calls: Arc<Mutex<Vec<EngineConfig>>>,
    fail: bool,
}

impl RecordingEngine {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<EngineConfig> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl MigrationEngine for RecordingEngine {
    fn migrate(&self, config: &EngineConfig) -> Result<MigrationOutcome, EngineError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(config.clone());
        }
        if self.fail {
            return Err(EngineError::Engine("script V3__broken.sql failed to parse".into()));
        }
        Ok(MigrationOutcome::default())
    }
}
