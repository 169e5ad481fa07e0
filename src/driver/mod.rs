//! Driver catalog and process-wide driver registry
//!
//! Drivers are looked up by name the way configuration files name them
//! (`postgres`, `org.postgresql.Driver`, `sqlite`, ...). The catalog maps every
//! accepted name to a factory; [`DriverRegistry::load`] constructs the driver
//! and registers it under its canonical [`Driver::name`]. Registration is
//! idempotent: loading the same driver twice, under any of its names,
//! constructs it once and returns the registered instance afterwards.
//!
//! [`DriverRegistry::connect`] then opens a connection with the first
//! registered driver that accepts the URL.

pub mod postgres;
pub mod sqlite;

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::connection::{sanitize_url, Connection, DbError};

pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

/// A database driver
pub trait Driver: Send + Sync {
    /// Canonical name the driver is registered under
    fn name(&self) -> &str;

    /// Whether this driver can open `url`
    fn accepts_url(&self, url: &str) -> bool;

    /// Open a new connection
    fn connect(&self, url: &str, user: &str, password: &str)
        -> Result<Box<dyn Connection>, DbError>;
}

/// Constructs a driver instance on demand
pub type DriverFactory = Box<dyn Fn() -> Result<Arc<dyn Driver>, DriverError> + Send + Sync>;

/// Driver loading and lookup errors
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no driver named '{0}' is available")]
    UnknownDriver(String),

    #[error("driver '{name}' could not be constructed: {reason}")]
    Construction { name: String, reason: String },

    #[error("no suitable driver found for '{0}'")]
    NoSuitableDriver(String),

    #[error("driver registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error(transparent)]
    Connect(#[from] DbError),
}

struct RegistryState {
    /// Lookup name (canonical name or alias) -> factory
    factories: HashMap<String, Arc<DriverFactory>>,
    /// Lookup name -> canonical name, filled when a driver is loaded
    resolved: HashMap<String, String>,
    /// Registered drivers in registration order
    drivers: Vec<Arc<dyn Driver>>,
}

impl RegistryState {
    fn with_builtin_drivers() -> Self {
        let mut state = Self {
            factories: HashMap::new(),
            resolved: HashMap::new(),
            drivers: Vec::new(),
        };

        let pg_factory: Arc<DriverFactory> =
            Arc::new(Box::new(|| Ok::<_, DriverError>(Arc::new(PostgresDriver) as Arc<dyn Driver>)));
        for name in [postgres::NAME, "postgresql", "org.postgresql.Driver"] {
            state.factories.insert(name.to_string(), Arc::clone(&pg_factory));
        }

        let sqlite_factory: Arc<DriverFactory> =
            Arc::new(Box::new(|| Ok::<_, DriverError>(Arc::new(SqliteDriver) as Arc<dyn Driver>)));
        for name in [sqlite::NAME, "org.sqlite.JDBC"] {
            state.factories.insert(name.to_string(), Arc::clone(&sqlite_factory));
        }

        state
    }

    fn registered(&self, canonical: &str) -> Option<Arc<dyn Driver>> {
        self.drivers
            .iter()
            .find(|d| d.name() == canonical)
            .map(Arc::clone)
    }
}

static REGISTRY: Lazy<Mutex<RegistryState>> =
    Lazy::new(|| Mutex::new(RegistryState::with_builtin_drivers()));

fn lock_registry() -> Result<MutexGuard<'static, RegistryState>, DriverError> {
    REGISTRY
        .lock()
        .map_err(|e| DriverError::RegistryUnavailable(format!("Failed to lock driver registry: {e}")))
}

/// Process-wide driver registry shared by all adapters
pub struct DriverRegistry;

impl DriverRegistry {
    /// Make a driver resolvable under `name`
    ///
    /// Replaces an earlier factory with the same lookup name. Drivers already
    /// loaded through the old factory stay registered.
    pub fn register_factory<F>(name: impl Into<String>, factory: F) -> Result<(), DriverError>
    where
        F: Fn() -> Result<Arc<dyn Driver>, DriverError> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut state = lock_registry()?;
        state.resolved.remove(&name);
        state.factories.insert(name, Arc::new(Box::new(factory)));
        Ok(())
    }

    /// Resolve, construct and register the driver known as `name`
    ///
    /// # Errors
    ///
    /// Returns `DriverError::UnknownDriver` if no factory is known under `name`
    /// and whatever error the factory itself reports.
    pub fn load(name: &str) -> Result<Arc<dyn Driver>, DriverError> {
        let factory = {
            let state = lock_registry()?;
            if let Some(driver) = state
                .resolved
                .get(name)
                .and_then(|canonical| state.registered(canonical))
            {
                return Ok(driver);
            }
            state
                .factories
                .get(name)
                .map(Arc::clone)
                .ok_or_else(|| DriverError::UnknownDriver(name.to_string()))?
        };

        // Construct outside the lock; factories may do arbitrary work
        let driver = factory()?;

        let mut state = lock_registry()?;
        let canonical = driver.name().to_string();
        state.resolved.insert(name.to_string(), canonical.clone());
        if let Some(existing) = state.registered(&canonical) {
            return Ok(existing);
        }
        log::debug!("registered driver '{}' (requested as '{}')", canonical, name);
        state.drivers.push(Arc::clone(&driver));
        Ok(driver)
    }

    /// Register an already constructed driver
    ///
    /// Returns `false` if a driver with the same canonical name was registered before.
    pub fn register(driver: Arc<dyn Driver>) -> Result<bool, DriverError> {
        let mut state = lock_registry()?;
        if state.registered(driver.name()).is_some() {
            return Ok(false);
        }
        state.drivers.push(driver);
        Ok(true)
    }

    /// Whether a driver with canonical name `name` is registered
    pub fn is_registered(name: &str) -> Result<bool, DriverError> {
        Ok(lock_registry()?.registered(name).is_some())
    }

    /// Canonical names of all registered drivers, in registration order
    pub fn registered_names() -> Result<Vec<String>, DriverError> {
        Ok(lock_registry()?
            .drivers
            .iter()
            .map(|d| d.name().to_string())
            .collect())
    }

    /// Open a connection with the first registered driver accepting `url`
    pub fn connect(url: &str, user: &str, password: &str) -> Result<Box<dyn Connection>, DriverError> {
        let drivers = lock_registry()?.drivers.clone();

        let driver = drivers
            .iter()
            .find(|d| d.accepts_url(url))
            .ok_or_else(|| DriverError::NoSuitableDriver(sanitize_url(url)))?;

        log::debug!("opening connection to {} with driver '{}'", sanitize_url(url), driver.name());
        Ok(driver.connect(url, user, password)?)
    }
}
