//! MigrationAdapter - configuration-driven entry point
//!
//! One adapter serves one logical database. It reads `<name>.driver`,
//! `<name>.url`, `<name>.user` and `<name>.passwd` from the configuration
//! source when they are first needed, keeps a single lazily opened connection
//! as a reachability check, and hands locations and hooks to the migration
//! engine.

use std::sync::Arc;

use crate::config::{self, ConfigurationSource};
use crate::connection::{sanitize_url, Connection, ConnectionSlot};
use crate::driver::{Driver, DriverRegistry};
use crate::engine::history::HISTORY_TABLE;
use crate::engine::{DataSource, EngineConfig, MigrationEngine, MigrationOutcome, ScriptEngine};
use crate::error::{ErrorContext, MigrateError};
use crate::hook::LifecycleHook;
use crate::location::{Location, LocationRegistry};

pub struct MigrationAdapter {
    config: Arc<dyn ConfigurationSource>,
    database: String,
    context: Arc<ErrorContext>,
    locations: LocationRegistry,
    hooks: Vec<Arc<dyn LifecycleHook>>,
    connection: ConnectionSlot,
    engine: Box<dyn MigrationEngine + Send>,
}

impl MigrationAdapter {
    /// Create an adapter for the database called `database` in `config`
    ///
    /// Nothing is read or opened until an operation needs it. Migrations run
    /// through the bundled [`ScriptEngine`] unless replaced with
    /// [`with_engine`](Self::with_engine).
    pub fn new(
        config: Arc<dyn ConfigurationSource>,
        database: impl Into<String>,
        context: Arc<ErrorContext>,
    ) -> Self {
        Self {
            config,
            database: database.into(),
            context,
            locations: LocationRegistry::new(),
            hooks: Vec::new(),
            connection: ConnectionSlot::new(),
            engine: Box::new(ScriptEngine::default()),
        }
    }

    /// Use `engine` for [`migrate_db`](Self::migrate_db)
    pub fn with_engine<E>(mut self, engine: E) -> Self
    where
        E: MigrationEngine + Send + 'static,
    {
        self.engine = Box::new(engine);
        self
    }

    /// Logical database name; the prefix of every configuration key read
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Append a hook; hooks reach the engine in the order they were added
    pub fn add_callback(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
    }

    /// Append a script location unless the same identifier is already present
    ///
    /// # Arguments
    ///
    /// * `path` - Directory or resource path, e.g. `db/patches`
    /// * `from_filesystem` - `true` for `filesystem:`, `false` for `bundled-resource:`
    pub fn add_file_location(&mut self, path: &str, from_filesystem: bool) {
        if !self.locations.add_file_location(path, from_filesystem) {
            log::debug!("Location {} already registered", path);
        }
    }

    /// Register `db/design`, `db/scripts`, `db/values` and `db/trigger`
    pub fn add_default_locations(&mut self, from_filesystem: bool) {
        self.locations.add_default_locations(from_filesystem);
    }

    /// Registered locations in registration order
    pub fn locations(&self) -> &[Location] {
        self.locations.locations()
    }

    /// Whether the adapter connection has been opened
    pub fn is_connected(&self) -> bool {
        self.connection.is_open()
    }

    /// Resolve the configured driver and register it process-wide
    ///
    /// # Errors
    ///
    /// `Config` if `<name>.driver` is missing, `Driver` if the name is unknown
    /// or the driver cannot be constructed.
    pub fn load_driver(&self) -> Result<Arc<dyn Driver>, MigrateError> {
        load_driver(self.config.as_ref(), &self.database, &self.context)
    }

    /// The adapter connection, opened on first use and reused afterwards
    ///
    /// A failed attempt leaves the adapter without a connection; the next call
    /// tries again.
    ///
    /// # Returns
    ///
    /// The cached connection, borrowed for as long as the adapter is
    ///
    /// # Errors
    ///
    /// `Config` for a missing key, `Driver` if the driver cannot be loaded,
    /// `Connection` if opening fails.
    pub fn get_connection(&mut self) -> Result<&mut dyn Connection, MigrateError> {
        let Self {
            config: source,
            database,
            context,
            connection,
            ..
        } = self;

        connection.get_or_try_open(|| {
            let settings = source.as_ref();
            load_driver(settings, database, context)?;

            let url = setting(settings, database, config::URL, context)?;
            let user = setting(settings, database, config::USER, context)?;
            let password = setting(settings, database, config::PASSWORD, context)?;

            log::info!("Connecting database '{}' at {}", database, sanitize_url(&url));
            DriverRegistry::connect(&url, &user, &password).map_err(|source| {
                report(MigrateError::Connection {
                    url: sanitize_url(&url),
                    source,
                    context: Arc::clone(context),
                })
            })
        })
    }

    /// Check that the migration history table can be queried
    ///
    /// Returns `Ok(true)` when the query succeeds; any failure, including a
    /// missing table, is a `Probe` error.
    pub fn check_history_table(&mut self) -> Result<bool, MigrateError> {
        let context = Arc::clone(&self.context);
        let conn = self.get_connection()?;
        conn.query(&format!("select * from {HISTORY_TABLE}"))
            .map_err(|source| report(MigrateError::Probe { source, context }))?;
        Ok(true)
    }

    /// The configuration the engine would receive right now
    ///
    /// Datasource values are read from the configuration source on every call.
    ///
    /// # Errors
    ///
    /// `Config` if `url`, `user` or `passwd` is missing.
    pub fn engine_config(&self) -> Result<EngineConfig, MigrateError> {
        let settings = self.config.as_ref();
        let datasource = DataSource {
            url: setting(settings, &self.database, config::URL, &self.context)?,
            user: setting(settings, &self.database, config::USER, &self.context)?,
            password: setting(settings, &self.database, config::PASSWORD, &self.context)?,
        };
        Ok(EngineConfig::new(datasource)
            .with_locations(self.locations.locations().iter().cloned())
            .with_hooks(self.hooks.iter().cloned()))
    }

    /// Register the default locations, verify connectivity and run the engine
    ///
    /// The adapter connection is only a pre-flight check; the engine opens its
    /// own connection from the datasource and runs to completion before this
    /// returns.
    ///
    /// # Errors
    ///
    /// Any `Config`, `Driver` or `Connection` error from connecting, or
    /// `Migration` wrapping the engine's error. The adapter connection stays
    /// open after an engine failure.
    pub fn migrate_db(&mut self, from_filesystem: bool) -> Result<MigrationOutcome, MigrateError> {
        self.add_default_locations(from_filesystem);
        self.get_connection()?;

        let engine_config = self.engine_config()?;
        log::info!(
            "Migrating database '{}' with {} location(s) and {} hook(s)",
            self.database,
            engine_config.locations.len(),
            engine_config.hooks.len()
        );
        log::debug!("Engine configuration: {:?}", engine_config);

        let outcome = self.engine.migrate(&engine_config).map_err(|source| {
            report(MigrateError::Migration {
                source,
                context: Arc::clone(&self.context),
            })
        })?;

        log::info!(
            "Database '{}' migrated: {} script(s) applied",
            self.database,
            outcome.migrations_executed()
        );
        Ok(outcome)
    }

    /// Close the adapter connection if it is open
    ///
    /// The adapter stays usable; the next operation that needs a connection
    /// opens a new one.
    pub fn close(&mut self) -> Result<(), MigrateError> {
        let url = self
            .config
            .value(&config::key(&self.database, config::URL))
            .map(|url| sanitize_url(&url))
            .unwrap_or_default();
        let context = Arc::clone(&self.context);
        self.connection.close().map_err(|e| {
            report(MigrateError::Connection {
                url,
                source: e.into(),
                context,
            })
        })
    }
}

fn report(err: MigrateError) -> MigrateError {
    log::error!("{}", err);
    err
}

fn setting(
    settings: &dyn ConfigurationSource,
    database: &str,
    property: &str,
    context: &Arc<ErrorContext>,
) -> Result<String, MigrateError> {
    let key = config::key(database, property);
    settings.value(&key).ok_or_else(|| {
        report(MigrateError::Config {
            key,
            context: Arc::clone(context),
        })
    })
}

fn load_driver(
    settings: &dyn ConfigurationSource,
    database: &str,
    context: &Arc<ErrorContext>,
) -> Result<Arc<dyn Driver>, MigrateError> {
    let name = setting(settings, database, config::DRIVER, context)?;
    DriverRegistry::load(&name).map_err(|source| {
        report(MigrateError::Driver {
            driver: name.clone(),
            source,
            context: Arc::clone(context),
        })
    })
}
