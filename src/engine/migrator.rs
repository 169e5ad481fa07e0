//! ScriptEngine - applies versioned SQL scripts

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::connection::{Connection, DbError};
use crate::driver::DriverRegistry;
use crate::engine::history::{self, HistoryRecord};
use crate::engine::lock::{MigrationLock, DEFAULT_LOCK_TIMEOUT};
use crate::engine::script::{resolve_scripts, ResolvedScript, Version};
use crate::engine::status::{MigrationStatus, PendingScript};
use crate::engine::{AppliedScript, EngineConfig, EngineError, MigrationEngine, MigrationOutcome};
use crate::hook::{HookContext, HookEvent, LifecycleHook};

/// Recorded as `installed_by` when the datasource has no user
const ANONYMOUS_INSTALLER: &str = "dbmigrate";

/// Migration engine for `V<version>__<description>.sql` scripts
///
/// Every run opens its own connection from [`EngineConfig::datasource`],
/// creates `flyway_schema_history` if needed, takes the table lock, validates
/// the history against the resolved scripts and then applies the pending
/// scripts in version order, each in its own transaction.
#[derive(Debug, Clone)]
pub struct ScriptEngine {
    lock_timeout: Duration,
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long to wait for a lock held by another run
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Applied and pending scripts
    ///
    /// Read-only: a database without history table reports every resolved
    /// script as pending and [`MigrationStatus::has_history`] as `false`.
    ///
    /// # Arguments
    ///
    /// * `config` - Datasource and locations, as handed to [`migrate`](MigrationEngine::migrate)
    ///
    /// # Errors
    ///
    /// Fails on the same validation errors as [`migrate`](MigrationEngine::migrate).
    pub fn info(&self, config: &EngineConfig) -> Result<MigrationStatus, EngineError> {
        let scripts = resolve_scripts(&config.locations, &config.encoding)?;
        with_connection(config, |conn| {
            if !history::exists(conn) {
                log::info!("No {} table yet; all scripts are pending", history::HISTORY_TABLE);
                let pending = pending_scripts(&plan(&[], &scripts)?);
                return Ok(MigrationStatus::without_history(pending));
            }
            let applied = history::applied(conn)?;
            let pending = pending_scripts(&plan(&applied, &scripts)?);
            Ok(MigrationStatus::new(applied, pending))
        })
    }

    /// Check the history against the scripts without applying anything
    pub fn validate(&self, config: &EngineConfig) -> Result<(), EngineError> {
        let status = self.info(config)?;
        log::info!(
            "Validated {} applied script(s), {} pending",
            status.applied_count(),
            status.pending_count()
        );
        Ok(())
    }

    fn apply(
        &self,
        conn: &mut dyn Connection,
        config: &EngineConfig,
        scripts: &[ResolvedScript],
    ) -> Result<MigrationOutcome, EngineError> {
        let applied = history::applied(conn)?;
        let pending = plan(&applied, scripts)?;

        let mut outcome = MigrationOutcome {
            applied: Vec::new(),
            target_version: applied.last().map(|r| r.version.clone()),
        };

        run_hooks(&config.hooks, HookEvent::BeforeMigrate, conn, None)?;

        if pending.is_empty() {
            log::info!(
                "Schema is up to date (version {})",
                outcome.target_version.as_deref().unwrap_or("<< empty >>")
            );
        }

        let installed_by = installed_by(config);
        let mut rank = history::next_rank(&applied);
        for script in pending {
            run_hooks(&config.hooks, HookEvent::BeforeEachMigrate, conn, Some(script))?;

            log::info!("Migrating to version {} - {}", script.version, script.description);
            let execution_time_ms = apply_script(conn, script, rank, &installed_by)?;

            run_hooks(&config.hooks, HookEvent::AfterEachMigrate, conn, Some(script))?;

            outcome.applied.push(AppliedScript {
                version: script.version.to_string(),
                description: script.description.clone(),
                script: script.script.clone(),
                execution_time_ms,
            });
            outcome.target_version = Some(script.version.to_string());
            rank += 1;
        }

        run_hooks(&config.hooks, HookEvent::AfterMigrate, conn, None)?;

        if outcome.migrations_executed() > 0 {
            log::info!(
                "Successfully applied {} script(s), schema now at version {}",
                outcome.migrations_executed(),
                outcome.target_version.as_deref().unwrap_or_default()
            );
        }
        Ok(outcome)
    }
}

impl MigrationEngine for ScriptEngine {
    fn migrate(&self, config: &EngineConfig) -> Result<MigrationOutcome, EngineError> {
        let scripts = resolve_scripts(&config.locations, &config.encoding)?;
        log::info!(
            "Resolved {} script(s) from {} location(s)",
            scripts.len(),
            config.locations.len()
        );

        with_connection(config, |conn| {
            history::initialize(conn)?;
            let mut lock = MigrationLock::acquire(conn, &installed_by(config), self.lock_timeout)?;

            let result = self.apply(lock.connection(), config, &scripts);
            if result.is_err() {
                if let Err(e) = run_hooks(&config.hooks, HookEvent::AfterMigrateError, lock.connection(), None) {
                    log::warn!("{}", e);
                }
            }
            result
        })
    }
}

/// Open the datasource, run `f`, and close the connection again
fn with_connection<T>(
    config: &EngineConfig,
    f: impl FnOnce(&mut dyn Connection) -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let datasource = &config.datasource;
    let mut conn = DriverRegistry::connect(&datasource.url, &datasource.user, &datasource.password)?;
    let result = f(conn.as_mut());
    if let Err(e) = conn.close() {
        log::warn!("Failed to close migration connection: {}", e);
    }
    result
}

fn installed_by(config: &EngineConfig) -> String {
    if config.datasource.user.is_empty() {
        ANONYMOUS_INSTALLER.to_string()
    } else {
        config.datasource.user.clone()
    }
}

/// Validate the history against `scripts` and return the scripts still to apply
fn plan<'s>(
    applied: &[HistoryRecord],
    scripts: &'s [ResolvedScript],
) -> Result<Vec<&'s ResolvedScript>, EngineError> {
    let mut applied_versions = HashSet::new();
    let mut latest: Option<Version> = None;

    for record in applied {
        if !record.success {
            return Err(EngineError::InvalidHistory(format!(
                "migration {} ({}) failed previously; remove its row from {} before migrating again",
                record.version,
                record.script,
                history::HISTORY_TABLE
            )));
        }

        let version = Version::parse(&record.version).ok_or_else(|| {
            EngineError::InvalidHistory(format!("unparseable version '{}'", record.version))
        })?;

        let script = scripts
            .iter()
            .find(|s| s.version == version)
            .ok_or_else(|| EngineError::MissingScript {
                version: record.version.clone(),
                script: record.script.clone(),
            })?;

        if script.checksum != record.checksum {
            return Err(EngineError::ChecksumMismatch {
                version: record.version.clone(),
                script: script.script.clone(),
                stored: record.checksum.clone(),
                current: script.checksum.clone(),
            });
        }

        if latest.as_ref().map_or(true, |l| version > *l) {
            latest = Some(version.clone());
        }
        applied_versions.insert(version);
    }

    let pending: Vec<&ResolvedScript> = scripts
        .iter()
        .filter(|s| !applied_versions.contains(&s.version))
        .collect();

    if let (Some(latest), Some(first)) = (&latest, pending.first()) {
        if first.version < *latest {
            return Err(EngineError::OutOfOrder {
                version: first.version.to_string(),
                latest: latest.to_string(),
            });
        }
    }

    Ok(pending)
}

fn pending_scripts(scripts: &[&ResolvedScript]) -> Vec<PendingScript> {
    scripts
        .iter()
        .map(|script| PendingScript {
            version: script.version.to_string(),
            description: script.description.clone(),
            script: script.script.clone(),
            location: script.location.clone(),
            checksum: script.checksum.clone(),
        })
        .collect()
}

/// Run one script and record it, in a single transaction
fn apply_script(
    conn: &mut dyn Connection,
    script: &ResolvedScript,
    rank: i64,
    installed_by: &str,
) -> Result<i64, EngineError> {
    let start = Instant::now();
    let execute = |conn: &mut dyn Connection| -> Result<i64, DbError> {
        conn.execute_batch("BEGIN")?;
        conn.execute_batch(&script.contents)?;
        let execution_time_ms = start.elapsed().as_millis() as i64;
        HistoryRecord {
            installed_rank: rank,
            version: script.version.to_string(),
            description: script.description.clone(),
            script: script.script.clone(),
            checksum: script.checksum.clone(),
            installed_by: installed_by.to_string(),
            installed_on: history::now(),
            execution_time_ms,
            success: true,
        }
        .insert(conn)?;
        conn.execute_batch("COMMIT")?;
        Ok(execution_time_ms)
    };

    execute(&mut *conn).map_err(|source| {
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            log::warn!("Rollback of {} failed: {}", script.script, e);
        }
        EngineError::ExecutionFailed {
            version: script.version.to_string(),
            script: script.script.clone(),
            source,
        }
    })
}

fn run_hooks(
    hooks: &[Arc<dyn LifecycleHook>],
    event: HookEvent,
    conn: &mut dyn Connection,
    script: Option<&ResolvedScript>,
) -> Result<(), EngineError> {
    for hook in hooks.iter().filter(|h| h.supports(event)) {
        log::debug!("Running hook '{}' for {}", hook.name(), event);
        let mut ctx = HookContext::new(&mut *conn, script);
        hook.handle(event, &mut ctx).map_err(|source| EngineError::Hook {
            hook: hook.name().to_string(),
            event,
            source,
        })?;
    }
    Ok(())
}
