//! Migration lock stored in the history table itself
//!
//! The process that inserts the row with `installed_rank = -1` holds the lock.
//! Concurrent runs poll until the row disappears or the timeout elapses.

use std::thread;
use std::time::{Duration, Instant};

use crate::connection::{Connection, DbError};
use crate::engine::history::{self, HISTORY_TABLE};
use crate::engine::EngineError;

/// Rank reserved for the lock row; real rows start at 1
pub const LOCK_RANK: i64 = -1;

/// How long a run waits for another run's lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Holds the migration lock until dropped
pub struct MigrationLock<'a> {
    conn: &'a mut dyn Connection,
}

impl<'a> MigrationLock<'a> {
    /// Acquire the lock, waiting at most `timeout`
    ///
    /// # Arguments
    ///
    /// * `conn` - Connection the lock row is inserted on; borrowed until release
    /// * `installed_by` - Recorded in the lock row to identify the holder
    /// * `timeout` - Longest time to poll for a lock held elsewhere
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::LockTimeout`] if another holder keeps the lock
    /// past `timeout`, or a database error if the insert itself fails.
    pub fn acquire(
        conn: &'a mut dyn Connection,
        installed_by: &str,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let sql = lock_sql(installed_by);
        let start = Instant::now();
        loop {
            if conn.execute(&sql)? > 0 {
                log::debug!("Acquired migration lock after {:?}", start.elapsed());
                return Ok(Self { conn });
            }
            if start.elapsed() >= timeout {
                return Err(EngineError::LockTimeout(format!(
                    "failed to acquire migration lock within {} seconds",
                    timeout.as_secs_f32()
                )));
            }
            log::debug!("Migration lock held by another process, retrying");
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// The locked connection
    pub fn connection(&mut self) -> &mut dyn Connection {
        &mut *self.conn
    }
}

impl Drop for MigrationLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = release(&mut *self.conn) {
            log::warn!("Failed to release migration lock: {}", e);
        }
    }
}

fn lock_sql(installed_by: &str) -> String {
    format!(
        "INSERT INTO {HISTORY_TABLE} \
         (installed_rank, version, description, type, script, checksum, installed_by, installed_on, execution_time, success) \
         VALUES ({LOCK_RANK}, NULL, 'LOCK', 'LOCK', 'LOCK', NULL, {}, {}, 0, TRUE) \
         ON CONFLICT (installed_rank) DO NOTHING",
        history::quote(installed_by),
        history::quote(&history::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
    )
}

/// Delete the lock row
pub fn release(conn: &mut dyn Connection) -> Result<(), DbError> {
    conn.execute(&format!(
        "DELETE FROM {HISTORY_TABLE} WHERE installed_rank = {LOCK_RANK}"
    ))?;
    Ok(())
}

/// Whether any process currently holds the lock
pub fn is_held(conn: &mut dyn Connection) -> Result<bool, DbError> {
    let rows = conn.query(&format!(
        "SELECT COUNT(*) FROM {HISTORY_TABLE} WHERE installed_rank = {LOCK_RANK}"
    ))?;
    Ok(rows
        .first()
        .and_then(|row| row.get(0))
        .and_then(|count| count.parse::<i64>().ok())
        .is_some_and(|count| count > 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::sqlite::SqliteDriver;
    use crate::driver::Driver;

    fn database() -> Box<dyn Connection> {
        let mut conn = SqliteDriver.connect("sqlite::memory:", "", "").expect("in-memory database");
        history::initialize(conn.as_mut()).expect("history table");
        conn
    }

    #[test]
    fn test_lock_released_on_drop() {
        let mut conn = database();
        {
            let mut lock = MigrationLock::acquire(conn.as_mut(), "sa", DEFAULT_LOCK_TIMEOUT).expect("lock");
            assert!(is_held(lock.connection()).expect("query"));
        }
        assert!(!is_held(conn.as_mut()).expect("query"));
    }

    #[test]
    fn test_lock_times_out_while_held() {
        let mut conn = database();
        conn.execute(&lock_sql("other-process")).expect("foreign lock row");

        let start = Instant::now();
        let result = MigrationLock::acquire(conn.as_mut(), "sa", Duration::from_millis(250));
        assert!(matches!(result, Err(EngineError::LockTimeout(_))));
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn test_lock_row_hidden_from_history() {
        let mut conn = database();
        let lock = MigrationLock::acquire(conn.as_mut(), "sa", DEFAULT_LOCK_TIMEOUT).expect("lock");
        drop(lock);
        conn.execute(&lock_sql("sa")).expect("lock row");
        assert!(history::applied(conn.as_mut()).expect("applied").is_empty());
    }
}
