//! The `flyway_schema_history` table
//!
//! One row per applied script. `installed_rank` orders the rows; rank `-1` is
//! reserved for the lock row (see [`lock`](crate::engine::lock)).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::connection::{Connection, DbError, Row};
use crate::engine::EngineError;

pub const HISTORY_TABLE: &str = "flyway_schema_history";

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS flyway_schema_history (
        installed_rank INTEGER NOT NULL PRIMARY KEY,
        version VARCHAR(50),
        description VARCHAR(200) NOT NULL,
        type VARCHAR(20) NOT NULL,
        script VARCHAR(1000) NOT NULL,
        checksum VARCHAR(64),
        installed_by VARCHAR(100) NOT NULL,
        installed_on TIMESTAMP NOT NULL,
        execution_time INTEGER NOT NULL,
        success BOOLEAN NOT NULL
    )
"#;

const CREATE_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS flyway_schema_history_s_idx
    ON flyway_schema_history (success)
"#;

const SELECT_APPLIED: &str = r#"
    SELECT installed_rank, version, description, script, checksum,
           installed_by, installed_on, execution_time, success
    FROM flyway_schema_history
    WHERE installed_rank > 0
    ORDER BY installed_rank
"#;

const PROBE_TABLE: &str = "SELECT installed_rank FROM flyway_schema_history WHERE 1 = 0";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Create the history table and its index if they don't exist
pub fn initialize(conn: &mut dyn Connection) -> Result<(), DbError> {
    conn.execute_batch(CREATE_TABLE)?;
    conn.execute_batch(CREATE_INDEX)?;
    Ok(())
}

/// Whether the history table can be queried
///
/// Selects nothing from the table; a failing query means the table is not
/// there yet. Used by read-only commands, which must not create it.
pub fn exists(conn: &mut dyn Connection) -> bool {
    match conn.query(PROBE_TABLE) {
        Ok(_) => true,
        Err(e) => {
            log::debug!("{} is not queryable: {}", HISTORY_TABLE, e);
            false
        }
    }
}

/// A row of the history table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub installed_rank: i64,
    pub version: String,
    pub description: String,
    pub script: String,
    pub checksum: String,
    pub installed_by: String,
    pub installed_on: DateTime<Utc>,
    pub execution_time_ms: i64,
    pub success: bool,
}

impl HistoryRecord {
    /// Parse a row selected in the column order of [`applied`]
    pub fn from_row(row: &Row) -> Result<Self, EngineError> {
        let text = |idx: usize, column: &str| {
            row.get(idx)
                .map(str::to_string)
                .ok_or_else(|| EngineError::InvalidHistory(format!("{column} is NULL")))
        };
        let number = |idx: usize, column: &str| {
            text(idx, column)?
                .parse::<i64>()
                .map_err(|e| EngineError::InvalidHistory(format!("{column}: {e}")))
        };

        let installed_on = text(6, "installed_on")?;
        Ok(Self {
            installed_rank: number(0, "installed_rank")?,
            version: text(1, "version")?,
            description: text(2, "description")?,
            script: text(3, "script")?,
            checksum: row.get(4).unwrap_or_default().to_string(),
            installed_by: text(5, "installed_by")?,
            installed_on: parse_timestamp(&installed_on)?,
            execution_time_ms: number(7, "execution_time")?,
            success: parse_bool(&text(8, "success")?),
        })
    }

    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO flyway_schema_history \
             (installed_rank, version, description, type, script, checksum, installed_by, installed_on, execution_time, success) \
             VALUES ({}, {}, {}, 'SQL', {}, {}, {}, {}, {}, {})",
            self.installed_rank,
            quote(&self.version),
            quote(&self.description),
            quote(&self.script),
            quote(&self.checksum),
            quote(&self.installed_by),
            quote(&self.installed_on.format(TIMESTAMP_FORMAT).to_string()),
            self.execution_time_ms,
            if self.success { "TRUE" } else { "FALSE" },
        )
    }

    /// Write this record
    pub fn insert(&self, conn: &mut dyn Connection) -> Result<(), DbError> {
        conn.execute(&self.insert_sql())?;
        Ok(())
    }
}

/// All history rows except the lock row, by rank
pub fn applied(conn: &mut dyn Connection) -> Result<Vec<HistoryRecord>, EngineError> {
    conn.query(SELECT_APPLIED)?
        .iter()
        .map(HistoryRecord::from_row)
        .collect()
}

/// Rank for the next row appended after `records`
pub fn next_rank(records: &[HistoryRecord]) -> i64 {
    records.iter().map(|r| r.installed_rank).max().unwrap_or(0) + 1
}

/// Current time in the precision stored in the table
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    parse_timestamp(&now.format(TIMESTAMP_FORMAT).to_string()).unwrap_or(now)
}

pub(crate) fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "t" | "true" | "1")
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, EngineError> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            EngineError::InvalidHistory(format!(
                "failed to parse timestamp '{value}': unrecognized format"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryConnection;

    fn row(values: &[Option<&str>]) -> Row {
        Row::new(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    fn record(rank: i64) -> HistoryRecord {
        HistoryRecord {
            installed_rank: rank,
            version: "1".to_string(),
            description: "owner's table".to_string(),
            script: "V1__owner's_table.sql".to_string(),
            checksum: "abc".to_string(),
            installed_by: "sa".to_string(),
            installed_on: now(),
            execution_time_ms: 5,
            success: true,
        }
    }

    #[test]
    fn test_from_row_postgres_text() {
        let parsed = HistoryRecord::from_row(&row(&[
            Some("3"),
            Some("1.2"),
            Some("add index"),
            Some("V1.2__add_index.sql"),
            Some("deadbeef"),
            Some("app"),
            Some("2024-01-20 12:00:00.123456"),
            Some("17"),
            Some("t"),
        ]))
        .expect("parses");

        assert_eq!(parsed.installed_rank, 3);
        assert_eq!(parsed.version, "1.2");
        assert_eq!(parsed.execution_time_ms, 17);
        assert!(parsed.success);
        assert_eq!(parsed.installed_on.format("%Y-%m-%d").to_string(), "2024-01-20");
    }

    #[test]
    fn test_from_row_sqlite_values() {
        let parsed = HistoryRecord::from_row(&row(&[
            Some("1"),
            Some("1"),
            Some("init"),
            Some("V1__init.sql"),
            None,
            Some("sa"),
            Some("2024-01-20T12:00:00"),
            Some("0"),
            Some("0"),
        ]))
        .expect("parses");

        assert_eq!(parsed.checksum, "");
        assert!(!parsed.success);
    }

    #[test]
    fn test_from_row_rejects_bad_timestamp() {
        let result = HistoryRecord::from_row(&row(&[
            Some("1"),
            Some("1"),
            Some("init"),
            Some("V1__init.sql"),
            Some("abc"),
            Some("sa"),
            Some("yesterday"),
            Some("0"),
            Some("1"),
        ]));
        assert!(matches!(result, Err(EngineError::InvalidHistory(_))));
    }

    #[test]
    fn test_insert_escapes_quotes() {
        let mut conn = MemoryConnection::default();
        record(4).insert(&mut conn).expect("insert");

        let executed = conn.executed();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].contains("'owner''s table'"));
        assert!(executed[0].starts_with("INSERT INTO flyway_schema_history"));
    }

    #[test]
    fn test_exists_does_not_create_table() {
        use crate::driver::sqlite::SqliteDriver;
        use crate::driver::Driver;

        let mut conn = SqliteDriver.connect("sqlite::memory:", "", "").expect("in-memory database");
        assert!(!exists(conn.as_mut()));
        assert!(!exists(conn.as_mut()));

        initialize(conn.as_mut()).expect("history table");
        assert!(exists(conn.as_mut()));
    }

    #[test]
    fn test_next_rank() {
        assert_eq!(next_rank(&[]), 1);
        assert_eq!(next_rank(&[record(1), record(7), record(3)]), 8);
    }
}
