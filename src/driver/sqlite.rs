//! SQLite driver backed by `rusqlite`
//!
//! URLs: `sqlite:<path>`, `jdbc:sqlite:<path>` or `sqlite::memory:`.
//! SQLite has no authentication, so user and password are ignored.

use rusqlite::types::ValueRef;

use crate::connection::{strip_jdbc_prefix, Connection, DbError, Row};
use crate::driver::Driver;

pub const NAME: &str = "sqlite";

const SCHEME: &str = "sqlite:";
const MEMORY: &str = ":memory:";

pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        NAME
    }

    fn accepts_url(&self, url: &str) -> bool {
        strip_jdbc_prefix(url).starts_with(SCHEME)
    }

    fn connect(&self, url: &str, user: &str, _password: &str) -> Result<Box<dyn Connection>, DbError> {
        let path = strip_jdbc_prefix(url)
            .strip_prefix(SCHEME)
            .ok_or_else(|| DbError::InvalidConnectionString(format!("not a SQLite URL: {url}")))?;

        if !user.is_empty() {
            log::debug!("sqlite ignores the configured user '{}'", user);
        }

        let conn = if path.is_empty() || path == MEMORY {
            rusqlite::Connection::open_in_memory()?
        } else {
            rusqlite::Connection::open(path)?
        };
        Ok(Box::new(SqliteConnection { conn }))
    }
}

struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str) -> Result<u64, DbError> {
        Ok(self.conn.execute(sql, [])? as u64)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        Ok(self.conn.execute_batch(sql)?)
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..columns)
                    .map(|idx| row.get_ref(idx).map(value_to_text))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Row::new)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn close(self: Box<Self>) -> Result<(), DbError> {
        self.conn.close().map_err(|(_, e)| DbError::Sqlite(e))
    }
}

fn value_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}
