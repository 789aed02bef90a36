//! `StoreExecutor` - statement execution over SQLite.
//!
//! Repositories are written against this trait so the same function can run on
//! a freshly acquired connection (through [`crate::Store`]) or inside an open
//! `rusqlite::Transaction` (which derefs to `Connection`).

use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, ToSql};
use std::fmt;
#[cfg(feature = "metrics")]
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Gateway-level error type
#[derive(Debug)]
pub enum StoreError {
    /// No connection could be acquired; busy/locked attempts are retried first
    Unavailable {
        attempts: u32,
        source: rusqlite::Error,
    },
    /// Error returned by SQLite
    Sqlite(rusqlite::Error),
    /// A guarded statement inside a transaction affected fewer rows than required
    GuardFailed {
        index: usize,
        affected: usize,
        required: usize,
    },
    /// Schema could not be created or upgraded
    SchemaInit(String),
    /// Store path rejected before any connection attempt
    InvalidPath(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable { attempts, source } => {
                write!(f, "Store unavailable after {attempts} attempt(s): {source}")
            }
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::GuardFailed {
                index,
                affected,
                required,
            } => write!(
                f,
                "Statement {index} affected {affected} row(s), required at least {required}; transaction rolled back"
            ),
            StoreError::SchemaInit(s) => write!(f, "Schema initialization failed: {s}"),
            StoreError::InvalidPath(s) => write!(f, "Invalid store path: {s}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Unavailable { source, .. } => Some(source),
            StoreError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Sqlite(err)
    }
}

impl StoreError {
    /// True for UNIQUE / PRIMARY KEY constraint violations.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.extended_code,
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            ),
            _ => false,
        }
    }

    /// True when a FOREIGN KEY constraint rejected the statement.
    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
            }
            _ => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        match self {
            StoreError::Unavailable { .. } => true,
            StoreError::Sqlite(e) => is_busy(e),
            _ => false,
        }
    }
}

/// Busy/locked conditions are the only ones worth retrying.
pub fn is_busy(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        }
        _ => false,
    }
}

/// Trait for executing statements against the store
///
/// Implemented for `rusqlite::Connection` and for [`crate::Store`], which
/// acquires a fresh connection per call.
///
/// # Examples
///
/// ```no_run
/// use labstock::executor::{StoreError, StoreExecutor};
///
/// fn count_materials<E: StoreExecutor>(executor: &E) -> Result<i64, StoreError> {
///     let count = executor.query_opt("SELECT COUNT(*) FROM materials", &[], |row| row.get(0))?;
///     Ok(count.unwrap_or(0))
/// }
/// ```
pub trait StoreExecutor {
    /// Execute a statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the statement fails.
    fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize, StoreError>;

    /// Execute an INSERT and return the generated row id
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the statement fails.
    fn insert(&self, sql: &str, params: &[&dyn ToSql]) -> Result<i64, StoreError>;

    /// Run a query and map every row
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query or any row mapping fails.
    fn query_all<T, F>(&self, sql: &str, params: &[&dyn ToSql], map: F) -> Result<Vec<T>, StoreError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>;

    /// Run a query expected to return zero or one row
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query or the row mapping fails.
    fn query_opt<T, F>(&self, sql: &str, params: &[&dyn ToSql], map: F) -> Result<Option<T>, StoreError>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>;
}

fn observe<T>(sql: &str, run: impl FnOnce() -> rusqlite::Result<T>) -> Result<T, StoreError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_statement_span(sql).entered();
    #[cfg(not(feature = "tracing"))]
    let _ = sql;

    #[cfg(feature = "metrics")]
    let start = Instant::now();
    let result = run().map_err(|e| {
        #[cfg(feature = "metrics")]
        METRICS.record_statement_error();
        StoreError::Sqlite(e)
    });

    #[cfg(feature = "metrics")]
    METRICS.record_statement(start.elapsed());

    result
}

impl StoreExecutor for Connection {
    fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize, StoreError> {
        observe(sql, || Connection::execute(self, sql, params))
    }

    fn insert(&self, sql: &str, params: &[&dyn ToSql]) -> Result<i64, StoreError> {
        observe(sql, || {
            Connection::execute(self, sql, params)?;
            Ok(self.last_insert_rowid())
        })
    }

    fn query_all<T, F>(&self, sql: &str, params: &[&dyn ToSql], map: F) -> Result<Vec<T>, StoreError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        observe(sql, || {
            let mut stmt = self.prepare(sql)?;
            let rows = stmt.query_map(params, map)?;
            rows.collect()
        })
    }

    fn query_opt<T, F>(&self, sql: &str, params: &[&dyn ToSql], map: F) -> Result<Option<T>, StoreError>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        observe(sql, || self.query_row(sql, params, map).optional())
    }
}

/// Statements issued inside an open transaction.
impl StoreExecutor for rusqlite::Transaction<'_> {
    fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize, StoreError> {
        StoreExecutor::execute(&**self, sql, params)
    }

    fn insert(&self, sql: &str, params: &[&dyn ToSql]) -> Result<i64, StoreError> {
        StoreExecutor::insert(&**self, sql, params)
    }

    fn query_all<T, F>(&self, sql: &str, params: &[&dyn ToSql], map: F) -> Result<Vec<T>, StoreError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        (**self).query_all(sql, params, map)
    }

    fn query_opt<T, F>(&self, sql: &str, params: &[&dyn ToSql], map: F) -> Result<Option<T>, StoreError>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        (**self).query_opt(sql, params, map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory store");
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL UNIQUE, qty INTEGER NOT NULL);",
        )
        .expect("create table");
        conn
    }

    #[test]
    fn test_insert_returns_generated_id() {
        let conn = memory();
        let first = StoreExecutor::insert(&conn, "INSERT INTO items (name, qty) VALUES (?, ?)", &[&"a", &1])
            .expect("insert");
        let second = StoreExecutor::insert(&conn, "INSERT INTO items (name, qty) VALUES (?, ?)", &[&"b", &2])
            .expect("insert");
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_query_all_and_query_opt() {
        let conn = memory();
        for (name, qty) in [("a", 1), ("b", 5)] {
            StoreExecutor::execute(&conn, "INSERT INTO items (name, qty) VALUES (?, ?)", &[&name, &qty])
                .expect("insert");
        }

        let names = conn
            .query_all("SELECT name FROM items ORDER BY qty DESC", &[], |row| row.get::<_, String>(0))
            .expect("query");
        assert_eq!(names, vec!["b".to_string(), "a".to_string()]);

        let missing = conn
            .query_opt("SELECT qty FROM items WHERE name = ?", &[&"zzz"], |row| row.get::<_, i64>(0))
            .expect("query");
        assert_eq!(missing, None);
    }

    #[test]
    fn test_unique_violation_is_classified() {
        let conn = memory();
        StoreExecutor::execute(&conn, "INSERT INTO items (name, qty) VALUES ('a', 1)", &[]).expect("insert");
        let err = StoreExecutor::execute(&conn, "INSERT INTO items (name, qty) VALUES ('a', 2)", &[])
            .expect_err("duplicate name");
        assert!(err.is_unique_violation());
        assert!(!err.is_foreign_key_violation());
        assert!(!err.is_busy());
    }

    #[test]
    fn test_busy_classification() {
        let busy = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_BUSY), None);
        let locked = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_LOCKED), None);
        let other = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_CONSTRAINT), None);
        assert!(is_busy(&busy));
        assert!(is_busy(&locked));
        assert!(!is_busy(&other));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::GuardFailed {
            index: 2,
            affected: 0,
            required: 1,
        };
        assert!(err.to_string().contains("Statement 2"));

        let err = StoreError::SchemaInit("disk full".to_string());
        assert!(err.to_string().contains("Schema initialization failed"));
    }
}
