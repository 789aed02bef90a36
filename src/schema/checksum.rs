//! Schema fingerprint recorded in `store_meta`

use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::executor::{StoreError, StoreExecutor};

pub const FINGERPRINT_KEY: &str = "schema_fingerprint";

/// SHA-256 over the DDL statements, in order, newline separated.
pub fn fingerprint<S: AsRef<str>>(statements: &[S]) -> String {
    let mut hasher = Sha256::new();
    for statement in statements {
        hasher.update(statement.as_ref().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

pub fn stored_fingerprint(conn: &Connection) -> Result<Option<String>, StoreError> {
    conn.query_opt(
        "SELECT value FROM store_meta WHERE key = ?",
        &[&FINGERPRINT_KEY],
        |row| row.get(0),
    )
}

/// Store `current` and report whether it differs from the previous value.
pub fn record_fingerprint(conn: &Connection, current: &str) -> Result<bool, StoreError> {
    let previous = stored_fingerprint(conn)?;
    if previous.as_deref() == Some(current) {
        return Ok(false);
    }

    match &previous {
        Some(old) => log::info!("schema fingerprint changed: {} -> {}", old, current),
        None => log::info!("recording schema fingerprint {}", current),
    }
    StoreExecutor::execute(
        conn,
        "INSERT INTO store_meta (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        &[&FINGERPRINT_KEY, &current],
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_order_sensitive() {
        let a = fingerprint(&["CREATE TABLE a (id INTEGER)", "CREATE TABLE b (id INTEGER)"]);
        let b = fingerprint(&["CREATE TABLE b (id INTEGER)", "CREATE TABLE a (id INTEGER)"]);
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(a, fingerprint(&["CREATE TABLE a (id INTEGER)", "CREATE TABLE b (id INTEGER)"]));
    }

    #[test]
    fn test_record_fingerprint_reports_changes_only() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("CREATE TABLE store_meta (key TEXT NOT NULL PRIMARY KEY, value TEXT NOT NULL)")
            .expect("meta table");

        assert!(record_fingerprint(&conn, "abc").expect("first"));
        assert!(!record_fingerprint(&conn, "abc").expect("same"));
        assert!(record_fingerprint(&conn, "def").expect("changed"));
        assert_eq!(stored_fingerprint(&conn).expect("read"), Some("def".to_string()));
    }
}
