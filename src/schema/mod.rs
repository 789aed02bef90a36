//! Schema initialization.
//!
//! [`initialize`] is idempotent: tables and indexes use `IF NOT EXISTS`, later
//! columns are added with `ALTER TABLE ... ADD COLUMN` and a duplicate column is
//! not an error. Rows are never dropped or rewritten.

pub mod checksum;
pub mod manager;
pub mod tables;

pub use manager::SchemaManager;

use rusqlite::Connection;
use sea_query::SqliteQueryBuilder;

use crate::executor::StoreError;
use crate::transaction::immediate;

/// Outcome of one initialization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReport {
    pub fingerprint: String,
    pub fingerprint_changed: bool,
    /// `table.column` entries added by this run.
    pub added_columns: Vec<String>,
}

/// The full DDL set, tables then indexes, as SQLite text.
pub fn ddl() -> Vec<String> {
    let tables = tables::all_tables()
        .into_iter()
        .map(|table| table.build(SqliteQueryBuilder));
    let indexes = tables::all_indexes()
        .into_iter()
        .map(|index| index.build(SqliteQueryBuilder));
    tables.chain(indexes).collect()
}

/// Creates or upgrades the schema inside one IMMEDIATE transaction.
///
/// # Errors
///
/// Any failure is reported as [`StoreError::SchemaInit`].
pub fn initialize(conn: &mut Connection) -> Result<SchemaReport, StoreError> {
    immediate(conn, |tx| {
        let manager = SchemaManager::new(tx);

        for table in tables::all_tables() {
            manager.create_table(&table)?;
        }

        let mut added_columns = Vec::new();
        for (table, name, column) in tables::additive_columns() {
            if manager.add_column_if_missing(table, column)? {
                log::info!("added column {}.{}", table, name);
                added_columns.push(format!("{table}.{name}"));
            }
        }

        for index in tables::all_indexes() {
            manager.create_index(&index)?;
        }

        let fingerprint = checksum::fingerprint(&ddl());
        let fingerprint_changed = checksum::record_fingerprint(tx, &fingerprint)?;

        Ok(SchemaReport {
            fingerprint,
            fingerprint_changed,
            added_columns,
        })
    })
    .map_err(|err: StoreError| match err {
        StoreError::SchemaInit(_) => err,
        other => StoreError::SchemaInit(other.to_string()),
    })
}
