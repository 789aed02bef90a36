//! SchemaManager - runs sea-query DDL against one SQLite connection

use rusqlite::Connection;
use sea_query::{ColumnDef, IndexCreateStatement, SqliteQueryBuilder, Table, TableAlterStatement, TableCreateStatement};

use crate::executor::{StoreError, StoreExecutor};

/// Builds DDL with `SqliteQueryBuilder` and executes it on a borrowed connection
///
/// The connection is usually an open `rusqlite::Transaction`, so a failed
/// initialization leaves nothing behind.
pub struct SchemaManager<'c> {
    conn: &'c Connection,
}

impl<'c> SchemaManager<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Create a table
    ///
    /// # Example
    /// ```rust,no_run
    /// use labstock::schema::SchemaManager;
    /// use sea_query::{ColumnDef, Table};
    ///
    /// # fn run(conn: &rusqlite::Connection) -> Result<(), labstock::executor::StoreError> {
    /// let table = Table::create()
    ///     .table("labels")
    ///     .if_not_exists()
    ///     .col(ColumnDef::new("id").integer().not_null().auto_increment().primary_key())
    ///     .to_owned();
    /// SchemaManager::new(conn).create_table(&table)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_table(&self, table: &TableCreateStatement) -> Result<(), StoreError> {
        let sql = table.build(SqliteQueryBuilder);
        self.execute(&sql)
    }

    pub fn create_index(&self, index: &IndexCreateStatement) -> Result<(), StoreError> {
        let sql = index.build(SqliteQueryBuilder);
        self.execute(&sql)
    }

    pub fn alter_table(&self, alter: &TableAlterStatement) -> Result<(), StoreError> {
        let sql = alter.build(SqliteQueryBuilder);
        self.execute(&sql)
    }

    /// Add a column unless the table already has it
    ///
    /// Returns `true` when the column was added, `false` when SQLite reported a
    /// duplicate column.
    pub fn add_column_if_missing(&self, table: &str, column: ColumnDef) -> Result<bool, StoreError> {
        let alter = Table::alter()
            .table(table.to_string())
            .add_column(column)
            .to_owned();
        match self.alter_table(&alter) {
            Ok(()) => Ok(true),
            Err(err) if is_duplicate_column(&err) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn execute(&self, sql: &str) -> Result<(), StoreError> {
        StoreExecutor::execute(self.conn, sql, &[]).map(|_| ())
    }
}

fn is_duplicate_column(err: &StoreError) -> bool {
    match err {
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(_, Some(message))) => {
            message.contains("duplicate column name")
        }
        _ => false,
    }
}
