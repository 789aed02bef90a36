//! Store gateway: one handle per store file, one connection per operation.

use rusqlite::{Connection, Row, ToSql};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::config::StoreSettings;
use crate::connection::{acquire, validate_store_path};
use crate::executor::{StoreError, StoreExecutor};
use crate::schema::{self, SchemaReport};
use crate::transaction::{self, Statement};

/// Handle on the current store file
///
/// Every call acquires its own configured connection, so a `Store` can be
/// shared freely across threads behind an `Arc`. The file it points at can be
/// changed with [`Store::switch_to`].
///
/// # Examples
///
/// ```no_run
/// use labstock::config::StoreSettings;
/// use labstock::executor::StoreExecutor;
/// use labstock::Store;
///
/// let store = Store::open("inventory.db", StoreSettings::default())?;
/// let names: Vec<String> = store.query_all("SELECT name FROM materials", &[], |row| row.get(0))?;
/// # Ok::<(), labstock::executor::StoreError>(())
/// ```
#[derive(Debug)]
pub struct Store {
    path: RwLock<PathBuf>,
    settings: StoreSettings,
}

impl Store {
    /// Opens (creating if needed) the store at `path` and initializes its schema.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SchemaInit` if the schema cannot be created, or
    /// `StoreError::Unavailable` if no connection can be acquired.
    pub fn open(path: impl AsRef<Path>, settings: StoreSettings) -> Result<Self, StoreError> {
        let path = path.as_ref();
        validate_store_path(path)?;
        let report = initialize_at(path, &settings)?;
        log::info!(
            "opened store {} (schema {})",
            path.display(),
            &report.fingerprint[..12]
        );
        Ok(Self {
            path: RwLock::new(path.to_path_buf()),
            settings,
        })
    }

    pub fn path(&self) -> PathBuf {
        self.path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// A fresh connection to the current file.
    pub fn acquire(&self) -> Result<Connection, StoreError> {
        acquire(&self.path(), &self.settings)
    }

    /// Runs every statement atomically in one IMMEDIATE transaction.
    ///
    /// # Errors
    ///
    /// Returns the first failure; nothing is committed.
    pub fn transaction(&self, statements: &[Statement]) -> Result<(), StoreError> {
        let mut conn = self.acquire()?;
        transaction::apply(&mut conn, statements)
    }

    /// Exclusive use of one connection for callers that need manual control.
    pub fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.acquire()?;
        f(&mut conn)
    }

    /// Re-points this handle at another file after initializing its schema.
    ///
    /// On failure the handle keeps its previous file.
    pub fn switch_to(&self, path: impl AsRef<Path>) -> Result<SchemaReport, StoreError> {
        let path = path.as_ref();
        validate_store_path(path)?;
        let report = initialize_at(path, &self.settings)?;
        let mut current = self.path.write().unwrap_or_else(PoisonError::into_inner);
        log::info!("switching store {} -> {}", current.display(), path.display());
        *current = path.to_path_buf();
        Ok(report)
    }
}

fn initialize_at(path: &Path, settings: &StoreSettings) -> Result<SchemaReport, StoreError> {
    let mut conn = acquire(path, settings)?;
    schema::initialize(&mut conn).map_err(|err| {
        log::error!("schema initialization failed for {}: {}", path.display(), err);
        err
    })
}

impl StoreExecutor for Store {
    fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize, StoreError> {
        StoreExecutor::execute(&self.acquire()?, sql, params)
    }

    fn insert(&self, sql: &str, params: &[&dyn ToSql]) -> Result<i64, StoreError> {
        StoreExecutor::insert(&self.acquire()?, sql, params)
    }

    fn query_all<T, F>(&self, sql: &str, params: &[&dyn ToSql], map: F) -> Result<Vec<T>, StoreError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.acquire()?.query_all(sql, params, map)
    }

    fn query_opt<T, F>(&self, sql: &str, params: &[&dyn ToSql], map: F) -> Result<Option<T>, StoreError>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.acquire()?.query_opt(sql, params, map)
    }
}
