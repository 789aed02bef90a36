//! Connection establishment for the store file.
//!
//! Every acquisition opens the file, installs the busy handler and applies the
//! journaling/durability pragmas. Busy or locked failures are retried with a
//! linear backoff before surfacing [`StoreError::Unavailable`].

use rusqlite::Connection;
use std::path::Path;
use std::thread;
use std::time::Instant;

use crate::config::StoreSettings;
use crate::executor::{is_busy, StoreError};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Opens one configured connection, no retries.
///
/// # Errors
///
/// Returns the driver error if the file cannot be opened or a pragma fails.
pub fn connect(path: &Path, settings: &StoreSettings) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(settings.busy_timeout())?;
    // journal_mode answers with a row, so it cannot go through execute_batch
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.execute_batch(&format!(
        "PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = {};
         PRAGMA foreign_keys = ON;",
        settings.cache_size_pages
    ))?;
    Ok(conn)
}

/// Acquires a connection, retrying busy/locked failures
///
/// Attempt `n` that fails with a busy/locked condition sleeps
/// `n * retry_backoff` before the next attempt. Any other failure, or the last
/// busy failure, is reported as [`StoreError::Unavailable`].
///
/// # Examples
///
/// ```no_run
/// use labstock::config::StoreSettings;
/// use labstock::connection::acquire;
/// use std::path::Path;
///
/// let conn = acquire(Path::new("inventory.db"), &StoreSettings::default())?;
/// # Ok::<(), labstock::executor::StoreError>(())
/// ```
pub fn acquire(path: &Path, settings: &StoreSettings) -> Result<Connection, StoreError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::acquire_connection_span(path).entered();

    let start = Instant::now();
    let max_attempts = settings.max_retries.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match connect(path, settings) {
            Ok(conn) => {
                #[cfg(feature = "metrics")]
                crate::metrics::METRICS.record_acquire(start.elapsed());
                if attempt > 1 {
                    log::debug!(
                        "acquired connection to {} on attempt {} after {:?}",
                        path.display(),
                        attempt,
                        start.elapsed()
                    );
                }
                return Ok(conn);
            }
            Err(err) if is_busy(&err) && attempt < max_attempts => {
                let delay = settings.retry_backoff() * attempt;
                log::warn!(
                    "store {} busy (attempt {}/{}), retrying in {:?}: {}",
                    path.display(),
                    attempt,
                    max_attempts,
                    delay,
                    err
                );
                #[cfg(feature = "metrics")]
                crate::metrics::METRICS.record_acquire_retry();
                thread::sleep(delay);
            }
            Err(err) => {
                log::error!(
                    "could not acquire connection to {} after {} attempt(s): {}",
                    path.display(),
                    attempt,
                    err
                );
                return Err(StoreError::Unavailable {
                    attempts: attempt,
                    source: err,
                });
            }
        }
    }
}

/// Rejects paths that can never hold a store file.
///
/// # Errors
///
/// Returns [`StoreError::InvalidPath`] for an empty path or an existing directory.
pub fn validate_store_path(path: &Path) -> Result<(), StoreError> {
    if path.as_os_str().is_empty() {
        return Err(StoreError::InvalidPath(
            "Store path cannot be empty".to_string(),
        ));
    }

    if path.is_dir() {
        return Err(StoreError::InvalidPath(format!(
            "{} is a directory, expected a store file",
            path.display()
        )));
    }

    Ok(())
}
