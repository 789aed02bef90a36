//! Atomic multi-statement units.
//!
//! A [`Statement`] owns its SQL and bound values so a whole unit of work can be
//! assembled before any connection is taken. [`apply`] runs a batch inside one
//! IMMEDIATE transaction; [`immediate`] does the same for callers that need to
//! read and decide while holding the write lock.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, TransactionBehavior};

use crate::executor::StoreError;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// One statement of a transaction
///
/// A statement may carry a guard: the minimum number of rows it must affect.
/// A conditional update that matches nothing then fails the whole unit.
///
/// # Examples
///
/// ```
/// use labstock::transaction::Statement;
///
/// let decrement = Statement::new("UPDATE adc_specs SET quantity = quantity - ? WHERE id = ? AND quantity >= ?")
///     .bind(4_i64)
///     .bind(7_i64)
///     .bind(4_i64)
///     .expect_affected(1);
/// assert_eq!(decrement.params().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
    min_affected: Option<usize>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            min_affected: None,
        }
    }

    /// Append a positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Fail the transaction unless this statement affects at least `rows` rows.
    pub fn expect_affected(mut self, rows: usize) -> Self {
        self.min_affected = Some(rows);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn min_affected(&self) -> Option<usize> {
        self.min_affected
    }
}

/// Runs `f` inside an IMMEDIATE transaction on `conn`
///
/// Commits when `f` returns `Ok`, rolls back otherwise. The write lock is held
/// from the first statement, so reads made inside `f` stay valid until commit.
///
/// # Errors
///
/// Returns the error from `f`, or a `StoreError` if begin/commit fails.
pub fn immediate<T, E, F>(conn: &mut Connection, f: F) -> Result<T, E>
where
    F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, E>,
    E: From<StoreError> + std::fmt::Display,
{
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(StoreError::from)?;

    match f(&tx) {
        Ok(value) => {
            tx.commit().map_err(StoreError::from)?;
            #[cfg(feature = "metrics")]
            METRICS.record_commit();
            Ok(value)
        }
        Err(err) => {
            log::debug!("rolling back transaction: {err}");
            if let Err(rollback_err) = tx.rollback() {
                log::error!("rollback failed: {rollback_err}");
            }
            #[cfg(feature = "metrics")]
            METRICS.record_rollback();
            Err(err)
        }
    }
}

/// Applies every statement on `conn` as one atomic unit.
///
/// # Errors
///
/// Returns [`StoreError::GuardFailed`] when a guarded statement affects too few
/// rows, or the driver error of the first failing statement. Nothing is
/// committed in either case.
pub fn apply(conn: &mut Connection, statements: &[Statement]) -> Result<(), StoreError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::transaction_span(statements.len()).entered();

    let result = immediate(conn, |tx| {
        for (index, statement) in statements.iter().enumerate() {
            let affected = tx.execute(&statement.sql, params_from_iter(statement.params.iter()))?;
            if let Some(required) = statement.min_affected {
                if affected < required {
                    return Err(StoreError::GuardFailed {
                        index,
                        affected,
                        required,
                    });
                }
            }
        }
        Ok(())
    });

    if let Err(err) = &result {
        log::error!(
            "transaction of {} statement(s) rolled back: {}",
            statements.len(),
            err
        );
    }
    result
}
