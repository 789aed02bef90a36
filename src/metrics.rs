//! Observability hooks for the store gateway.
//!
//! Both halves are feature gated: `metrics` records OpenTelemetry counters and
//! histograms through the global meter provider (the host application owns the
//! exporter), `tracing` wraps acquisitions, statements and composite operations
//! in spans. With both features disabled this module is empty.

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<StoreMetrics> = Lazy::new(StoreMetrics::init);

#[cfg(feature = "metrics")]
pub struct StoreMetrics {
    pub statements_total: Counter<u64>,
    pub statement_errors_total: Counter<u64>,
    pub statement_duration: Histogram<f64>,
    pub acquire_duration: Histogram<f64>,
    pub acquire_retries_total: Counter<u64>,
    pub transactions_total: Counter<u64>,
    pub rollbacks_total: Counter<u64>,
}

#[cfg(feature = "metrics")]
impl StoreMetrics {
    pub fn init() -> Self {
        let meter = global::meter("labstock");

        let statements_total = meter
            .u64_counter("labstock_statements_total")
            .with_description("Total statements executed against the store")
            .build();

        let statement_errors_total = meter
            .u64_counter("labstock_statement_errors_total")
            .with_description("Statements that returned an error")
            .build();

        let statement_duration = meter
            .f64_histogram("labstock_statement_duration_seconds")
            .with_description("Duration of single statements")
            .build();

        let acquire_duration = meter
            .f64_histogram("labstock_acquire_duration_seconds")
            .with_description("Time spent opening and configuring a connection, retries included")
            .build();

        let acquire_retries_total = meter
            .u64_counter("labstock_acquire_retries_total")
            .with_description("Connection acquisitions retried after a busy/locked store")
            .build();

        let transactions_total = meter
            .u64_counter("labstock_transactions_total")
            .with_description("Multi-statement transactions committed")
            .build();

        let rollbacks_total = meter
            .u64_counter("labstock_rollbacks_total")
            .with_description("Multi-statement transactions rolled back")
            .build();

        Self {
            statements_total,
            statement_errors_total,
            statement_duration,
            acquire_duration,
            acquire_retries_total,
            transactions_total,
            rollbacks_total,
        }
    }

    pub fn record_statement(&self, elapsed: std::time::Duration) {
        self.statements_total.add(1, &[]);
        self.statement_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_statement_error(&self) {
        self.statement_errors_total.add(1, &[]);
    }

    pub fn record_acquire(&self, elapsed: std::time::Duration) {
        self.acquire_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_acquire_retry(&self) {
        self.acquire_retries_total.add(1, &[]);
    }

    pub fn record_commit(&self) {
        self.transactions_total.add(1, &[]);
    }

    pub fn record_rollback(&self) {
        self.rollbacks_total.add(1, &[]);
    }
}

/// Span constructors used by the gateway and the composite operations.
#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use std::path::Path;
    use tracing::Span;

    pub fn acquire_connection_span(path: &Path) -> Span {
        tracing::debug_span!("labstock.acquire", path = %path.display())
    }

    pub fn execute_statement_span(sql: &str) -> Span {
        tracing::trace_span!("labstock.statement", sql = %statement_head(sql))
    }

    pub fn transaction_span(statements: usize) -> Span {
        tracing::debug_span!("labstock.transaction", statements)
    }

    pub fn composite_span(operation: &'static str, id: i64) -> Span {
        tracing::info_span!("labstock.composite", operation, id)
    }

    /// First non-blank line of a statement, enough to tell statements apart in a trace.
    fn statement_head(sql: &str) -> &str {
        sql.lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("")
    }

    #[cfg(test)]
    mod tests {
        use super::statement_head;

        #[test]
        fn test_statement_head_skips_blank_lines() {
            let sql = "\n    \n   UPDATE adc_specs\n   SET quantity = quantity - ?\n";
            assert_eq!(statement_head(sql), "UPDATE adc_specs");
            assert_eq!(statement_head(""), "");
        }
    }
}
