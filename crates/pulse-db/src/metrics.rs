//! Database metrics collection.
//!
//! Provides standardized metrics for monitoring repository operations:
//! - Transaction counters by operation and outcome
//! - Latency histograms
//! - Retry counters
//! - Money movement counters by ledger entry kind

use metrics::{counter, histogram};

use pulse_models::{Coins, LedgerEntryKind};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Total transactions by operation and outcome.
    pub const TRANSACTIONS_TOTAL: &str = "db_transactions_total";

    /// Total retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "db_retries_total";

    /// Transaction latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "db_transaction_latency_seconds";

    /// Ledger entries written, by kind.
    pub const LEDGER_ENTRIES_TOTAL: &str = "wallet_ledger_entries_total";

    /// Coins moved, by ledger entry kind.
    pub const COINS_MOVED_TOTAL: &str = "wallet_coins_moved_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record metrics for a completed transaction.
pub fn record_transaction(operation: &str, ok: bool, latency_ms: f64) {
    counter!(
        names::TRANSACTIONS_TOTAL,
        "operation" => operation.to_string(),
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record one ledger entry.
pub fn record_ledger_entry(kind: LedgerEntryKind, amount: Coins) {
    counter!(names::LEDGER_ENTRIES_TOTAL, "kind" => kind.as_str()).increment(1);
    counter!(names::COINS_MOVED_TOTAL, "kind" => kind.as_str()).increment(amount.unsigned_abs());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::TRANSACTIONS_TOTAL.contains("transactions"));
        assert!(names::RETRIES_TOTAL.contains("retries"));
        assert!(names::LATENCY_SECONDS.contains("latency"));
        assert!(names::COINS_MOVED_TOTAL.starts_with("wallet_"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_transaction("transfer", true, 12.0);
        record_retry("transfer");
        record_ledger_entry(LedgerEntryKind::TransferOut, -50);
    }
}
