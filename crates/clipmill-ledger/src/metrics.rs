//! Ledger metrics collection.

use metrics::counter;

use clipmill_models::LedgerEntryType;

/// Metric name constants for consistency.
pub mod names {
    /// Total ledger entries by type.
    pub const ENTRIES_TOTAL: &str = "clipmill_ledger_entries_total";

    /// Total debits rejected for insufficient balance.
    pub const REJECTED_DEBITS_TOTAL: &str = "clipmill_ledger_rejected_debits_total";
}

/// Record an applied ledger entry.
pub fn record_entry(entry_type: LedgerEntryType) {
    counter!(
        names::ENTRIES_TOTAL,
        "type" => entry_type.as_str()
    )
    .increment(1);
}

/// Record a debit rejected for insufficient balance.
pub fn record_rejected_debit() {
    counter!(names::REJECTED_DEBITS_TOTAL).increment(1);
}
