//! Usage ledger entry records.
//!
//! Every balance change appends an immutable entry. The correlation id
//! (a video or clip id) ties each debit to its eventual refund and
//! makes double-refund attempts detectable.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    /// Consumption charged by the pipeline.
    Debit,
    /// Returned after a failed unit of work.
    Refund,
    /// Purchased balance.
    Purchase,
    /// Promotional balance.
    Bonus,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::Debit => "debit",
            LedgerEntryType::Refund => "refund",
            LedgerEntryType::Purchase => "purchase",
            LedgerEntryType::Bonus => "bonus",
        }
    }
}

impl fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable record of one balance change.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UsageLedgerEntry {
    /// Unique entry id (UUID).
    pub id: String,

    pub workspace_id: String,

    /// Signed amount: negative for debits, positive otherwise.
    pub amount: i64,

    pub entry_type: LedgerEntryType,

    /// Workspace balance after this entry was applied.
    pub resulting_balance: i64,

    pub description: String,

    /// Video or clip id this entry belongs to, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl UsageLedgerEntry {
    pub fn new(
        workspace_id: impl Into<String>,
        amount: i64,
        entry_type: LedgerEntryType,
        resulting_balance: i64,
        description: impl Into<String>,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.into(),
            amount,
            entry_type,
            resulting_balance,
            description: description.into(),
            correlation_id,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_sign_convention() {
        let debit = UsageLedgerEntry::new(
            "ws_1",
            -3,
            LedgerEntryType::Debit,
            7,
            "Clip render",
            Some("clip-abc".to_string()),
        );
        assert!(debit.amount < 0);
        assert_eq!(debit.entry_type.as_str(), "debit");

        let refund = UsageLedgerEntry::new(
            "ws_1",
            3,
            LedgerEntryType::Refund,
            10,
            "Render failed",
            Some("clip-abc".to_string()),
        );
        assert!(refund.amount > 0);
        assert_eq!(refund.correlation_id, debit.correlation_id);
    }
}
