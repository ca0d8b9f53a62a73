//! Workspace balance bookkeeping.
//!
//! All balance changes for a workspace serialize on the ledger's lock,
//! so a debit's check-and-decrement is atomic: two render jobs debiting
//! the same workspace concurrently can never drive the balance
//! negative.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{info, warn};

use clipmill_models::{LedgerEntryType, UsageLedgerEntry};

use crate::error::{LedgerError, LedgerResult};
use crate::metrics;

#[derive(Debug, Default)]
struct WorkspaceAccount {
    balance: i64,
    entries: Vec<UsageLedgerEntry>,
}

impl WorkspaceAccount {
    fn has_refund_for(&self, correlation_id: &str) -> bool {
        self.entries.iter().any(|e| {
            e.entry_type == LedgerEntryType::Refund
                && e.correlation_id.as_deref() == Some(correlation_id)
        })
    }
}

/// Prepaid usage ledger.
///
/// Tracks per-workspace balances (minutes or credits, units are the
/// caller's concern) and an append-only entry log for audit and refund
/// matching.
#[derive(Debug, Default)]
pub struct UsageLedger {
    accounts: Mutex<HashMap<String, WorkspaceAccount>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically debit `amount` from a workspace.
    ///
    /// Rejects with `InsufficientBalance` when `amount` exceeds the
    /// current balance; otherwise decrements and appends a debit entry
    /// in the same critical section. Returns the new balance.
    pub async fn debit(
        &self,
        workspace_id: &str,
        amount: i64,
        correlation_id: &str,
        description: &str,
    ) -> LedgerResult<i64> {
        if amount <= 0 {
            return Err(LedgerError::invalid_amount(format!(
                "debit amount must be positive, got {amount}"
            )));
        }

        let mut accounts = self.accounts.lock().expect("ledger lock poisoned");
        let account = accounts.entry(workspace_id.to_string()).or_default();

        if amount > account.balance {
            warn!(
                workspace_id = %workspace_id,
                requested = amount,
                available = account.balance,
                correlation_id = %correlation_id,
                "Debit rejected: insufficient balance"
            );
            metrics::record_rejected_debit();
            return Err(LedgerError::InsufficientBalance {
                workspace_id: workspace_id.to_string(),
                requested: amount,
                available: account.balance,
            });
        }

        account.balance -= amount;
        let entry = UsageLedgerEntry::new(
            workspace_id,
            -amount,
            LedgerEntryType::Debit,
            account.balance,
            description,
            Some(correlation_id.to_string()),
        );
        account.entries.push(entry);
        metrics::record_entry(LedgerEntryType::Debit);

        info!(
            workspace_id = %workspace_id,
            amount = amount,
            balance = account.balance,
            correlation_id = %correlation_id,
            "Debited workspace"
        );
        Ok(account.balance)
    }

    /// Refund a previously debited amount.
    ///
    /// Refunds always succeed (they are not capped), but at most one
    /// refund is applied per correlation id: a second attempt is
    /// logged and returns the unchanged balance.
    pub async fn refund(
        &self,
        workspace_id: &str,
        amount: i64,
        correlation_id: &str,
        reason: &str,
    ) -> i64 {
        let mut accounts = self.accounts.lock().expect("ledger lock poisoned");
        let account = accounts.entry(workspace_id.to_string()).or_default();

        if account.has_refund_for(correlation_id) {
            warn!(
                workspace_id = %workspace_id,
                correlation_id = %correlation_id,
                "Duplicate refund suppressed"
            );
            return account.balance;
        }

        account.balance += amount;
        let entry = UsageLedgerEntry::new(
            workspace_id,
            amount,
            LedgerEntryType::Refund,
            account.balance,
            reason,
            Some(correlation_id.to_string()),
        );
        account.entries.push(entry);
        metrics::record_entry(LedgerEntryType::Refund);

        info!(
            workspace_id = %workspace_id,
            amount = amount,
            balance = account.balance,
            correlation_id = %correlation_id,
            "Refunded workspace"
        );
        account.balance
    }

    /// Credit purchased or bonus balance. Shares the debit path's
    /// atomicity; not used by the pipeline directly.
    pub async fn credit(
        &self,
        workspace_id: &str,
        amount: i64,
        entry_type: LedgerEntryType,
        description: &str,
    ) -> LedgerResult<i64> {
        if amount <= 0 {
            return Err(LedgerError::invalid_amount(format!(
                "credit amount must be positive, got {amount}"
            )));
        }

        let mut accounts = self.accounts.lock().expect("ledger lock poisoned");
        let account = accounts.entry(workspace_id.to_string()).or_default();

        account.balance += amount;
        let entry = UsageLedgerEntry::new(
            workspace_id,
            amount,
            entry_type,
            account.balance,
            description,
            None,
        );
        account.entries.push(entry);
        metrics::record_entry(entry_type);

        Ok(account.balance)
    }

    /// Current balance for a workspace (0 for unknown workspaces).
    pub async fn balance(&self, workspace_id: &str) -> i64 {
        let accounts = self.accounts.lock().expect("ledger lock poisoned");
        accounts.get(workspace_id).map(|a| a.balance).unwrap_or(0)
    }

    /// All entries for a workspace, in application order.
    pub async fn entries(&self, workspace_id: &str) -> Vec<UsageLedgerEntry> {
        let accounts = self.accounts.lock().expect("ledger lock poisoned");
        accounts
            .get(workspace_id)
            .map(|a| a.entries.clone())
            .unwrap_or_default()
    }
}
