//! Ledger error types.

use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient balance in workspace {workspace_id}: requested {requested}, available {available}")]
    InsufficientBalance {
        workspace_id: String,
        requested: i64,
        available: i64,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

impl LedgerError {
    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn is_insufficient_balance(&self) -> bool {
        matches!(self, LedgerError::InsufficientBalance { .. })
    }
}
