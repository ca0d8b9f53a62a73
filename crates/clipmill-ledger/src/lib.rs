//! Prepaid usage ledger.
//!
//! This crate provides:
//! - Atomic check-and-decrement debits per workspace
//! - Refunds matched to debits by correlation id (at most one each)
//! - Purchase/bonus credits
//! - An append-only entry log for audit

pub mod error;
pub mod ledger;
pub mod metrics;

pub use error::{LedgerError, LedgerResult};
pub use ledger::UsageLedger;
