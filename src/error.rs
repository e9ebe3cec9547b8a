// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Closed error taxonomy for ledger operations.
//!
//! Every fallible ledger/withdrawal operation returns one of these variants.
//! Business failures abort the surrounding database transaction in full
//! (the write transaction is dropped without commit), so callers never see
//! partially-applied state.

use crate::storage::ledger_db::StoreError;
use crate::storage::withdrawals::WithdrawStatus;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Amount failed validation (zero, malformed decimal string, overflow).
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Requested more than the balance can cover at validation time.
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u128, available: u128 },

    /// No withdraw request stored under this id.
    #[error("withdraw request not found: {0}")]
    WithdrawRequestNotFound(String),

    /// The request already reached a terminal status and cannot change again.
    #[error("withdraw request {request_id} already finalized as {status}")]
    WithdrawRequestFinalized {
        request_id: String,
        status: WithdrawStatus,
    },

    /// Completion-time re-validation failed: the raw balance no longer covers
    /// the withdrawal amount.
    #[error("balance too low to complete withdrawal {request_id}: requested {requested}, balance {balance}")]
    BalanceTooLow {
        request_id: String,
        requested: u128,
        balance: u128,
    },

    /// A balance row that must already exist (completion path) is missing.
    #[error("no balance for wallet {wallet_id} and token {token}")]
    BalanceNotFound { wallet_id: String, token: String },

    /// Administrative secret missing or mismatched.
    #[error("unauthorized")]
    Unauthorized,

    /// Infrastructure failure in the embedded database layer.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// redb and serde failures funnel through the Store variant so `?` works
// directly inside transaction code.
macro_rules! impl_store_from {
    ($($err:ty),+ $(,)?) => {
        $(impl From<$err> for LedgerError {
            fn from(e: $err) -> Self {
                LedgerError::Store(e.into())
            }
        })+
    };
}

impl_store_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    serde_json::Error,
);
