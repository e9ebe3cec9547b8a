// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Storage Module
//!
//! All persistent state lives in a single redb database file (pure Rust,
//! ACID). Every logical operation is one write transaction; redb's
//! single-writer model serializes all balance mutations, which is what makes
//! the read-validate-write-log pattern in this module safe without any
//! additional locking.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/ledger.redb
//!   wallets            wallet_id → WalletRecord
//!   wallet_owners      owner_user_id → wallet_id
//!   balances           wallet_id|token → BalanceRecord
//!   ledger_entries     wallet_id|token|!seq → LedgerEntry (newest first)
//!   withdraw_requests  request_id → WithdrawRequest
//!   withdraw_queue     status|created_ms|request_id → request_id (oldest first)
//!   counters           name → u64
//! ```
//!
//! ## Consistency Rules
//!
//! - A balance row is never written without its matching ledger entry in the
//!   same transaction (and vice versa).
//! - Ledger entries are append-only; nothing in this module updates or
//!   deletes one.
//! - The withdraw queue index moves in the same transaction as the request
//!   row it points at.

pub mod balances;
pub mod entries;
pub mod ledger_db;
pub mod units;
pub mod wallets;
pub mod withdrawals;

pub use balances::{BalanceLedger, BalanceRecord, BalanceSnapshot};
pub use entries::{EntryKind, LedgerEntry};
pub use ledger_db::{LedgerDb, StoreError, StoreResult};
pub use units::{format_units, parse_units};
pub use wallets::{WalletDirectory, WalletRecord};
pub use withdrawals::{QueueItem, WithdrawManager, WithdrawRequest, WithdrawStatus};
