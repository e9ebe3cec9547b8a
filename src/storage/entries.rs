// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Append-only ledger entries.
//!
//! Every balance mutation appends exactly one entry inside the same write
//! transaction, carrying the post-mutation balance. Entries are never updated
//! or deleted; replaying them oldest-first from zero must reproduce the
//! stored balance exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ledger_db::{self, StoreError, LEDGER_ENTRIES};
use crate::error::LedgerResult;

/// Ledger entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Funds added to the balance
    Credit,
    /// Administrative deduction from the balance
    Debit,
    /// Signed administrative correction
    Adjustment,
    /// Withdrawal settled on-chain
    Payout,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Adjustment => "adjustment",
            Self::Payout => "payout",
        }
    }
}

/// Immutable audit record of one balance mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry identifier (UUID)
    pub entry_id: String,
    /// Database-wide monotonic sequence number fixing total creation order
    pub seq: u64,
    /// Owning wallet
    pub wallet_id: String,
    /// Token symbol
    pub token: String,
    /// Entry kind
    pub kind: EntryKind,
    /// Signed delta in base units (credits positive, debits/payouts negative)
    pub amount: i128,
    /// Balance immediately after this mutation
    pub balance_after: u128,
    /// Free-form reference (e.g. the withdraw request id for payouts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Structured context recorded alongside the mutation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// User or system identity that triggered the mutation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_user_id: Option<String>,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        seq: u64,
        wallet_id: &str,
        token: &str,
        kind: EntryKind,
        amount: i128,
        balance_after: u128,
        reference: Option<&str>,
        metadata: Option<serde_json::Value>,
        actor_user_id: Option<&str>,
    ) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            seq,
            wallet_id: wallet_id.to_string(),
            token: token.to_string(),
            kind,
            amount,
            balance_after,
            reference: reference.map(|r| r.to_string()),
            metadata,
            actor_user_id: actor_user_id.map(|a| a.to_string()),
            created_at: Utc::now(),
        }
    }
}

/// Append an entry inside the caller's write transaction.
pub(crate) fn append_in_txn(
    write_txn: &redb::WriteTransaction,
    entry: &LedgerEntry,
) -> LedgerResult<()> {
    let mut table = write_txn.open_table(LEDGER_ENTRIES)?;
    let key = ledger_db::entry_key(&entry.wallet_id, &entry.token, entry.seq);
    let json = serde_json::to_vec(entry)?;
    table.insert(key.as_slice(), json.as_slice())?;
    Ok(())
}

/// List the most recent entries for a (wallet, token) pair, newest first.
pub(crate) fn list_recent_in_read(
    read_txn: &redb::ReadTransaction,
    wallet_id: &str,
    token: &str,
    limit: usize,
) -> LedgerResult<Vec<LedgerEntry>> {
    let table = read_txn.open_table(LEDGER_ENTRIES)?;
    let prefix = ledger_db::entry_prefix(wallet_id, token);
    let end = ledger_db::entry_prefix_end(wallet_id, token);

    let mut entries = Vec::with_capacity(limit.min(64));
    for item in table.range(prefix.as_slice()..end.as_slice())? {
        let item = item?;
        let entry: LedgerEntry =
            ledger_db::decode_row(&format!("ledger entry {wallet_id}|{token}"), item.1.value())?;
        entries.push(entry);
        if entries.len() >= limit {
            break;
        }
    }
    Ok(entries)
}

/// Replay the full entry history oldest-first from zero and return the
/// reconstructed balance.
pub(crate) fn replay_in_read(
    read_txn: &redb::ReadTransaction,
    wallet_id: &str,
    token: &str,
) -> LedgerResult<u128> {
    let mut entries = list_recent_in_read(read_txn, wallet_id, token, usize::MAX)?;
    entries.reverse();

    let mut balance: u128 = 0;
    for entry in &entries {
        balance = apply_delta(balance, entry.amount).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "ledger replay for {wallet_id}|{token} drops below zero at seq {}",
                entry.seq
            ))
        })?;
    }
    Ok(balance)
}

fn apply_delta(balance: u128, delta: i128) -> Option<u128> {
    if delta >= 0 {
        balance.checked_add(delta as u128)
    } else {
        balance.checked_sub(delta.unsigned_abs())
    }
}
