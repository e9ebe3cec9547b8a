// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Balance store: one mutable record per (wallet, token) pair.
//!
//! Every mutation runs as a single write transaction that reads the balance
//! row, validates, writes the new row, and appends the matching ledger entry.
//! redb serializes writers, so the row can never be read-modified-written by
//! two operations at once, and an error return before commit rolls the whole
//! mutation back. The balance and its entry trail therefore never diverge.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use super::entries::{self, EntryKind, LedgerEntry};
use super::ledger_db::{self, LedgerDb, BALANCES};
use super::wallets::{self, WalletRecord};
use crate::error::{LedgerError, LedgerResult};

/// Balance record stored per (wallet, token) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceRecord {
    /// Unique balance identifier (UUID)
    pub balance_id: String,
    /// Owning wallet
    pub wallet_id: String,
    /// Token symbol
    pub token: String,
    /// Total balance in base units
    pub balance: u128,
    /// Amount reserved for withdrawals awaiting on-chain settlement
    pub pending_onchain: u128,
    /// Amount otherwise locked (not spendable)
    pub locked: u128,
    /// When the balance row was created
    pub created_at: DateTime<Utc>,
    /// When the balance row was last modified
    pub updated_at: DateTime<Utc>,
}

impl BalanceRecord {
    /// Build a zeroed balance for a (wallet, token) pair.
    pub fn new(wallet_id: &str, token: &str) -> Self {
        let now = Utc::now();
        Self {
            balance_id: uuid::Uuid::new_v4().to_string(),
            wallet_id: wallet_id.to_string(),
            token: token.to_string(),
            balance: 0,
            pending_onchain: 0,
            locked: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Amount eligible for new reservations: balance minus reserved minus
    /// locked, floored at zero.
    pub fn available(&self) -> u128 {
        self.balance
            .saturating_sub(self.pending_onchain)
            .saturating_sub(self.locked)
    }
}

/// Read-only view assembled for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub wallet: WalletRecord,
    pub balance: BalanceRecord,
    /// Derived spendable amount at snapshot time
    pub available: u128,
    /// Most recent ledger entries, newest first
    pub entries: Vec<LedgerEntry>,
}

// =============================================================================
// In-transaction helpers (shared with the withdrawal manager)
// =============================================================================

/// Load the balance row for (wallet, token), or a zeroed default when the
/// token was never touched. The default is not persisted until stored.
pub(crate) fn load_or_default_in_txn(
    write_txn: &redb::WriteTransaction,
    wallet_id: &str,
    token: &str,
) -> LedgerResult<BalanceRecord> {
    let table = write_txn.open_table(BALANCES)?;
    let key = ledger_db::balance_key(wallet_id, token);
    let result = match table.get(key.as_str())? {
        Some(row) => Ok(ledger_db::decode_row(
            &format!("balance {key}"),
            row.value(),
        )?),
        None => Ok(BalanceRecord::new(wallet_id, token)),
    };
    result
}

/// Load the balance row for (wallet, token), failing when it does not exist.
pub(crate) fn get_required_in_txn(
    write_txn: &redb::WriteTransaction,
    wallet_id: &str,
    token: &str,
) -> LedgerResult<BalanceRecord> {
    let table = write_txn.open_table(BALANCES)?;
    let key = ledger_db::balance_key(wallet_id, token);
    let result = match table.get(key.as_str())? {
        Some(row) => Ok(ledger_db::decode_row(
            &format!("balance {key}"),
            row.value(),
        )?),
        None => Err(LedgerError::BalanceNotFound {
            wallet_id: wallet_id.to_string(),
            token: token.to_string(),
        }),
    };
    result
}

/// Write the balance row inside the caller's write transaction.
pub(crate) fn store_in_txn(
    write_txn: &redb::WriteTransaction,
    record: &BalanceRecord,
) -> LedgerResult<()> {
    let mut table = write_txn.open_table(BALANCES)?;
    let key = ledger_db::balance_key(&record.wallet_id, &record.token);
    let json = serde_json::to_vec(record)?;
    table.insert(key.as_str(), json.as_slice())?;
    Ok(())
}

/// Load the balance row in a read transaction (snapshot path).
pub(crate) fn get_in_read(
    read_txn: &redb::ReadTransaction,
    wallet_id: &str,
    token: &str,
) -> LedgerResult<Option<BalanceRecord>> {
    let table = read_txn.open_table(BALANCES)?;
    let key = ledger_db::balance_key(wallet_id, token);
    match table.get(key.as_str())? {
        Some(row) => Ok(Some(ledger_db::decode_row(
            &format!("balance {key}"),
            row.value(),
        )?)),
        None => Ok(None),
    }
}

/// Validate that a base-unit amount fits the signed ledger delta range.
pub(crate) fn signed_delta(amount: u128) -> LedgerResult<i128> {
    i128::try_from(amount)
        .map_err(|_| LedgerError::InvalidAmount("amount exceeds ledger range".to_string()))
}

// =============================================================================
// BalanceLedger
// =============================================================================

/// Repository for balance mutations and snapshots.
pub struct BalanceLedger<'a> {
    db: &'a LedgerDb,
}

impl<'a> BalanceLedger<'a> {
    /// Create a new BalanceLedger.
    pub fn new(db: &'a LedgerDb) -> Self {
        Self { db }
    }

    /// Add funds to a balance, creating the wallet and balance rows on first
    /// use, and append the matching `credit` entry.
    pub fn credit(
        &self,
        owner_user_id: &str,
        token: &str,
        amount: u128,
        reference: Option<&str>,
        metadata: Option<serde_json::Value>,
        actor_user_id: Option<&str>,
    ) -> LedgerResult<(BalanceRecord, LedgerEntry)> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "credit amount must be positive".to_string(),
            ));
        }
        let delta = signed_delta(amount)?;

        let write_txn = self.db.begin_write()?;
        let wallet = wallets::ensure_in_txn(&write_txn, owner_user_id, None)?;

        let mut balance = load_or_default_in_txn(&write_txn, &wallet.wallet_id, token)?;
        balance.balance = balance
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::InvalidAmount("credit overflows balance".to_string()))?;
        balance.updated_at = Utc::now();
        store_in_txn(&write_txn, &balance)?;

        let seq = ledger_db::next_entry_seq(&write_txn)?;
        let entry = LedgerEntry::new(
            seq,
            &balance.wallet_id,
            token,
            EntryKind::Credit,
            delta,
            balance.balance,
            reference,
            metadata,
            actor_user_id,
        );
        entries::append_in_txn(&write_txn, &entry)?;
        write_txn.commit()?;

        tracing::info!(
            wallet_id = %balance.wallet_id,
            token = %token,
            amount = %amount,
            balance = %balance.balance,
            "Credited balance"
        );
        Ok((balance, entry))
    }

    /// Deduct funds directly from a balance (administrative path, checked
    /// against the raw balance rather than `available`), and append the
    /// matching `debit` entry.
    pub fn debit(
        &self,
        owner_user_id: &str,
        token: &str,
        amount: u128,
        reference: Option<&str>,
        metadata: Option<serde_json::Value>,
        actor_user_id: Option<&str>,
    ) -> LedgerResult<(BalanceRecord, LedgerEntry)> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "debit amount must be positive".to_string(),
            ));
        }
        let delta = signed_delta(amount)?;

        let write_txn = self.db.begin_write()?;
        let wallet = wallets::ensure_in_txn(&write_txn, owner_user_id, None)?;

        let mut balance = load_or_default_in_txn(&write_txn, &wallet.wallet_id, token)?;
        let current = balance.balance;
        balance.balance = current
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds {
                requested: amount,
                available: current,
            })?;
        balance.updated_at = Utc::now();
        store_in_txn(&write_txn, &balance)?;

        let seq = ledger_db::next_entry_seq(&write_txn)?;
        let entry = LedgerEntry::new(
            seq,
            &balance.wallet_id,
            token,
            EntryKind::Debit,
            -delta,
            balance.balance,
            reference,
            metadata,
            actor_user_id,
        );
        entries::append_in_txn(&write_txn, &entry)?;
        write_txn.commit()?;

        tracing::info!(
            wallet_id = %balance.wallet_id,
            token = %token,
            amount = %amount,
            balance = %balance.balance,
            "Debited balance"
        );
        Ok((balance, entry))
    }

    /// Apply a signed administrative correction and append the matching
    /// `adjustment` entry. Negative deltas are bounded by the raw balance.
    pub fn adjust(
        &self,
        owner_user_id: &str,
        token: &str,
        delta: i128,
        reference: Option<&str>,
        metadata: Option<serde_json::Value>,
        actor_user_id: Option<&str>,
    ) -> LedgerResult<(BalanceRecord, LedgerEntry)> {
        if delta == 0 {
            return Err(LedgerError::InvalidAmount(
                "adjustment delta must be nonzero".to_string(),
            ));
        }

        let write_txn = self.db.begin_write()?;
        let wallet = wallets::ensure_in_txn(&write_txn, owner_user_id, None)?;

        let mut balance = load_or_default_in_txn(&write_txn, &wallet.wallet_id, token)?;
        let current = balance.balance;
        balance.balance = if delta >= 0 {
            current.checked_add(delta as u128).ok_or_else(|| {
                LedgerError::InvalidAmount("adjustment overflows balance".to_string())
            })?
        } else {
            current
                .checked_sub(delta.unsigned_abs())
                .ok_or(LedgerError::InsufficientFunds {
                    requested: delta.unsigned_abs(),
                    available: current,
                })?
        };
        balance.updated_at = Utc::now();
        store_in_txn(&write_txn, &balance)?;

        let seq = ledger_db::next_entry_seq(&write_txn)?;
        let entry = LedgerEntry::new(
            seq,
            &balance.wallet_id,
            token,
            EntryKind::Adjustment,
            delta,
            balance.balance,
            reference,
            metadata,
            actor_user_id,
        );
        entries::append_in_txn(&write_txn, &entry)?;
        write_txn.commit()?;

        tracing::info!(
            wallet_id = %balance.wallet_id,
            token = %token,
            delta = %delta,
            balance = %balance.balance,
            "Adjusted balance"
        );
        Ok((balance, entry))
    }

    /// Read-only snapshot: wallet, balance (zeroed default when the token was
    /// never touched) and the most recent `entry_limit` ledger entries.
    ///
    /// Returns `Ok(None)` when the user has no wallet yet.
    pub fn snapshot(
        &self,
        owner_user_id: &str,
        token: &str,
        entry_limit: usize,
    ) -> LedgerResult<Option<BalanceSnapshot>> {
        let read_txn = self.db.begin_read()?;
        let wallet = match wallets::get_by_owner_in_read(&read_txn, owner_user_id)? {
            Some(w) => w,
            None => return Ok(None),
        };

        let balance = get_in_read(&read_txn, &wallet.wallet_id, token)?
            .unwrap_or_else(|| BalanceRecord::new(&wallet.wallet_id, token));
        let entries = entries::list_recent_in_read(&read_txn, &wallet.wallet_id, token, entry_limit)?;

        let available = balance.available();
        Ok(Some(BalanceSnapshot {
            wallet,
            balance,
            available,
            entries,
        }))
    }

    /// Reconstruct the balance by replaying the full entry history from zero.
    /// Audit hook: the result must equal the stored balance at all times.
    pub fn replay(&self, owner_user_id: &str, token: &str) -> LedgerResult<u128> {
        let read_txn = self.db.begin_read()?;
        match wallets::get_by_owner_in_read(&read_txn, owner_user_id)? {
            Some(wallet) => entries::replay_in_read(&read_txn, &wallet.wallet_id, token),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "rEUR";

    fn temp_db() -> (LedgerDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn credit_creates_wallet_balance_and_entry() {
        let (db, _dir) = temp_db();
        let ledger = BalanceLedger::new(&db);

        let (balance, entry) = ledger.credit("user-1", TOKEN, 100, None, None, None).unwrap();
        assert_eq!(balance.balance, 100);
        assert_eq!(balance.pending_onchain, 0);
        assert_eq!(entry.kind, EntryKind::Credit);
        assert_eq!(entry.amount, 100);
        assert_eq!(entry.balance_after, 100);

        // Wallet came into existence as part of the same operation
        let snapshot = ledger.snapshot("user-1", TOKEN, 10).unwrap().unwrap();
        assert_eq!(snapshot.balance.balance, 100);
        assert_eq!(snapshot.entries.len(), 1);
    }

    #[test]
    fn credit_zero_is_rejected() {
        let (db, _dir) = temp_db();
        let ledger = BalanceLedger::new(&db);

        let result = ledger.credit("user-1", TOKEN, 0, None, None, None);
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn debit_checks_raw_balance() {
        let (db, _dir) = temp_db();
        let ledger = BalanceLedger::new(&db);

        ledger.credit("user-1", TOKEN, 100, None, None, None).unwrap();
        let (balance, entry) = ledger.debit("user-1", TOKEN, 40, None, None, None).unwrap();
        assert_eq!(balance.balance, 60);
        assert_eq!(entry.amount, -40);
        assert_eq!(entry.balance_after, 60);

        let result = ledger.debit("user-1", TOKEN, 100, None, None, None);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientFunds {
                requested: 100,
                available: 60
            })
        ));
    }

    #[test]
    fn failed_debit_leaves_no_entry() {
        let (db, _dir) = temp_db();
        let ledger = BalanceLedger::new(&db);

        ledger.credit("user-1", TOKEN, 50, None, None, None).unwrap();
        let _ = ledger.debit("user-1", TOKEN, 80, None, None, None);

        let snapshot = ledger.snapshot("user-1", TOKEN, 10).unwrap().unwrap();
        assert_eq!(snapshot.balance.balance, 50);
        assert_eq!(snapshot.entries.len(), 1, "Rolled-back debit must not log");
    }

    #[test]
    fn adjust_applies_signed_deltas() {
        let (db, _dir) = temp_db();
        let ledger = BalanceLedger::new(&db);

        ledger.credit("user-1", TOKEN, 100, None, None, None).unwrap();

        let (balance, entry) = ledger
            .adjust("user-1", TOKEN, -30, Some("audit-fix"), None, Some("admin-1"))
            .unwrap();
        assert_eq!(balance.balance, 70);
        assert_eq!(entry.kind, EntryKind::Adjustment);
        assert_eq!(entry.amount, -30);
        assert_eq!(entry.actor_user_id.as_deref(), Some("admin-1"));

        let (balance, _) = ledger.adjust("user-1", TOKEN, 5, None, None, None).unwrap();
        assert_eq!(balance.balance, 75);

        assert!(matches!(
            ledger.adjust("user-1", TOKEN, 0, None, None, None),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.adjust("user-1", TOKEN, -1_000, None, None, None),
            Err(LedgerError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn snapshot_unknown_user_is_none() {
        let (db, _dir) = temp_db();
        let ledger = BalanceLedger::new(&db);
        assert!(ledger.snapshot("nobody", TOKEN, 10).unwrap().is_none());
    }

    #[test]
    fn snapshot_defaults_untouched_token_to_zero() {
        let (db, _dir) = temp_db();
        let ledger = BalanceLedger::new(&db);
        ledger.credit("user-1", TOKEN, 100, None, None, None).unwrap();

        let snapshot = ledger.snapshot("user-1", "USDC", 10).unwrap().unwrap();
        assert_eq!(snapshot.balance.balance, 0);
        assert_eq!(snapshot.available, 0);
        assert!(snapshot.entries.is_empty());
    }

    #[test]
    fn snapshot_limits_entries_newest_first() {
        let (db, _dir) = temp_db();
        let ledger = BalanceLedger::new(&db);

        for amount in [10u128, 20, 30] {
            ledger.credit("user-1", TOKEN, amount, None, None, None).unwrap();
        }

        let snapshot = ledger.snapshot("user-1", TOKEN, 2).unwrap().unwrap();
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.entries[0].amount, 30);
        assert_eq!(snapshot.entries[1].amount, 20);
    }

    #[test]
    fn replay_matches_stored_balance() {
        let (db, _dir) = temp_db();
        let ledger = BalanceLedger::new(&db);

        ledger.credit("user-1", TOKEN, 100, None, None, None).unwrap();
        ledger.debit("user-1", TOKEN, 25, None, None, None).unwrap();
        ledger.adjust("user-1", TOKEN, 7, None, None, None).unwrap();
        let (balance, _) = ledger.debit("user-1", TOKEN, 2, None, None, None).unwrap();

        assert_eq!(ledger.replay("user-1", TOKEN).unwrap(), balance.balance);
        assert_eq!(ledger.replay("user-1", TOKEN).unwrap(), 80);
    }

    #[test]
    fn available_saturates_at_zero() {
        let mut balance = BalanceRecord::new("w1", TOKEN);
        balance.balance = 10;
        balance.pending_onchain = 8;
        balance.locked = 5;
        assert_eq!(balance.available(), 0);

        balance.locked = 0;
        assert_eq!(balance.available(), 2);
    }
}
