// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `wallets`: wallet_id → serialized WalletRecord
//! - `wallet_owners`: owner_user_id → wallet_id
//! - `balances`: composite key (wallet_id|token) → serialized BalanceRecord
//! - `ledger_entries`: composite key (wallet_id|token|!seq) → serialized LedgerEntry
//! - `withdraw_requests`: request_id → serialized WithdrawRequest
//! - `withdraw_queue`: composite key (status|created_ms|request_id) → request_id
//! - `counters`: name → next u64 (monotonic entry sequence)
//!
//! Every logical operation runs inside a single write transaction; redb
//! serializes writers, so read-modify-write sequences observe a stable row
//! and an error return before `commit()` rolls the whole operation back.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary wallet table: wallet_id → serialized WalletRecord (JSON bytes).
pub(crate) const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");

/// Owner index: owner_user_id → wallet_id (one custodial wallet per user).
pub(crate) const WALLET_OWNERS: TableDefinition<&str, &str> = TableDefinition::new("wallet_owners");

/// Balance table: `wallet_id|token` → serialized BalanceRecord (JSON bytes).
pub(crate) const BALANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("balances");

/// Append-only ledger: composite key → serialized LedgerEntry (JSON bytes).
/// Key format: `wallet_id|token|!seq_be` for newest-first range scans.
pub(crate) const LEDGER_ENTRIES: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("ledger_entries");

/// Withdraw request table: request_id → serialized WithdrawRequest (JSON bytes).
pub(crate) const WITHDRAW_REQUESTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("withdraw_requests");

/// Status queue index: composite key → request_id.
/// Key format: `status|created_ms_be|request_id` for oldest-first queue scans.
pub(crate) const WITHDRAW_QUEUE: TableDefinition<&[u8], &str> =
    TableDefinition::new("withdraw_queue");

/// Counter table: name → next value (e.g. "entry_seq").
pub(crate) const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

const ENTRY_SEQ_COUNTER: &str = "entry_seq";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Key Helpers
// =============================================================================

/// Build the composite key for the balances table.
pub(crate) fn balance_key(wallet_id: &str, token: &str) -> String {
    format!("{wallet_id}|{token}")
}

/// Build a composite key for the ledger_entries table.
///
/// Format: `wallet_id | token | inverted_seq_be_bytes`
///
/// The inverted sequence ensures newest-first ordering when scanning forward.
pub(crate) fn entry_key(wallet_id: &str, token: &str, seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(wallet_id.len() + 1 + token.len() + 1 + 8);
    key.extend_from_slice(wallet_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(token.as_bytes());
    key.push(b'|');
    // Invert sequence for descending order (newest first)
    key.extend_from_slice(&(!seq).to_be_bytes());
    key
}

/// Build a prefix key for range scanning all entries of a (wallet, token) pair.
pub(crate) fn entry_prefix(wallet_id: &str, token: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(wallet_id.len() + 1 + token.len() + 1);
    prefix.extend_from_slice(wallet_id.as_bytes());
    prefix.push(b'|');
    prefix.extend_from_slice(token.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Build the upper bound for an entry range scan.
pub(crate) fn entry_prefix_end(wallet_id: &str, token: &str) -> Vec<u8> {
    let mut end = entry_prefix(wallet_id, token);
    // Append enough 0xFF bytes to be past any valid key with this prefix
    end.extend_from_slice(&[0xFF; 20]);
    end
}

/// Build a composite key for the withdraw_queue table.
///
/// Format: `status | created_ms_be_bytes | request_id`
///
/// Creation time is NOT inverted: forward scans yield oldest-first, which is
/// the order the settlement worker drains the queue in.
pub(crate) fn queue_key(status: &str, created_ms: i64, request_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(status.len() + 1 + 8 + 1 + request_id.len());
    key.extend_from_slice(status.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(created_ms as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(request_id.as_bytes());
    key
}

/// Build a prefix key for range scanning all queued requests in one status.
pub(crate) fn queue_prefix(status: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(status.len() + 1);
    prefix.extend_from_slice(status.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Build the upper bound for a queue range scan.
pub(crate) fn queue_prefix_end(status: &str) -> Vec<u8> {
    let mut end = queue_prefix(status);
    end.extend_from_slice(&[0xFF; 20]);
    end
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Deserialize a stored row, mapping failures to [`StoreError::Corrupt`]
/// with enough context to locate the bad row.
pub(crate) fn decode_row<T: serde::de::DeserializeOwned>(
    context: &str,
    bytes: &[u8],
) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt(format!("{context}: {e}")))
}

// =============================================================================
// LedgerDb
// =============================================================================

/// Embedded ACID ledger database.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(WALLET_OWNERS)?;
            let _ = write_txn.open_table(BALANCES)?;
            let _ = write_txn.open_table(LEDGER_ENTRIES)?;
            let _ = write_txn.open_table(WITHDRAW_REQUESTS)?;
            let _ = write_txn.open_table(WITHDRAW_QUEUE)?;
            let _ = write_txn.open_table(COUNTERS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a write transaction. redb allows one writer at a time; this call
    /// blocks until any in-flight writer commits or aborts.
    pub(crate) fn begin_write(&self) -> StoreResult<redb::WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Begin a read transaction (MVCC snapshot, never blocks writers).
    pub(crate) fn begin_read(&self) -> StoreResult<redb::ReadTransaction> {
        Ok(self.db.begin_read()?)
    }
}

/// Claim the next ledger entry sequence number inside the caller's write
/// transaction. Rolls back with the caller, so aborted operations leave no
/// gap observable in committed entries' relative order.
pub(crate) fn next_entry_seq(write_txn: &redb::WriteTransaction) -> StoreResult<u64> {
    let mut table = write_txn.open_table(COUNTERS)?;
    let current = {
        let existing = table.get(ENTRY_SEQ_COUNTER)?;
        existing.map(|v| v.value()).unwrap_or(0)
    };
    let next = current + 1;
    table.insert(ENTRY_SEQ_COUNTER, next)?;
    Ok(next)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (LedgerDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn open_precreates_tables() {
        let (db, _dir) = temp_db();
        // All tables must be readable immediately after open
        let read_txn = db.begin_read().unwrap();
        assert!(read_txn.open_table(WALLETS).is_ok());
        assert!(read_txn.open_table(WALLET_OWNERS).is_ok());
        assert!(read_txn.open_table(BALANCES).is_ok());
        assert!(read_txn.open_table(LEDGER_ENTRIES).is_ok());
        assert!(read_txn.open_table(WITHDRAW_REQUESTS).is_ok());
        assert!(read_txn.open_table(WITHDRAW_QUEUE).is_ok());
        assert!(read_txn.open_table(COUNTERS).is_ok());
    }

    #[test]
    fn entry_key_ordering() {
        // Higher sequence numbers should produce smaller composite keys (descending)
        let key_old = entry_key("w1", "rEUR", 10);
        let key_new = entry_key("w1", "rEUR", 20);
        assert!(key_new < key_old, "Newer entries should sort first");

        let prefix = entry_prefix("w1", "rEUR");
        let end = entry_prefix_end("w1", "rEUR");
        assert!(key_old > prefix && key_old < end);
        assert!(key_new > prefix && key_new < end);
    }

    #[test]
    fn queue_key_ordering() {
        // Earlier creation should sort first within a status (ascending)
        let key_old = queue_key("approved", 1_000, "req-a");
        let key_new = queue_key("approved", 2_000, "req-b");
        assert!(key_old < key_new, "Older requests should sort first");

        // Different statuses never share a prefix range
        let other = queue_key("pending", 1_500, "req-c");
        let prefix = queue_prefix("approved");
        let end = queue_prefix_end("approved");
        assert!(key_old > prefix && key_old < end);
        assert!(!(other > prefix && other < end));
    }

    #[test]
    fn entry_seq_is_monotonic_across_transactions() {
        let (db, _dir) = temp_db();

        let txn = db.begin_write().unwrap();
        let first = next_entry_seq(&txn).unwrap();
        txn.commit().unwrap();

        let txn = db.begin_write().unwrap();
        let second = next_entry_seq(&txn).unwrap();
        txn.commit().unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn aborted_transaction_rolls_back_counter() {
        let (db, _dir) = temp_db();

        let txn = db.begin_write().unwrap();
        let _ = next_entry_seq(&txn).unwrap();
        drop(txn); // abort without commit

        let txn = db.begin_write().unwrap();
        let seq = next_entry_seq(&txn).unwrap();
        txn.commit().unwrap();
        assert_eq!(seq, 1, "Aborted claim must not consume the sequence");
    }

    #[test]
    fn decode_row_maps_garbage_to_corrupt() {
        let result: StoreResult<serde_json::Value> = decode_row("balance w1|rEUR", b"not json");
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }
}
