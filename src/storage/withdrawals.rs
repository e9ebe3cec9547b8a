// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Withdraw request state machine.
//!
//! Lifecycle: `pending → {approved, rejected}`, `approved → {processing,
//! rejected}`, `processing → {completed, rejected}`. `completed` and
//! `rejected` are terminal. Creation reserves the requested amount in the
//! balance's `pending_onchain`; rejection releases the reservation, completion
//! consumes it and appends the `payout` ledger entry. All of that happens in
//! one write transaction per operation, so a request can never disagree with
//! the balance it reserves against.

use std::fmt;

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::balances::{self, signed_delta};
use super::entries::{self, EntryKind, LedgerEntry};
use super::ledger_db::{self, LedgerDb, StoreError, WALLETS, WITHDRAW_QUEUE, WITHDRAW_REQUESTS};
use super::wallets::{self, WalletRecord};
use crate::error::{LedgerError, LedgerResult};

/// Withdrawal lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawStatus {
    /// Created, funds reserved, awaiting review.
    Pending,
    /// Cleared for settlement.
    Approved,
    /// Claimed by a settlement worker run.
    Processing,
    /// Settled on-chain. Terminal.
    Completed,
    /// Declined or failed, reservation released. Terminal.
    Rejected,
}

impl WithdrawStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Terminal statuses reject any further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

impl fmt::Display for WithdrawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted withdraw request record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    /// Unique request identifier (UUID)
    pub request_id: String,
    /// Wallet the reservation is held against
    pub wallet_id: String,
    /// Owner user identity (denormalized for per-user queries)
    pub owner_user_id: String,
    /// Token symbol
    pub token: String,
    /// Requested amount in base units
    pub amount: u128,
    /// Optional fee, mutable only while pending/approved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<u128>,
    /// On-chain destination address
    pub destination_address: String,
    /// Current status
    pub status: WithdrawStatus,
    /// Reviewer identity; the settlement worker writes its own id here on claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    /// On-chain transaction hash once settled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Free-form notes (user note at creation, diagnostics on rejection)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl WithdrawRequest {
    /// Construct a new pending request.
    pub fn new_pending(
        wallet_id: String,
        owner_user_id: String,
        token: String,
        amount: u128,
        destination_address: String,
        note: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            wallet_id,
            owner_user_id,
            token,
            amount,
            fee: None,
            destination_address,
            status: WithdrawStatus::Pending,
            reviewed_by: None,
            tx_hash: None,
            notes: note,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Execution queue item: a request joined with its owning wallet.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub request: WithdrawRequest,
    pub wallet: WalletRecord,
}

/// Repository owning the withdrawal state machine.
pub struct WithdrawManager<'a> {
    db: &'a LedgerDb,
}

impl<'a> WithdrawManager<'a> {
    /// Create a new WithdrawManager.
    pub fn new(db: &'a LedgerDb) -> Self {
        Self { db }
    }

    /// Create a withdrawal in `pending` and reserve the amount.
    ///
    /// An empty `destination` falls back to the wallet's default withdrawal
    /// address. No ledger entry is written here: no value has moved yet, the
    /// amount is only added to `pending_onchain`.
    pub fn create(
        &self,
        owner_user_id: &str,
        token: &str,
        amount: u128,
        destination: &str,
        note: Option<&str>,
    ) -> LedgerResult<WithdrawRequest> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "withdrawal amount must be positive".to_string(),
            ));
        }
        // Completion writes a signed payout delta later, so the amount must
        // fit the entry range already at reservation time.
        let _ = signed_delta(amount)?;

        let write_txn = self.db.begin_write()?;
        let wallet = wallets::ensure_in_txn(&write_txn, owner_user_id, None)?;

        let destination = if destination.is_empty() {
            wallet.default_withdraw_address.clone().unwrap_or_default()
        } else {
            destination.to_string()
        };
        if destination.is_empty() {
            return Err(LedgerError::InvalidAmount(
                "withdrawal requires a destination address".to_string(),
            ));
        }

        let mut balance = balances::load_or_default_in_txn(&write_txn, &wallet.wallet_id, token)?;
        let available = balance.available();
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                requested: amount,
                available,
            });
        }
        balance.pending_onchain = balance
            .pending_onchain
            .checked_add(amount)
            .ok_or_else(|| LedgerError::InvalidAmount("reservation overflows".to_string()))?;
        balance.updated_at = Utc::now();
        balances::store_in_txn(&write_txn, &balance)?;

        let request = WithdrawRequest::new_pending(
            wallet.wallet_id.clone(),
            owner_user_id.to_string(),
            token.to_string(),
            amount,
            destination,
            note.map(|n| n.to_string()),
        );
        insert_request_in_txn(&write_txn, &request)?;
        write_txn.commit()?;

        tracing::info!(
            request_id = %request.request_id,
            wallet_id = %request.wallet_id,
            token = %token,
            amount = %amount,
            "Created withdraw request"
        );
        Ok(request)
    }

    /// Look up a request by id.
    pub fn get(&self, request_id: &str) -> LedgerResult<Option<WithdrawRequest>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WITHDRAW_REQUESTS)?;
        match table.get(request_id)? {
            Some(row) => Ok(Some(ledger_db::decode_row(
                &format!("withdraw request {request_id}"),
                row.value(),
            )?)),
            None => Ok(None),
        }
    }

    /// Drive a request through the state machine.
    ///
    /// Re-issuing the current status is an idempotent no-op that changes
    /// nothing, checked before the terminal guard so retried finalizations
    /// stay safe. A terminal request rejects every other transition.
    pub fn update_status(
        &self,
        request_id: &str,
        new_status: WithdrawStatus,
        reviewer: Option<&str>,
        tx_hash: Option<&str>,
        notes: Option<&str>,
    ) -> LedgerResult<WithdrawRequest> {
        let write_txn = self.db.begin_write()?;

        let mut request = get_request_in_txn(&write_txn, request_id)?;

        if request.status == new_status {
            return Ok(request);
        }
        if request.status.is_terminal() {
            return Err(LedgerError::WithdrawRequestFinalized {
                request_id: request_id.to_string(),
                status: request.status,
            });
        }

        let old_status = request.status;
        request.status = new_status;
        if let Some(r) = reviewer {
            request.reviewed_by = Some(r.to_string());
        }
        if let Some(h) = tx_hash {
            request.tx_hash = Some(h.to_string());
        }
        if let Some(n) = notes {
            request.notes = Some(n.to_string());
        }
        request.updated_at = Utc::now();

        match new_status {
            WithdrawStatus::Rejected => release_reservation_in_txn(&write_txn, &request)?,
            WithdrawStatus::Completed => consume_reservation_in_txn(&write_txn, &request)?,
            _ => {}
        }

        store_request_in_txn(&write_txn, &request, Some(old_status))?;
        write_txn.commit()?;

        tracing::info!(
            request_id = %request_id,
            from = %old_status,
            to = %new_status,
            "Withdraw request status updated"
        );
        Ok(request)
    }

    /// Set or clear the fee. Only allowed while the request is still
    /// pending or approved.
    pub fn update_fee(
        &self,
        request_id: &str,
        fee: Option<u128>,
    ) -> LedgerResult<WithdrawRequest> {
        if fee == Some(0) {
            return Err(LedgerError::InvalidAmount(
                "fee must be positive".to_string(),
            ));
        }

        let write_txn = self.db.begin_write()?;
        let mut request = get_request_in_txn(&write_txn, request_id)?;

        if !matches!(
            request.status,
            WithdrawStatus::Pending | WithdrawStatus::Approved
        ) {
            return Err(LedgerError::WithdrawRequestFinalized {
                request_id: request_id.to_string(),
                status: request.status,
            });
        }

        request.fee = fee;
        request.updated_at = Utc::now();
        store_request_in_txn(&write_txn, &request, None)?;
        write_txn.commit()?;
        Ok(request)
    }

    /// All requests of one user, newest first.
    pub fn list_for_owner(&self, owner_user_id: &str) -> LedgerResult<Vec<WithdrawRequest>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WITHDRAW_REQUESTS)?;

        let mut requests = Vec::new();
        for item in table.range::<&str>(""..)? {
            let item = item?;
            let request: WithdrawRequest =
                ledger_db::decode_row(&format!("withdraw request {}", item.0.value()), item.1.value())?;
            if request.owner_user_id == owner_user_id {
                requests.push(request);
            }
        }

        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    /// Requests in the given statuses, oldest first, joined with their
    /// owning wallet. The settlement worker consumes this with `[Approved]`.
    pub fn execution_queue(
        &self,
        statuses: &[WithdrawStatus],
        limit: usize,
    ) -> LedgerResult<Vec<QueueItem>> {
        let read_txn = self.db.begin_read()?;
        let queue = read_txn.open_table(WITHDRAW_QUEUE)?;
        let requests = read_txn.open_table(WITHDRAW_REQUESTS)?;
        let wallets_table = read_txn.open_table(WALLETS)?;

        let mut items = Vec::new();
        for status in statuses {
            let prefix = ledger_db::queue_prefix(status.as_str());
            let end = ledger_db::queue_prefix_end(status.as_str());
            let mut found = 0usize;

            for item in queue.range(prefix.as_slice()..end.as_slice())? {
                let item = item?;
                let request_id = item.1.value().to_string();

                let request: WithdrawRequest = {
                    let row = requests.get(request_id.as_str())?.ok_or_else(|| {
                        StoreError::Corrupt(format!(
                            "withdraw_queue points at missing request {request_id}"
                        ))
                    })?;
                    ledger_db::decode_row(&format!("withdraw request {request_id}"), row.value())?
                };
                let wallet: WalletRecord = {
                    let row = wallets_table.get(request.wallet_id.as_str())?.ok_or_else(|| {
                        StoreError::Corrupt(format!(
                            "withdraw request {request_id} points at missing wallet {}",
                            request.wallet_id
                        ))
                    })?;
                    ledger_db::decode_row(&format!("wallet {}", request.wallet_id), row.value())?
                };

                items.push(QueueItem { request, wallet });
                found += 1;
                if found >= limit {
                    break;
                }
            }
        }

        // Merge multiple status scans back into one oldest-first sequence
        items.sort_by(|a, b| a.request.created_at.cmp(&b.request.created_at));
        items.truncate(limit);
        Ok(items)
    }

    /// Sum of non-rejected withdrawal amounts created at or after `since`.
    /// Aggregation only; rate limits are enforced by the calling layer.
    pub fn volume_since(
        &self,
        owner_user_id: &str,
        since: DateTime<Utc>,
    ) -> LedgerResult<u128> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WITHDRAW_REQUESTS)?;

        let mut total: u128 = 0;
        for item in table.range::<&str>(""..)? {
            let item = item?;
            let request: WithdrawRequest =
                ledger_db::decode_row(&format!("withdraw request {}", item.0.value()), item.1.value())?;
            if request.owner_user_id == owner_user_id
                && request.status != WithdrawStatus::Rejected
                && request.created_at >= since
            {
                total = total.saturating_add(request.amount);
            }
        }
        Ok(total)
    }
}

// =============================================================================
// In-transaction helpers
// =============================================================================

fn get_request_in_txn(
    write_txn: &redb::WriteTransaction,
    request_id: &str,
) -> LedgerResult<WithdrawRequest> {
    let table = write_txn.open_table(WITHDRAW_REQUESTS)?;
    let bytes = {
        let row = table
            .get(request_id)?
            .ok_or_else(|| LedgerError::WithdrawRequestNotFound(request_id.to_string()))?;
        row.value().to_vec()
    };
    Ok(ledger_db::decode_row(
        &format!("withdraw request {request_id}"),
        &bytes,
    )?)
}

/// Insert a fresh request row plus its queue index entry.
fn insert_request_in_txn(
    write_txn: &redb::WriteTransaction,
    request: &WithdrawRequest,
) -> LedgerResult<()> {
    let mut table = write_txn.open_table(WITHDRAW_REQUESTS)?;
    let json = serde_json::to_vec(request)?;
    table.insert(request.request_id.as_str(), json.as_slice())?;

    let mut queue = write_txn.open_table(WITHDRAW_QUEUE)?;
    let key = ledger_db::queue_key(
        request.status.as_str(),
        request.created_at.timestamp_millis(),
        &request.request_id,
    );
    queue.insert(key.as_slice(), request.request_id.as_str())?;
    Ok(())
}

/// Rewrite a request row; when the status changed, move its queue index
/// entry in the same transaction.
fn store_request_in_txn(
    write_txn: &redb::WriteTransaction,
    request: &WithdrawRequest,
    old_status: Option<WithdrawStatus>,
) -> LedgerResult<()> {
    let mut table = write_txn.open_table(WITHDRAW_REQUESTS)?;
    let json = serde_json::to_vec(request)?;
    table.insert(request.request_id.as_str(), json.as_slice())?;

    if let Some(old) = old_status {
        let mut queue = write_txn.open_table(WITHDRAW_QUEUE)?;
        let created_ms = request.created_at.timestamp_millis();
        let old_key = ledger_db::queue_key(old.as_str(), created_ms, &request.request_id);
        queue.remove(old_key.as_slice())?;
        let new_key =
            ledger_db::queue_key(request.status.as_str(), created_ms, &request.request_id);
        queue.insert(new_key.as_slice(), request.request_id.as_str())?;
    }
    Ok(())
}

/// Rejection path: give the reserved amount back, floored at zero.
/// No ledger entry; no value ever left the balance.
fn release_reservation_in_txn(
    write_txn: &redb::WriteTransaction,
    request: &WithdrawRequest,
) -> LedgerResult<()> {
    let mut balance =
        balances::load_or_default_in_txn(write_txn, &request.wallet_id, &request.token)?;
    if balance.pending_onchain < request.amount {
        tracing::warn!(
            request_id = %request.request_id,
            pending = %balance.pending_onchain,
            amount = %request.amount,
            "Reservation release hit the zero floor"
        );
    }
    balance.pending_onchain = balance.pending_onchain.saturating_sub(request.amount);
    balance.updated_at = Utc::now();
    balances::store_in_txn(write_txn, &balance)
}

/// Completion path: re-validate against the raw balance (a concurrent direct
/// debit may have drained it since reservation), deduct, release the
/// reservation and append the `payout` entry.
fn consume_reservation_in_txn(
    write_txn: &redb::WriteTransaction,
    request: &WithdrawRequest,
) -> LedgerResult<()> {
    let mut balance =
        balances::get_required_in_txn(write_txn, &request.wallet_id, &request.token)?;
    if balance.balance < request.amount {
        return Err(LedgerError::BalanceTooLow {
            request_id: request.request_id.clone(),
            requested: request.amount,
            balance: balance.balance,
        });
    }

    balance.balance -= request.amount;
    balance.pending_onchain = balance.pending_onchain.saturating_sub(request.amount);
    balance.updated_at = Utc::now();
    balances::store_in_txn(write_txn, &balance)?;

    let delta = signed_delta(request.amount)?;
    let seq = ledger_db::next_entry_seq(write_txn)?;
    let entry = LedgerEntry::new(
        seq,
        &request.wallet_id,
        &request.token,
        EntryKind::Payout,
        -delta,
        balance.balance,
        Some(&request.request_id),
        Some(json!({
            "tx_hash": request.tx_hash,
            "destination": request.destination_address,
        })),
        request.reviewed_by.as_deref(),
    );
    entries::append_in_txn(write_txn, &entry)
}

#[cfg(test)]
mod tests {
    use super::super::balances::BalanceLedger;
    use super::*;

    const TOKEN: &str = "rEUR";
    const DEST: &str = "0x2222222222222222222222222222222222222222";

    fn temp_db() -> (LedgerDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn funded(db: &LedgerDb, user: &str, amount: u128) {
        BalanceLedger::new(db)
            .credit(user, TOKEN, amount, None, None, None)
            .unwrap();
    }

    fn balance_of(db: &LedgerDb, user: &str) -> super::super::balances::BalanceRecord {
        BalanceLedger::new(db)
            .snapshot(user, TOKEN, 0)
            .unwrap()
            .unwrap()
            .balance
    }

    #[test]
    fn create_reserves_funds() {
        let (db, _dir) = temp_db();
        funded(&db, "user-1", 100);

        let manager = WithdrawManager::new(&db);
        let request = manager
            .create("user-1", TOKEN, 40, DEST, Some("rent"))
            .unwrap();

        assert_eq!(request.status, WithdrawStatus::Pending);
        assert_eq!(request.amount, 40);
        assert_eq!(request.destination_address, DEST);
        assert_eq!(request.notes.as_deref(), Some("rent"));

        let balance = balance_of(&db, "user-1");
        assert_eq!(balance.balance, 100);
        assert_eq!(balance.pending_onchain, 40);
        assert_eq!(balance.available(), 60);
    }

    #[test]
    fn create_rejects_zero_and_missing_destination() {
        let (db, _dir) = temp_db();
        funded(&db, "user-1", 100);
        let manager = WithdrawManager::new(&db);

        assert!(matches!(
            manager.create("user-1", TOKEN, 0, DEST, None),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            manager.create("user-1", TOKEN, 10, "", None),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn create_falls_back_to_default_destination() {
        let (db, _dir) = temp_db();
        funded(&db, "user-1", 100);
        super::super::wallets::WalletDirectory::new(&db)
            .set_default_destination("user-1", DEST)
            .unwrap();

        let request = WithdrawManager::new(&db)
            .create("user-1", TOKEN, 10, "", None)
            .unwrap();
        assert_eq!(request.destination_address, DEST);
    }

    #[test]
    fn create_checks_available_not_raw_balance() {
        let (db, _dir) = temp_db();
        funded(&db, "user-1", 60);
        let manager = WithdrawManager::new(&db);

        manager.create("user-1", TOKEN, 40, DEST, None).unwrap();

        // balance=60, reservation=40, so only 20 is available
        let result = manager.create("user-1", TOKEN, 30, DEST, None);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientFunds {
                requested: 30,
                available: 20
            })
        ));

        // The failed attempt must not have touched the reservation
        assert_eq!(balance_of(&db, "user-1").pending_onchain, 40);
    }

    #[test]
    fn complete_consumes_reservation_and_logs_payout() {
        let (db, _dir) = temp_db();
        funded(&db, "user-1", 100);
        let manager = WithdrawManager::new(&db);

        let request = manager.create("user-1", TOKEN, 40, DEST, None).unwrap();
        manager
            .update_status(&request.request_id, WithdrawStatus::Approved, Some("admin-1"), None, None)
            .unwrap();
        let completed = manager
            .update_status(
                &request.request_id,
                WithdrawStatus::Completed,
                None,
                Some("0xabc"),
                None,
            )
            .unwrap();

        assert_eq!(completed.status, WithdrawStatus::Completed);
        assert_eq!(completed.tx_hash.as_deref(), Some("0xabc"));
        assert_eq!(completed.reviewed_by.as_deref(), Some("admin-1"));

        let balance = balance_of(&db, "user-1");
        assert_eq!(balance.balance, 60);
        assert_eq!(balance.pending_onchain, 0);

        let snapshot = BalanceLedger::new(&db)
            .snapshot("user-1", TOKEN, 10)
            .unwrap()
            .unwrap();
        let payout = &snapshot.entries[0];
        assert_eq!(payout.kind, EntryKind::Payout);
        assert_eq!(payout.amount, -40);
        assert_eq!(payout.balance_after, 60);
        assert_eq!(payout.reference.as_deref(), Some(request.request_id.as_str()));
    }

    #[test]
    fn reject_releases_reservation_without_entry() {
        let (db, _dir) = temp_db();
        funded(&db, "user-1", 100);
        let manager = WithdrawManager::new(&db);

        let request = manager.create("user-1", TOKEN, 40, DEST, None).unwrap();
        manager
            .update_status(
                &request.request_id,
                WithdrawStatus::Rejected,
                Some("admin-1"),
                None,
                Some("kyc failed"),
            )
            .unwrap();

        let balance = balance_of(&db, "user-1");
        assert_eq!(balance.balance, 100);
        assert_eq!(balance.pending_onchain, 0);

        let snapshot = BalanceLedger::new(&db)
            .snapshot("user-1", TOKEN, 10)
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.entries.len(), 1, "Only the funding credit remains");
    }

    #[test]
    fn terminal_requests_are_frozen() {
        let (db, _dir) = temp_db();
        funded(&db, "user-1", 100);
        let manager = WithdrawManager::new(&db);

        let request = manager.create("user-1", TOKEN, 40, DEST, None).unwrap();
        manager
            .update_status(&request.request_id, WithdrawStatus::Approved, None, None, None)
            .unwrap();
        manager
            .update_status(&request.request_id, WithdrawStatus::Completed, None, Some("0xabc"), None)
            .unwrap();

        let result = manager.update_status(
            &request.request_id,
            WithdrawStatus::Processing,
            Some("worker"),
            None,
            None,
        );
        assert!(matches!(
            result,
            Err(LedgerError::WithdrawRequestFinalized {
                status: WithdrawStatus::Completed,
                ..
            })
        ));

        // Record unchanged by the rejected transition
        let stored = manager.get(&request.request_id).unwrap().unwrap();
        assert_eq!(stored.status, WithdrawStatus::Completed);
        assert_eq!(stored.tx_hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn repeated_status_is_idempotent() {
        let (db, _dir) = temp_db();
        funded(&db, "user-1", 100);
        let manager = WithdrawManager::new(&db);

        let request = manager.create("user-1", TOKEN, 40, DEST, None).unwrap();
        let first = manager
            .update_status(&request.request_id, WithdrawStatus::Approved, Some("admin-1"), None, None)
            .unwrap();

        // Same status again, different reviewer: nothing may change
        let second = manager
            .update_status(&request.request_id, WithdrawStatus::Approved, Some("admin-2"), None, None)
            .unwrap();
        assert_eq!(second.reviewed_by.as_deref(), Some("admin-1"));
        assert_eq!(second.updated_at, first.updated_at);

        // Re-rejecting an already-rejected request must not double-release
        manager
            .update_status(&request.request_id, WithdrawStatus::Rejected, None, None, None)
            .unwrap();
        assert_eq!(balance_of(&db, "user-1").pending_onchain, 0);
        manager
            .update_status(&request.request_id, WithdrawStatus::Rejected, None, None, None)
            .unwrap();
        assert_eq!(balance_of(&db, "user-1").pending_onchain, 0);
        assert_eq!(balance_of(&db, "user-1").balance, 100);
    }

    #[test]
    fn complete_revalidates_raw_balance() {
        let (db, _dir) = temp_db();
        funded(&db, "user-1", 100);
        let manager = WithdrawManager::new(&db);
        let ledger = BalanceLedger::new(&db);

        let request = manager.create("user-1", TOKEN, 80, DEST, None).unwrap();
        manager
            .update_status(&request.request_id, WithdrawStatus::Approved, None, None, None)
            .unwrap();

        // A direct debit since reservation drained the raw balance
        ledger.debit("user-1", TOKEN, 50, None, None, None).unwrap();

        let result = manager.update_status(
            &request.request_id,
            WithdrawStatus::Completed,
            None,
            Some("0xabc"),
            None,
        );
        assert!(matches!(
            result,
            Err(LedgerError::BalanceTooLow {
                requested: 80,
                balance: 50,
                ..
            })
        ));

        // Whole transition rolled back: request still approved, reservation held
        let stored = manager.get(&request.request_id).unwrap().unwrap();
        assert_eq!(stored.status, WithdrawStatus::Approved);
        assert!(stored.tx_hash.is_none());
        let balance = balance_of(&db, "user-1");
        assert_eq!(balance.balance, 50);
        assert_eq!(balance.pending_onchain, 80);
    }

    #[test]
    fn fee_mutable_only_while_pending_or_approved() {
        let (db, _dir) = temp_db();
        funded(&db, "user-1", 100);
        let manager = WithdrawManager::new(&db);

        let request = manager.create("user-1", TOKEN, 40, DEST, None).unwrap();

        let updated = manager.update_fee(&request.request_id, Some(2)).unwrap();
        assert_eq!(updated.fee, Some(2));

        assert!(matches!(
            manager.update_fee(&request.request_id, Some(0)),
            Err(LedgerError::InvalidAmount(_))
        ));

        let cleared = manager.update_fee(&request.request_id, None).unwrap();
        assert!(cleared.fee.is_none());

        manager
            .update_status(&request.request_id, WithdrawStatus::Approved, None, None, None)
            .unwrap();
        manager.update_fee(&request.request_id, Some(3)).unwrap();

        manager
            .update_status(&request.request_id, WithdrawStatus::Processing, Some("worker"), None, None)
            .unwrap();
        assert!(matches!(
            manager.update_fee(&request.request_id, Some(4)),
            Err(LedgerError::WithdrawRequestFinalized { .. })
        ));
    }

    #[test]
    fn unknown_request_id_fails() {
        let (db, _dir) = temp_db();
        let manager = WithdrawManager::new(&db);

        assert!(manager.get("nope").unwrap().is_none());
        assert!(matches!(
            manager.update_status("nope", WithdrawStatus::Approved, None, None, None),
            Err(LedgerError::WithdrawRequestNotFound(_))
        ));
        assert!(matches!(
            manager.update_fee("nope", Some(1)),
            Err(LedgerError::WithdrawRequestNotFound(_))
        ));
    }

    #[test]
    fn execution_queue_is_oldest_first_and_joined() {
        let (db, _dir) = temp_db();
        funded(&db, "user-1", 100);
        let manager = WithdrawManager::new(&db);

        let mut ids = Vec::new();
        for amount in [10u128, 20, 30] {
            let request = manager.create("user-1", TOKEN, amount, DEST, None).unwrap();
            manager
                .update_status(&request.request_id, WithdrawStatus::Approved, None, None, None)
                .unwrap();
            ids.push(request.request_id);
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let queue = manager
            .execution_queue(&[WithdrawStatus::Approved], 10)
            .unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(queue[0].request.request_id, ids[0]);
        assert_eq!(queue[2].request.request_id, ids[2]);
        assert_eq!(queue[0].wallet.owner_user_id, "user-1");

        let limited = manager
            .execution_queue(&[WithdrawStatus::Approved], 1)
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].request.request_id, ids[0]);

        // Claimed requests leave the approved queue
        manager
            .update_status(&ids[0], WithdrawStatus::Processing, Some("worker"), None, None)
            .unwrap();
        let remaining = manager
            .execution_queue(&[WithdrawStatus::Approved], 10)
            .unwrap();
        assert_eq!(remaining.len(), 2);
        let processing = manager
            .execution_queue(&[WithdrawStatus::Processing], 10)
            .unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].request.reviewed_by.as_deref(), Some("worker"));
    }

    #[test]
    fn volume_sums_non_rejected_since() {
        let (db, _dir) = temp_db();
        funded(&db, "user-1", 200);
        funded(&db, "user-2", 50);
        let manager = WithdrawManager::new(&db);

        let a = manager.create("user-1", TOKEN, 40, DEST, None).unwrap();
        let b = manager.create("user-1", TOKEN, 30, DEST, None).unwrap();
        manager.create("user-2", TOKEN, 20, DEST, None).unwrap();

        // Completed requests still count toward volume, rejected do not
        manager
            .update_status(&a.request_id, WithdrawStatus::Approved, None, None, None)
            .unwrap();
        manager
            .update_status(&a.request_id, WithdrawStatus::Completed, None, Some("0x1"), None)
            .unwrap();
        manager
            .update_status(&b.request_id, WithdrawStatus::Rejected, None, None, None)
            .unwrap();

        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        assert_eq!(manager.volume_since("user-1", epoch).unwrap(), 40);
        assert_eq!(manager.volume_since("user-2", epoch).unwrap(), 20);

        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(manager.volume_since("user-1", future).unwrap(), 0);
    }
}
