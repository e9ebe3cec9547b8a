// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet directory: resolves opaque user identities to custodial wallet
//! records.
//!
//! One wallet per user identity, created lazily on the first balance or
//! withdrawal operation that references the identity. The directory also
//! keeps the last observed external address and the default withdrawal
//! destination used when a request omits one.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use super::ledger_db::{self, LedgerDb, StoreError, WALLETS, WALLET_OWNERS};
use crate::error::LedgerResult;

/// Wallet record stored in the wallets table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Unique wallet identifier (UUID)
    pub wallet_id: String,
    /// External user identity that owns this wallet
    pub owner_user_id: String,
    /// Last observed external address for this user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_address: Option<String>,
    /// Destination used when a withdrawal omits one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_withdraw_address: Option<String>,
    /// When the wallet was created
    pub created_at: DateTime<Utc>,
    /// When the wallet was last modified
    pub updated_at: DateTime<Utc>,
}

impl WalletRecord {
    /// Build a fresh wallet for a user identity.
    pub fn new(owner_user_id: &str, observed_address: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            wallet_id: uuid::Uuid::new_v4().to_string(),
            owner_user_id: owner_user_id.to_string(),
            observed_address: observed_address.map(|a| a.to_string()),
            default_withdraw_address: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Get-or-create a wallet inside an already-open write transaction.
///
/// Callers that mutate balances in the same transaction (credit, withdrawal
/// creation) go through this so the wallet row commits or rolls back together
/// with the balance mutation.
pub(crate) fn ensure_in_txn(
    write_txn: &redb::WriteTransaction,
    owner_user_id: &str,
    observed_address: Option<&str>,
) -> LedgerResult<WalletRecord> {
    let mut wallets = write_txn.open_table(WALLETS)?;
    let mut owners = write_txn.open_table(WALLET_OWNERS)?;

    let existing_id = {
        let guard = owners.get(owner_user_id)?;
        guard.map(|v| v.value().to_string())
    };

    if let Some(wallet_id) = existing_id {
        let bytes = {
            let row = wallets.get(wallet_id.as_str())?.ok_or_else(|| {
                StoreError::Corrupt(format!("wallet_owners points at missing wallet {wallet_id}"))
            })?;
            row.value().to_vec()
        };
        let mut wallet: WalletRecord =
            ledger_db::decode_row(&format!("wallet {wallet_id}"), &bytes)?;

        // Refresh the observed address when a different non-empty one is presented
        if let Some(addr) = observed_address {
            if !addr.is_empty() && wallet.observed_address.as_deref() != Some(addr) {
                wallet.observed_address = Some(addr.to_string());
                wallet.updated_at = Utc::now();
                let json = serde_json::to_vec(&wallet)?;
                wallets.insert(wallet_id.as_str(), json.as_slice())?;
            }
        }
        return Ok(wallet);
    }

    let wallet = WalletRecord::new(owner_user_id, observed_address.filter(|a| !a.is_empty()));
    let json = serde_json::to_vec(&wallet)?;
    wallets.insert(wallet.wallet_id.as_str(), json.as_slice())?;
    owners.insert(owner_user_id, wallet.wallet_id.as_str())?;
    Ok(wallet)
}

/// Look up a wallet by owner inside an already-open read transaction.
pub(crate) fn get_by_owner_in_read(
    read_txn: &redb::ReadTransaction,
    owner_user_id: &str,
) -> LedgerResult<Option<WalletRecord>> {
    let owners = read_txn.open_table(WALLET_OWNERS)?;
    let wallet_id = match owners.get(owner_user_id)? {
        Some(v) => v.value().to_string(),
        None => return Ok(None),
    };

    let wallets = read_txn.open_table(WALLETS)?;
    match wallets.get(wallet_id.as_str())? {
        Some(row) => {
            let wallet = ledger_db::decode_row(&format!("wallet {wallet_id}"), row.value())?;
            Ok(Some(wallet))
        }
        None => Err(StoreError::Corrupt(format!(
            "wallet_owners points at missing wallet {wallet_id}"
        ))
        .into()),
    }
}

/// Repository for wallet records.
pub struct WalletDirectory<'a> {
    db: &'a LedgerDb,
}

impl<'a> WalletDirectory<'a> {
    /// Create a new WalletDirectory.
    pub fn new(db: &'a LedgerDb) -> Self {
        Self { db }
    }

    /// Get the wallet for a user identity, creating it on first use.
    pub fn ensure(
        &self,
        owner_user_id: &str,
        observed_address: Option<&str>,
    ) -> LedgerResult<WalletRecord> {
        let write_txn = self.db.begin_write()?;
        let wallet = ensure_in_txn(&write_txn, owner_user_id, observed_address)?;
        write_txn.commit()?;
        Ok(wallet)
    }

    /// Look up a wallet by its id.
    pub fn get(&self, wallet_id: &str) -> LedgerResult<Option<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        let wallets = read_txn.open_table(WALLETS)?;
        match wallets.get(wallet_id)? {
            Some(row) => {
                let wallet = ledger_db::decode_row(&format!("wallet {wallet_id}"), row.value())?;
                Ok(Some(wallet))
            }
            None => Ok(None),
        }
    }

    /// Look up a wallet by its owning user identity.
    pub fn get_by_owner(&self, owner_user_id: &str) -> LedgerResult<Option<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        get_by_owner_in_read(&read_txn, owner_user_id)
    }

    /// Set (or clear, with an empty string) the default withdrawal
    /// destination, creating the wallet if the user has none yet.
    pub fn set_default_destination(
        &self,
        owner_user_id: &str,
        address: &str,
    ) -> LedgerResult<WalletRecord> {
        let write_txn = self.db.begin_write()?;
        let mut wallet = ensure_in_txn(&write_txn, owner_user_id, None)?;
        {
            let mut wallets = write_txn.open_table(WALLETS)?;
            wallet.default_withdraw_address = if address.is_empty() {
                None
            } else {
                Some(address.to_string())
            };
            wallet.updated_at = Utc::now();
            let json = serde_json::to_vec(&wallet)?;
            wallets.insert(wallet.wallet_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (LedgerDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn ensure_creates_one_wallet_per_owner() {
        let (db, _dir) = temp_db();
        let dir = WalletDirectory::new(&db);

        let first = dir.ensure("user-1", None).unwrap();
        let second = dir.ensure("user-1", None).unwrap();
        assert_eq!(first.wallet_id, second.wallet_id);

        let other = dir.ensure("user-2", None).unwrap();
        assert_ne!(first.wallet_id, other.wallet_id);
    }

    #[test]
    fn ensure_refreshes_observed_address() {
        let (db, _dir) = temp_db();
        let dir = WalletDirectory::new(&db);

        let created = dir.ensure("user-1", Some("0xaaa")).unwrap();
        assert_eq!(created.observed_address.as_deref(), Some("0xaaa"));

        let refreshed = dir.ensure("user-1", Some("0xbbb")).unwrap();
        assert_eq!(refreshed.wallet_id, created.wallet_id);
        assert_eq!(refreshed.observed_address.as_deref(), Some("0xbbb"));

        // Empty presented address never clobbers the stored one
        let kept = dir.ensure("user-1", Some("")).unwrap();
        assert_eq!(kept.observed_address.as_deref(), Some("0xbbb"));
    }

    #[test]
    fn get_unknown_returns_none() {
        let (db, _dir) = temp_db();
        let dir = WalletDirectory::new(&db);

        assert!(dir.get("no-such-wallet").unwrap().is_none());
        assert!(dir.get_by_owner("no-such-user").unwrap().is_none());
    }

    #[test]
    fn default_destination_set_and_clear() {
        let (db, _dir) = temp_db();
        let dir = WalletDirectory::new(&db);

        let set = dir.set_default_destination("user-1", "0xdead").unwrap();
        assert_eq!(set.default_withdraw_address.as_deref(), Some("0xdead"));

        let loaded = dir.get_by_owner("user-1").unwrap().unwrap();
        assert_eq!(loaded.default_withdraw_address.as_deref(), Some("0xdead"));

        let cleared = dir.set_default_destination("user-1", "").unwrap();
        assert!(cleared.default_withdraw_address.is_none());
    }
}
