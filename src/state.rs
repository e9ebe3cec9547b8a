// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state.
//!
//! The composition root builds one [`AppState`] at startup and hands clones
//! to every component. Nothing reaches the database or the administrative
//! gate except through this type.

use std::sync::Arc;

use crate::admin::AdminGate;
use crate::error::LedgerResult;
use crate::storage::{BalanceLedger, LedgerDb, WalletDirectory, WithdrawManager};

#[derive(Clone)]
pub struct AppState {
    db: Arc<LedgerDb>,
    admin: Arc<AdminGate>,
}

impl AppState {
    pub fn new(db: LedgerDb, admin: AdminGate) -> Self {
        Self {
            db: Arc::new(db),
            admin: Arc::new(admin),
        }
    }

    /// Shared handle on the underlying database, for long-lived workers.
    pub fn db(&self) -> Arc<LedgerDb> {
        self.db.clone()
    }

    /// Wallet directory backed by this state's database.
    pub fn wallets(&self) -> WalletDirectory<'_> {
        WalletDirectory::new(&self.db)
    }

    /// Balance ledger backed by this state's database.
    pub fn ledger(&self) -> BalanceLedger<'_> {
        BalanceLedger::new(&self.db)
    }

    /// Withdrawal manager without an authorization check. End-user surfaces
    /// reach `create` and the read operations through this handle.
    pub fn withdrawals(&self) -> WithdrawManager<'_> {
        WithdrawManager::new(&self.db)
    }

    /// Withdrawal manager for administrative mutations.
    ///
    /// Status and fee transitions must come through here so the shared-secret
    /// check runs before any business logic.
    pub fn admin_withdrawals(&self, presented: Option<&str>) -> LedgerResult<WithdrawManager<'_>> {
        self.admin.authorize(presented)?;
        Ok(self.withdrawals())
    }
}
