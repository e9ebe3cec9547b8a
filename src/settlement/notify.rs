// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settlement outcome notifications.
//!
//! Every terminal transition the worker drives is reported through a
//! [`SettlementNotifier`]. Delivery is best-effort: the worker logs and drops
//! failed notifications, it never blocks or unwinds the ledger transition
//! the event describes.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::storage::WithdrawStatus;

/// Notification delivery failure.
#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Terminal settlement outcome for one withdrawal request.
#[derive(Debug, Clone)]
pub struct SettlementEvent {
    pub request_id: String,
    pub status: WithdrawStatus,
    pub token: String,
    /// Amount in the token's smallest unit
    pub amount: u128,
    pub destination: String,
    /// On-chain transaction hash, absent for rejections
    pub tx_hash: Option<String>,
}

/// Sink for settlement outcomes.
#[async_trait]
pub trait SettlementNotifier: Send + Sync {
    async fn notify(&self, event: &SettlementEvent) -> Result<(), NotifyError>;
}

/// Notifier that emits a structured log line per outcome.
///
/// Downstream delivery (chat, email) is handled by external collaborators
/// that consume the log stream.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl SettlementNotifier for LogNotifier {
    async fn notify(&self, event: &SettlementEvent) -> Result<(), NotifyError> {
        info!(
            request_id = %event.request_id,
            status = %event.status,
            token = %event.token,
            amount = event.amount,
            destination = %event.destination,
            tx_hash = event.tx_hash.as_deref().unwrap_or("-"),
            "Withdrawal settled"
        );
        Ok(())
    }
}
