// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Settlement Worker
//!
//! Background task that drains approved withdrawal requests into on-chain
//! token transfers.
//!
//! ## Strategy
//!
//! Each sweep:
//! 1. Reads the oldest approved requests from the execution queue (up to the
//!    configured batch size).
//! 2. Claims each request by moving it to `processing` under the worker's
//!    reviewer id. A claim that fails (for example an admin rejected the
//!    request since the queue was read) is logged and skipped.
//! 3. Runs the transfer backend. Success completes the request with the
//!    returned transaction hash, deducting the balance and writing the payout
//!    ledger entry. Any transfer error rejects the request with a diagnostic
//!    note, which releases the reservation.
//! 4. Reports each terminal outcome to the notifier, best-effort.
//!
//! A ledger failure after the transfer already confirmed (for example the
//! raw balance was debited concurrently) leaves the request in `processing`
//! with the reservation held: value has left the treasury, so releasing the
//! reservation automatically would double-spend. Those requests are surfaced
//! as errors for operator review.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown when
//! running in interval mode.

pub mod notify;
pub mod transfer;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::LedgerResult;
use crate::storage::{LedgerDb, WithdrawManager, WithdrawRequest, WithdrawStatus};

pub use notify::{LogNotifier, NotifyError, SettlementEvent, SettlementNotifier};
pub use transfer::{DryRunBackend, Erc20Backend, TransferBackend};

/// Default interval between sweeps in loop mode.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Counters from one settlement sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Requests moved `approved -> processing` this sweep
    pub claimed: usize,
    /// Requests settled on-chain and completed
    pub completed: usize,
    /// Requests rejected after a failed transfer
    pub rejected: usize,
    /// Claim failures and ledger failures that left a request behind
    pub errors: usize,
}

/// Background worker that settles approved withdrawals.
pub struct SettlementWorker<T, N> {
    db: Arc<LedgerDb>,
    backend: T,
    notifier: N,
    /// Recorded as `reviewed_by` on every transition this worker drives
    worker_id: String,
    batch_size: usize,
    poll_interval: Duration,
}

impl<T: TransferBackend, N: SettlementNotifier> SettlementWorker<T, N> {
    /// Create a new worker over the given ledger database.
    pub fn new(db: Arc<LedgerDb>, backend: T, notifier: N, worker_id: String, batch_size: usize) -> Self {
        Self {
            db,
            backend,
            notifier,
            worker_id,
            batch_size,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the interval between sweeps in loop mode.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Execute one settlement sweep over approved withdrawals.
    pub async fn run_once(&self) -> LedgerResult<SweepSummary> {
        let withdrawals = WithdrawManager::new(&self.db);
        let queue = withdrawals.execution_queue(&[WithdrawStatus::Approved], self.batch_size)?;

        let mut summary = SweepSummary::default();
        if queue.is_empty() {
            debug!("No approved withdrawals to settle");
            return Ok(summary);
        }

        info!(
            count = queue.len(),
            worker_id = %self.worker_id,
            "Settlement sweep starting"
        );

        for item in queue {
            let request_id = item.request.request_id.clone();

            // Claim first so an admin transition racing this sweep cannot
            // reject or re-route a request mid-transfer.
            let claimed = match withdrawals.update_status(
                &request_id,
                WithdrawStatus::Processing,
                Some(&self.worker_id),
                None,
                None,
            ) {
                Ok(request) => request,
                Err(e) => {
                    warn!(
                        request_id = %request_id,
                        error = %e,
                        "Failed to claim withdrawal, skipping"
                    );
                    summary.errors += 1;
                    continue;
                }
            };
            summary.claimed += 1;

            let event = match self
                .backend
                .transfer(&request_id, &claimed.destination_address, claimed.amount)
                .await
            {
                Ok(tx_hash) => {
                    match withdrawals.update_status(
                        &request_id,
                        WithdrawStatus::Completed,
                        Some(&self.worker_id),
                        Some(&tx_hash),
                        None,
                    ) {
                        Ok(completed) => {
                            summary.completed += 1;
                            terminal_event(&completed)
                        }
                        Err(e) => {
                            // Value already left the treasury. The reservation
                            // stays held and the claim stays in place until an
                            // operator reconciles the request.
                            error!(
                                request_id = %request_id,
                                tx_hash = %tx_hash,
                                error = %e,
                                "Transfer confirmed but ledger completion failed; request left processing"
                            );
                            summary.errors += 1;
                            continue;
                        }
                    }
                }
                Err(transfer_err) => {
                    let note = format!("Settlement failed: {}", transfer_err);
                    match withdrawals.update_status(
                        &request_id,
                        WithdrawStatus::Rejected,
                        Some(&self.worker_id),
                        None,
                        Some(&note),
                    ) {
                        Ok(rejected) => {
                            summary.rejected += 1;
                            terminal_event(&rejected)
                        }
                        Err(e) => {
                            error!(
                                request_id = %request_id,
                                error = %e,
                                "Failed to reject withdrawal after transfer error"
                            );
                            summary.errors += 1;
                            continue;
                        }
                    }
                }
            };

            if let Err(e) = self.notifier.notify(&event).await {
                warn!(
                    request_id = %event.request_id,
                    error = %e,
                    "Settlement notification failed"
                );
            }
        }

        info!(
            claimed = summary.claimed,
            completed = summary.completed,
            rejected = summary.rejected,
            errors = summary.errors,
            "Settlement sweep finished"
        );

        Ok(summary)
    }

    /// Run sweeps on an interval until the cancellation token fires.
    ///
    /// Driven from the binary entrypoint:
    /// ```rust,ignore
    /// worker.run(shutdown.clone()).await;
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            worker_id = %self.worker_id,
            "Settlement worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Settlement worker shutting down");
                return;
            }

            if let Err(e) = self.run_once().await {
                warn!(error = %e, "Settlement sweep failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Settlement worker shutting down");
                    return;
                }
            }
        }
    }
}

fn terminal_event(request: &WithdrawRequest) -> SettlementEvent {
    SettlementEvent {
        request_id: request.request_id.clone(),
        status: request.status,
        token: request.token.clone(),
        amount: request.amount,
        destination: request.destination_address.clone(),
        tx_hash: request.tx_hash.clone(),
    }
}
