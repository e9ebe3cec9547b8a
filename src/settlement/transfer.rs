// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transfer execution backends.
//!
//! The worker hands each claimed withdrawal to a [`TransferBackend`] and keys
//! the terminal transition off the result. [`Erc20Backend`] moves real value
//! on-chain; [`DryRunBackend`] fabricates transaction hashes so the full
//! pipeline can run without an RPC endpoint or signing key.

use std::time::Duration;

use alloy::primitives::{keccak256, U256};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::blockchain::{ChainError, SettlementClient};

/// Upper bound on waiting for a broadcast transfer to confirm.
const CONFIRMATION_DEADLINE: Duration = Duration::from_secs(120);

/// Executes the on-chain leg of one withdrawal.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Move `amount` base units to `destination`. Returns the tx hash.
    async fn transfer(
        &self,
        request_id: &str,
        destination: &str,
        amount: u128,
    ) -> Result<String, ChainError>;
}

/// Settles withdrawals with real ERC-20 transfers.
pub struct Erc20Backend {
    client: SettlementClient,
    confirmations: u64,
}

impl Erc20Backend {
    /// Wrap a connected client; `confirmations` is the block depth a
    /// transfer must reach before it counts as settled.
    pub fn new(client: SettlementClient, confirmations: u64) -> Self {
        Self {
            client,
            confirmations,
        }
    }
}

#[async_trait]
impl TransferBackend for Erc20Backend {
    async fn transfer(
        &self,
        request_id: &str,
        destination: &str,
        amount: u128,
    ) -> Result<String, ChainError> {
        let requested = U256::from(amount);

        // A transfer the treasury cannot cover would revert on-chain anyway;
        // catch it before paying gas for the failure.
        let treasury = self.client.treasury_balance().await?;
        if treasury < requested {
            return Err(ChainError::TransactionFailed(format!(
                "Treasury balance {} below requested {}",
                treasury, requested
            )));
        }

        let tx_hash = self
            .client
            .send_token_transfer(destination, requested)
            .await?;
        info!(
            request_id = %request_id,
            tx_hash = %tx_hash,
            explorer = %self.client.network().explorer_tx_url(&tx_hash),
            "Settlement transfer broadcast"
        );

        let receipt = self
            .client
            .wait_for_confirmation(&tx_hash, self.confirmations, CONFIRMATION_DEADLINE)
            .await?;
        if !receipt.success {
            return Err(ChainError::TransactionFailed(format!(
                "Transfer {} reverted in block {}",
                tx_hash, receipt.block_number
            )));
        }

        info!(
            request_id = %request_id,
            tx_hash = %tx_hash,
            block_number = receipt.block_number,
            gas_used = receipt.gas_used,
            "Settlement transfer confirmed"
        );

        Ok(tx_hash)
    }
}

/// Backend that fabricates transaction hashes without touching the chain.
///
/// Selected when the RPC endpoint or signing key is not configured, so
/// withdrawals still flow through the full state machine in development
/// deployments.
#[derive(Debug, Default)]
pub struct DryRunBackend;

#[async_trait]
impl TransferBackend for DryRunBackend {
    async fn transfer(
        &self,
        request_id: &str,
        destination: &str,
        amount: u128,
    ) -> Result<String, ChainError> {
        let nonce = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let digest = keccak256(format!("{request_id}:{nonce}").as_bytes());
        let tx_hash = format!("{digest:?}");

        warn!(
            request_id = %request_id,
            destination = %destination,
            amount,
            tx_hash = %tx_hash,
            "DRY RUN transfer, no value moved on-chain"
        );

        Ok(tx_hash)
    }
}
