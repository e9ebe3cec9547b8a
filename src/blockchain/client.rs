// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing Avalanche C-Chain client for settlement transfers.
//!
//! Wraps an alloy provider with a local signing key and exposes the narrow
//! surface the settlement worker needs: the treasury token balance, an ERC-20
//! `transfer` broadcast with EIP-1559 fees, and receipt polling until a
//! configured confirmation depth is reached.

use std::str::FromStr;
use std::time::Duration;

use alloy::{
    network::{Ethereum, EthereumWallet},
    primitives::{Address, U256},
    providers::{
        fillers::{
            BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller,
            WalletFiller,
        },
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol_types::SolCall,
};
use tracing::debug;

use super::erc20::{Erc20Contract, IERC20};
use super::types::NetworkConfig;

/// Delay between receipt polls while waiting for confirmations.
/// Avalanche C-Chain produces blocks roughly every two seconds.
const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// HTTP provider type with all fillers plus a signing wallet.
pub type SigningProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider<Ethereum>,
>;

/// Transaction receipt after confirmation.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    /// Transaction hash
    pub tx_hash: String,
    /// Block number where the transaction was included
    pub block_number: u64,
    /// Gas actually used
    pub gas_used: u64,
    /// Whether the transaction was successful
    pub success: bool,
}

/// Signing client bound to one network and one token contract.
pub struct SettlementClient {
    /// Network configuration
    network: NetworkConfig,
    /// Alloy HTTP provider with signing wallet
    provider: SigningProvider,
    /// Address derived from the settlement signing key
    signer_address: Address,
    /// The token contract settlements are paid from
    token: Erc20Contract<SigningProvider>,
}

impl SettlementClient {
    /// Connect a signing client for the given network and token contract.
    ///
    /// Queries the endpoint's chain id and refuses to proceed when it does
    /// not match the configured network, so a misdirected RPC URL cannot
    /// settle value on the wrong chain.
    pub async fn connect(
        network: NetworkConfig,
        rpc_url: &str,
        private_key_hex: &str,
        token_contract: &str,
    ) -> Result<Self, ChainError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainError::InvalidRpcUrl(e.to_string()))?;

        let signer = parse_signer(private_key_hex)?;
        let signer_address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);

        let reported = provider
            .get_chain_id()
            .await
            .map_err(|e| ChainError::RpcError(format!("Failed to get chain id: {}", e)))?;
        if reported != network.chain_id {
            return Err(ChainError::RpcError(format!(
                "RPC endpoint reports chain id {} but network `{}` expects {}",
                reported, network.id, network.chain_id
            )));
        }

        let token = Erc20Contract::new(&provider, token_contract)?;

        Ok(Self {
            network,
            provider,
            signer_address,
            token,
        })
    }

    /// Get the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Address the settlement transfers are signed with.
    pub fn signer_address(&self) -> Address {
        self.signer_address
    }

    /// The configured token contract.
    pub fn token(&self) -> &Erc20Contract<SigningProvider> {
        &self.token
    }

    /// Token balance held by the settlement signer.
    pub async fn treasury_balance(&self) -> Result<U256, ChainError> {
        self.token.balance_of(self.signer_address).await
    }

    /// Get the current block number.
    pub async fn get_block_number(&self) -> Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))
    }

    /// Get current gas prices from the network.
    async fn get_gas_prices(&self) -> Result<(u128, u128), ChainError> {
        // Get base fee from latest block
        let block = self
            .provider
            .get_block_by_number(alloy::eips::BlockNumberOrTag::Latest)
            .await
            .map_err(|e| ChainError::RpcError(format!("Failed to get block: {}", e)))?
            .ok_or_else(|| ChainError::RpcError("No latest block".to_string()))?;

        let base_fee: u128 = block
            .header
            .base_fee_per_gas
            .map(|f| f as u128)
            .unwrap_or(25_000_000_000u128); // 25 gwei default

        // Standard priority fee for Avalanche
        let priority_fee: u128 = 1_500_000_000; // 1.5 gwei

        // Max fee = 2 * base_fee + priority_fee (allows for base fee increase)
        let max_fee = base_fee.saturating_mul(2).saturating_add(priority_fee);

        Ok((max_fee, priority_fee))
    }

    /// Broadcast an ERC-20 `transfer(to, amount)` and return the tx hash.
    pub async fn send_token_transfer(
        &self,
        to: &str,
        amount: U256,
    ) -> Result<String, ChainError> {
        let to_addr = Address::from_str(to)
            .map_err(|e| ChainError::InvalidAddress(format!("Invalid destination: {}", e)))?;

        // Encode the transfer(to, amount) call
        let call = IERC20::transferCall {
            to: to_addr,
            amount,
        };
        let data = call.abi_encode();

        let (max_fee_per_gas, priority_fee) = self.get_gas_prices().await?;

        let tx = TransactionRequest::default()
            .to(self.token.address())
            .input(data.into())
            .max_fee_per_gas(max_fee_per_gas)
            .max_priority_fee_per_gas(priority_fee);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| ChainError::TransactionFailed(format!("Failed to send: {}", e)))?;

        let tx_hash = format!("{:?}", pending.tx_hash());
        debug!(tx_hash = %tx_hash, to = %to_addr, "Token transfer broadcast");

        Ok(tx_hash)
    }

    /// Poll for the transaction receipt until it sits `confirmations` blocks
    /// deep, bounded by `deadline`.
    ///
    /// A reverted transaction is returned immediately with `success == false`;
    /// reverts are final at inclusion. Deadline expiry is a
    /// `TransactionFailed` error, the transaction may still land later.
    pub async fn wait_for_confirmation(
        &self,
        tx_hash: &str,
        confirmations: u64,
        deadline: Duration,
    ) -> Result<TxReceipt, ChainError> {
        let hash = tx_hash
            .parse()
            .map_err(|e| ChainError::InvalidAddress(format!("Invalid tx hash: {}", e)))?;

        let started = tokio::time::Instant::now();
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| ChainError::RpcError(format!("Failed to get receipt: {}", e)))?;

            if let Some(receipt) = receipt {
                let included_in = receipt.block_number.unwrap_or(0);
                let result = TxReceipt {
                    tx_hash: tx_hash.to_string(),
                    block_number: included_in,
                    gas_used: receipt.gas_used as u64,
                    success: receipt.status(),
                };

                if !result.success {
                    return Ok(result);
                }

                let current = self.get_block_number().await?;
                let depth = current.saturating_sub(included_in).saturating_add(1);
                if depth >= confirmations {
                    return Ok(result);
                }

                debug!(
                    tx_hash = %tx_hash,
                    depth,
                    required = confirmations,
                    "Waiting for confirmations"
                );
            }

            if started.elapsed() >= deadline {
                return Err(ChainError::TransactionFailed(format!(
                    "No confirmation for {} within {}s",
                    tx_hash,
                    deadline.as_secs()
                )));
            }

            tokio::time::sleep(CONFIRMATION_POLL_INTERVAL).await;
        }
    }
}

/// Create a signer from a hex-encoded private key (with or without 0x prefix).
fn parse_signer(private_key_hex: &str) -> Result<PrivateKeySigner, ChainError> {
    // Use alloy's hex decoding (from alloy-primitives)
    let key_bytes = alloy::hex::decode(private_key_hex)
        .map_err(|e| ChainError::InvalidPrivateKey(e.to_string()))?;

    PrivateKeySigner::from_slice(&key_bytes)
        .map_err(|e| ChainError::InvalidPrivateKey(e.to_string()))
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract error: {0}")]
    ContractError(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}
