// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values, and the
//! typed settlement configuration loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the ledger database file | `/data` |
//! | `NETWORK` | Target network, `fuji` or `mainnet` | `fuji` |
//! | `SETTLEMENT_RPC_URL` | Chain RPC endpoint; absent forces dry-run | — |
//! | `SETTLEMENT_SIGNER_KEY` | Hex signing key; absent forces dry-run | — |
//! | `TOKEN_CONTRACT` | ERC-20 contract settlements pay from | known-token address |
//! | `TOKEN_SYMBOL` | Ledger token symbol | `rEUR` |
//! | `TOKEN_DECIMALS` | Token decimal precision | known-token decimals |
//! | `SETTLEMENT_BATCH_SIZE` | Max withdrawals per sweep | `10` |
//! | `SETTLEMENT_CONFIRMATIONS` | Blocks before a transfer counts as final | `1` |
//! | `SETTLEMENT_WORKER_ID` | Reviewer identity recorded by the worker | `settlement-worker` |
//! | `SETTLEMENT_INTERVAL_SECS` | Sweep interval; absent runs once and exits | — |
//! | `ADMIN_API_SECRET` | Administrative shared secret | — |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::blockchain::{network_by_id, token_by_symbol, NetworkConfig, REUR_TOKEN};

/// Environment variable name for the data directory path.
///
/// The ledger database file lives here; the directory is created on first
/// open if missing.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable selecting the target network (`fuji` or `mainnet`).
pub const NETWORK_ENV: &str = "NETWORK";

/// Environment variable for the chain RPC endpoint.
pub const SETTLEMENT_RPC_URL_ENV: &str = "SETTLEMENT_RPC_URL";

/// Environment variable for the hex-encoded settlement signing key.
pub const SETTLEMENT_SIGNER_KEY_ENV: &str = "SETTLEMENT_SIGNER_KEY";

/// Environment variable for the ERC-20 contract address.
pub const TOKEN_CONTRACT_ENV: &str = "TOKEN_CONTRACT";

/// Environment variable for the ledger token symbol.
pub const TOKEN_SYMBOL_ENV: &str = "TOKEN_SYMBOL";

/// Environment variable for the token decimal precision.
pub const TOKEN_DECIMALS_ENV: &str = "TOKEN_DECIMALS";

/// Environment variable for the per-sweep batch size.
pub const SETTLEMENT_BATCH_SIZE_ENV: &str = "SETTLEMENT_BATCH_SIZE";

/// Environment variable for the required confirmation depth.
pub const SETTLEMENT_CONFIRMATIONS_ENV: &str = "SETTLEMENT_CONFIRMATIONS";

/// Environment variable for the worker's reviewer identity.
pub const SETTLEMENT_WORKER_ID_ENV: &str = "SETTLEMENT_WORKER_ID";

/// Environment variable for the sweep interval in seconds.
pub const SETTLEMENT_INTERVAL_SECS_ENV: &str = "SETTLEMENT_INTERVAL_SECS";

/// Environment variable for the administrative shared secret.
pub const ADMIN_API_SECRET_ENV: &str = "ADMIN_API_SECRET";

/// Environment variable for the logging format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// File name of the ledger database inside `DATA_DIR`.
pub const LEDGER_DB_FILE: &str = "ledger.redb";

const DEFAULT_DATA_DIR: &str = "/data";
const DEFAULT_NETWORK: &str = "fuji";
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_CONFIRMATIONS: u64 = 1;
const DEFAULT_WORKER_ID: &str = "settlement-worker";
const DEFAULT_TOKEN_DECIMALS: u8 = 6;

/// Configuration loading failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Typed settlement worker configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Directory holding the ledger database file
    pub data_dir: PathBuf,
    /// Target network (chain id + explorer)
    pub network: NetworkConfig,
    /// Chain RPC endpoint; `None` forces dry-run settlement
    pub rpc_url: Option<String>,
    /// Hex-encoded signing key; `None` forces dry-run settlement
    pub signer_key: Option<String>,
    /// ERC-20 contract settlements pay from; `None` forces dry-run
    pub token_contract: Option<String>,
    /// Ledger token symbol
    pub token_symbol: String,
    /// Token decimal precision
    pub token_decimals: u8,
    /// Max withdrawals per sweep
    pub batch_size: usize,
    /// Blocks before an on-chain transfer counts as final
    pub confirmations: u64,
    /// Reviewer identity recorded on worker transitions
    pub worker_id: String,
    /// Interval between sweeps; `None` means one sweep, then exit
    pub interval: Option<Duration>,
    /// Administrative shared secret
    pub admin_secret: Option<String>,
}

impl SettlementConfig {
    /// Load the settlement configuration from the environment.
    ///
    /// Missing chain settings are not an error; they select dry-run mode.
    /// Malformed values (unknown network, non-numeric sizes) are.
    pub fn from_env() -> Result<Self, ConfigError> {
        let network = network_by_id(&env_or_default(NETWORK_ENV, DEFAULT_NETWORK))
            .map_err(|reason| ConfigError::Invalid {
                name: NETWORK_ENV,
                reason,
            })?;

        let token_symbol = env_or_default(TOKEN_SYMBOL_ENV, REUR_TOKEN.symbol);
        let (default_contract, default_decimals) = token_defaults(&token_symbol, &network);

        let token_contract = env_optional(TOKEN_CONTRACT_ENV).or(default_contract);
        let token_decimals = match env_optional(TOKEN_DECIMALS_ENV) {
            Some(raw) => parse_value(TOKEN_DECIMALS_ENV, &raw)?,
            None => default_decimals,
        };

        let interval = env_optional(SETTLEMENT_INTERVAL_SECS_ENV)
            .map(|raw| parse_value::<u64>(SETTLEMENT_INTERVAL_SECS_ENV, &raw))
            .transpose()?
            .map(Duration::from_secs);

        Ok(Self {
            data_dir: PathBuf::from(env_or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            network,
            rpc_url: env_optional(SETTLEMENT_RPC_URL_ENV),
            signer_key: env_optional(SETTLEMENT_SIGNER_KEY_ENV),
            token_contract,
            token_symbol,
            token_decimals,
            batch_size: parse_env(SETTLEMENT_BATCH_SIZE_ENV, DEFAULT_BATCH_SIZE)?,
            confirmations: parse_env(SETTLEMENT_CONFIRMATIONS_ENV, DEFAULT_CONFIRMATIONS)?,
            worker_id: env_or_default(SETTLEMENT_WORKER_ID_ENV, DEFAULT_WORKER_ID),
            interval,
            admin_secret: env_optional(ADMIN_API_SECRET_ENV),
        })
    }

    /// Path of the ledger database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_DB_FILE)
    }

    /// RPC endpoint, signing key, and token contract when all are present.
    /// Any absence forces dry-run settlement.
    pub fn chain_settings(&self) -> Option<(&str, &str, &str)> {
        match (&self.rpc_url, &self.signer_key, &self.token_contract) {
            (Some(rpc), Some(key), Some(contract)) => {
                Some((rpc.as_str(), key.as_str(), contract.as_str()))
            }
            _ => None,
        }
    }
}

/// Contract address and decimals bundled with a known token symbol.
fn token_defaults(symbol: &str, network: &NetworkConfig) -> (Option<String>, u8) {
    match token_by_symbol(symbol) {
        Some(token) => (
            token.address_on(network).map(str::to_string),
            token.decimals,
        ),
        None => (None, DEFAULT_TOKEN_DECIMALS),
    }
}

fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_optional(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}
