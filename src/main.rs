// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use relational_ledger_server::admin::AdminGate;
use relational_ledger_server::blockchain::{ChainError, SettlementClient};
use relational_ledger_server::config::{SettlementConfig, LOG_FORMAT_ENV};
use relational_ledger_server::settlement::{
    DryRunBackend, Erc20Backend, LogNotifier, SettlementWorker, TransferBackend,
};
use relational_ledger_server::state::AppState;
use relational_ledger_server::storage::LedgerDb;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = SettlementConfig::from_env().expect("Invalid settlement configuration");
    let db = LedgerDb::open(&config.db_path()).expect("Failed to open ledger database");
    let state = AppState::new(db, AdminGate::new(config.admin_secret.as_deref()));

    info!(
        network = config.network.id,
        token = %config.token_symbol,
        batch_size = config.batch_size,
        db = %config.db_path().display(),
        "Relational ledger starting"
    );

    match config.chain_settings() {
        Some((rpc_url, signer_key, token_contract)) => {
            let client = SettlementClient::connect(
                config.network.clone(),
                rpc_url,
                signer_key,
                token_contract,
            )
            .await
            .expect("Failed to connect settlement client");

            if let Err(e) = announce_token(&client, &config).await {
                warn!(error = %e, "Token contract check failed; settling with configured values");
            }

            drive(state, &config, Erc20Backend::new(client, config.confirmations)).await;
        }
        None => {
            warn!("Chain settlement not fully configured; transfers run in DRY RUN mode");
            drive(state, &config, DryRunBackend).await;
        }
    }
}

/// Run the settlement worker with the chosen transfer backend: one sweep by
/// default, a polling loop when an interval is configured.
async fn drive<T: TransferBackend>(state: AppState, config: &SettlementConfig, backend: T) {
    let worker = SettlementWorker::new(
        state.db(),
        backend,
        LogNotifier,
        config.worker_id.clone(),
        config.batch_size,
    );

    match config.interval {
        Some(interval) => {
            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl-C received, shutting down");
                    signal.cancel();
                }
            });
            worker.with_poll_interval(interval).run(shutdown).await;
        }
        None => match worker.run_once().await {
            Ok(summary) => info!(
                claimed = summary.claimed,
                completed = summary.completed,
                rejected = summary.rejected,
                errors = summary.errors,
                "Settlement sweep finished"
            ),
            Err(e) => {
                error!(error = %e, "Settlement sweep failed");
                std::process::exit(1);
            }
        },
    }
}

/// Log the on-chain token metadata next to the configured values.
async fn announce_token(
    client: &SettlementClient,
    config: &SettlementConfig,
) -> Result<(), ChainError> {
    let name = client.token().name().await?;
    let symbol = client.token().symbol().await?;
    let decimals = client.token().decimals().await?;

    info!(
        contract = ?client.token().address(),
        name = %name,
        symbol = %symbol,
        decimals,
        signer = ?client.signer_address(),
        "Settlement token contract verified"
    );

    if decimals != config.token_decimals {
        warn!(
            configured = config.token_decimals,
            on_chain = decimals,
            "Configured token decimals differ from the contract"
        );
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if matches!(std::env::var(LOG_FORMAT_ENV).as_deref(), Ok("json")) {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
