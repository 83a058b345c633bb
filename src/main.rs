//! Liquidation bot for an Aave-v2-style lending protocol on Polygon.
//!
//! Bootstraps the tracked watchlist, then iterates the tracking loop
//! forever, dispatching the Liquidator on every health-factor breach.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquidator_api::SubgraphClient;
use liquidator_chain::{ChainReader, LiquidatorContract, TransactionSender};
use liquidator_core::{
    config, init_config, AccountOracle, BotConfig, DeploymentConfig, Liquidator, MarketCatalog,
    Tracker,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,liquidator_core=debug,liquidator_chain=debug")),
        )
        .init();

    let bot_config = BotConfig::from_env();
    bot_config.log_config();
    init_config(bot_config);

    let deployment = DeploymentConfig::from_env().context("loading deployment configuration")?;

    let reader = Arc::new(ChainReader::new(
        deployment.rpc_url.clone(),
        deployment.lending_pool_address,
        deployment.protocol_data_provider_address,
        deployment.price_oracle_address,
    ));
    let catalog = Arc::new(MarketCatalog::new(reader.clone()));
    let account_oracle = Arc::new(AccountOracle::new(reader.clone()));
    let store = Arc::new(liquidator_core::WatchlistStore::new(&deployment.redis_url)?);
    let subgraph = Arc::new(SubgraphClient::new(deployment.subgraph_url.clone()));

    let sender = Arc::new(
        TransactionSender::new(&deployment.private_key, &deployment.rpc_url, deployment.chain_id)
            .await
            .context("initializing transaction sender")?,
    );
    let contract = LiquidatorContract::new(deployment.liquidator_contract_address, sender.clone());

    let cfg = config();
    let liquidator = Liquidator::new(
        catalog.clone(),
        account_oracle.clone(),
        contract,
        sender.clone(),
        deployment.mempool_ws_url.clone(),
        deployment.stablecoin_allowlist.clone(),
        deployment.exotic_allowlist.clone(),
        cfg.liquidation.clone(),
        cfg.watchdog.clone(),
    );

    // Bounded queue, worker pool of size one (spec §9 design note): the
    // Tracker dispatches fire-and-forget while the single worker below
    // guarantees at most one liquidation attempt in flight.
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        if let Some(borrower) = rx.recv().await {
            let artifact = liquidator.attempt(borrower).await;
            write_liquidation_artifact(&artifact);

            // Exit code inversion preserved verbatim from the reference
            // implementation (spec §6, §9): 0 signals the transaction-send
            // path failed, 1 signals it succeeded. This is backwards from
            // POSIX convention but is part of the observable behavior.
            let exit_code = if artifact.submitted_tx_hash.is_some() { 1 } else { 0 };
            if let Some(err) = &artifact.error {
                error!(borrower = %borrower, error = %err, "liquidation attempt recorded with error");
            }
            std::process::exit(exit_code);
        }
    });

    let tracker = Tracker::new(account_oracle, store, subgraph, tx, cfg.tracking.clone());

    info!("Loading market catalog");
    let markets = catalog.load_all().await.context("initial market catalog load")?;
    write_json_file("dump-markets.json", &markets_dump(&markets));

    info!("Bootstrapping tracked watchlist");
    tracker.bootstrap().await.context("bootstrap failed")?;
    write_json_file("dump.json", &tracked_dump(&tracker.tracked_snapshot()));

    info!("Entering tracking loop");
    loop {
        match tracker.tick().await {
            Ok(report) => {
                info!(
                    size_before = report.size_before,
                    size_after = report.size_after,
                    dispatched = report.dispatched,
                    min_health_factor = ?report.min_health_factor,
                    "tick"
                );
            }
            Err(e) => {
                error!(error = %e, "tracker tick failed, continuing");
            }
        }
    }
}

fn markets_dump(markets: &[liquidator_core::Market]) -> serde_json::Value {
    serde_json::json!(markets
        .iter()
        .map(|m| {
            serde_json::json!({
                "asset_id": m.asset_id.to_string(),
                "symbol": m.symbol,
                "decimals": m.decimals,
                "liquidation_threshold_bps": m.liquidation_threshold_bps,
                "liquidation_bonus_bps": m.liquidation_bonus_bps,
                "price": m.price.to_string(),
            })
        })
        .collect::<Vec<_>>())
}

fn tracked_dump(entries: &[liquidator_core::TrackedEntry]) -> serde_json::Value {
    serde_json::json!(entries
        .iter()
        .map(|e| {
            serde_json::json!({
                "address": e.address.to_string(),
                "last_health_factor": e.last_health_factor.to_string(),
            })
        })
        .collect::<Vec<_>>())
}

fn write_json_file(path: &str, value: &serde_json::Value) {
    match serde_json::to_vec_pretty(value) {
        Ok(bytes) => {
            if let Err(e) = std::fs::write(path, bytes) {
                error!(path, error = %e, "failed to write sidecar artifact");
            }
        }
        Err(e) => error!(path, error = %e, "failed to serialize sidecar artifact"),
    }
}

fn write_liquidation_artifact(artifact: &liquidator_core::LiquidationArtifact) {
    if let Err(e) = std::fs::create_dir_all("liquidations") {
        error!(error = %e, "failed to create liquidations directory");
        return;
    }
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let path = format!("liquidations/{millis}.json");
    match serde_json::to_vec_pretty(artifact) {
        Ok(bytes) => {
            if let Err(e) = std::fs::write(&path, bytes) {
                error!(path, error = %e, "failed to write liquidation artifact");
            }
        }
        Err(e) => error!(error = %e, "failed to serialize liquidation artifact"),
    }
}
