//! Deployment configuration: the required environment surface for one
//! fixed chain/protocol/contract deployment.

use alloy::primitives::Address;
use anyhow::{anyhow, Context, Result};
use std::collections::HashSet;
use std::env;

/// Everything the bot needs to talk to one concrete Aave-v2-style
/// deployment: RPC endpoints, the submitter key, the wrapper contract,
/// the three upstream contracts, and the swap-fee-tier allow-lists.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    /// JSON-RPC endpoint for on-chain reads and writes.
    pub rpc_url: String,
    /// Signing key for the submitter account, hex-encoded (with or
    /// without the `0x` prefix).
    pub private_key: String,
    /// Address of the on-chain liquidator wrapper.
    pub liquidator_contract_address: Address,
    /// Chain id (default 137, Polygon).
    pub chain_id: u64,
    /// Websocket endpoint used for mempool pending-transaction streaming.
    pub mempool_ws_url: String,
    /// `LendingPool` contract address.
    pub lending_pool_address: Address,
    /// `ProtocolDataProvider` contract address.
    pub protocol_data_provider_address: Address,
    /// `PriceOracle` contract address.
    pub price_oracle_address: Address,
    /// GraphQL subgraph endpoint used for bootstrap enumeration.
    pub subgraph_url: String,
    /// Watchlist Store backing connection string (`redis://...`).
    pub redis_url: String,
    /// Addresses treated as stablecoins for the swap-fee tier classifier.
    pub stablecoin_allowlist: HashSet<Address>,
    /// Addresses treated as exotic tokens for the swap-fee tier classifier.
    pub exotic_allowlist: HashSet<Address>,
}

impl DeploymentConfig {
    /// Load from environment variables (via `dotenvy` having already run).
    pub fn from_env() -> Result<Self> {
        let rpc_url = get_env("RPC_URL")?;
        let private_key = get_env("PRIVATE_KEY")?;
        let liquidator_contract_address = get_address("LIQUIDATOR_CONTRACT_ADDRESS")?;
        let chain_id = get_env_opt("CHAIN_ID")
            .map(|s| s.parse::<u64>())
            .transpose()
            .context("CHAIN_ID must be a u64")?
            .unwrap_or(137);
        let mempool_ws_url = get_env("MEMPOOL_WS_URL")?;
        let lending_pool_address = get_address("LENDING_POOL_ADDRESS")?;
        let protocol_data_provider_address = get_address("PROTOCOL_DATA_PROVIDER_ADDRESS")?;
        let price_oracle_address = get_address("PRICE_ORACLE_ADDRESS")?;
        let subgraph_url = get_env("SUBGRAPH_URL")?;
        let redis_url = get_env_opt("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1".to_string());
        let stablecoin_allowlist = get_address_list("STABLECOIN_ALLOWLIST")?;
        let exotic_allowlist = get_address_list("EXOTIC_ALLOWLIST")?;

        Ok(Self {
            rpc_url,
            private_key,
            liquidator_contract_address,
            chain_id,
            mempool_ws_url,
            lending_pool_address,
            protocol_data_provider_address,
            price_oracle_address,
            subgraph_url,
            redis_url,
            stablecoin_allowlist,
            exotic_allowlist,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| anyhow!("missing required environment variable: {name}"))
}

fn get_env_opt(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn get_address(name: &str) -> Result<Address> {
    let raw = get_env(name)?;
    raw.parse::<Address>()
        .map_err(|e| anyhow!("invalid address in {name}: {e}"))
}

fn get_address_list(name: &str) -> Result<HashSet<Address>> {
    let raw = match get_env_opt(name) {
        Some(v) => v,
        None => return Ok(HashSet::new()),
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Address>()
                .map_err(|e| anyhow!("invalid address in {name}: {e}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_allowlist() {
        std::env::set_var(
            "TEST_ALLOWLIST_PARSE",
            "0x0000000000000000000000000000000000000001, 0x0000000000000000000000000000000000000002",
        );
        let set = get_address_list("TEST_ALLOWLIST_PARSE").unwrap();
        assert_eq!(set.len(), 2);
        std::env::remove_var("TEST_ALLOWLIST_PARSE");
    }

    #[test]
    fn missing_allowlist_is_empty() {
        std::env::remove_var("TEST_ALLOWLIST_MISSING");
        let set = get_address_list("TEST_ALLOWLIST_MISSING").unwrap();
        assert!(set.is_empty());
    }
}
