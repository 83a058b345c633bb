//! Typed chain-read layer backing the Market Catalog and Account Oracle
//! (spec §4.1, §4.2). A thin view over `LendingPool`/`ProtocolDataProvider`/
//! `PriceOracle`; no arithmetic lives here.

use crate::contracts::{ILendingPool, IPriceOracle, IProtocolDataProvider};
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt};
use tracing::{debug, instrument, warn};

/// Transient-upstream taxonomy for the Account Oracle's two read calls
/// (spec §7). Never propagated past the oracle boundary — every call site
/// downgrades this to `None` and logs, per the "swallow per-call" policy.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("rpc call failed: {0}")]
    Rpc(String),
    #[error("contract call reverted: {0}")]
    ContractRevert(String),
    #[error("rpc call timed out")]
    Timeout,
}

impl UpstreamError {
    fn classify(e: impl std::fmt::Display) -> Self {
        let message = e.to_string();
        let lower = message.to_lowercase();
        if lower.contains("timed out") {
            UpstreamError::Timeout
        } else if lower.contains("revert") {
            UpstreamError::ContractRevert(message)
        } else {
            UpstreamError::Rpc(message)
        }
    }
}

/// One reserve's chain-read configuration, decimals and price, before the
/// Market Catalog assembles it into a `Market`.
#[derive(Debug, Clone)]
pub struct ReserveSnapshot {
    pub asset: Address,
    pub symbol: String,
    pub decimals: u8,
    pub liquidation_threshold_bps: u16,
    pub liquidation_bonus_bps: u16,
    pub a_token: Address,
    pub variable_debt_token: Address,
    pub price: U256,
    pub variable_debt_index: U256,
}

/// Raw `getUserAccountData` tuple.
#[derive(Debug, Clone, Copy)]
pub struct AccountDataRaw {
    pub total_collateral: U256,
    pub total_debt: U256,
    pub available_borrow: U256,
    pub current_liquidation_threshold: U256,
    pub health_factor: U256,
}

/// Raw `getUserReserveData` tuple for one market.
#[derive(Debug, Clone, Copy)]
pub struct PositionLegRaw {
    pub a_token_balance: U256,
    pub variable_debt: U256,
    pub stable_debt: U256,
    pub used_as_collateral: bool,
}

/// Read-only client over the three upstream contracts named in spec §6.
#[derive(Clone)]
pub struct ChainReader {
    rpc_url: String,
    lending_pool: Address,
    data_provider: Address,
    price_oracle: Address,
}

impl ChainReader {
    pub fn new(rpc_url: impl Into<String>, lending_pool: Address, data_provider: Address, price_oracle: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            lending_pool,
            data_provider,
            price_oracle,
        }
    }

    fn provider(&self) -> Result<impl Provider + Clone> {
        Ok(ProviderBuilder::new().on_http(self.rpc_url.parse()?))
    }

    /// Enumerate every reserve and fetch its configuration, token
    /// addresses and current price. One RPC round-trip per reserve per
    /// call kind; a price is captured atomically per-market, never across
    /// markets (spec §4.1's "no cross-market snapshot guarantee").
    #[instrument(skip(self))]
    pub async fn load_all_reserves(&self) -> Result<Vec<ReserveSnapshot>> {
        let provider = self.provider()?;
        let data_provider = IProtocolDataProvider::new(self.data_provider, &provider);

        let tokens = data_provider
            .getAllReservesTokens()
            .call()
            .await
            .map_err(|e| anyhow!("getAllReservesTokens failed: {e}"))?
            ._0;

        debug!(count = tokens.len(), "Enumerated reserves");

        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            let snapshot = self.load_reserve(token.tokenAddress, &token.symbol).await?;
            out.push(snapshot);
        }
        Ok(out)
    }

    async fn load_reserve(&self, asset: Address, symbol: &str) -> Result<ReserveSnapshot> {
        let provider = self.provider()?;
        let data_provider = IProtocolDataProvider::new(self.data_provider, &provider);
        let oracle = IPriceOracle::new(self.price_oracle, &provider);
        let lending_pool = ILendingPool::new(self.lending_pool, &provider);

        let config = data_provider
            .getReserveConfigurationData(asset)
            .call()
            .await
            .map_err(|e| anyhow!("getReserveConfigurationData({asset}) failed: {e}"))?;

        let tokens = data_provider
            .getReserveTokensAddresses(asset)
            .call()
            .await
            .map_err(|e| anyhow!("getReserveTokensAddresses({asset}) failed: {e}"))?;

        let price = oracle
            .getAssetPrice(asset)
            .call()
            .await
            .map_err(|e| anyhow!("getAssetPrice({asset}) failed: {e}"))?
            ._0;

        let variable_debt_index = lending_pool
            .getReserveNormalizedVariableDebt(asset)
            .call()
            .await
            .map_err(|e| anyhow!("getReserveNormalizedVariableDebt({asset}) failed: {e}"))?
            ._0;

        Ok(ReserveSnapshot {
            asset,
            symbol: symbol.to_string(),
            decimals: config.decimals.to::<u8>(),
            liquidation_threshold_bps: config.liquidationThreshold.to::<u16>(),
            liquidation_bonus_bps: config.liquidationBonus.to::<u16>(),
            a_token: tokens.aTokenAddress,
            variable_debt_token: tokens.variableDebtTokenAddress,
            price,
            variable_debt_index,
        })
    }

    /// Single-call read of a borrower's aggregate position (spec §4.2).
    /// Returns `None` on any RPC error — the Account Oracle never throws.
    #[instrument(skip(self))]
    pub async fn get_account_summary(&self, address: Address) -> Option<AccountDataRaw> {
        let provider = match self.provider() {
            Ok(p) => p,
            Err(e) => {
                warn!(address = %address, error = %e, "Failed to build provider");
                return None;
            }
        };
        let pool = ILendingPool::new(self.lending_pool, &provider);

        match pool.getUserAccountData(address).call().await {
            Ok(data) => Some(AccountDataRaw {
                total_collateral: data.totalCollateralETH,
                total_debt: data.totalDebtETH,
                available_borrow: data.availableBorrowsETH,
                current_liquidation_threshold: data.currentLiquidationThreshold,
                health_factor: data.healthFactor,
            }),
            Err(e) => {
                let classified = UpstreamError::classify(e);
                warn!(address = %address, error = %classified, "getUserAccountData failed");
                None
            }
        }
    }

    /// Per-market balance breakdown for one borrower (spec §4.2).
    pub async fn get_position_leg(&self, asset: Address, address: Address) -> Option<PositionLegRaw> {
        let provider = match self.provider() {
            Ok(p) => p,
            Err(e) => {
                warn!(address = %address, asset = %asset, error = %e, "Failed to build provider");
                return None;
            }
        };
        let data_provider = IProtocolDataProvider::new(self.data_provider, &provider);

        match data_provider.getUserReserveData(asset, address).call().await {
            Ok(data) => Some(PositionLegRaw {
                a_token_balance: data.currentATokenBalance,
                variable_debt: data.currentVariableDebt,
                stable_debt: data.currentStableDebt,
                used_as_collateral: data.usageAsCollateralEnabled,
            }),
            Err(e) => {
                let classified = UpstreamError::classify(e);
                warn!(address = %address, asset = %asset, error = %classified, "getUserReserveData failed");
                None
            }
        }
    }

    /// Fan out `get_account_summary` over many addresses with a bounded
    /// parallel width (spec §5: bootstrap chunks at 500, the run loop's
    /// width is bounded only by `|Tracked| <= K`).
    pub async fn get_account_summaries_batch(
        &self,
        addresses: &[Address],
        max_concurrent: usize,
    ) -> Vec<(Address, Option<AccountDataRaw>)> {
        stream::iter(addresses.iter().copied())
            .map(|addr| async move { (addr, self.get_account_summary(addr).await) })
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await
    }

    /// Current chain id (used at startup to sanity-check `CHAIN_ID`).
    pub async fn chain_id(&self) -> Result<u64> {
        let provider = self.provider()?;
        Ok(provider.get_chain_id().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_timeout_messages_distinctly() {
        let classified = UpstreamError::classify("request timed out after 5s");
        assert!(matches!(classified, UpstreamError::Timeout));
    }

    #[test]
    fn classifies_revert_messages_distinctly() {
        let classified = UpstreamError::classify("execution reverted");
        assert!(matches!(classified, UpstreamError::ContractRevert(_)));
    }

    #[test]
    fn classifies_other_errors_as_rpc() {
        let classified = UpstreamError::classify("connection refused");
        assert!(matches!(classified, UpstreamError::Rpc(_)));
    }
}
