//! Market Catalog (spec §4.1): a read-through cache over every reserve
//! asset's chain-read configuration. Performs no arithmetic — it is a
//! typed view over chain state, reread before any write transaction.

use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Result};
use liquidator_chain::{ChainReader, ReserveSnapshot};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// One reserve's cached parameters (spec §3 `Market`).
///
/// Invariants: `liquidation_threshold_bps <= 10_000`;
/// `liquidation_bonus_bps >= 10_000` (the bonus is expressed as a
/// multiplier in basis points, 10_000 = 1.0x).
#[derive(Debug, Clone)]
pub struct Market {
    pub asset_id: Address,
    pub symbol: String,
    pub decimals: u8,
    pub liquidation_threshold_bps: u16,
    pub liquidation_bonus_bps: u16,
    pub a_token_id: Address,
    pub variable_debt_token_id: Address,
    /// 1e18-fixed-point price in the reference numéraire.
    pub price: U256,
    pub variable_debt_index: U256,
}

impl Market {
    fn from_snapshot(s: ReserveSnapshot) -> Result<Self> {
        if s.liquidation_threshold_bps > 10_000 {
            return Err(anyhow!(
                "market {}: liquidation_threshold_bps {} exceeds 10000",
                s.asset,
                s.liquidation_threshold_bps
            ));
        }
        if s.liquidation_bonus_bps < 10_000 {
            return Err(anyhow!(
                "market {}: liquidation_bonus_bps {} below par (10000)",
                s.asset,
                s.liquidation_bonus_bps
            ));
        }
        Ok(Self {
            asset_id: s.asset,
            symbol: s.symbol,
            decimals: s.decimals,
            liquidation_threshold_bps: s.liquidation_threshold_bps,
            liquidation_bonus_bps: s.liquidation_bonus_bps,
            a_token_id: s.a_token,
            variable_debt_token_id: s.variable_debt_token,
            price: s.price,
            variable_debt_index: s.variable_debt_index,
        })
    }

    /// `10^decimals`, the scaling factor every reward/selection formula in
    /// the Liquidator uses (never the raw `decimals` integer — spec §9's
    /// flagged source bug).
    pub fn decimals_scale(&self) -> U256 {
        crate::u256_math::pow10(self.decimals)
    }
}

/// Cache of every reserve's `Market`, refreshed wholesale on demand.
///
/// Errors with `UpstreamUnavailable` (surfaced as an `anyhow::Error`) if
/// any reserve's chain reads fail; the caller decides whether to keep
/// serving the previous snapshot or abort.
pub struct MarketCatalog {
    reader: Arc<ChainReader>,
    markets: RwLock<Vec<Market>>,
}

impl MarketCatalog {
    pub fn new(reader: Arc<ChainReader>) -> Self {
        Self {
            reader,
            markets: RwLock::new(Vec::new()),
        }
    }

    /// Enumerate all reserves and fetch their configuration/price,
    /// replacing the cached state. Equivalent to `refresh()`.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<Market>> {
        let snapshots = self
            .reader
            .load_all_reserves()
            .await
            .map_err(|e| anyhow!("UpstreamUnavailable: {e}"))?;

        let mut markets = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            markets.push(Market::from_snapshot(snapshot)?);
        }

        info!(count = markets.len(), "Market catalog loaded");
        *self.markets.write() = markets.clone();
        Ok(markets)
    }

    /// Replace cached state with a fresh `load_all()`. Called mandatorily
    /// before every liquidation attempt to pick up price moves (spec §4.1).
    pub async fn refresh(&self) -> Result<Vec<Market>> {
        self.load_all().await
    }

    /// Current cached snapshot (empty until `load_all`/`refresh` succeeds).
    pub fn cached(&self) -> Vec<Market> {
        self.markets.read().clone()
    }

    pub fn by_asset(&self, asset: Address) -> Option<Market> {
        self.markets.read().iter().find(|m| m.asset_id == asset).cloned()
    }

    /// Index cached markets by asset for fast lookup during position
    /// evaluation.
    pub fn index(&self) -> HashMap<Address, Market> {
        self.markets
            .read()
            .iter()
            .map(|m| (m.asset_id, m.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(ltv: u16, bonus: u16) -> ReserveSnapshot {
        ReserveSnapshot {
            asset: Address::repeat_byte(1),
            symbol: "TEST".to_string(),
            decimals: 18,
            liquidation_threshold_bps: ltv,
            liquidation_bonus_bps: bonus,
            a_token: Address::repeat_byte(2),
            variable_debt_token: Address::repeat_byte(3),
            price: U256::from(10u64).pow(U256::from(18u64)),
            variable_debt_index: U256::from(10u64).pow(U256::from(27u64)),
        }
    }

    #[test]
    fn rejects_threshold_above_10000_bps() {
        let result = Market::from_snapshot(market(10_001, 11_000));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_bonus_below_par() {
        let result = Market::from_snapshot(market(8_000, 9_999));
        assert!(result.is_err());
    }

    #[test]
    fn accepts_valid_configuration() {
        let result = Market::from_snapshot(market(8_000, 10_750)).unwrap();
        assert_eq!(result.liquidation_threshold_bps, 8_000);
        assert_eq!(result.liquidation_bonus_bps, 10_750);
        assert_eq!(result.decimals_scale(), U256::from(10u64).pow(U256::from(18u64)));
    }
}
