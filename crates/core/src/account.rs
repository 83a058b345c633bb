//! Account Oracle (spec §4.2): single-call reads of a borrower's
//! aggregate position and per-market balance breakdown. Read-only,
//! idempotent, no internal retries — RPC failure downgrades to `None`
//! rather than propagating, so the Tracker's state machine can treat it
//! as a transient failure (§4.4).

use crate::u256_math::WAD;
use alloy::primitives::{Address, U256};
use liquidator_chain::ChainReader;
use std::sync::Arc;
use tracing::instrument;

/// Borrower's aggregate position (spec §3 `AccountSummary`). All amounts
/// are 1e18-fixed-point in the reference numéraire.
///
/// Invariant: `health_factor = (sum(collateral_i * lt_i)) / sum(debt_j)`,
/// scaled so `health_factor == WAD` marks the liquidation boundary.
#[derive(Debug, Clone, Copy)]
pub struct AccountSummary {
    pub total_collateral: U256,
    pub total_debt: U256,
    pub available_borrow: U256,
    pub current_liquidation_threshold: U256,
    pub health_factor: U256,
}

impl AccountSummary {
    /// A borrower is liquidatable iff `health_factor <= 1e18` (spec §3).
    pub fn is_liquidatable(&self) -> bool {
        self.health_factor <= WAD
    }
}

/// Per-account-per-market balance breakdown (spec §3 `PositionLeg`). All
/// fields are non-negative.
#[derive(Debug, Clone, Copy)]
pub struct PositionLeg {
    pub a_token_balance: U256,
    pub variable_debt: U256,
    pub stable_debt: U256,
    pub used_as_collateral: bool,
}

/// Thin wrapper over `ChainReader` exposing the Account Oracle's two
/// operations.
pub struct AccountOracle {
    reader: Arc<ChainReader>,
}

impl AccountOracle {
    pub fn new(reader: Arc<ChainReader>) -> Self {
        Self { reader }
    }

    /// `None` on RPC error; never throws (spec §4.2).
    #[instrument(skip(self))]
    pub async fn get_account_summary(&self, address: Address) -> Option<AccountSummary> {
        let raw = self.reader.get_account_summary(address).await?;
        Some(AccountSummary {
            total_collateral: raw.total_collateral,
            total_debt: raw.total_debt,
            available_borrow: raw.available_borrow,
            current_liquidation_threshold: raw.current_liquidation_threshold,
            health_factor: raw.health_factor,
        })
    }

    pub async fn get_position_leg(&self, market_asset: Address, address: Address) -> Option<PositionLeg> {
        let raw = self.reader.get_position_leg(market_asset, address).await?;
        Some(PositionLeg {
            a_token_balance: raw.a_token_balance,
            variable_debt: raw.variable_debt,
            stable_debt: raw.stable_debt,
            used_as_collateral: raw.used_as_collateral,
        })
    }

    /// Fan out `get_account_summary` over many addresses with a bounded
    /// parallel width (spec §4.4 bootstrap step 4, default width 500).
    pub async fn get_account_summaries_batch(
        &self,
        addresses: &[Address],
        max_concurrent: usize,
    ) -> Vec<(Address, Option<AccountSummary>)> {
        self.reader
            .get_account_summaries_batch(addresses, max_concurrent)
            .await
            .into_iter()
            .map(|(addr, raw)| {
                (
                    addr,
                    raw.map(|r| AccountSummary {
                        total_collateral: r.total_collateral,
                        total_debt: r.total_debt,
                        available_borrow: r.available_borrow,
                        current_liquidation_threshold: r.current_liquidation_threshold,
                        health_factor: r.health_factor,
                    }),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(hf: U256) -> AccountSummary {
        AccountSummary {
            total_collateral: U256::from(1000u64) * WAD,
            total_debt: U256::from(500u64) * WAD,
            available_borrow: U256::ZERO,
            current_liquidation_threshold: U256::from(8_000u64),
            health_factor: hf,
        }
    }

    #[test]
    fn liquidatable_at_exactly_one() {
        assert!(summary(WAD).is_liquidatable());
    }

    #[test]
    fn liquidatable_below_one() {
        let hf = WAD * U256::from(99u64) / U256::from(100u64);
        assert!(summary(hf).is_liquidatable());
    }

    #[test]
    fn not_liquidatable_above_one() {
        let hf = WAD * U256::from(101u64) / U256::from(100u64);
        assert!(!summary(hf).is_liquidatable());
    }
}
