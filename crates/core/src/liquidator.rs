//! Liquidator (spec §4.5): given a borrower already known to be
//! liquidatable, selects the debt and collateral markets, sizes the
//! repay amount, prices gas, submits the on-chain call, and runs the
//! mempool watchdog until confirmation, exhaustion, or timeout.

use crate::account::AccountOracle;
use crate::config::{LiquidationConfig, WatchdogConfig};
use crate::market::{Market, MarketCatalog};
use crate::u256_math::pow10;
use alloy::primitives::{Address, U256};
use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use liquidator_chain::{LiquidatorContract, MempoolWatchdog, TransactionSender};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Plan computed for one liquidation attempt (spec §3 `LiquidationPlan`).
/// Invariant: `repay_amount <= variable_debt(borrower, debt_market) / 2`.
#[derive(Debug, Clone, Serialize)]
pub struct LiquidationPlan {
    pub borrower: Address,
    pub debt_market: Address,
    pub debt_market_symbol: String,
    pub collateral_market: Address,
    pub collateral_market_symbol: String,
    pub repay_amount: String,
    pub gas_price_wei: u128,
    pub estimated_reward: String,
}

/// Result written to the sidecar artifact (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct LiquidationArtifact {
    pub plan: LiquidationPlan,
    pub submitted_tx_hash: Option<String>,
    pub watchdog_outcome: Option<String>,
    pub error: Option<String>,
}

/// Swap-fee tier consumed by the on-chain wrapper (spec §4.5); not a
/// selection criterion for debt/collateral markets, purely a calldata
/// parameter.
fn swap_fee_tier(
    debt_a_token: Address,
    collateral_a_token: Address,
    stablecoins: &HashSet<Address>,
    exotics: &HashSet<Address>,
) -> u32 {
    if exotics.contains(&debt_a_token) || exotics.contains(&collateral_a_token) {
        return 10_000;
    }
    if stablecoins.contains(&debt_a_token) && stablecoins.contains(&collateral_a_token) {
        return 500;
    }
    3_000
}

/// `gas_gwei = min(10000, floor(29.9895 * exp(3.50691 * debt_eth)))` (spec
/// §4.5, §8 invariant 9). The constants must be reproduced bit-exactly.
fn gas_price_wei_for(debt_eth: f64, config: &LiquidationConfig) -> u128 {
    let raw = config.gas_price_coefficient * libm::exp(config.gas_price_exponent_rate * debt_eth);
    let gwei = config.gas_price_cap_gwei.min(raw.floor());
    (gwei as u128) * 1_000_000_000
}

/// `amount * price / 10^decimals`, the numéraire-denominated value of a
/// token amount at the market's cached (already 1e18-fixed-point) price.
/// Never the raw `decimals` integer — the spec's flagged source bug.
fn numeraire_value(amount: U256, price: U256, decimals: u8) -> U256 {
    if amount.is_zero() || price.is_zero() {
        return U256::ZERO;
    }
    amount * price / pow10(decimals)
}

/// One market's debt and collateral legs for a single borrower, used by
/// market selection.
struct MarketLeg {
    market: Market,
    a_token_balance: U256,
    variable_debt: U256,
}

pub struct Liquidator {
    catalog: Arc<MarketCatalog>,
    account_oracle: Arc<AccountOracle>,
    contract: LiquidatorContract,
    sender: Arc<TransactionSender>,
    mempool_ws_url: String,
    stablecoin_allowlist: HashSet<Address>,
    exotic_allowlist: HashSet<Address>,
    liquidation_config: LiquidationConfig,
    watchdog_config: WatchdogConfig,
}

impl Liquidator {
    pub fn new(
        catalog: Arc<MarketCatalog>,
        account_oracle: Arc<AccountOracle>,
        contract: LiquidatorContract,
        sender: Arc<TransactionSender>,
        mempool_ws_url: String,
        stablecoin_allowlist: HashSet<Address>,
        exotic_allowlist: HashSet<Address>,
        liquidation_config: LiquidationConfig,
        watchdog_config: WatchdogConfig,
    ) -> Self {
        Self {
            catalog,
            account_oracle,
            contract,
            sender,
            mempool_ws_url,
            stablecoin_allowlist,
            exotic_allowlist,
            liquidation_config,
            watchdog_config,
        }
    }

    async fn fetch_legs(&self, borrower: Address, markets: &[Market]) -> Vec<MarketLeg> {
        stream::iter(markets.iter().cloned())
            .map(|market| async move {
                let leg = self.account_oracle.get_position_leg(market.asset_id, borrower).await?;
                Some(MarketLeg {
                    market,
                    a_token_balance: leg.a_token_balance,
                    variable_debt: leg.variable_debt,
                })
            })
            .buffer_unordered(markets.len().max(1))
            .filter_map(|leg| async move { leg })
            .collect()
            .await
    }

    /// Debt market selection (spec §4.5): largest `variable_debt * price /
    /// 10^decimals`, ties broken by address-lexicographic minimum.
    fn select_debt_market(legs: &[MarketLeg]) -> Option<(&MarketLeg, U256)> {
        legs.iter()
            .filter(|leg| leg.variable_debt > U256::ZERO)
            .map(|leg| {
                let score = numeraire_value(leg.variable_debt, leg.market.price, leg.market.decimals);
                (leg, score)
            })
            .fold(None, |best, candidate| match best {
                None => Some(candidate),
                Some(current) => Some(pick_highest_score(current, candidate)),
            })
    }

    /// Collateral market selection (spec §4.5): largest `a_token_balance *
    /// price * liquidation_bonus / 10^decimals`, same tie-break.
    fn select_collateral_market(legs: &[MarketLeg]) -> Option<(&MarketLeg, U256)> {
        legs.iter()
            .filter(|leg| leg.a_token_balance > U256::ZERO)
            .map(|leg| {
                let base = numeraire_value(leg.a_token_balance, leg.market.price, leg.market.decimals);
                let score = base * U256::from(leg.market.liquidation_bonus_bps) / U256::from(10_000u64);
                (leg, score)
            })
            .fold(None, |best, candidate| match best {
                None => Some(candidate),
                Some(current) => Some(pick_highest_score(current, candidate)),
            })
    }

    /// Build a `LiquidationPlan` for `borrower` from the current market
    /// catalog and position legs. The catalog is refreshed first so the
    /// plan reflects the latest prices (spec §4.1).
    #[instrument(skip(self))]
    async fn build_plan(&self, borrower: Address) -> Result<LiquidationPlan> {
        self.catalog.refresh().await?;
        let markets = self.catalog.cached();
        if markets.is_empty() {
            bail!("market catalog is empty, cannot plan a liquidation");
        }

        let legs = self.fetch_legs(borrower, &markets).await;

        let (debt_leg, _) = Self::select_debt_market(&legs)
            .ok_or_else(|| anyhow::anyhow!("borrower {borrower} has no outstanding debt in any tracked market"))?;
        let (coll_leg, _) = Self::select_collateral_market(&legs)
            .ok_or_else(|| anyhow::anyhow!("borrower {borrower} has no seizable collateral in any tracked market"))?;

        let repay_amount = debt_leg.variable_debt / U256::from(2u64);

        let debt_market = debt_leg.market.clone();
        let coll_market = coll_leg.market.clone();

        // reward = repay_amount * price(debt) * 10^decimals(coll) / 10^decimals(debt) / price(coll) * bonus / 10000
        let numerator = repay_amount * debt_market.price * coll_market.decimals_scale();
        let denominator = debt_market.decimals_scale() * coll_market.price;
        let reward_base = if denominator.is_zero() { U256::ZERO } else { numerator / denominator };
        let estimated_reward = reward_base * U256::from(coll_market.liquidation_bonus_bps) / U256::from(10_000u64);

        let debt_eth = crate::u256_math::wad_to_f64(numeraire_value(
            repay_amount,
            debt_market.price,
            debt_market.decimals,
        ));
        let gas_price_wei = gas_price_wei_for(debt_eth, &self.liquidation_config);

        // Diagnostic only — the spec does not gate submission on
        // profitability, so this never blocks the attempt (spec §4.5).
        let reward_numeraire = crate::u256_math::wad_to_f64(numeraire_value(
            estimated_reward,
            coll_market.price,
            coll_market.decimals,
        ));
        if reward_numeraire < self.liquidation_config.min_profit_usd_diagnostic {
            warn!(
                borrower = %borrower,
                reward_numeraire,
                threshold = self.liquidation_config.min_profit_usd_diagnostic,
                "estimated reward below diagnostic profitability threshold, proceeding anyway"
            );
        }

        Ok(LiquidationPlan {
            borrower,
            debt_market: debt_market.asset_id,
            debt_market_symbol: debt_market.symbol,
            collateral_market: coll_market.asset_id,
            collateral_market_symbol: coll_market.symbol,
            repay_amount: repay_amount.to_string(),
            gas_price_wei,
            estimated_reward: estimated_reward.to_string(),
        })
    }

    /// Execute one liquidation attempt end-to-end: plan, submit, watch
    /// the mempool for competitors, and write the sidecar artifact.
    /// Failures here are fatal to the current attempt, not to the
    /// process (spec §4.5, §7); the caller decides on process exit.
    #[instrument(skip(self))]
    pub async fn attempt(&self, borrower: Address) -> LiquidationArtifact {
        let started = Instant::now();
        let plan = match self.build_plan(borrower).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(borrower = %borrower, error = %e, "liquidation#{:#x} planning failed", borrower);
                return LiquidationArtifact {
                    plan: LiquidationPlan {
                        borrower,
                        debt_market: Address::ZERO,
                        debt_market_symbol: String::new(),
                        collateral_market: Address::ZERO,
                        collateral_market_symbol: String::new(),
                        repay_amount: "0".to_string(),
                        gas_price_wei: 0,
                        estimated_reward: "0".to_string(),
                    },
                    submitted_tx_hash: None,
                    watchdog_outcome: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let markets = self.catalog.index();
        let debt_a_token = markets.get(&plan.debt_market).map(|m| m.a_token_id).unwrap_or(Address::ZERO);
        let collateral_a_token = markets
            .get(&plan.collateral_market)
            .map(|m| m.a_token_id)
            .unwrap_or(Address::ZERO);
        let swap_fee = swap_fee_tier(
            debt_a_token,
            collateral_a_token,
            &self.stablecoin_allowlist,
            &self.exotic_allowlist,
        );

        let repay_amount: U256 = plan.repay_amount.parse().unwrap_or(U256::ZERO);

        let submission = self
            .contract
            .liquidate(
                borrower,
                debt_a_token,
                collateral_a_token,
                repay_amount,
                swap_fee,
                plan.gas_price_wei,
                self.liquidation_config.gas_limit,
            )
            .await;

        let submitted = match submission {
            Ok(tx) => tx,
            Err(e) => {
                warn!(borrower = %borrower, error = %e, "liquidation#{:#x} submission failed", borrower);
                return LiquidationArtifact {
                    plan,
                    submitted_tx_hash: None,
                    watchdog_outcome: None,
                    error: Some(e.to_string()),
                };
            }
        };

        info!(
            borrower = %borrower,
            tx_hash = %submitted.hash,
            elapsed_ms = started.elapsed().as_millis(),
            "liquidation#{:#x} submitted",
            borrower
        );

        let watchdog = MempoolWatchdog::new(
            self.mempool_ws_url.clone(),
            Arc::clone(&self.sender),
            self.watchdog_config.bump_numerator,
            self.watchdog_config.bump_denominator,
            self.watchdog_config.timeout(),
        );

        let outcome = watchdog.run(borrower, submitted.clone()).await;
        let (outcome_label, error) = match outcome {
            Ok(outcome) => (Some(format!("{outcome:?}")), None),
            Err(e) => (None, Some(e.to_string())),
        };

        info!(
            borrower = %borrower,
            elapsed_ms = started.elapsed().as_millis(),
            outcome = ?outcome_label,
            "liquidation#{:#x} attempt finished",
            borrower
        );

        LiquidationArtifact {
            plan,
            submitted_tx_hash: Some(submitted.hash.to_string()),
            watchdog_outcome: outcome_label,
            error,
        }
    }
}

fn pick_highest_score<'a>(a: (&'a MarketLeg, U256), b: (&'a MarketLeg, U256)) -> (&'a MarketLeg, U256) {
    match b.1.cmp(&a.1) {
        std::cmp::Ordering::Greater => b,
        std::cmp::Ordering::Less => a,
        std::cmp::Ordering::Equal => {
            if b.0.market.asset_id < a.0.market.asset_id {
                b
            } else {
                a
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LiquidationConfig;

    fn market(addr: u8, decimals: u8, price_wad: u64, bonus_bps: u16) -> Market {
        // Mirrors Market::from_snapshot's validated fields without going
        // through ChainReader; constructed directly for test fixtures.
        Market {
            asset_id: Address::repeat_byte(addr),
            symbol: format!("T{addr}"),
            decimals,
            liquidation_threshold_bps: 8_000,
            liquidation_bonus_bps: bonus_bps,
            a_token_id: Address::repeat_byte(addr.wrapping_add(100)),
            variable_debt_token_id: Address::repeat_byte(addr.wrapping_add(150)),
            price: U256::from(price_wad),
            variable_debt_index: U256::from(10u64).pow(U256::from(27u64)),
        }
    }

    #[test]
    fn repay_sizing_is_exact_half_debt_floor() {
        let debt = U256::from(1_000_000_001u64);
        assert_eq!(debt / U256::from(2u64), U256::from(500_000_000u64));
    }

    #[test]
    fn gas_price_matches_reference_points() {
        let config = LiquidationConfig::default();
        let cases = [
            (0.0f64, 29u128 * 1_000_000_000),
            (0.1f64, 42u128 * 1_000_000_000),
            (0.5f64, 173u128 * 1_000_000_000),
            (1.0f64, 1_000u128 * 1_000_000_000),
            (2.0f64, 10_000u128 * 1_000_000_000),
            (3.0f64, 10_000u128 * 1_000_000_000),
        ];
        for (debt_eth, expected_wei) in cases {
            let gas_price = gas_price_wei_for(debt_eth, &config);
            assert_eq!(gas_price, expected_wei, "mismatch for debt_eth={debt_eth}");
        }
    }

    #[test]
    fn debt_market_selection_ignores_input_permutation() {
        let m1 = market(1, 6, 1_000_000_000_000_000_000, 10_500);
        let m2 = market(2, 18, 1_000_000_000_000_000_000, 10_750);
        let leg1 = MarketLeg {
            market: m1.clone(),
            a_token_balance: U256::ZERO,
            variable_debt: U256::from(1_000_000_000u64),
        };
        let leg2 = MarketLeg {
            market: m2.clone(),
            a_token_balance: U256::ZERO,
            variable_debt: U256::from(1u64),
        };

        let forward = Liquidator::select_debt_market(&[leg1, leg2]).unwrap();
        let leg1b = MarketLeg {
            market: m2,
            a_token_balance: U256::ZERO,
            variable_debt: U256::from(1u64),
        };
        let leg2b = MarketLeg {
            market: m1,
            a_token_balance: U256::ZERO,
            variable_debt: U256::from(1_000_000_000u64),
        };
        let reversed = Liquidator::select_debt_market(&[leg1b, leg2b]).unwrap();

        assert_eq!(forward.0.market.asset_id, reversed.0.market.asset_id);
    }

    #[test]
    fn swap_fee_tier_classifies_stable_stable_as_lowest() {
        let stable_a = Address::repeat_byte(1);
        let stable_b = Address::repeat_byte(2);
        let mut stables = HashSet::new();
        stables.insert(stable_a);
        stables.insert(stable_b);
        let exotics = HashSet::new();
        assert_eq!(swap_fee_tier(stable_a, stable_b, &stables, &exotics), 500);
    }

    #[test]
    fn swap_fee_tier_classifies_exotic_as_highest() {
        let stables = HashSet::new();
        let mut exotics = HashSet::new();
        let exotic = Address::repeat_byte(9);
        exotics.insert(exotic);
        assert_eq!(swap_fee_tier(exotic, Address::repeat_byte(3), &stables, &exotics), 10_000);
    }

    #[test]
    fn swap_fee_tier_defaults_to_mid_tier() {
        let stables = HashSet::new();
        let exotics = HashSet::new();
        assert_eq!(
            swap_fee_tier(Address::repeat_byte(1), Address::repeat_byte(2), &stables, &exotics),
            3_000
        );
    }
}
