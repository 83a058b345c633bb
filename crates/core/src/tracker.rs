//! Tracker (spec §4.4): owns the bounded tracked set, drives the control
//! loop, maintains invariants under concurrent RPC fan-out, applies the
//! per-account state machine, and dispatches the Liquidator on breach.

use crate::account::AccountOracle;
use crate::config::TrackingConfig;
use crate::u256_math::f64_to_wad;
use crate::watchlist::{WatchlistSet, WatchlistStore};
use alloy::primitives::{Address, U256};
use anyhow::{bail, Result};
use liquidator_api::SubgraphClient;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

/// Lifecycle state of one tracked address (spec §3 `TrackedEntry`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Tracked,
    Liquidating,
    Removed,
}

#[derive(Debug, Clone)]
pub struct TrackedEntry {
    pub address: Address,
    pub last_health_factor: U256,
    pub state: TrackState,
}

/// Outcome of one run-loop iteration, for logging and tests.
#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    pub min_health_factor: Option<U256>,
    pub size_before: usize,
    pub size_after: usize,
    pub dispatched: usize,
}

/// Pure per-entry state-machine decision (spec §4.4 run-loop step 2),
/// factored out of `Tracker::tick` so the hysteresis band and the
/// defensive-removal rule are directly testable against fixture
/// `AccountSummary` values without a live oracle.
enum EntryDecision {
    UntrackDefensively,
    Liquidate { health_factor: U256 },
    Untrack,
    KeepTracked { health_factor: U256 },
}

fn classify_entry(summary: Option<crate::account::AccountSummary>, upper_bound: U256) -> EntryDecision {
    match summary {
        None => EntryDecision::UntrackDefensively,
        Some(summary) if summary.health_factor <= crate::u256_math::WAD => EntryDecision::Liquidate {
            health_factor: summary.health_factor,
        },
        Some(summary) if summary.health_factor > upper_bound => EntryDecision::Untrack,
        Some(summary) => EntryDecision::KeepTracked {
            health_factor: summary.health_factor,
        },
    }
}

/// Bootstrap selection (spec §4.4 step 5/6): filter candidates to
/// `total_debt > min_debt` and `health_factor > WAD` (strictly above —
/// anything at or below threshold is presumed already liquidated or
/// unprofitable), sort ascending by health factor, and take the first
/// `take` entries. Factored out of `Tracker::bootstrap` for direct
/// testing against fixture summaries (spec §8 invariant 6, scenario S6).
fn select_bootstrap_candidates(
    summaries: Vec<(Address, Option<crate::account::AccountSummary>)>,
    min_debt: U256,
    take: usize,
) -> Vec<(Address, U256)> {
    let mut eligible: Vec<(Address, U256)> = summaries
        .into_iter()
        .filter_map(|(addr, summary)| {
            let summary = summary?;
            if summary.total_debt > min_debt && summary.health_factor > crate::u256_math::WAD {
                Some((addr, summary.health_factor))
            } else {
                None
            }
        })
        .collect();

    eligible.sort_by(|a, b| a.1.cmp(&b.1));
    eligible.into_iter().take(take).collect()
}

pub struct Tracker {
    oracle: Arc<AccountOracle>,
    store: Arc<WatchlistStore>,
    subgraph: Arc<SubgraphClient>,
    liquidator_tx: mpsc::Sender<Address>,
    config: TrackingConfig,
    tracked: parking_lot::RwLock<Vec<TrackedEntry>>,
}

impl Tracker {
    pub fn new(
        oracle: Arc<AccountOracle>,
        store: Arc<WatchlistStore>,
        subgraph: Arc<SubgraphClient>,
        liquidator_tx: mpsc::Sender<Address>,
        config: TrackingConfig,
    ) -> Self {
        Self {
            oracle,
            store,
            subgraph,
            liquidator_tx,
            config,
            tracked: parking_lot::RwLock::new(Vec::new()),
        }
    }

    pub fn tracked_snapshot(&self) -> Vec<TrackedEntry> {
        self.tracked.read().clone()
    }

    fn min_debt_wad(&self) -> U256 {
        f64_to_wad(self.config.min_debt_fraction)
    }

    fn upper_bound_wad(&self) -> U256 {
        f64_to_wad(self.config.upper_bound_multiplier)
    }

    /// Proper async blacklist filter (spec §9 flags the source's
    /// `filter(async a => !await isBlackListed(a))` as never awaiting its
    /// predicate and therefore admitting blacklisted addresses).
    async fn exclude_blacklisted(&self, candidates: Vec<Address>) -> Result<Vec<Address>> {
        let mut kept = Vec::with_capacity(candidates.len());
        for addr in candidates {
            if !self.store.sismember(WatchlistSet::Blacklist, addr).await? {
                kept.push(addr);
            }
        }
        Ok(kept)
    }

    /// Bootstrap (spec §4.4): load tracked set from the store if already
    /// full; otherwise enumerate candidates, evaluate them, and fill the
    /// remaining slots with the lowest health factors above threshold.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<()> {
        let restored = self.store.smembers(WatchlistSet::Tracked).await?;
        let restored = self.exclude_blacklisted(restored).await?;
        if restored.len() >= self.config.k {
            info!(count = restored.len(), "Tracked set restored from store at capacity");
            let entries = self.seed_entries(restored).await;
            *self.tracked.write() = entries;
            return Ok(());
        }

        let mut candidates = self.store.smembers(WatchlistSet::AllKnown).await?;
        if candidates.is_empty() {
            info!("AllKnown empty, enumerating borrowers via subgraph");
            candidates = self.subgraph.fetch_all_borrowers().await?;
            if candidates.is_empty() {
                bail!("subgraph returned no borrowers; cannot bootstrap an empty candidate set");
            }
            self.store.sadd(WatchlistSet::AllKnown, &candidates).await?;
        }

        let candidates = self.exclude_blacklisted(candidates).await?;

        let summaries = self
            .oracle
            .get_account_summaries_batch(&candidates, self.config.bootstrap_width)
            .await;

        let min_debt = self.min_debt_wad();
        let take = self.config.k.saturating_sub(restored.len());
        let selected = select_bootstrap_candidates(summaries, min_debt, take);

        let mut entries = self.seed_entries(restored).await;
        let selected_addrs: Vec<Address> = selected.iter().map(|(a, _)| *a).collect();
        entries.extend(selected.into_iter().map(|(address, hf)| TrackedEntry {
            address,
            last_health_factor: hf,
            state: TrackState::Tracked,
        }));

        self.store.sadd(WatchlistSet::Tracked, &selected_addrs).await?;

        info!(
            selected = selected_addrs.len(),
            total_tracked = entries.len(),
            "Bootstrap complete"
        );
        *self.tracked.write() = entries;
        Ok(())
    }

    async fn seed_entries(&self, addresses: Vec<Address>) -> Vec<TrackedEntry> {
        let summaries = self
            .oracle
            .get_account_summaries_batch(&addresses, self.config.bootstrap_width)
            .await;
        summaries
            .into_iter()
            .map(|(address, summary)| TrackedEntry {
                address,
                last_health_factor: summary.map(|s| s.health_factor).unwrap_or(U256::ZERO),
                state: TrackState::Tracked,
            })
            .collect()
    }

    /// One run-loop iteration (spec §4.4). Iterations must be called
    /// sequentially; the tracked set is read once at the start and
    /// replaced wholesale at the end.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickReport> {
        let before = self.tracked.read().clone();
        let addresses: Vec<Address> = before.iter().map(|e| e.address).collect();
        let size_before = before.len();

        let summaries = self
            .oracle
            .get_account_summaries_batch(&addresses, addresses.len().max(1))
            .await;
        let summary_by_address: std::collections::HashMap<Address, _> = summaries.into_iter().collect();

        let upper_bound = self.upper_bound_wad();
        let mut retained = Vec::with_capacity(before.len());
        let mut removed = Vec::new();
        let mut dispatched = 0usize;
        let mut min_health_factor: Option<U256> = None;

        for entry in before {
            let summary = summary_by_address.get(&entry.address).and_then(|s| *s);
            match classify_entry(summary, upper_bound) {
                EntryDecision::UntrackDefensively => {
                    warn!(address = %entry.address, "account summary unavailable, untracking defensively");
                    removed.push(entry.address);
                }
                EntryDecision::Liquidate { health_factor } => {
                    info!(address = %entry.address, health_factor = %health_factor, "health factor breached, dispatching liquidator");
                    if self.liquidator_tx.try_send(entry.address).is_err() {
                        warn!(address = %entry.address, "liquidator dispatch queue full or closed, dropping dispatch");
                    } else {
                        dispatched += 1;
                    }
                    removed.push(entry.address);
                }
                EntryDecision::Untrack => {
                    removed.push(entry.address);
                }
                EntryDecision::KeepTracked { health_factor } => {
                    min_health_factor = Some(match min_health_factor {
                        Some(min) => crate::u256_math::min(min, health_factor),
                        None => health_factor,
                    });
                    retained.push(TrackedEntry {
                        address: entry.address,
                        last_health_factor: health_factor,
                        state: TrackState::Tracked,
                    });
                }
            }
        }

        if !removed.is_empty() {
            self.store.srem(WatchlistSet::Tracked, &removed).await?;
        }

        let size_after = retained.len();
        *self.tracked.write() = retained;

        info!(size_before, size_after, dispatched, ?min_health_factor, "tick complete");

        Ok(TickReport {
            min_health_factor,
            size_before,
            size_after,
            dispatched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upper_bound_matches_spec_default() {
        let config = TrackingConfig::default();
        assert_eq!(config.upper_bound_multiplier, 1.01);
    }

    #[test]
    fn min_debt_fraction_matches_spec_default() {
        let config = TrackingConfig::default();
        assert_eq!(config.min_debt_fraction, 1e-4);
    }

    fn summary(hf: U256) -> crate::account::AccountSummary {
        crate::account::AccountSummary {
            total_collateral: U256::from(1000u64) * crate::u256_math::WAD,
            total_debt: U256::from(500u64) * crate::u256_math::WAD,
            available_borrow: U256::ZERO,
            current_liquidation_threshold: U256::from(8_000u64),
            health_factor: hf,
        }
    }

    fn upper_bound() -> U256 {
        f64_to_wad(1.01)
    }

    /// S1 — untrack-on-heal: health_factor = 1.02e18 crosses the 1.01
    /// hysteresis band and is untracked.
    #[test]
    fn s1_untracks_on_heal_above_upper_bound() {
        let hf = f64_to_wad(1.02);
        let decision = classify_entry(Some(summary(hf)), upper_bound());
        assert!(matches!(decision, EntryDecision::Untrack));
    }

    /// S3 — hysteresis: health_factor = 1.005e18 stays inside the band on
    /// every one of 5 consecutive ticks.
    #[test]
    fn s3_hysteresis_keeps_tracked_across_repeated_ticks() {
        let hf = f64_to_wad(1.005);
        for _ in 0..5 {
            let decision = classify_entry(Some(summary(hf)), upper_bound());
            assert!(matches!(decision, EntryDecision::KeepTracked { health_factor } if health_factor == hf));
        }
    }

    /// S4 — transient RPC: a `None` summary is removed defensively, not
    /// liquidated and not silently kept.
    #[test]
    fn s4_transient_rpc_failure_untracks_defensively() {
        let decision = classify_entry(None, upper_bound());
        assert!(matches!(decision, EntryDecision::UntrackDefensively));
    }

    /// S2-adjacent: health_factor = 0.99e18 (at or below the WAD
    /// boundary) dispatches exactly the Liquidate decision, never Untrack
    /// or KeepTracked.
    #[test]
    fn breach_at_or_below_wad_dispatches_liquidation() {
        let hf = U256::from(99u64) * crate::u256_math::WAD / U256::from(100u64);
        let decision = classify_entry(Some(summary(hf)), upper_bound());
        assert!(matches!(decision, EntryDecision::Liquidate { health_factor } if health_factor == hf));
    }

    #[test]
    fn breach_exactly_at_wad_dispatches_liquidation() {
        let decision = classify_entry(Some(summary(crate::u256_math::WAD)), upper_bound());
        assert!(matches!(decision, EntryDecision::Liquidate { .. }));
    }

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn eligible_summary(debt_wad: u64, hf: U256) -> crate::account::AccountSummary {
        crate::account::AccountSummary {
            total_collateral: U256::ZERO,
            total_debt: U256::from(debt_wad) * crate::u256_math::WAD,
            available_borrow: U256::ZERO,
            current_liquidation_threshold: U256::from(8_000u64),
            health_factor: hf,
        }
    }

    /// S6 — bootstrap size cap: 10000 candidates, K=200, only candidates
    /// passing `total_debt > 1e14` (1e-4 of a 1e18 numéraire) and
    /// `health_factor > 1e18` are eligible; exactly 200 are selected,
    /// sorted ascending by health factor.
    #[test]
    fn s6_bootstrap_caps_at_k_sorted_ascending_by_health_factor() {
        let min_debt = f64_to_wad(1e-4);
        let mut summaries: Vec<(Address, Option<crate::account::AccountSummary>)> = Vec::new();
        for i in 0..10_000u32 {
            let mut bytes = [0u8; 20];
            bytes[16..20].copy_from_slice(&i.to_be_bytes());
            let addr = Address::from(bytes);
            let hf = crate::u256_math::WAD + U256::from(i + 1);
            summaries.push((addr, Some(eligible_summary(1, hf))));
        }
        let selected = select_bootstrap_candidates(summaries, min_debt, 200);
        assert_eq!(selected.len(), 200);
        for pair in selected.windows(2) {
            assert!(pair[0].1 <= pair[1].1, "selection must be sorted ascending by health factor");
        }
        for (_, hf) in &selected {
            assert!(*hf > crate::u256_math::WAD);
        }
    }

    #[test]
    fn bootstrap_selection_excludes_insufficient_debt_and_already_liquidatable() {
        let min_debt = f64_to_wad(1e-4);
        let summaries = vec![
            (addr(1), Some(eligible_summary(1, crate::u256_math::WAD + U256::from(1u64)))),
            (addr(2), Some(eligible_summary(0, crate::u256_math::WAD + U256::from(1u64)))), // zero debt
            (addr(3), Some(eligible_summary(1, crate::u256_math::WAD))),                    // already at threshold
            (addr(4), None),                                                                // transient failure
        ];
        let selected = select_bootstrap_candidates(summaries, min_debt, 200);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, addr(1));
    }
}
