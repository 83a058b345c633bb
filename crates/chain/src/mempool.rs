//! Mempool competition watchdog: the front-run defense at the heart of
//! the Liquidator (spec §4.5). Watches pending transactions for a
//! competing liquidation against the same borrower and re-signs our
//! submission at a bumped gas price, reusing the original nonce, until
//! confirmation, exhaustion, or a 30-second hard deadline.

use crate::signer::{SubmittedTx, TransactionSender};
use alloy::consensus::Transaction as _;
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::Transaction;
use anyhow::Result;
use futures::stream::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of a watchdog run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// One of our transactions confirmed successfully.
    Confirmed(B256),
    /// All of our transactions failed; none remain in flight.
    Exhausted,
    /// The 30-second hard deadline elapsed with no resolution either way.
    TimedOut,
}

/// Applies the bump ratio (default 11/10 per spec §4.5) to a competitor's
/// observed gas price.
pub fn bumped_gas_price(competitor_gas_price_wei: u128, numerator: u64, denominator: u64) -> u128 {
    competitor_gas_price_wei * numerator as u128 / denominator as u128
}

/// Returns true if `calldata` contains `borrower`'s 20 bytes (without the
/// `0x` prefix) as a substring — the spec's definition of "this pending
/// tx targets our borrower" (§4.5).
pub fn calldata_targets_borrower(calldata: &[u8], borrower: Address) -> bool {
    let needle = borrower.as_slice();
    if needle.is_empty() || calldata.len() < needle.len() {
        return false;
    }
    calldata.windows(needle.len()).any(|w| w == needle)
}

/// Watches the mempool for competing liquidation attempts against one
/// borrower and keeps our submission ahead on gas, per spec §4.5.
pub struct MempoolWatchdog {
    ws_url: String,
    sender: Arc<TransactionSender>,
    our_address: Address,
    bump_numerator: u64,
    bump_denominator: u64,
    deadline: Duration,
}

impl MempoolWatchdog {
    pub fn new(
        ws_url: impl Into<String>,
        sender: Arc<TransactionSender>,
        bump_numerator: u64,
        bump_denominator: u64,
        deadline: Duration,
    ) -> Self {
        let our_address = sender.address;
        Self {
            ws_url: ws_url.into(),
            sender,
            our_address,
            bump_numerator,
            bump_denominator,
            deadline,
        }
    }

    /// Race the mempool against competing liquidators targeting
    /// `borrower`, starting from `initial`. Returns once one of our
    /// transactions confirms, all are exhausted, or the deadline fires.
    pub async fn run(&self, borrower: Address, initial: SubmittedTx) -> Result<WatchdogOutcome> {
        let current_gas_price = std::sync::atomic::AtomicU64::new(
            (initial.gas_price_wei / 1_000_000_000).min(u64::MAX as u128) as u64,
        );
        let mut edited: Vec<SubmittedTx> = vec![initial];
        let mut edited_hashes: HashSet<B256> = edited.iter().map(|t| t.hash).collect();

        let watch = async {
            let ws = WsConnect::new(&self.ws_url);
            let provider = ProviderBuilder::new().on_ws(ws).await?;
            let sub = provider.subscribe_full_pending_transactions().await?;
            let mut stream = sub.into_stream();

            loop {
                // Check confirmation/failure of our in-flight set first.
                let mut still_pending = Vec::with_capacity(edited.len());
                for tx in &edited {
                    match self.sender.wait_for_receipt(tx.hash).await {
                        Ok(true) => {
                            info!(tx_hash = %tx.hash, borrower = %borrower, "liquidation#{:#x} confirmed", borrower);
                            return Ok(WatchdogOutcome::Confirmed(tx.hash));
                        }
                        Ok(false) => {
                            // Reverted: drop from the in-flight set.
                        }
                        Err(_) => still_pending.push(tx.clone()),
                    }
                }
                edited = still_pending;
                if edited.is_empty() {
                    return Ok(WatchdogOutcome::Exhausted);
                }

                let Some(pending_tx) = stream.next().await else {
                    return Ok(WatchdogOutcome::Exhausted);
                };

                if let Some(bumped) = self
                    .maybe_bump(&pending_tx, borrower, &current_gas_price, edited.last().unwrap())
                    .await?
                {
                    edited_hashes.insert(bumped.hash);
                    edited.push(bumped);
                }
            }
        };

        match tokio::time::timeout(self.deadline, watch).await {
            Ok(result) => result,
            Err(_) => {
                warn!(borrower = %borrower, "liquidation#{:#x} mempool watchdog hit 30s deadline", borrower);
                Ok(WatchdogOutcome::TimedOut)
            }
        }
    }

    async fn maybe_bump(
        &self,
        pending_tx: &Transaction,
        borrower: Address,
        current_gas_price: &std::sync::atomic::AtomicU64,
        latest: &SubmittedTx,
    ) -> Result<Option<SubmittedTx>> {
        use std::sync::atomic::Ordering;

        let from = pending_tx.inner.signer();
        if from == self.our_address {
            return Ok(None);
        }

        let input = pending_tx.input();
        if !calldata_targets_borrower(input, borrower) {
            return Ok(None);
        }

        let competitor_gas_price = pending_tx.gas_price().unwrap_or(0);
        let our_gas_price_wei = (current_gas_price.load(Ordering::SeqCst) as u128) * 1_000_000_000;

        if competitor_gas_price <= our_gas_price_wei {
            info!(borrower = %borrower, "still ahead of observed competitor on gas");
            return Ok(None);
        }

        let new_gas_price = bumped_gas_price(competitor_gas_price, self.bump_numerator, self.bump_denominator);
        info!(
            borrower = %borrower,
            competitor_gwei = competitor_gas_price / 1_000_000_000,
            new_gwei = new_gas_price / 1_000_000_000,
            "competing liquidation detected, bumping gas"
        );

        let rebroadcast = self.sender.rebroadcast_at_gas_price(latest, new_gas_price).await?;
        current_gas_price.store((new_gas_price / 1_000_000_000) as u64, Ordering::SeqCst);
        Ok(Some(rebroadcast))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_applies_eleven_tenths() {
        assert_eq!(bumped_gas_price(50_000_000_000, 11, 10), 55_000_000_000);
    }

    #[test]
    fn bump_floors_integer_division() {
        // 7 * 11 / 10 = 77 / 10 = 7 (floor), not 7.7 rounded.
        assert_eq!(bumped_gas_price(7, 11, 10), 7);
    }

    #[test]
    fn calldata_substring_match_is_case_exact_bytes() {
        let borrower: Address = "0x0000000000000000000000000000000000000042".parse().unwrap();
        let mut calldata = vec![0xaa, 0xbb];
        calldata.extend_from_slice(borrower.as_slice());
        calldata.extend_from_slice(&[0xcc]);
        assert!(calldata_targets_borrower(&calldata, borrower));

        let other: Address = "0x0000000000000000000000000000000000000099".parse().unwrap();
        assert!(!calldata_targets_borrower(&calldata, other));
    }
}
