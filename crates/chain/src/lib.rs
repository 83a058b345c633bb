//! Chain interaction layer for the liquidation agent.
//!
//! - `contracts`: typed ABI bindings for `LendingPool`, `ProtocolDataProvider`,
//!   `PriceOracle`, and the on-chain `LiquidatorForAave` wrapper.
//! - `provider`: the read-only chain client backing the Market Catalog and
//!   Account Oracle (spec §4.1, §4.2).
//! - `signer`: cached-nonce transaction submission, including same-nonce
//!   re-broadcast for the mempool watchdog.
//! - `mempool`: the front-run defense — observes competing liquidations and
//!   bumps gas to stay ahead (spec §4.5).

mod contracts;
mod mempool;
mod provider;
mod signer;

pub use contracts::{ILiquidatorForAave, LiquidatorContract};
pub use mempool::{bumped_gas_price, calldata_targets_borrower, MempoolWatchdog, WatchdogOutcome};
pub use provider::{AccountDataRaw, ChainReader, PositionLegRaw, ReserveSnapshot, UpstreamError};
pub use signer::{NonceManager, SubmittedTx, TransactionSender};
