//! Core liquidation control loop: market catalog, account reads,
//! durable watchlist, tracker state machine, and liquidator.

mod account;
pub mod config;
mod liquidator;
mod market;
mod tracker;
pub mod u256_math;
mod watchlist;

pub use account::{AccountOracle, AccountSummary, PositionLeg};
pub use config::{config, init_config, BotConfig, DeploymentConfig};
pub use liquidator::{LiquidationArtifact, LiquidationPlan, Liquidator};
pub use market::{Market, MarketCatalog};
pub use tracker::{TickReport, TrackState, Tracker, TrackedEntry};
pub use watchlist::{WatchlistError, WatchlistSet, WatchlistStore};
