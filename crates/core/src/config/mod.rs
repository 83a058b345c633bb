//! Configuration system for the liquidation bot.
//!
//! This module provides:
//! - Bot runtime configuration (profiles, tracking/watchdog/liquidation
//!   tunables left as design choices by the spec)
//! - Deployment configuration (the required environment surface: RPC,
//!   signing key, contract addresses, subgraph, Watchlist Store backing)

mod bot;
mod deployment;

pub use bot::{config, init_config, BotConfig, LiquidationConfig, TrackingConfig, WatchdogConfig};
pub use deployment::DeploymentConfig;
