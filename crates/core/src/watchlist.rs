//! Watchlist Store (spec §4.3): durable set-of-strings KV backing the
//! `AllKnown`/`Tracked`/`Blacklist` sets plus a reserved per-address blob
//! slot. Backed by Redis — set membership persists across restarts, the
//! store is exclusively owned by one process (spec §5), and every call
//! is awaited to completion before acknowledging so a crash mid-tick
//! cannot silently drop a removal.

use alloy::primitives::Address;
use redis::AsyncCommands;

const ALL_KNOWN_KEY: &str = "AAVE#allAccounts";
const TRACKED_KEY: &str = "AAVE#accountToTrack";
const BLACKLIST_KEY: &str = "AAVE#blacklist";

fn blob_key(address: Address) -> String {
    format!("AAVE#{}", lowercase_hex(address))
}

fn lowercase_hex(address: Address) -> String {
    format!("{address:#x}")
}

/// The three named sets (spec §3 `Watchlist`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchlistSet {
    AllKnown,
    Tracked,
    Blacklist,
}

impl WatchlistSet {
    fn key(self) -> &'static str {
        match self {
            WatchlistSet::AllKnown => ALL_KNOWN_KEY,
            WatchlistSet::Tracked => TRACKED_KEY,
            WatchlistSet::Blacklist => BLACKLIST_KEY,
        }
    }
}

/// Store-level failures are fatal to the process (spec §7: "Store
/// corruption / unreachable KV: fatal").
#[derive(Debug, thiserror::Error)]
pub enum WatchlistError {
    #[error("watchlist store unreachable: {0}")]
    Unreachable(#[from] redis::RedisError),
}

pub struct WatchlistStore {
    client: redis::Client,
}

impl WatchlistStore {
    pub fn new(redis_url: &str) -> Result<Self, WatchlistError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, WatchlistError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn smembers(&self, set: WatchlistSet) -> Result<Vec<Address>, WatchlistError> {
        let mut conn = self.conn().await?;
        let raw: Vec<String> = conn.smembers(set.key()).await?;
        Ok(raw.iter().filter_map(|s| s.parse().ok()).collect())
    }

    pub async fn sadd(&self, set: WatchlistSet, items: &[Address]) -> Result<(), WatchlistError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let encoded: Vec<String> = items.iter().map(|a| lowercase_hex(*a)).collect();
        let _: () = conn.sadd(set.key(), encoded).await?;
        Ok(())
    }

    pub async fn srem(&self, set: WatchlistSet, items: &[Address]) -> Result<(), WatchlistError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let encoded: Vec<String> = items.iter().map(|a| lowercase_hex(*a)).collect();
        let _: () = conn.srem(set.key(), encoded).await?;
        Ok(())
    }

    pub async fn sismember(&self, set: WatchlistSet, item: Address) -> Result<bool, WatchlistError> {
        let mut conn = self.conn().await?;
        Ok(conn.sismember(set.key(), lowercase_hex(item)).await?)
    }

    /// Reserved per-address JSON blob slot; not read by the core loop
    /// today (spec §4.3), kept for a future balance cache.
    pub async fn set_blob(&self, address: Address, json: &str) -> Result<(), WatchlistError> {
        let mut conn = self.conn().await?;
        let _: () = conn.set(blob_key(address), json).await?;
        Ok(())
    }

    pub async fn get_blob(&self, address: Address) -> Result<Option<String>, WatchlistError> {
        let mut conn = self.conn().await?;
        Ok(conn.get(blob_key(address)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn blob_key_is_lowercase_prefixed() {
        let addr = Address::from_str("0xAbCdEf0000000000000000000000000000000001").unwrap();
        assert_eq!(blob_key(addr), format!("AAVE#{}", lowercase_hex(addr)));
        assert!(blob_key(addr).starts_with("AAVE#0x"));
        assert_eq!(blob_key(addr), blob_key(addr).to_lowercase());
    }

    #[test]
    fn set_keys_match_spec_names() {
        assert_eq!(WatchlistSet::AllKnown.key(), "AAVE#allAccounts");
        assert_eq!(WatchlistSet::Tracked.key(), "AAVE#accountToTrack");
        assert_eq!(WatchlistSet::Blacklist.key(), "AAVE#blacklist");
    }
}
