//! Transaction signer and sender for liquidation submissions.
//!
//! Keeps the teacher's cached-nonce pattern (`NonceManager`) since the
//! mempool watchdog's gas-bump race depends on reusing exactly the same
//! nonce across re-broadcasts (spec §4.5): only the highest-fee tx for
//! that nonce is ever mined.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Cached nonce manager. Avoids an RPC round-trip per submission and
/// guarantees every bumped re-broadcast of one liquidation attempt keeps
/// the same nonce.
pub struct NonceManager {
    current: AtomicU64,
}

impl NonceManager {
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_nonce),
        }
    }

    /// Allocate the next nonce for a brand-new submission.
    #[inline]
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst)
    }

    /// Read the current nonce without allocating (used to reuse the
    /// nonce of an in-flight liquidation across gas bumps).
    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn sync(&self, chain_nonce: u64) {
        let current = self.current.load(Ordering::SeqCst);
        if chain_nonce > current {
            self.current.store(chain_nonce, Ordering::SeqCst);
        }
    }
}

/// A submitted (or re-signed) transaction, identified by the `{to, nonce}`
/// pair so the mempool watchdog can build a strictly-higher-gas
/// replacement against the exact same on-chain slot.
#[derive(Debug, Clone)]
pub struct SubmittedTx {
    pub hash: B256,
    pub nonce: u64,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price_wei: u128,
    pub chain_id: u64,
}

/// Transaction sender: holds the signing key and submits legacy
/// (non-EIP-1559) transactions at a caller-specified gas price, per the
/// spec's gas-price formula (§4.5) which produces a single `gas_price`,
/// not a base-fee/tip pair.
pub struct TransactionSender {
    rpc_url: String,
    wallet: EthereumWallet,
    pub address: Address,
    chain_id: u64,
    nonce_manager: NonceManager,
}

impl TransactionSender {
    pub async fn new(private_key: &str, rpc_url: &str, chain_id: u64) -> Result<Self> {
        let key_str = private_key.trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str.parse()?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
        let initial_nonce = provider.get_transaction_count(address).await?;
        let nonce_manager = NonceManager::new(initial_nonce);

        info!(
            address = %address,
            chain_id = chain_id,
            initial_nonce = initial_nonce,
            "Transaction sender initialized with cached nonce"
        );

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            wallet,
            address,
            chain_id,
            nonce_manager,
        })
    }

    #[cfg(test)]
    pub fn dummy_for_encoding_tests() -> Self {
        let signer = PrivateKeySigner::random();
        let address = signer.address();
        Self {
            rpc_url: "http://127.0.0.1:1".to_string(),
            wallet: EthereumWallet::from(signer),
            address,
            chain_id: 137,
            nonce_manager: NonceManager::new(0),
        }
    }

    /// Submit a brand-new transaction (fresh nonce) at a given gas price.
    pub async fn send_transaction_at_gas_price(
        &self,
        to: Address,
        calldata: Bytes,
        gas_price_wei: u128,
        gas_limit: u64,
    ) -> Result<SubmittedTx> {
        let nonce = self.nonce_manager.next();
        self.sign_and_broadcast(to, calldata, U256::ZERO, nonce, gas_price_wei, gas_limit)
            .await
    }

    /// Re-sign and re-broadcast an existing submission at a strictly
    /// higher gas price, reusing `{to, nonce, data, value}` exactly, per
    /// the mempool watchdog's gas-bump rule (spec §4.5).
    pub async fn rebroadcast_at_gas_price(
        &self,
        prior: &SubmittedTx,
        new_gas_price_wei: u128,
    ) -> Result<SubmittedTx> {
        self.sign_and_broadcast(
            prior.to,
            prior.data.clone(),
            prior.value,
            prior.nonce,
            new_gas_price_wei,
            prior.gas_limit,
        )
        .await
    }

    async fn sign_and_broadcast(
        &self,
        to: Address,
        calldata: Bytes,
        value: U256,
        nonce: u64,
        gas_price_wei: u128,
        gas_limit: u64,
    ) -> Result<SubmittedTx> {
        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata.clone())
            .with_value(value)
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price_wei)
            .with_chain_id(self.chain_id);

        debug!(
            to = %to,
            nonce = nonce,
            gas_price_gwei = gas_price_wei / 1_000_000_000,
            gas_limit = gas_limit,
            "Signing and broadcasting transaction"
        );

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.parse()?);

        let pending = provider.send_transaction(tx).await?;
        let hash = *pending.tx_hash();

        info!(tx_hash = %hash, nonce = nonce, gas_price_gwei = gas_price_wei / 1_000_000_000, "Transaction broadcast");

        Ok(SubmittedTx {
            hash,
            nonce,
            to,
            data: calldata,
            value,
            gas_limit,
            gas_price_wei,
            chain_id: self.chain_id,
        })
    }

    /// Wait for one specific transaction hash to confirm or revert.
    /// Used by the mempool watchdog to detect completion of whichever
    /// bumped re-broadcast ultimately lands.
    pub async fn wait_for_receipt(&self, tx_hash: B256) -> Result<bool> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let receipt = provider.get_transaction_receipt(tx_hash).await?;
        match receipt {
            Some(r) => Ok(r.status()),
            None => anyhow::bail!("no receipt yet for {tx_hash}"),
        }
    }

    pub async fn sync_nonce(&self) {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse().unwrap());
        match provider.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                self.nonce_manager.sync(chain_nonce);
                debug!(nonce = chain_nonce, "Nonce synced from chain");
            }
            Err(e) => {
                warn!(error = %e, "Failed to sync nonce from chain");
            }
        }
    }

    pub fn current_nonce(&self) -> u64 {
        self.nonce_manager.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_manager_allocates_sequentially() {
        let manager = NonceManager::new(10);
        assert_eq!(manager.next(), 10);
        assert_eq!(manager.next(), 11);
        assert_eq!(manager.current(), 12);
    }

    #[test]
    fn nonce_manager_sync_never_decreases() {
        let manager = NonceManager::new(10);
        manager.sync(15);
        assert_eq!(manager.current(), 15);
        manager.sync(10);
        assert_eq!(manager.current(), 15);
    }
}
