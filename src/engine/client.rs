//! Chain RPC collaborator interface
//!
//! The engine talks to the chain through [`ChainClient`]: a handful of
//! fallible, possibly-slow remote calls. [`RpcChainClient`] implements it
//! over an HTTP JSON-RPC provider for whichever network is currently
//! selected; tests substitute their own implementation.

use crate::networks::Network;
use crate::{Error, Result};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

/// Confirmation data extracted from a transaction receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptInfo {
    /// Whether execution succeeded (reverts report `false`)
    pub success: bool,
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

/// What the engine needs from a chain endpoint
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    async fn get_balance(&self, address: Address) -> Result<U256>;

    /// Pending-inclusive transaction count, used as the next nonce.
    async fn get_nonce(&self, address: Address) -> Result<u64>;

    async fn gas_price(&self) -> Result<u128>;

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64>;

    /// Broadcast a signed transaction; returns the chain-assigned hash.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256>;

    /// `None` while the transaction is not yet mined.
    async fn get_receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>>;
}

/// HTTP JSON-RPC implementation of [`ChainClient`]
pub struct RpcChainClient {
    rpc_url: String,
    chain_id: u64,
}

impl RpcChainClient {
    pub fn new(rpc_url: String, chain_id: u64) -> Self {
        Self { rpc_url, chain_id }
    }

    /// Client targeting a registered network's RPC endpoint.
    pub fn from_network(network: &Network) -> Self {
        Self::new(network.rpc_endpoint.clone(), network.chain_id)
    }

    fn provider(&self) -> Result<DynProvider> {
        let url: url::Url = self
            .rpc_url
            .parse()
            .map_err(|e| Error::Rpc(format!("invalid RPC URL: {e}")))?;
        Ok(ProviderBuilder::new().connect_http(url).erased())
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        self.provider()?
            .get_balance(address)
            .await
            .map_err(|e| Error::Rpc(format!("get_balance: {e}")))
    }

    async fn get_nonce(&self, address: Address) -> Result<u64> {
        self.provider()?
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(|e| Error::Rpc(format!("get_transaction_count: {e}")))
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider()?
            .get_gas_price()
            .await
            .map_err(|e| Error::Rpc(format!("gas_price: {e}")))
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        self.provider()?
            .estimate_gas(tx.clone())
            .await
            .map_err(|e| Error::Rpc(format!("estimate_gas: {e}")))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        let pending = self
            .provider()?
            .send_raw_transaction(raw)
            .await
            .map_err(|e| Error::Rpc(format!("send_raw_transaction: {e}")))?;
        Ok(*pending.tx_hash())
    }

    async fn get_receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>> {
        let receipt = self
            .provider()?
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| Error::Rpc(format!("get_transaction_receipt: {e}")))?;

        Ok(receipt.map(|r| ReceiptInfo {
            success: r.status(),
            gas_used: r.gas_used,
            effective_gas_price: r.effective_gas_price,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks::builtin_networks;

    #[test]
    fn client_targets_the_network_endpoint() {
        let mainnet = &builtin_networks()[0];
        let client = RpcChainClient::from_network(mainnet);
        assert_eq!(client.chain_id(), 1);
        assert_eq!(client.rpc_url, mainnet.rpc_endpoint);
    }

    #[tokio::test]
    async fn invalid_rpc_url_surfaces_as_rpc_error() {
        let client = RpcChainClient::new("not a url".to_string(), 1);
        let err = client.get_balance(Address::ZERO).await.unwrap_err();
        assert!(matches!(err, Error::Rpc(_)));
    }
}
