//! Network registry
//!
//! Known chains: an immutable built-in table plus user-added custom
//! networks persisted through the storage port. Switching the current
//! network never touches account records, it only retargets subsequent
//! balance and transaction operations.

use crate::storage::{keys, StoragePort};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Chain ID constants for the built-in networks
pub mod chains {
    pub const ETHEREUM: u64 = 1;
    pub const SEPOLIA: u64 = 11155111;
    pub const POLYGON: u64 = 137;
    pub const ARBITRUM: u64 = 42161;
}

/// Display metadata for a chain's native asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl NativeCurrency {
    pub fn eth() -> Self {
        Self {
            name: "Ether".to_string(),
            symbol: "ETH".to_string(),
            decimals: 18,
        }
    }
}

/// A known chain: identity, RPC endpoint, display metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub chain_id: u64,
    pub display_name: String,
    pub rpc_endpoint: String,
    pub native_currency: NativeCurrency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    #[serde(default)]
    pub testnet: bool,
}

/// The immutable built-in network table.
pub fn builtin_networks() -> Vec<Network> {
    vec![
        Network {
            chain_id: chains::ETHEREUM,
            display_name: "Ethereum Mainnet".to_string(),
            rpc_endpoint: "https://eth.llamarpc.com".to_string(),
            native_currency: NativeCurrency::eth(),
            explorer_url: Some("https://etherscan.io".to_string()),
            testnet: false,
        },
        Network {
            chain_id: chains::SEPOLIA,
            display_name: "Sepolia Testnet".to_string(),
            rpc_endpoint: "https://rpc.sepolia.org".to_string(),
            native_currency: NativeCurrency::eth(),
            explorer_url: Some("https://sepolia.etherscan.io".to_string()),
            testnet: true,
        },
        Network {
            chain_id: chains::POLYGON,
            display_name: "Polygon Mainnet".to_string(),
            rpc_endpoint: "https://polygon-rpc.com".to_string(),
            native_currency: NativeCurrency {
                name: "POL".to_string(),
                symbol: "POL".to_string(),
                decimals: 18,
            },
            explorer_url: Some("https://polygonscan.com".to_string()),
            testnet: false,
        },
        Network {
            chain_id: chains::ARBITRUM,
            display_name: "Arbitrum One".to_string(),
            rpc_endpoint: "https://arb1.arbitrum.io/rpc".to_string(),
            native_currency: NativeCurrency::eth(),
            explorer_url: Some("https://arbiscan.io".to_string()),
            testnet: false,
        },
    ]
}

/// Built-in plus custom networks, with a persisted "current" selection
pub struct NetworkRegistry {
    storage: Arc<dyn StoragePort>,
}

impl NetworkRegistry {
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        Self { storage }
    }

    /// All known networks: built-ins first, then custom, stable order.
    pub async fn list_all(&self) -> Result<Vec<Network>> {
        let mut all = builtin_networks();
        all.extend(self.load_custom().await?);
        Ok(all)
    }

    /// Register a user-added network.
    pub async fn add_custom(&self, network: Network) -> Result<()> {
        if network.chain_id == 0 {
            return Err(Error::InvalidParameter(
                "chain id must be a positive integer".to_string(),
            ));
        }
        let existing = self.list_all().await?;
        if existing.iter().any(|n| n.chain_id == network.chain_id) {
            return Err(Error::DuplicateChainId(network.chain_id));
        }

        let mut custom = self.load_custom().await?;
        tracing::info!(chain_id = network.chain_id, name = %network.display_name, "Adding custom network");
        custom.push(network);
        self.save_custom(&custom).await
    }

    /// Remove a custom network; built-ins are not removable and removing an
    /// unknown custom chain id is a no-op.
    pub async fn remove_custom(&self, chain_id: u64) -> Result<()> {
        if builtin_networks().iter().any(|n| n.chain_id == chain_id) {
            return Err(Error::CannotRemoveBuiltin(chain_id));
        }

        let mut custom = self.load_custom().await?;
        let before = custom.len();
        custom.retain(|n| n.chain_id != chain_id);
        if custom.len() == before {
            return Ok(());
        }
        self.save_custom(&custom).await?;

        // Re-point the selection if it referenced the removed network
        if self.selected_chain_id().await? == Some(chain_id) {
            self.storage.remove(keys::SELECTED_NETWORK).await?;
        }
        Ok(())
    }

    /// The currently selected network; defaults to the first built-in.
    pub async fn current(&self) -> Result<Network> {
        let all = self.list_all().await?;
        if let Some(chain_id) = self.selected_chain_id().await? {
            if let Some(network) = all.iter().find(|n| n.chain_id == chain_id) {
                return Ok(network.clone());
            }
            tracing::warn!(chain_id, "Selected network no longer known, using default");
        }
        Ok(all.into_iter().next().expect("built-in table is non-empty"))
    }

    /// Select the network subsequent operations target.
    pub async fn set_current(&self, chain_id: u64) -> Result<()> {
        let all = self.list_all().await?;
        if !all.iter().any(|n| n.chain_id == chain_id) {
            return Err(Error::NotFound(format!("network {chain_id}")));
        }
        self.storage
            .set(keys::SELECTED_NETWORK, &chain_id.to_string())
            .await
    }

    async fn selected_chain_id(&self) -> Result<Option<u64>> {
        Ok(self
            .storage
            .get(keys::SELECTED_NETWORK)
            .await?
            .and_then(|s| s.trim().parse().ok()))
    }

    async fn load_custom(&self) -> Result<Vec<Network>> {
        let Some(raw) = self.storage.get(keys::CUSTOM_NETWORKS).await? else {
            return Ok(Vec::new());
        };
        // Malformed custom-network state must never take the wallet down
        match serde_json::from_str(&raw) {
            Ok(list) => Ok(list),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed custom network list");
                Ok(Vec::new())
            }
        }
    }

    async fn save_custom(&self, custom: &[Network]) -> Result<()> {
        let raw = serde_json::to_string(custom)?;
        self.storage.set(keys::CUSTOM_NETWORKS, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn registry() -> NetworkRegistry {
        NetworkRegistry::new(Arc::new(MemoryStorage::new()))
    }

    fn custom(chain_id: u64) -> Network {
        Network {
            chain_id,
            display_name: format!("Chain {chain_id}"),
            rpc_endpoint: "http://localhost:8545".to_string(),
            native_currency: NativeCurrency::eth(),
            explorer_url: None,
            testnet: true,
        }
    }

    #[tokio::test]
    async fn builtins_come_first_and_default_selection() {
        let reg = registry();
        let all = reg.list_all().await.unwrap();
        assert_eq!(all[0].chain_id, chains::ETHEREUM);
        assert_eq!(reg.current().await.unwrap().chain_id, chains::ETHEREUM);
    }

    #[tokio::test]
    async fn add_select_remove_custom() {
        let reg = registry();
        reg.add_custom(custom(31337)).await.unwrap();
        assert!(reg
            .list_all()
            .await
            .unwrap()
            .iter()
            .any(|n| n.chain_id == 31337));

        reg.set_current(31337).await.unwrap();
        assert_eq!(reg.current().await.unwrap().chain_id, 31337);

        reg.remove_custom(31337).await.unwrap();
        // Selection falls back to the default once its target is gone
        assert_eq!(reg.current().await.unwrap().chain_id, chains::ETHEREUM);
        // Removing again is a no-op
        reg.remove_custom(31337).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_chain_id_rejected_registry_unchanged() {
        let reg = registry();
        let err = reg.add_custom(custom(chains::ETHEREUM)).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateChainId(1)));

        reg.add_custom(custom(777)).await.unwrap();
        let err = reg.add_custom(custom(777)).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateChainId(777)));

        let count = reg
            .list_all()
            .await
            .unwrap()
            .iter()
            .filter(|n| n.chain_id == 777)
            .count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn builtin_is_not_removable() {
        let reg = registry();
        assert!(matches!(
            reg.remove_custom(chains::POLYGON).await,
            Err(Error::CannotRemoveBuiltin(137))
        ));
    }

    #[tokio::test]
    async fn unknown_selection_is_not_found() {
        let reg = registry();
        assert!(matches!(
            reg.set_current(424242).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn malformed_custom_list_fails_closed() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(keys::CUSTOM_NETWORKS, "{not json")
            .await
            .unwrap();

        let reg = NetworkRegistry::new(storage);
        let all = reg.list_all().await.unwrap();
        assert_eq!(all.len(), builtin_networks().len());

        // Registry keeps working; a new custom network replaces the junk
        reg.add_custom(custom(555)).await.unwrap();
        assert!(reg
            .list_all()
            .await
            .unwrap()
            .iter()
            .any(|n| n.chain_id == 555));
    }
}
