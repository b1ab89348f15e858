//! Wallet store
//!
//! The persisted account collection plus the "currently selected account"
//! pointer. Every mutation is a read-modify-write-persist sequence against
//! the storage port, serialised by an in-process lock; the persisted value
//! is the source of truth, so a second context (another tab) sharing the
//! same storage observes every change through the port's subscription.
//!
//! Secrets enter encrypted (via the vault) and leave only through the
//! short-lived decrypt-use-discard paths `export_private_key` and
//! `signer_for`.

use crate::keys::{self, DerivedKey};
use crate::storage::{keys as storage_keys, StoragePort};
use crate::vault::{CipherBlob, SecretVault};
use crate::{Error, Result};
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

/// How an account's signing capability is provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountKind {
    /// Imported or generated raw private key, held encrypted
    PrivateKey,
    /// Derived from a BIP-39 mnemonic; the derived key is held encrypted
    Mnemonic,
    /// Delegated to an external signer; no local secret
    External,
}

/// A persisted account record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub display_name: String,
    pub kind: AccountKind,
    pub address: Address,
    /// Ciphertext of the private key; absent for external accounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_secret: Option<CipherBlob>,
    /// BIP-44 path, recorded for mnemonic-derived accounts only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// EIP-55 checksummed address string
    pub fn checksummed(&self) -> String {
        self.address.to_checksum(None)
    }
}

/// Maximum accounts derivable from one mnemonic in a single call
pub const MAX_MNEMONIC_ACCOUNTS: u32 = 10;

/// The account collection and selection pointer, backed by a storage port
pub struct WalletStore {
    storage: Arc<dyn StoragePort>,
    vault: SecretVault,
    write_lock: Mutex<()>,
}

impl WalletStore {
    pub fn new(storage: Arc<dyn StoragePort>, vault: SecretVault) -> Self {
        Self {
            storage,
            vault,
            write_lock: Mutex::new(()),
        }
    }

    /// Change notifications for this store's persisted state (and anything
    /// else another context writes through the same storage).
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.storage.subscribe()
    }

    /// Generate a fresh key pair and add it as a new account.
    pub async fn create_account(&self, name: &str, password: &SecretString) -> Result<Account> {
        let derived = keys::generate_private_key();
        self.insert(derived, AccountKind::PrivateKey, name, password)
            .await
    }

    /// Import an account from a raw private key.
    pub async fn import_private_key(
        &self,
        key_hex: &str,
        name: &str,
        password: &SecretString,
    ) -> Result<Account> {
        let derived = keys::derive_from_private_key(key_hex)?;
        self.insert(derived, AccountKind::PrivateKey, name, password)
            .await
    }

    /// Import the account at `index` of a BIP-39 mnemonic.
    pub async fn import_mnemonic(
        &self,
        phrase: &str,
        name: &str,
        password: &SecretString,
        index: u32,
    ) -> Result<Account> {
        let derived = keys::derive_from_mnemonic(phrase, index)?;
        self.insert(derived, AccountKind::Mnemonic, name, password)
            .await
    }

    /// Derive `count` sequential accounts (indices `0..count`) from one
    /// mnemonic. All derivation and duplicate checks happen before anything
    /// is persisted, so a failure leaves the collection untouched.
    pub async fn accounts_from_mnemonic(
        &self,
        phrase: &str,
        base_name: &str,
        count: u32,
        password: &SecretString,
    ) -> Result<Vec<Account>> {
        if count == 0 || count > MAX_MNEMONIC_ACCOUNTS {
            return Err(Error::InvalidParameter(format!(
                "account count must be between 1 and {MAX_MNEMONIC_ACCOUNTS}, got {count}"
            )));
        }

        let mut derived = Vec::with_capacity(count as usize);
        for index in 0..count {
            derived.push(keys::derive_from_mnemonic(phrase, index)?);
        }

        let _guard = self.write_lock.lock().await;
        let mut accounts = self.load_accounts().await?;

        for d in &derived {
            if accounts
                .iter()
                .any(|a| a.address == d.address() && a.kind == AccountKind::Mnemonic)
            {
                return Err(Error::DuplicateAccount(d.checksummed()));
            }
        }

        let mut created = Vec::with_capacity(derived.len());
        for (index, d) in derived.iter().enumerate() {
            let record = self.build_record(
                d,
                AccountKind::Mnemonic,
                &format!("{base_name}-{index}"),
                password,
            )?;
            accounts.push(record.clone());
            created.push(record);
        }

        self.save_accounts(&accounts).await?;
        self.ensure_selection(&accounts, created.first().map(|a| a.id))
            .await?;

        tracing::info!(count = created.len(), "Derived accounts from mnemonic");
        Ok(created)
    }

    /// Register an external/delegated account by its reported address.
    pub async fn connect_external(&self, name: &str, address: &str) -> Result<Account> {
        let address = Address::from_str(address)
            .map_err(|e| Error::InvalidParameter(format!("address: {e}")))?;

        let _guard = self.write_lock.lock().await;
        let mut accounts = self.load_accounts().await?;
        if accounts
            .iter()
            .any(|a| a.address == address && a.kind == AccountKind::External)
        {
            return Err(Error::DuplicateAccount(address.to_checksum(None)));
        }

        let record = Account {
            id: Uuid::new_v4(),
            display_name: name.to_string(),
            kind: AccountKind::External,
            address,
            encrypted_secret: None,
            derivation_path: None,
            created_at: Utc::now(),
        };
        accounts.push(record.clone());
        self.save_accounts(&accounts).await?;
        self.ensure_selection(&accounts, Some(record.id)).await?;

        tracing::info!(address = %record.checksummed(), "Connected external account");
        Ok(record)
    }

    /// Rename an account; the label is non-unique and freely mutable.
    pub async fn rename_account(&self, id: Uuid, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut accounts = self.load_accounts().await?;
        let account = accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::NotFound(format!("account {id}")))?;
        account.display_name = name.to_string();
        self.save_accounts(&accounts).await
    }

    /// Remove an account. Removing an unknown id is a no-op; removing the
    /// selected account clears the selection.
    pub async fn remove_account(&self, id: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut accounts = self.load_accounts().await?;
        let before = accounts.len();
        accounts.retain(|a| a.id != id);
        if accounts.len() == before {
            return Ok(());
        }
        self.save_accounts(&accounts).await?;

        if self.selected_id().await? == Some(id) {
            self.storage.remove(storage_keys::SELECTED_ACCOUNT).await?;
        }
        tracing::info!(%id, "Removed account");
        Ok(())
    }

    /// Point the selection at an existing account.
    pub async fn select_account(&self, id: Uuid) -> Result<()> {
        let accounts = self.load_accounts().await?;
        if !accounts.iter().any(|a| a.id == id) {
            return Err(Error::NotFound(format!("account {id}")));
        }
        self.storage
            .set(storage_keys::SELECTED_ACCOUNT, &id.to_string())
            .await
    }

    /// The currently selected account, if any.
    pub async fn selected(&self) -> Result<Option<Account>> {
        let Some(id) = self.selected_id().await? else {
            return Ok(None);
        };
        // A stale pointer (e.g. removed by another context) reads as none
        Ok(self.load_accounts().await?.into_iter().find(|a| a.id == id))
    }

    /// All accounts in insertion order.
    pub async fn list(&self) -> Result<Vec<Account>> {
        self.load_accounts().await
    }

    /// Decrypt and return an account's private key (password required).
    pub async fn export_private_key(&self, id: Uuid, password: &SecretString) -> Result<SecretString> {
        let blob = self.secret_blob(id).await?;
        self.vault.decrypt(&blob, password)
    }

    /// Decrypt an account's key into a signer for one signing operation.
    ///
    /// The plaintext key lives only inside this call; callers drop the
    /// signer as soon as the signature is produced.
    pub async fn signer_for(&self, id: Uuid, password: &SecretString) -> Result<PrivateKeySigner> {
        let blob = self.secret_blob(id).await?;
        let key_hex = self.vault.decrypt(&blob, password)?;
        let stripped = key_hex
            .expose_secret()
            .strip_prefix("0x")
            .unwrap_or(key_hex.expose_secret());
        PrivateKeySigner::from_str(stripped).map_err(|e| Error::Signer(e.to_string()))
    }

    async fn secret_blob(&self, id: Uuid) -> Result<CipherBlob> {
        let accounts = self.load_accounts().await?;
        let account = accounts
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::NotFound(format!("account {id}")))?;
        account.encrypted_secret.clone().ok_or_else(|| {
            Error::InvalidParameter("external account holds no local secret".to_string())
        })
    }

    async fn insert(
        &self,
        derived: DerivedKey,
        kind: AccountKind,
        name: &str,
        password: &SecretString,
    ) -> Result<Account> {
        let _guard = self.write_lock.lock().await;
        let mut accounts = self.load_accounts().await?;
        if accounts
            .iter()
            .any(|a| a.address == derived.address() && a.kind == kind)
        {
            return Err(Error::DuplicateAccount(derived.checksummed()));
        }

        let record = self.build_record(&derived, kind, name, password)?;
        accounts.push(record.clone());
        self.save_accounts(&accounts).await?;
        self.ensure_selection(&accounts, Some(record.id)).await?;

        tracing::info!(address = %record.checksummed(), kind = ?kind, "Added account");
        Ok(record)
    }

    fn build_record(
        &self,
        derived: &DerivedKey,
        kind: AccountKind,
        name: &str,
        password: &SecretString,
    ) -> Result<Account> {
        // key_hex is zeroized when this scope ends
        let key_hex = derived.key_hex();
        let encrypted = self.vault.encrypt(&key_hex, password)?;

        Ok(Account {
            id: Uuid::new_v4(),
            display_name: name.to_string(),
            kind,
            address: derived.address(),
            encrypted_secret: Some(encrypted),
            derivation_path: derived.path().map(str::to_string),
            created_at: Utc::now(),
        })
    }

    /// First account added to an empty wallet becomes the selection.
    async fn ensure_selection(&self, accounts: &[Account], candidate: Option<Uuid>) -> Result<()> {
        let current = self.selected_id().await?;
        let still_valid = current.is_some_and(|id| accounts.iter().any(|a| a.id == id));
        if !still_valid {
            if let Some(id) = candidate {
                self.storage
                    .set(storage_keys::SELECTED_ACCOUNT, &id.to_string())
                    .await?;
            }
        }
        Ok(())
    }

    async fn selected_id(&self) -> Result<Option<Uuid>> {
        Ok(self
            .storage
            .get(storage_keys::SELECTED_ACCOUNT)
            .await?
            .and_then(|s| Uuid::parse_str(s.trim()).ok()))
    }

    async fn load_accounts(&self) -> Result<Vec<Account>> {
        let Some(raw) = self.storage.get(storage_keys::ACCOUNTS).await? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw)
            .map_err(|e| Error::Storage(format!("corrupt account collection: {e}")))
    }

    async fn save_accounts(&self, accounts: &[Account]) -> Result<()> {
        let raw = serde_json::to_string(accounts)?;
        self.storage.set(storage_keys::ACCOUNTS, &raw).await
    }
}
