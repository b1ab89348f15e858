//! Transaction signing variants
//!
//! The engine signs through [`TransferSigner`], which is either a locally
//! held key (decrypted by the store immediately before the call and dropped
//! right after) or a delegate implementing [`ExternalSigner`]. The external
//! path never sees encrypted secret material; it receives the unsigned
//! transaction and returns signed raw bytes.

use crate::{Error, Result};
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::sync::Arc;

/// Delegated signer for accounts whose keys live elsewhere
/// (browser extension, hardware device, remote service).
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    /// The address this signer signs for.
    fn address(&self) -> Address;

    /// Sign the unsigned transfer and return the raw signed transaction.
    async fn sign_transfer(&self, tx: &TxLegacy) -> Result<Vec<u8>>;
}

/// Signing capability for one transfer
pub enum TransferSigner {
    /// Decrypted local key, alive only for the duration of the submit call
    Local(PrivateKeySigner),
    /// Delegated to an external signer
    External(Arc<dyn ExternalSigner>),
}

impl TransferSigner {
    pub fn address(&self) -> Address {
        match self {
            Self::Local(signer) => signer.address(),
            Self::External(ext) => ext.address(),
        }
    }

    /// Produce the raw signed transaction bytes.
    pub async fn sign(&self, tx: TxLegacy) -> Result<Vec<u8>> {
        match self {
            Self::Local(signer) => {
                let mut tx = tx;
                let signature = signer
                    .sign_transaction_sync(&mut tx)
                    .map_err(|e| Error::Signer(e.to_string()))?;
                let signed = tx.into_signed(signature);

                let mut raw = Vec::new();
                TxEnvelope::from(signed).encode_2718(&mut raw);
                Ok(raw)
            }
            Self::External(ext) => ext.sign_transfer(&tx).await,
        }
    }
}

// Implement Debug manually to avoid exposing the local signer
impl std::fmt::Debug for TransferSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(signer) => f
                .debug_struct("TransferSigner::Local")
                .field("address", &signer.address())
                .field("signer", &"[REDACTED]")
                .finish(),
            Self::External(ext) => f
                .debug_struct("TransferSigner::External")
                .field("address", &ext.address())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::consensus::transaction::SignerRecoverable;
    use alloy::consensus::Transaction;
    use alloy::eips::eip2718::Decodable2718;
    use alloy::primitives::{TxKind, U256};
    use std::str::FromStr;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn transfer_tx() -> TxLegacy {
        TxLegacy {
            chain_id: Some(1),
            nonce: 7,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(Address::repeat_byte(0x42)),
            value: U256::from(1_000_000u64),
            input: Default::default(),
        }
    }

    #[tokio::test]
    async fn local_signing_produces_a_decodable_envelope() {
        let key = PrivateKeySigner::from_str(&TEST_KEY[2..]).unwrap();
        let from = key.address();
        let signer = TransferSigner::Local(key);

        let raw = signer.sign(transfer_tx()).await.unwrap();
        let envelope = TxEnvelope::decode_2718(&mut raw.as_slice()).unwrap();

        assert_eq!(envelope.nonce(), 7);
        assert_eq!(envelope.value(), U256::from(1_000_000u64));
        assert_eq!(envelope.recover_signer().unwrap(), from);
    }

    #[tokio::test]
    async fn external_signing_delegates() {
        struct FixedSigner;

        #[async_trait]
        impl ExternalSigner for FixedSigner {
            fn address(&self) -> Address {
                Address::repeat_byte(0x11)
            }

            async fn sign_transfer(&self, tx: &TxLegacy) -> Result<Vec<u8>> {
                // A stand-in signature: echo the nonce so the test can see
                // the unsigned payload reached the delegate.
                Ok(vec![tx.nonce as u8])
            }
        }

        let signer = TransferSigner::External(Arc::new(FixedSigner));
        assert_eq!(signer.address(), Address::repeat_byte(0x11));
        assert_eq!(signer.sign(transfer_tx()).await.unwrap(), vec![7]);
    }

    #[test]
    fn debug_redacts_local_key() {
        let key = PrivateKeySigner::from_str(&TEST_KEY[2..]).unwrap();
        let debug = format!("{:?}", TransferSigner::Local(key));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("ac0974bec"));
    }
}
