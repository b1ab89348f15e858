//! Native wallet core
//!
//! The local key-management and transaction-submission subsystem behind a
//! wallet front-end:
//! - Derive accounts from private keys or BIP-39 mnemonics
//! - Persist them encrypted through a pluggable storage port
//! - Track an active account and network
//! - Build, sign, submit and observe native-asset transfers
//!
//! # Security Model
//!
//! - Secrets persist only as Argon2id + AES-256-GCM ciphertext
//! - Decrypted keys live for a single signing or export operation
//! - External accounts delegate signing and hold no local secret
//! - Key material is redacted from every `Debug` representation

pub mod engine;
pub mod keys;
pub mod networks;
pub mod storage;
pub mod store;
pub mod units;
pub mod vault;

mod error;

// Re-export commonly used types
pub use engine::{
    CancelToken, ChainClient, RpcChainClient, TrackOutcome, TransactionEngine, TransactionRecord,
    TransferJournal, TransferRequest, TransferSigner, TxStatus,
};
pub use error::{Error, Result};
pub use networks::{Network, NetworkRegistry};
pub use storage::{FileStorage, MemoryStorage, StoragePort};
pub use store::{Account, AccountKind, WalletStore};
pub use vault::SecretVault;
