//! Error types for the wallet core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid private key: {0}")]
    InvalidSecretFormat(String),

    #[error("Invalid mnemonic phrase: {0}")]
    InvalidMnemonic(String),

    #[error("Decryption failed: wrong password or corrupt ciphertext")]
    DecryptionFailed,

    #[error("Account with address {0} already exists")]
    DuplicateAccount(String),

    #[error("Chain id {0} is already registered")]
    DuplicateChainId(u64),

    #[error("Chain id {0} is a built-in network and cannot be removed")]
    CannotRemoveBuiltin(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Transaction submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Vault error: {0}")]
    Vault(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
