//! Secret vault
//!
//! Password-based authenticated encryption for private key material:
//! Argon2id stretches the password into an AES-256-GCM key, and the GCM
//! tag makes wrong-password decryption fail loudly instead of yielding
//! plausible-looking garbage.
//!
//! Only the ciphertext blob ever persists. Passwords and derived KDF keys
//! are zeroized after use; decrypted plaintext is handed back wrapped in
//! `SecretString` and must not outlive the operation that needed it.

use crate::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use alloy::hex;
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

const BLOB_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Encrypted secret as persisted inside an account record.
///
/// Self-describing: the KDF parameters, salt and nonce travel with the
/// ciphertext, so a blob written by an older build stays decryptable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CipherBlob {
    pub version: u8,
    /// Argon2id memory cost in KiB
    pub m_cost: u32,
    /// Argon2id iterations
    pub t_cost: u32,
    /// Argon2id parallelism
    pub p_cost: u32,
    /// Hex-encoded KDF salt
    pub salt: String,
    /// Hex-encoded AES-GCM nonce
    pub nonce: String,
    /// Hex-encoded ciphertext, GCM tag appended
    pub ciphertext: String,
}

/// Encrypts and decrypts secrets with a user-supplied password
#[derive(Debug, Clone, Copy)]
pub struct SecretVault {
    m_cost: u32,
    t_cost: u32,
    p_cost: u32,
}

impl Default for SecretVault {
    fn default() -> Self {
        // OWASP-recommended Argon2id parameters for interactive logins
        Self {
            m_cost: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl SecretVault {
    /// Vault with explicit KDF cost parameters.
    ///
    /// Tests use low costs to stay fast; production uses `Default`.
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Self {
        Self {
            m_cost,
            t_cost,
            p_cost,
        }
    }

    /// Encrypt a plaintext secret under a password.
    ///
    /// Salt and nonce are drawn fresh from the OS CSPRNG, so encrypting the
    /// same plaintext twice yields different blobs.
    pub fn encrypt(&self, plaintext: &str, password: &SecretString) -> Result<CipherBlob> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut nonce);

        let key = self.derive_key(password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_ref())
            .map_err(|e| Error::Vault(format!("cipher init: {e}")))?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| Error::Vault(format!("encryption: {e}")))?;

        Ok(CipherBlob {
            version: BLOB_VERSION,
            m_cost: self.m_cost,
            t_cost: self.t_cost,
            p_cost: self.p_cost,
            salt: hex::encode(salt),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        })
    }

    /// Decrypt a blob back to the original secret.
    ///
    /// Fails with `DecryptionFailed` on a wrong password or corrupt blob;
    /// the GCM tag check guarantees no garbage plaintext is ever returned.
    pub fn decrypt(&self, blob: &CipherBlob, password: &SecretString) -> Result<SecretString> {
        let salt = hex::decode(&blob.salt).map_err(|_| Error::DecryptionFailed)?;
        let nonce = hex::decode(&blob.nonce).map_err(|_| Error::DecryptionFailed)?;
        let ciphertext = hex::decode(&blob.ciphertext).map_err(|_| Error::DecryptionFailed)?;
        if nonce.len() != NONCE_LEN || salt.len() != SALT_LEN {
            return Err(Error::DecryptionFailed);
        }

        // KDF parameters come from the blob, not from this vault's config
        let vault = Self::with_params(blob.m_cost, blob.t_cost, blob.p_cost);
        let key = vault.derive_key(password, &salt)?;
        let cipher =
            Aes256Gcm::new_from_slice(key.as_ref()).map_err(|_| Error::DecryptionFailed)?;

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
                .map_err(|_| Error::DecryptionFailed)?,
        );

        let text = std::str::from_utf8(&plaintext).map_err(|_| Error::DecryptionFailed)?;
        Ok(SecretString::from(text.to_string()))
    }

    fn derive_key(&self, password: &SecretString, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(KEY_LEN))
            .map_err(|e| Error::Vault(format!("kdf params: {e}")))?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        argon
            .hash_password_into(password.expose_secret().as_bytes(), salt, key.as_mut())
            .map_err(|e| Error::Vault(format!("kdf: {e}")))?;
        Ok(key)
    }
}
