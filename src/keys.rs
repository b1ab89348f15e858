//! Key derivation
//!
//! Pure functions that turn a raw secret (private key hex, or BIP-39
//! mnemonic + account index) into a deterministic key pair and checksummed
//! address. No state lives here; persistence and encryption are the
//! store's and vault's concern.
//!
//! SECURITY: derived key material is held in alloy's `PrivateKeySigner`,
//! never logged, and redacted from `Debug` output.

use crate::{Error, Result};
use alloy::hex;
use alloy::primitives::Address;
use alloy::signers::local::coins_bip39::{English, Mnemonic};
use alloy::signers::local::{MnemonicBuilder, PrivateKeySigner};
use rand::{CryptoRng, RngCore};
use std::str::FromStr;
use zeroize::Zeroizing;

/// BIP-44 path template for Ethereum-family accounts.
pub const DERIVATION_PATH_PREFIX: &str = "m/44'/60'/0'/0/";

/// Build the derivation path for a sequential account index.
pub fn derivation_path(index: u32) -> String {
    format!("{DERIVATION_PATH_PREFIX}{index}")
}

/// A key pair derived from a secret, with its checksummed address
pub struct DerivedKey {
    signer: PrivateKeySigner,
    address: Address,
    path: Option<String>,
}

impl DerivedKey {
    fn new(signer: PrivateKeySigner, path: Option<String>) -> Self {
        let address = signer.address();
        Self {
            signer,
            address,
            path,
        }
    }

    /// Public address (safe to share)
    pub fn address(&self) -> Address {
        self.address
    }

    /// EIP-55 checksummed address string
    pub fn checksummed(&self) -> String {
        self.address.to_checksum(None)
    }

    /// BIP-44 path this key was derived through, if mnemonic-derived
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The signer holding the private key
    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// Hex-encoded private key, zeroized on drop.
    ///
    /// Only called when the key is about to be encrypted or exported;
    /// callers must not hold the result longer than that operation.
    pub fn key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(self.signer.to_bytes())))
    }
}

// Implement Debug manually to avoid exposing the signer
impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("address", &self.address)
            .field("path", &self.path)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

/// Derive a key pair from a hex-encoded private key.
///
/// The input must be exactly a `0x`-prefixed 64-hex-digit string encoding
/// a nonzero scalar below the secp256k1 curve order.
pub fn derive_from_private_key(key_hex: &str) -> Result<DerivedKey> {
    if !is_valid_private_key(key_hex) {
        return Err(Error::InvalidSecretFormat(
            "expected 0x-prefixed 64-hex-digit string".to_string(),
        ));
    }

    let stripped = key_hex.strip_prefix("0x").unwrap_or(key_hex);
    let signer = PrivateKeySigner::from_str(stripped)
        .map_err(|e| Error::InvalidSecretFormat(e.to_string()))?;

    Ok(DerivedKey::new(signer, None))
}

/// Derive the key pair at `index` from a BIP-39 mnemonic.
///
/// Deterministic: the same phrase and index always yield the same address,
/// so an account can be reproduced from its mnemonic after data loss.
pub fn derive_from_mnemonic(phrase: &str, index: u32) -> Result<DerivedKey> {
    let phrase = phrase.trim();

    // Wordlist + checksum validation, before any derivation work
    Mnemonic::<English>::new_from_phrase(phrase)
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;

    let path = derivation_path(index);
    let signer = MnemonicBuilder::<English>::default()
        .phrase(phrase)
        .derivation_path(&path)
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))?
        .build()
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;

    Ok(DerivedKey::new(signer, Some(path)))
}

/// Generate a fresh random key pair from the OS CSPRNG.
pub fn generate_private_key() -> DerivedKey {
    DerivedKey::new(PrivateKeySigner::random(), None)
}

/// Generate a random BIP-39 phrase of the requested entropy.
///
/// Supported strengths are 128 bits (12 words) and 256 bits (24 words).
pub fn generate_mnemonic(strength_bits: usize) -> Result<String> {
    generate_mnemonic_with_rng(&mut rand::thread_rng(), strength_bits)
}

/// RNG-parameterised variant of [`generate_mnemonic`] for deterministic
/// tests; production code goes through the CSPRNG wrapper above.
pub fn generate_mnemonic_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
    strength_bits: usize,
) -> Result<String> {
    let word_count = match strength_bits {
        128 => 12,
        256 => 24,
        other => {
            return Err(Error::InvalidParameter(format!(
                "unsupported mnemonic strength {other}, expected 128 or 256"
            )))
        }
    };

    let mnemonic = Mnemonic::<English>::new_with_count(rng, word_count)
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;
    Ok(mnemonic.to_phrase())
}

/// Check private key format: 0x prefix plus 64 hex digits.
pub fn is_valid_private_key(key_hex: &str) -> bool {
    key_hex.len() == 66
        && key_hex.starts_with("0x")
        && key_hex[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Check whether a phrase passes BIP-39 wordlist and checksum validation.
pub fn is_valid_mnemonic(phrase: &str) -> bool {
    Mnemonic::<English>::new_from_phrase(phrase.trim()).is_ok()
}

/// Check address format (any-case hex; checksum not required).
pub fn is_valid_address(address: &str) -> bool {
    Address::from_str(address).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known test vectors (DO NOT use in production!)
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_PHRASE: &str = "test test test test test test test test test test test junk";

    #[test]
    fn private_key_derivation_is_deterministic() {
        let a = derive_from_private_key(TEST_KEY).unwrap();
        let b = derive_from_private_key(TEST_KEY).unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(
            a.checksummed(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn key_of_one_derives_known_address() {
        let key = "0x0000000000000000000000000000000000000000000000000000000000000001";
        let derived = derive_from_private_key(key).unwrap();
        assert_eq!(
            derived.checksummed(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn rejects_malformed_private_keys() {
        // Missing prefix
        assert!(matches!(
            derive_from_private_key(&TEST_KEY[2..]),
            Err(Error::InvalidSecretFormat(_))
        ));
        // Too short
        assert!(derive_from_private_key("0xabcd").is_err());
        // Non-hex
        let bad = format!("0x{}", "zz".repeat(32));
        assert!(derive_from_private_key(&bad).is_err());
        // Zero scalar is outside the valid range
        let zero = format!("0x{}", "00".repeat(32));
        assert!(derive_from_private_key(&zero).is_err());
    }

    #[test]
    fn mnemonic_derivation_is_deterministic_and_indexed() {
        let first = derive_from_mnemonic(TEST_PHRASE, 0).unwrap();
        let again = derive_from_mnemonic(TEST_PHRASE, 0).unwrap();
        let second = derive_from_mnemonic(TEST_PHRASE, 1).unwrap();

        assert_eq!(first.address(), again.address());
        assert_ne!(first.address(), second.address());
        assert_eq!(
            first.checksummed(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
        assert_eq!(
            second.checksummed(),
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
        );
        assert_eq!(first.path(), Some("m/44'/60'/0'/0/0"));
        assert_eq!(second.path(), Some("m/44'/60'/0'/0/1"));
    }

    #[test]
    fn rejects_invalid_mnemonic() {
        let err = derive_from_mnemonic("not a real phrase at all", 0).unwrap_err();
        assert!(matches!(err, Error::InvalidMnemonic(_)));
        assert!(!is_valid_mnemonic("foo bar baz"));
        assert!(is_valid_mnemonic(TEST_PHRASE));
    }

    #[test]
    fn generated_mnemonics_have_requested_length() {
        let twelve = generate_mnemonic(128).unwrap();
        assert_eq!(twelve.split_whitespace().count(), 12);
        assert!(is_valid_mnemonic(&twelve));

        let twenty_four = generate_mnemonic(256).unwrap();
        assert_eq!(twenty_four.split_whitespace().count(), 24);

        assert!(matches!(
            generate_mnemonic(160),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn generated_keys_are_importable() {
        let generated = generate_private_key();
        let hex = generated.key_hex();
        let reimported = derive_from_private_key(&hex).unwrap();
        assert_eq!(generated.address(), reimported.address());
    }

    #[test]
    fn debug_redacts_key_material() {
        let derived = derive_from_private_key(TEST_KEY).unwrap();
        let debug = format!("{:?}", derived);
        assert!(!debug.contains("ac0974bec"));
        assert!(debug.contains("[REDACTED]"));
    }
}
