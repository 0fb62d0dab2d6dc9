//! Per-message key derivation using HKDF-SHA256.
//!
//! A `Cipher` never encrypts with its long-term key directly.  Each message
//! gets a fresh random salt, and HKDF (RFC 5869) expands the long-term key
//! and that salt into:
//! - a one-off AES key of the same size as the long-term key, and
//! - the 7-byte nonce prefix used by the STREAM construction.
//!
//! Uniqueness of (key, nonce) therefore rests on the 256-bit salt rather
//! than on a per-instance counter.

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::errors::{NeonVaultError, Result};

/// Length of the random per-message salt (256 bits).
pub const SALT_LEN: usize = 32;

/// Length of the STREAM nonce prefix for a 96-bit AES-GCM nonce.
pub const NONCE_PREFIX_LEN: usize = 7;

/// Generate a cryptographically random per-message salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

/// Fill a fresh buffer of `len` bytes from the thread-local CSPRNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Key material for a single message, zeroed on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct MessageKey {
    key: Vec<u8>,
    nonce_prefix: [u8; NONCE_PREFIX_LEN],
}

impl MessageKey {
    /// Expand `master_key` and `salt` into a message key.
    ///
    /// The key size is bound into the HKDF `info`, so an AES-128 and an
    /// AES-256 cipher never derive related message keys.
    pub fn derive(master_key: &[u8], salt: &[u8]) -> Result<Self> {
        let info = format!("neon-vault-cipher:v1:aes{}", master_key.len() * 8);
        let hk = Hkdf::<Sha256>::new(Some(salt), master_key);

        let mut okm = Zeroizing::new(vec![0u8; master_key.len() + NONCE_PREFIX_LEN]);
        hk.expand(info.as_bytes(), &mut okm[..])
            .map_err(|e| NeonVaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

        let (key, prefix) = okm.split_at(master_key.len());
        let mut nonce_prefix = [0u8; NONCE_PREFIX_LEN];
        nonce_prefix.copy_from_slice(prefix);

        Ok(Self {
            key: key.to_vec(),
            nonce_prefix,
        })
    }

    /// The one-off AES key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The STREAM nonce prefix.
    pub fn nonce_prefix(&self) -> &[u8; NONCE_PREFIX_LEN] {
        &self.nonce_prefix
    }
}
