//! Deterministic password-based key derivation using Argon2id.
//!
//! Vault documents record only the *name* of the password that protects
//! them, never a salt, so the same password must yield the same key on every
//! machine and in every release.  The Argon2id parameters and the salt below
//! are therefore part of the on-disk format: changing any of them makes every
//! existing vault undecryptable.

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use crate::crypto::cipher::DEFAULT_KEY_BITS;
use crate::errors::{NeonVaultError, Result};

/// Largest key that can be derived, in bits.
pub const MAX_KEY_BITS: u32 = 512;

/// Argon2id memory cost in KiB (19 MiB).
const MEMORY_KIB: u32 = 19_456;

/// Argon2id passes over memory.
const ITERATIONS: u32 = 2;

/// Argon2id lanes.
const PARALLELISM: u32 = 1;

/// Fixed, public domain-separation salt.
const SALT: &[u8] = b"neon-vault/kdf/v1";

/// Argon2 always produces the full 512 bits; shorter keys are prefixes.
const OUTPUT_LEN: usize = (MAX_KEY_BITS / 8) as usize;

/// Derive a `bits / 8` byte key from `password`.
///
/// `bits` must be a positive multiple of 8 no greater than 512, and the
/// password must be non-empty.  Shorter keys are prefixes of longer ones
/// derived from the same password.
pub fn derive(password: &str, bits: u32) -> Result<Zeroizing<Vec<u8>>> {
    if bits == 0 || bits % 8 != 0 || bits > MAX_KEY_BITS {
        return Err(NeonVaultError::InvalidArgument(format!(
            "key size must be a positive multiple of 8 bits up to {MAX_KEY_BITS} (got {bits})"
        )));
    }
    if password.is_empty() {
        return Err(NeonVaultError::InvalidArgument(
            "password cannot be empty".into(),
        ));
    }

    let params = Params::new(MEMORY_KIB, ITERATIONS, PARALLELISM, Some(OUTPUT_LEN))
        .map_err(|e| NeonVaultError::KeyDerivationFailed(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; OUTPUT_LEN]);
    argon2
        .hash_password_into(password.as_bytes(), SALT, &mut output[..])
        .map_err(|e| {
            NeonVaultError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}"))
        })?;

    Ok(Zeroizing::new(output[..(bits / 8) as usize].to_vec()))
}

/// Same as [`derive`], for callers holding an optional password.
///
/// A missing password is rejected like an empty one.
pub fn derive_optional(password: Option<&str>, bits: u32) -> Result<Zeroizing<Vec<u8>>> {
    match password {
        Some(password) => derive(password, bits),
        None => Err(NeonVaultError::InvalidArgument(
            "password is required".into(),
        )),
    }
}

/// Derive a key sized for the default [`Cipher`](crate::crypto::Cipher).
pub fn derive_key(password: &str) -> Result<Zeroizing<Vec<u8>>> {
    derive(password, DEFAULT_KEY_BITS)
}
