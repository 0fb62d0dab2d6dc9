//! Cryptographic primitives for neon-vault.
//!
//! This module provides:
//! - AES-GCM authenticated encryption of buffers and streams (`cipher`)
//! - Deterministic Argon2id password-based key derivation (`kdf`)
//! - HKDF-based per-message key derivation (`keys`)
//! - MD5/SHA digests with a zero sentinel for empty input (`hash`)

pub mod cipher;
pub mod hash;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use neon_vault::crypto::{Cipher, derive, generate_key, ...};
pub use cipher::{generate_key, Cipher, DEFAULT_KEY_BITS, MAX_PADDING_BYTES};
pub use hash::HashAlgorithm;
pub use kdf::{derive, derive_key, derive_optional, MAX_KEY_BITS};
