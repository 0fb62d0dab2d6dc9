//! Password-based encryption of text documents.
//!
//! A [`Vault`] turns plaintext into a self-describing ASCII document that
//! names the password protecting it.  Passwords are looked up through a
//! caller-supplied [`PasswordResolver`]; the lower-level [`Cipher`] and key
//! derivation are usable on their own.

pub mod config;
pub mod crypto;
pub mod errors;
pub mod vault;

#[cfg(feature = "keyring-store")]
pub mod keyring;

pub use config::Settings;
pub use crypto::{Cipher, HashAlgorithm};
pub use errors::{NeonVaultError, Result};
pub use vault::{PasswordFolderResolver, PasswordResolver, StaticResolver, Vault};
