//! OS keyring integration for named passwords.
//!
//! Stores and retrieves vault passwords in the operating system's secure
//! credential store:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring / KDE Wallet)
//!
//! Each password name maps to one keyring entry under a shared service.

use crate::errors::{NeonVaultError, Result};
use crate::vault::format::validate_password_name;
use crate::vault::resolver::{PasswordResolver, ResolveError};

/// Default service name used in the OS keyring.
pub const DEFAULT_SERVICE: &str = "neon-vault";

/// Resolves passwords stored in the OS keyring.
#[derive(Debug, Clone)]
pub struct KeyringResolver {
    service: String,
}

impl Default for KeyringResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

impl KeyringResolver {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// The keyring service entries are stored under.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Store a password under `password_name`.
    pub fn store_password(&self, password_name: &str, password: &str) -> Result<()> {
        let entry = self.entry(password_name)?;
        entry.set_password(password).map_err(|e| {
            NeonVaultError::KeyringError(format!("failed to store password in keyring: {e}"))
        })
    }

    /// Retrieve the password stored under `password_name`.
    ///
    /// Returns `None` if no password is stored (rather than an error).
    pub fn get_password(&self, password_name: &str) -> Result<Option<String>> {
        let entry = self.entry(password_name)?;
        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(NeonVaultError::KeyringError(format!(
                "failed to read from keyring: {e}"
            ))),
        }
    }

    /// Delete the password stored under `password_name`.
    pub fn delete_password(&self, password_name: &str) -> Result<()> {
        let entry = self.entry(password_name)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already gone.
            Err(e) => Err(NeonVaultError::KeyringError(format!(
                "failed to delete from keyring: {e}"
            ))),
        }
    }

    fn entry(&self, password_name: &str) -> Result<keyring::Entry> {
        validate_password_name(password_name)?;
        keyring::Entry::new(&self.service, &entry_key(password_name)).map_err(|e| {
            NeonVaultError::KeyringError(format!("failed to create keyring entry: {e}"))
        })
    }
}

impl PasswordResolver for KeyringResolver {
    fn resolve(&self, password_name: &str) -> std::result::Result<String, ResolveError> {
        self.get_password(password_name)?
            .ok_or_else(|| format!("no keyring entry for '{password_name}'").into())
    }
}

/// Build a keyring entry key from a password name.
fn entry_key(password_name: &str) -> String {
    format!("password:{password_name}")
}
