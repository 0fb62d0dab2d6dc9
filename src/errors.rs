use thiserror::Error;

/// All errors that can occur in neon-vault.
#[derive(Debug, Error)]
pub enum NeonVaultError {
    // --- Argument errors ---
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // --- Crypto errors ---
    #[error("Decryption failed — wrong password or corrupted data")]
    TamperDetected,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Decrypted data is not valid UTF-8")]
    InvalidUtf8,

    // --- Vault errors ---
    #[error("Password '{0}' could not be resolved")]
    PasswordNotFound(String),

    #[error("Malformed vault document: {0}")]
    MalformedVault(String),

    // --- Keyring errors ---
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NeonVaultError {
    /// Returns `true` for the failures a vault operation reports about the
    /// document or its password: unknown password name, malformed body, or
    /// failed integrity check.
    pub fn is_vault_error(&self) -> bool {
        matches!(
            self,
            Self::PasswordNotFound(_) | Self::MalformedVault(_) | Self::TamperDetected
        )
    }
}

/// Convenience type alias for neon-vault results.
pub type Result<T> = std::result::Result<T, NeonVaultError>;
