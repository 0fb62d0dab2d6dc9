//! Vault module: password-protected text documents.
//!
//! This module provides:
//! - The text container format and header inspection (`format`)
//! - Password lookup by name (`resolver`)
//! - High-level `Vault` for encrypting and decrypting documents (`store`)

pub mod format;
pub mod resolver;
pub mod store;

// Re-export the most commonly used items.
pub use format::{
    header_line, is_encrypted, is_encrypted_file, is_encrypted_stream, password_name,
    validate_password_name, LineEnding, HEADER_TAG,
};
pub use resolver::{PasswordFolderResolver, PasswordResolver, ResolveError, StaticResolver};
pub use store::Vault;
