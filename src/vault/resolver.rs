//! Password lookup by name.
//!
//! A vault document stores the *name* of its password, never the password.
//! The host application supplies a [`PasswordResolver`] that turns names
//! into passwords; `Vault` calls it once per operation and keeps nothing.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use super::format::validate_password_name;

/// Error returned by a resolver.  `Vault` never passes it on: callers only
/// ever see `PasswordNotFound`.
pub type ResolveError = Box<dyn std::error::Error + Send + Sync>;

/// Looks up passwords by name.
pub trait PasswordResolver {
    /// Return the password registered under `password_name`.
    fn resolve(&self, password_name: &str) -> Result<String, ResolveError>;
}

/// Closures resolve by returning `None` for unknown names.
impl<F> PasswordResolver for F
where
    F: Fn(&str) -> Option<String>,
{
    fn resolve(&self, password_name: &str) -> Result<String, ResolveError> {
        self(password_name).ok_or_else(|| format!("unknown password name '{password_name}'").into())
    }
}

// ---------------------------------------------------------------------------
// In-memory resolver
// ---------------------------------------------------------------------------

/// Resolves from an in-memory map of names to passwords.
#[derive(Clone, Default)]
pub struct StaticResolver {
    passwords: HashMap<String, Zeroizing<String>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`StaticResolver::insert`].
    pub fn with(mut self, password_name: impl Into<String>, password: impl Into<String>) -> Self {
        self.insert(password_name, password);
        self
    }

    /// Register or replace a password.
    pub fn insert(&mut self, password_name: impl Into<String>, password: impl Into<String>) {
        self.passwords
            .insert(password_name.into(), Zeroizing::new(password.into()));
    }

    /// Forget a password.  Returns `true` if it was registered.
    pub fn remove(&mut self, password_name: &str) -> bool {
        self.passwords.remove(password_name).is_some()
    }
}

impl PasswordResolver for StaticResolver {
    fn resolve(&self, password_name: &str) -> Result<String, ResolveError> {
        self.passwords
            .get(password_name)
            .map(|password| password.as_str().to_owned())
            .ok_or_else(|| format!("unknown password name '{password_name}'").into())
    }
}

impl<N, P> FromIterator<(N, P)> for StaticResolver
where
    N: Into<String>,
    P: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, P)>>(iter: I) -> Self {
        let mut resolver = Self::new();
        for (name, password) in iter {
            resolver.insert(name, password);
        }
        resolver
    }
}

impl fmt::Debug for StaticResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.passwords.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("StaticResolver")
            .field("names", &names)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Password folder resolver
// ---------------------------------------------------------------------------

/// Resolves from a directory holding one file per password, named after
/// the password.
///
/// A trailing line ending in the file is not part of the password.
#[derive(Debug, Clone)]
pub struct PasswordFolderResolver {
    dir: PathBuf,
}

impl PasswordFolderResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory passwords are read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `password` to the file for `password_name`, creating the
    /// directory if needed.
    ///
    /// On Unix the file is restricted to owner read/write.
    pub fn save(&self, password_name: &str, password: &str) -> crate::errors::Result<()> {
        validate_password_name(password_name)?;
        if password.is_empty() {
            return Err(crate::errors::NeonVaultError::InvalidArgument(
                "password cannot be empty".into(),
            ));
        }

        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(password_name);
        fs::write(&path, password)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl PasswordResolver for PasswordFolderResolver {
    fn resolve(&self, password_name: &str) -> Result<String, ResolveError> {
        // The name becomes a file name: never let it escape the directory.
        validate_password_name(password_name)?;

        let contents = Zeroizing::new(fs::read_to_string(self.dir.join(password_name))?);
        let password = contents.trim_end_matches(&['\r', '\n'][..]);
        if password.is_empty() {
            return Err(format!("password file for '{password_name}' is empty").into());
        }
        Ok(password.to_owned())
    }
}
