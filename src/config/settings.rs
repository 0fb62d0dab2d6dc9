use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::cipher::MAX_PADDING_BYTES;
use crate::errors::{NeonVaultError, Result};
use crate::vault::format::{LineEnding, DEFAULT_LINE_WIDTH};
use crate::vault::resolver::PasswordFolderResolver;

/// Vault settings, loaded from `neon-vault.toml`.
///
/// Every field has a sensible default so vaults work out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Line terminator written into vault documents (`lf` or `crlf`).
    #[serde(default)]
    pub line_ending: LineEnding,

    /// Body width in hex digits.
    #[serde(default = "default_line_width")]
    pub line_width: usize,

    /// Random padding added to each encrypted payload (0 = none).
    #[serde(default)]
    pub max_padding_bytes: usize,

    /// Directory holding one file per named password, relative to the
    /// project directory unless absolute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_dir: Option<PathBuf>,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_line_width() -> usize {
    DEFAULT_LINE_WIDTH
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            line_ending: LineEnding::default(),
            line_width: default_line_width(),
            max_padding_bytes: 0,
            password_dir: None,
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    const FILE_NAME: &'static str = "neon-vault.toml";

    /// Load settings from `<project_dir>/neon-vault.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::from_file(&config_path)
    }

    /// Load and validate settings from an explicit file.
    pub fn from_file(config_path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            NeonVaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values no vault operation could honour.
    pub fn validate(&self) -> Result<()> {
        if self.line_width == 0 {
            return Err(NeonVaultError::ConfigError(
                "line_width must be at least 1".into(),
            ));
        }
        if self.max_padding_bytes > MAX_PADDING_BYTES {
            return Err(NeonVaultError::ConfigError(format!(
                "max_padding_bytes must not exceed {MAX_PADDING_BYTES} (got {})",
                self.max_padding_bytes
            )));
        }
        Ok(())
    }

    /// Build a folder resolver for the configured `password_dir`, if any.
    pub fn password_resolver(&self, project_dir: &Path) -> Option<PasswordFolderResolver> {
        self.password_dir
            .as_ref()
            .map(|dir| PasswordFolderResolver::new(project_dir.join(dir)))
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.line_ending, LineEnding::Lf);
        assert_eq!(s.line_width, 64);
        assert_eq!(s.max_padding_bytes, 0);
        assert!(s.password_dir.is_none());
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn load_parses_toml_file() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
line_ending = "crlf"
line_width = 80
max_padding_bytes = 512
password_dir = "secrets/passwords"
"#;
        fs::write(tmp.path().join("neon-vault.toml"), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.line_ending, LineEnding::CrLf);
        assert_eq!(settings.line_width, 80);
        assert_eq!(settings.max_padding_bytes, 512);
        assert_eq!(
            settings.password_dir,
            Some(PathBuf::from("secrets/passwords"))
        );
    }

    #[test]
    fn load_uses_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("neon-vault.toml"), "line_width = 32\n").unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.line_width, 32);
        // Rest should be defaults
        assert_eq!(settings.line_ending, LineEnding::Lf);
        assert_eq!(settings.max_padding_bytes, 0);
    }

    #[test]
    fn load_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("neon-vault.toml"), "not valid {{toml").unwrap();

        let result = Settings::load(tmp.path());
        assert!(matches!(result, Err(NeonVaultError::ConfigError(_))));
    }

    #[test]
    fn load_errors_on_unknown_line_ending() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("neon-vault.toml"), "line_ending = \"cr\"\n").unwrap();

        assert!(Settings::load(tmp.path()).is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let zero_width = Settings {
            line_width: 0,
            ..Settings::default()
        };
        assert!(zero_width.validate().is_err());

        let huge_padding = Settings {
            max_padding_bytes: MAX_PADDING_BYTES + 1,
            ..Settings::default()
        };
        assert!(huge_padding.validate().is_err());
    }

    #[test]
    fn password_resolver_is_relative_to_project() {
        let s = Settings {
            password_dir: Some(PathBuf::from("passwords")),
            ..Settings::default()
        };
        let project = Path::new("/home/user/myproject");
        let resolver = s.password_resolver(project).unwrap();
        assert_eq!(
            resolver.dir(),
            Path::new("/home/user/myproject/passwords")
        );
        assert!(Settings::default().password_resolver(project).is_none());
    }
}
