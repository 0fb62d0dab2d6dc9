//! High-level vault operations.
//!
//! `Vault` ties the pieces together: it validates the password name, asks
//! the caller's resolver for the password, derives the key, runs the
//! `Cipher` and wraps the frame in the text format from `format`.
//!
//! Errors crossing this boundary are deliberately coarse.  Resolver failures
//! become `PasswordNotFound` and every cipher failure becomes
//! `TamperDetected`, whether the data was corrupted or the password was
//! wrong: the two cannot be told apart, and reporting them differently
//! would hand an attacker an oracle.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use super::format::{self, HexLineReader, HexLineWriter, MAX_HEADER_LINE_LEN};
use super::resolver::PasswordResolver;
use crate::config::Settings;
use crate::crypto::cipher::{Cipher, DEFAULT_KEY_BITS};
use crate::crypto::{kdf, keys};
use crate::errors::{NeonVaultError, Result};

/// Encrypts and decrypts vault documents using passwords looked up by name.
pub struct Vault<R> {
    resolver: R,
    settings: Settings,
}

impl<R: PasswordResolver> Vault<R> {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a vault with default settings.
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            settings: Settings::default(),
        }
    }

    /// Create a vault with explicit settings.
    pub fn with_settings(resolver: R, settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { resolver, settings })
    }

    /// The settings in effect.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The password resolver.
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    // ------------------------------------------------------------------
    // Encryption
    // ------------------------------------------------------------------

    /// Encrypt `plaintext` into a vault document protected by the password
    /// named `password_name`.
    pub fn encrypt(&self, plaintext: &[u8], password_name: &str) -> Result<Vec<u8>> {
        let mut document = Vec::new();
        let mut source = plaintext;
        self.encrypt_stream(&mut source, &mut document, password_name)?;
        Ok(document)
    }

    /// Encrypt text.  Vault documents are plain ASCII.
    pub fn encrypt_str(&self, plaintext: &str, password_name: &str) -> Result<String> {
        let document = self.encrypt(plaintext.as_bytes(), password_name)?;
        String::from_utf8(document).map_err(|_| NeonVaultError::InvalidUtf8)
    }

    /// Encrypt everything readable from `source` and write the vault
    /// document to `sink`.
    ///
    /// Returns the number of plaintext bytes consumed.
    pub fn encrypt_stream<Rd, W>(
        &self,
        source: &mut Rd,
        sink: &mut W,
        password_name: &str,
    ) -> Result<u64>
    where
        Rd: Read + ?Sized,
        W: Write + ?Sized,
    {
        format::validate_password_name(password_name)?;
        let cipher = self.cipher_for(password_name)?;
        debug!(password_name, "encrypting vault document");

        sink.write_all(format::header_line(password_name, self.settings.line_ending).as_bytes())?;

        let mut body = HexLineWriter::new(
            &mut *sink,
            self.settings.line_width,
            self.settings.line_ending,
        );
        let consumed = cipher.encrypt_stream(source, &mut body)?;
        body.finish()?;

        Ok(consumed)
    }

    /// Encrypt the file at `source` into a vault document at `target`.
    ///
    /// `target` is replaced atomically and may be the same path as
    /// `source`.
    pub fn encrypt_file(&self, source: &Path, target: &Path, password_name: &str) -> Result<u64> {
        format::validate_password_name(password_name)?;
        write_atomically(target, |sink| {
            let mut input = BufReader::new(File::open(source)?);
            self.encrypt_stream(&mut input, sink, password_name)
        })
    }

    // ------------------------------------------------------------------
    // Decryption
    // ------------------------------------------------------------------

    /// Decrypt a vault document.
    ///
    /// Input without a vault header is returned unchanged.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        // Reject a malformed body before asking for the password.
        if let Some((_, body_start)) = format::parse_header(data) {
            format::check_body(&data[body_start..])
                .map_err(|e| NeonVaultError::MalformedVault(e.to_string()))?;
        }

        let mut plaintext = Zeroizing::new(Vec::with_capacity(data.len() / 2));
        let mut source = data;
        self.decrypt_stream(&mut source, &mut *plaintext)?;
        Ok(std::mem::take(&mut *plaintext))
    }

    /// Decrypt a vault document holding UTF-8 text.
    pub fn decrypt_to_string(&self, data: &[u8]) -> Result<String> {
        String::from_utf8(self.decrypt(data)?).map_err(|e| {
            let mut bad_bytes = e.into_bytes();
            bad_bytes.zeroize();
            NeonVaultError::InvalidUtf8
        })
    }

    /// Decrypt a vault document read from `source` into `sink`.
    ///
    /// Input without a vault header is copied through byte for byte.  The
    /// body is decoded while it is decrypted, so a malformed body may only
    /// be noticed after the password has been resolved.  Returns the number
    /// of bytes written to `sink`.
    pub fn decrypt_stream<Rd, W>(&self, source: &mut Rd, sink: &mut W) -> Result<u64>
    where
        Rd: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut reader = BufReader::new(source);
        let mut first_line = Vec::new();
        (&mut reader)
            .take(MAX_HEADER_LINE_LEN as u64)
            .read_until(b'\n', &mut first_line)?;

        let Some((password_name, _)) = format::parse_header(&first_line) else {
            debug!("input has no vault header; passing it through unchanged");
            sink.write_all(&first_line)?;
            let copied = io::copy(&mut reader, sink)?;
            sink.flush()?;
            return Ok(first_line.len() as u64 + copied);
        };

        let password_name = password_name.to_owned();
        let cipher = self.cipher_for(&password_name)?;
        debug!(password_name = %password_name, "decrypting vault document");

        let mut body = HexLineReader::new(reader);
        cipher
            .decrypt_stream(&mut body, sink)
            .map_err(|e| launder_cipher_error(e, &password_name))
    }

    /// Decrypt the vault document at `source` into `target`.
    ///
    /// A file without a vault header is copied unchanged.  `target` is
    /// replaced atomically and may be the same path as `source`.
    pub fn decrypt_file(&self, source: &Path, target: &Path) -> Result<u64> {
        write_atomically(target, |sink| {
            let mut input = File::open(source)?;
            self.decrypt_stream(&mut input, sink)
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Resolve the password and build the cipher keyed from it.
    fn cipher_for(&self, password_name: &str) -> Result<Cipher> {
        let password = Zeroizing::new(self.resolver.resolve(password_name).map_err(|_| {
            debug!(password_name, "password resolver failed");
            NeonVaultError::PasswordNotFound(password_name.to_string())
        })?);

        let key = kdf::derive(&password, DEFAULT_KEY_BITS)?;
        Cipher::from_key(&key)?.with_max_padding(self.settings.max_padding_bytes)
    }
}

/// Collapse cipher failures into the vault's error categories.
fn launder_cipher_error(err: NeonVaultError, password_name: &str) -> NeonVaultError {
    match err {
        NeonVaultError::Io(e) => format::body_error_from_io(e),
        NeonVaultError::TamperDetected
        | NeonVaultError::InvalidArgument(_)
        | NeonVaultError::KeyDerivationFailed(_) => {
            debug!(password_name, "vault document failed authentication");
            NeonVaultError::TamperDetected
        }
        other => other,
    }
}

/// Write a file **atomically**.
///
/// 1. Run `write` against a uniquely named temp file in the same directory.
/// 2. Rename the temp file over the target path.
///
/// The rename ensures readers never see a half-written file.  The temp
/// file is removed if `write` fails.
fn write_atomically<F>(path: &Path, write: F) -> Result<u64>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<u64>,
{
    // The temp file is in the same directory so rename is guaranteed
    // to be atomic on the same filesystem.
    let tmp_path = temp_path_for(path);

    let written = write_temp(&tmp_path, write).and_then(|written| {
        fs::rename(&tmp_path, path)?;
        Ok(written)
    });

    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written
}

/// `.<file>.<random>.tmp` next to `path`, so concurrent writers to the same
/// target never share a temp file.
fn temp_path_for(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        hex::encode(keys::random_bytes(8))
    ))
}

fn write_temp<F>(tmp_path: &Path, write: F) -> Result<u64>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<u64>,
{
    let mut sink = BufWriter::new(File::create(tmp_path)?);
    let written = write(&mut sink)?;
    let file = sink.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_paths_are_unique_siblings() {
        let target = Path::new("/srv/app/secrets.vault");
        let first = temp_path_for(target);
        let second = temp_path_for(target);

        assert_ne!(first, second);
        for tmp in [&first, &second] {
            assert_eq!(tmp.parent(), target.parent());
            let name = tmp.file_name().unwrap().to_string_lossy();
            assert!(name.starts_with(".secrets.vault."));
            assert!(name.ends_with(".tmp"));
        }
    }
}
