//! Authenticated AES-GCM encryption of byte buffers and streams.
//!
//! A `Cipher` holds a long-term AES key (128, 192 or 256 bits).  Every
//! encryption draws a fresh random salt, derives a one-off message key from
//! it (see `keys`), and seals the payload with AES-GCM in the STREAM
//! construction: 64 KiB chunks, each with its own tag, a big-endian chunk
//! counter in the nonce and a flag marking the final chunk.  A chunk is
//! released only after its tag verifies, and a missing final chunk fails
//! the whole message, so integrity covers the full message rather than
//! whatever prefix happened to arrive.
//!
//! Layout of an encrypted frame:
//!
//! ```text
//! [version: 1 byte][salt: 32 bytes][chunk 0][chunk 1] ... [final chunk]
//! chunk = [AES-GCM ciphertext][16-byte tag]
//! ```
//!
//! The chunks encrypt `[padding_len: u32 LE][padding][payload]`, so the
//! random padding lives inside the authenticated ciphertext.  The 33-byte
//! frame header is passed as associated data to every chunk.

use std::fmt;
use std::io::{self, Cursor, Read, Write};

use aes_gcm::aead::consts::{U12, U7};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::stream::{DecryptorBE32, EncryptorBE32};
use aes_gcm::aead::{KeyInit, Payload};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;
use zeroize::{Zeroize, Zeroizing};

use super::keys::{self, MessageKey, SALT_LEN};
use crate::errors::{NeonVaultError, Result};

/// AES-192 in GCM mode with the standard 96-bit nonce.
type Aes192Gcm = AesGcm<Aes192, U12>;

/// Key size used when none is specified.
pub const DEFAULT_KEY_BITS: u32 = 256;

/// Upper bound for the random padding added per encryption (16 MiB).
pub const MAX_PADDING_BYTES: usize = 16 * 1024 * 1024;

/// Length of the display-only initialization value.
const IV_LEN: usize = 16;

/// Frame format version.
const FRAME_VERSION: u8 = 1;

/// Frame header: version byte followed by the salt.
const HEADER_LEN: usize = 1 + SALT_LEN;

/// Plaintext bytes per STREAM chunk.
const CHUNK_LEN: usize = 64 * 1024;

/// AES-GCM tag size.
const TAG_LEN: usize = 16;

/// Ciphertext bytes per full STREAM chunk.
const SEALED_CHUNK_LEN: usize = CHUNK_LEN + TAG_LEN;

/// Width of the padding length prefix.
const PADDING_LEN_PREFIX: usize = 4;

/// Generate a random key of `bits` (128, 192 or 256) and return it base64
/// encoded.
pub fn generate_key(bits: u32) -> Result<String> {
    let len = key_len_for_bits(bits)?;
    let key = Zeroizing::new(keys::random_bytes(len));
    Ok(BASE64.encode(&key[..]))
}

fn key_len_for_bits(bits: u32) -> Result<usize> {
    match bits {
        128 | 192 | 256 => Ok((bits / 8) as usize),
        _ => Err(NeonVaultError::InvalidArgument(format!(
            "AES key size must be 128, 192 or 256 bits (got {bits})"
        ))),
    }
}

fn is_aes_key_len(len: usize) -> bool {
    matches!(len, 16 | 24 | 32)
}

/// An AES key plus encryption settings.
///
/// Instances are immutable and can be shared between threads; every
/// `encrypt` call draws its own randomness.
#[derive(Clone)]
pub struct Cipher {
    key: Zeroizing<Vec<u8>>,
    iv: [u8; IV_LEN],
    max_padding: usize,
}

impl Cipher {
    /// Create a cipher with a random 256-bit key.
    pub fn new() -> Self {
        Self::from_parts(keys::random_bytes((DEFAULT_KEY_BITS / 8) as usize))
    }

    /// Create a cipher with a random key of `bits` (128, 192 or 256).
    pub fn with_key_size(bits: u32) -> Result<Self> {
        let len = key_len_for_bits(bits)?;
        Ok(Self::from_parts(keys::random_bytes(len)))
    }

    /// Create a cipher from raw key bytes (16, 24 or 32 bytes).
    pub fn from_key(key: &[u8]) -> Result<Self> {
        if !is_aes_key_len(key.len()) {
            return Err(NeonVaultError::InvalidArgument(format!(
                "AES key must be 16, 24 or 32 bytes (got {})",
                key.len()
            )));
        }
        Ok(Self::from_parts(key.to_vec()))
    }

    /// Create a cipher from a base64-encoded key, as returned by
    /// [`generate_key`] or [`Cipher::key_base64`].
    pub fn from_base64(key: &str) -> Result<Self> {
        let bytes = Zeroizing::new(BASE64.decode(key.trim()).map_err(|e| {
            NeonVaultError::InvalidArgument(format!("key is not valid base64: {e}"))
        })?);
        Self::from_key(&bytes)
    }

    fn from_parts(key: Vec<u8>) -> Self {
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&keys::random_bytes(IV_LEN));
        Self {
            key: Zeroizing::new(key),
            iv,
            max_padding: 0,
        }
    }

    /// Add `0..=max_padding` random bytes of padding to every encryption.
    pub fn with_max_padding(mut self, max_padding: usize) -> Result<Self> {
        if max_padding > MAX_PADDING_BYTES {
            return Err(NeonVaultError::InvalidArgument(format!(
                "padding cannot exceed {MAX_PADDING_BYTES} bytes (got {max_padding})"
            )));
        }
        self.max_padding = max_padding;
        Ok(self)
    }

    /// The key, base64 encoded.
    pub fn key_base64(&self) -> String {
        BASE64.encode(&self.key[..])
    }

    /// The instance initialization value, base64 encoded.
    ///
    /// Diagnostic only: frames carry their own per-message salt.
    pub fn iv_base64(&self) -> String {
        BASE64.encode(self.iv)
    }

    /// Key size in bits.
    pub fn key_bits(&self) -> u32 {
        // `from_key` admits at most 32 bytes.
        (self.key.len() * 8) as u32
    }

    /// Maximum random padding added per encryption.
    pub fn max_padding(&self) -> usize {
        self.max_padding
    }

    // ------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------

    /// Encrypt `plaintext` into a self-contained frame.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut frame = Vec::with_capacity(HEADER_LEN + plaintext.len() + TAG_LEN + 64);
        let mut source = plaintext;
        self.encrypt_stream(&mut source, &mut frame)?;
        Ok(frame)
    }

    /// Encrypt UTF-8 text.
    pub fn encrypt_str(&self, plaintext: &str) -> Result<Vec<u8>> {
        self.encrypt(plaintext.as_bytes())
    }

    /// Decrypt a frame produced by [`Cipher::encrypt`] or
    /// [`Cipher::encrypt_stream`].
    ///
    /// Nothing is returned unless the whole frame authenticates.
    pub fn decrypt(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let mut plaintext = Zeroizing::new(Vec::with_capacity(frame.len()));
        let mut source = frame;
        self.decrypt_stream(&mut source, &mut *plaintext)?;
        Ok(std::mem::take(&mut *plaintext))
    }

    /// Decrypt a frame holding UTF-8 text.
    pub fn decrypt_to_string(&self, frame: &[u8]) -> Result<String> {
        String::from_utf8(self.decrypt(frame)?).map_err(|e| {
            let mut bad_bytes = e.into_bytes();
            bad_bytes.zeroize();
            NeonVaultError::InvalidUtf8
        })
    }

    // ------------------------------------------------------------------
    // Streams
    // ------------------------------------------------------------------

    /// Encrypt everything readable from `source` into `sink`.
    ///
    /// Returns the number of plaintext bytes consumed.
    pub fn encrypt_stream<R, W>(&self, source: &mut R, sink: &mut W) -> Result<u64>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let salt = keys::generate_salt();
        let message_key = MessageKey::derive(&self.key, &salt)?;

        let mut header = [0u8; HEADER_LEN];
        header[0] = FRAME_VERSION;
        header[1..].copy_from_slice(&salt);
        sink.write_all(&header)?;

        let padding = self.padding_prefix();
        let padding_len = padding.len() as u64;
        let mut logical = Cursor::new(padding).chain(&mut *source);

        let mut sealer = SealingStream::new(&message_key)?;
        let mut pending = Zeroizing::new(Vec::with_capacity(CHUNK_LEN + 1));
        let mut total = 0u64;

        loop {
            fill_to(&mut logical, &mut pending, CHUNK_LEN + 1)?;
            if pending.len() > CHUNK_LEN {
                let sealed = sealer.seal_next(Payload {
                    msg: &pending[..CHUNK_LEN],
                    aad: &header,
                })?;
                sink.write_all(&sealed)?;
                pending.drain(..CHUNK_LEN);
                total += CHUNK_LEN as u64;
            } else {
                let sealed = sealer.seal_last(Payload {
                    msg: &pending,
                    aad: &header,
                })?;
                sink.write_all(&sealed)?;
                total += pending.len() as u64;
                break;
            }
        }

        sink.flush()?;
        Ok(total - padding_len)
    }

    /// Decrypt a frame read from `source` into `sink`.
    ///
    /// Each chunk is authenticated before it is written, but on failure
    /// earlier verified chunks may already be in `sink`; discarding them is
    /// up to the caller.  Returns the number of plaintext bytes written.
    pub fn decrypt_stream<R, W>(&self, source: &mut R, sink: &mut W) -> Result<u64>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut header = Vec::with_capacity(HEADER_LEN);
        fill_to(source, &mut header, HEADER_LEN)?;
        if header.len() < HEADER_LEN || header[0] != FRAME_VERSION {
            return Err(NeonVaultError::TamperDetected);
        }

        let message_key = MessageKey::derive(&self.key, &header[1..])?;
        let mut opener = OpeningStream::new(&message_key)?;
        let mut unpadder = Unpadder::default();
        let mut pending = Vec::with_capacity(SEALED_CHUNK_LEN + 1);

        loop {
            fill_to(source, &mut pending, SEALED_CHUNK_LEN + 1)?;
            if pending.len() > SEALED_CHUNK_LEN {
                let plaintext = Zeroizing::new(opener.open_next(Payload {
                    msg: &pending[..SEALED_CHUNK_LEN],
                    aad: &header,
                })?);
                unpadder.feed(&plaintext, sink)?;
                pending.drain(..SEALED_CHUNK_LEN);
            } else {
                let plaintext = Zeroizing::new(opener.open_last(Payload {
                    msg: &pending,
                    aad: &header,
                })?);
                unpadder.feed(&plaintext, sink)?;
                break;
            }
        }

        let written = unpadder.finish()?;
        sink.flush()?;
        Ok(written)
    }

    /// Length prefix plus random padding for one message.
    fn padding_prefix(&self) -> Vec<u8> {
        let mut rng = rand::rng();
        let len = if self.max_padding == 0 {
            0
        } else {
            rng.random_range(0..=self.max_padding)
        };

        let mut prefix = Vec::with_capacity(PADDING_LEN_PREFIX + len);
        // MAX_PADDING_BYTES keeps `len` well inside u32.
        prefix.extend_from_slice(&(len as u32).to_le_bytes());
        prefix.extend_from_slice(&keys::random_bytes(len));
        prefix
    }
}

impl Default for Cipher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("key_bits", &self.key_bits())
            .field("max_padding", &self.max_padding)
            .finish_non_exhaustive()
    }
}

/// Read from `source` until `buf` holds `target` bytes or the source ends.
fn fill_to<R: Read + ?Sized>(source: &mut R, buf: &mut Vec<u8>, target: usize) -> io::Result<()> {
    let mut filled = buf.len();
    buf.resize(target, 0);
    while filled < target {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                buf.truncate(filled);
                return Err(e);
            }
        }
    }
    buf.truncate(filled);
    Ok(())
}

// ---------------------------------------------------------------------------
// STREAM encryptors, one variant per AES key size
// ---------------------------------------------------------------------------

enum SealingStream {
    Aes128(EncryptorBE32<Aes128Gcm>),
    Aes192(EncryptorBE32<Aes192Gcm>),
    Aes256(EncryptorBE32<Aes256Gcm>),
}

impl SealingStream {
    fn new(message_key: &MessageKey) -> Result<Self> {
        let nonce: &GenericArray<u8, U7> = message_key.nonce_prefix().into();
        let key = message_key.key();
        Ok(match key.len() {
            16 => Self::Aes128(EncryptorBE32::from_aead(
                Aes128Gcm::new_from_slice(key).map_err(invalid_key)?,
                nonce,
            )),
            24 => Self::Aes192(EncryptorBE32::from_aead(
                Aes192Gcm::new_from_slice(key).map_err(invalid_key)?,
                nonce,
            )),
            32 => Self::Aes256(EncryptorBE32::from_aead(
                Aes256Gcm::new_from_slice(key).map_err(invalid_key)?,
                nonce,
            )),
            other => {
                return Err(NeonVaultError::InvalidArgument(format!(
                    "unsupported AES key length {other}"
                )))
            }
        })
    }

    fn seal_next(&mut self, payload: Payload<'_, '_>) -> Result<Vec<u8>> {
        let result = match self {
            Self::Aes128(s) => s.encrypt_next(payload),
            Self::Aes192(s) => s.encrypt_next(payload),
            Self::Aes256(s) => s.encrypt_next(payload),
        };
        result.map_err(|e| NeonVaultError::EncryptionFailed(format!("chunk encryption error: {e}")))
    }

    fn seal_last(self, payload: Payload<'_, '_>) -> Result<Vec<u8>> {
        let result = match self {
            Self::Aes128(s) => s.encrypt_last(payload),
            Self::Aes192(s) => s.encrypt_last(payload),
            Self::Aes256(s) => s.encrypt_last(payload),
        };
        result.map_err(|e| NeonVaultError::EncryptionFailed(format!("chunk encryption error: {e}")))
    }
}

enum OpeningStream {
    Aes128(DecryptorBE32<Aes128Gcm>),
    Aes192(DecryptorBE32<Aes192Gcm>),
    Aes256(DecryptorBE32<Aes256Gcm>),
}

impl OpeningStream {
    fn new(message_key: &MessageKey) -> Result<Self> {
        let nonce: &GenericArray<u8, U7> = message_key.nonce_prefix().into();
        let key = message_key.key();
        Ok(match key.len() {
            16 => Self::Aes128(DecryptorBE32::from_aead(
                Aes128Gcm::new_from_slice(key).map_err(invalid_key)?,
                nonce,
            )),
            24 => Self::Aes192(DecryptorBE32::from_aead(
                Aes192Gcm::new_from_slice(key).map_err(invalid_key)?,
                nonce,
            )),
            32 => Self::Aes256(DecryptorBE32::from_aead(
                Aes256Gcm::new_from_slice(key).map_err(invalid_key)?,
                nonce,
            )),
            other => {
                return Err(NeonVaultError::InvalidArgument(format!(
                    "unsupported AES key length {other}"
                )))
            }
        })
    }

    fn open_next(&mut self, payload: Payload<'_, '_>) -> Result<Vec<u8>> {
        let result = match self {
            Self::Aes128(s) => s.decrypt_next(payload),
            Self::Aes192(s) => s.decrypt_next(payload),
            Self::Aes256(s) => s.decrypt_next(payload),
        };
        result.map_err(|_| NeonVaultError::TamperDetected)
    }

    fn open_last(self, payload: Payload<'_, '_>) -> Result<Vec<u8>> {
        let result = match self {
            Self::Aes128(s) => s.decrypt_last(payload),
            Self::Aes192(s) => s.decrypt_last(payload),
            Self::Aes256(s) => s.decrypt_last(payload),
        };
        result.map_err(|_| NeonVaultError::TamperDetected)
    }
}

fn invalid_key<E: fmt::Display>(e: E) -> NeonVaultError {
    NeonVaultError::InvalidArgument(format!("invalid key length: {e}"))
}

// ---------------------------------------------------------------------------
// Padding removal
// ---------------------------------------------------------------------------

/// Strips `[padding_len][padding]` from the front of the decrypted stream.
#[derive(Default)]
struct Unpadder {
    prefix: [u8; PADDING_LEN_PREFIX],
    prefix_filled: usize,
    skipped: usize,
    written: u64,
}

impl Unpadder {
    fn padding_len(&self) -> usize {
        u32::from_le_bytes(self.prefix) as usize
    }

    fn feed<W: Write + ?Sized>(&mut self, mut chunk: &[u8], sink: &mut W) -> Result<()> {
        while self.prefix_filled < PADDING_LEN_PREFIX {
            let Some((&byte, rest)) = chunk.split_first() else {
                return Ok(());
            };
            self.prefix[self.prefix_filled] = byte;
            self.prefix_filled += 1;
            chunk = rest;
        }

        let skip = (self.padding_len() - self.skipped).min(chunk.len());
        self.skipped += skip;
        chunk = &chunk[skip..];

        if !chunk.is_empty() {
            sink.write_all(chunk)?;
            self.written += chunk.len() as u64;
        }
        Ok(())
    }

    /// An authenticated stream that ends inside its own padding is corrupt.
    fn finish(self) -> Result<u64> {
        if self.prefix_filled < PADDING_LEN_PREFIX || self.skipped < self.padding_len() {
            return Err(NeonVaultError::TamperDetected);
        }
        Ok(self.written)
    }
}
