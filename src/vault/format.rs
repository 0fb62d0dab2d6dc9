//! Vault document text format.
//!
//! A vault document looks like this:
//!
//! ```text
//! NEON-VAULT:<password-name>
//! 01c2e4f1a0...            <- encrypted frame as hex, wrapped at a fixed width
//! 9b77d3...
//! ```
//!
//! - **Header**: the `NEON-VAULT:` tag followed by the name of the password
//!   that protects the document.
//! - **Body**: the `Cipher` frame, two hex digits per byte.  Line breaks in
//!   the body only exist to keep diffs readable and are ignored on read.
//!
//! Readers tolerate what version control does to text files: a UTF-8 BOM
//! before the header, LF or CRLF line breaks (mixed is fine) and hex digits
//! in either case.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{NeonVaultError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Literal that starts every vault document.
pub const HEADER_TAG: &str = "NEON-VAULT:";

/// UTF-8 byte-order mark some editors prepend to text files.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Longest accepted password name.
pub const MAX_PASSWORD_NAME_LEN: usize = 256;

/// Default body width in hex digits.
pub const DEFAULT_LINE_WIDTH: usize = 64;

/// Longest possible header line: BOM, tag, name and CRLF.
pub(crate) const MAX_HEADER_LINE_LEN: usize =
    UTF8_BOM.len() + HEADER_TAG.len() + MAX_PASSWORD_NAME_LEN + 2;

// ---------------------------------------------------------------------------
// Line endings
// ---------------------------------------------------------------------------

/// Line terminator written after the header and every body line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

// ---------------------------------------------------------------------------
// Password names
// ---------------------------------------------------------------------------

/// Validate that a password name is safe to embed in a header and to use
/// as a file name.
///
/// Allowed: ASCII letters, digits, underscores, hyphens, periods.
/// Must be non-empty, at most 256 characters, and not made only of periods
/// (`.` and `..` name directories, not files).
pub fn validate_password_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NeonVaultError::InvalidArgument(
            "password name cannot be empty".into(),
        ));
    }
    if name.len() > MAX_PASSWORD_NAME_LEN {
        return Err(NeonVaultError::InvalidArgument(format!(
            "password name cannot exceed {MAX_PASSWORD_NAME_LEN} characters"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(NeonVaultError::InvalidArgument(format!(
            "password name '{name}' contains invalid characters — only ASCII letters, digits, underscores, hyphens, and periods are allowed"
        )));
    }
    if name.bytes().all(|b| b == b'.') {
        return Err(NeonVaultError::InvalidArgument(format!(
            "password name '{name}' must contain something other than periods"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Build the header line for `password_name`, line ending included.
pub fn header_line(password_name: &str, line_ending: LineEnding) -> String {
    format!("{HEADER_TAG}{password_name}{}", line_ending.as_str())
}

/// Parse the header at the start of `data`.
///
/// Returns the password name and the offset of the first body byte, or
/// `None` if `data` does not start with a well-formed header line.  A
/// header line longer than `MAX_HEADER_LINE_LEN` is never well formed, so
/// the buffered and streaming readers agree on what is a vault.
pub(crate) fn parse_header(data: &[u8]) -> Option<(&str, usize)> {
    let bom_len = if data.starts_with(UTF8_BOM) {
        UTF8_BOM.len()
    } else {
        0
    };
    let after_tag = data[bom_len..].strip_prefix(HEADER_TAG.as_bytes())?;
    let newline = after_tag.iter().position(|&b| b == b'\n')?;

    let mut name = &after_tag[..newline];
    while let Some((last, rest)) = name.split_last() {
        if !matches!(*last, b'\r' | b' ' | b'\t') {
            break;
        }
        name = rest;
    }

    let body_start = bom_len + HEADER_TAG.len() + newline + 1;
    if body_start > MAX_HEADER_LINE_LEN {
        return None;
    }

    let name = std::str::from_utf8(name).ok()?;
    validate_password_name(name).ok()?;
    Some((name, body_start))
}

/// Returns `true` if `data` starts with a vault header.
///
/// Only the header is inspected; the body is neither parsed nor decrypted.
pub fn is_encrypted(data: &[u8]) -> bool {
    parse_header(data).is_some()
}

/// Like [`is_encrypted`], reading at most one header line from `reader`.
pub fn is_encrypted_stream<R: Read>(reader: R) -> Result<bool> {
    let mut first_line = Vec::new();
    BufReader::new(reader.take(MAX_HEADER_LINE_LEN as u64)).read_until(b'\n', &mut first_line)?;
    Ok(is_encrypted(&first_line))
}

/// Like [`is_encrypted`], for a file on disk.
pub fn is_encrypted_file(path: &Path) -> Result<bool> {
    is_encrypted_stream(std::fs::File::open(path)?)
}

/// The password name recorded in a vault header, if `data` has one.
pub fn password_name(data: &[u8]) -> Option<String> {
    parse_header(data).map(|(name, _)| name.to_owned())
}

// ---------------------------------------------------------------------------
// Body validation
// ---------------------------------------------------------------------------

/// Problems with the hex body of a vault document.
#[derive(Debug, Error)]
pub(crate) enum BodyError {
    #[error("invalid hex digit {0:?} in vault body")]
    InvalidDigit(char),

    #[error("vault body has an odd number of hex digits")]
    OddDigitCount,
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Check a whole in-memory body without decoding it.
pub(crate) fn check_body(body: &[u8]) -> std::result::Result<(), BodyError> {
    let mut digits = 0usize;
    for &byte in body {
        if byte.is_ascii_whitespace() {
            continue;
        }
        if hex_value(byte).is_none() {
            return Err(BodyError::InvalidDigit(char::from(byte)));
        }
        digits += 1;
    }
    if digits % 2 != 0 {
        return Err(BodyError::OddDigitCount);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Hex line codec
// ---------------------------------------------------------------------------

/// Writes bytes as lowercase hex, wrapped at a fixed width.
pub(crate) struct HexLineWriter<W: Write> {
    inner: W,
    width: usize,
    column: usize,
    line_ending: &'static [u8],
}

impl<W: Write> HexLineWriter<W> {
    pub(crate) fn new(inner: W, width: usize, line_ending: LineEnding) -> Self {
        Self {
            inner,
            width: width.max(1),
            column: 0,
            line_ending: line_ending.as_str().as_bytes(),
        }
    }

    /// Terminate the last line and flush.
    pub(crate) fn finish(mut self) -> io::Result<W> {
        if self.column > 0 {
            self.inner.write_all(self.line_ending)?;
            self.column = 0;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for HexLineWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let encoded = hex::encode(buf);
        let mut digits = encoded.as_bytes();
        let mut out = Vec::with_capacity(digits.len() + digits.len() / self.width * 2 + 2);

        while !digits.is_empty() {
            if self.column == self.width {
                out.extend_from_slice(self.line_ending);
                self.column = 0;
            }
            let take = (self.width - self.column).min(digits.len());
            out.extend_from_slice(&digits[..take]);
            self.column += take;
            digits = &digits[take..];
        }

        self.inner.write_all(&out)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decodes a hex body, skipping whitespace and line breaks.
///
/// Malformed input surfaces as an `InvalidData` I/O error wrapping a
/// [`BodyError`].
pub(crate) struct HexLineReader<R: BufRead> {
    inner: R,
    high_nibble: Option<u8>,
}

impl<R: BufRead> HexLineReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            high_nibble: None,
        }
    }
}

fn body_error(e: BodyError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

impl<R: BufRead> Read for HexLineReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;

        while written < out.len() {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                if self.high_nibble.is_some() {
                    return Err(body_error(BodyError::OddDigitCount));
                }
                break;
            }

            let mut used = 0;
            for &byte in available {
                if written == out.len() {
                    break;
                }
                used += 1;
                if byte.is_ascii_whitespace() {
                    continue;
                }
                let nibble = hex_value(byte)
                    .ok_or_else(|| body_error(BodyError::InvalidDigit(char::from(byte))))?;
                match self.high_nibble.take() {
                    Some(high) => {
                        out[written] = (high << 4) | nibble;
                        written += 1;
                    }
                    None => self.high_nibble = Some(nibble),
                }
            }
            self.inner.consume(used);
        }

        Ok(written)
    }
}

/// Map an I/O error raised by [`HexLineReader`] back to a vault error.
pub(crate) fn body_error_from_io(e: io::Error) -> NeonVaultError {
    match e
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<BodyError>())
    {
        Some(body) => NeonVaultError::MalformedVault(body.to_string()),
        None => NeonVaultError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_password_names() {
        for name in ["a", "a_b", "a.b", "a-b", "a1", "Prod.DB-2_key"] {
            assert!(validate_password_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejected_password_names() {
        let too_long = "x".repeat(MAX_PASSWORD_NAME_LEN + 1);
        for name in [
            "",
            "bad\\name",
            "bad/name",
            "bad.name!",
            "with space",
            "é",
            ".",
            "..",
            "...",
            too_long.as_str(),
        ] {
            assert!(
                matches!(
                    validate_password_name(name),
                    Err(NeonVaultError::InvalidArgument(_))
                ),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn header_round_trips_with_either_line_ending() {
        for ending in [LineEnding::Lf, LineEnding::CrLf] {
            let mut doc = header_line("db.prod", ending).into_bytes();
            doc.extend_from_slice(b"00ff\n");
            let (name, body_start) = parse_header(&doc).unwrap();
            assert_eq!(name, "db.prod");
            assert_eq!(&doc[body_start..], b"00ff\n");
        }
    }

    #[test]
    fn names_with_dots_and_other_characters_are_accepted() {
        for name in [".env", "..a", "a..", ".hidden.key"] {
            assert!(validate_password_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn header_line_length_is_bounded() {
        let name = "n".repeat(MAX_PASSWORD_NAME_LEN);

        let mut longest = UTF8_BOM.to_vec();
        longest.extend_from_slice(header_line(&name, LineEnding::CrLf).as_bytes());
        assert_eq!(longest.len(), MAX_HEADER_LINE_LEN);
        longest.extend_from_slice(b"00ff\n");
        assert_eq!(password_name(&longest).as_deref(), Some(name.as_str()));
        assert!(is_encrypted_stream(&longest[..]).unwrap());

        // Trailing whitespace may not push the line past the limit.
        let padded = format!("{HEADER_TAG}{name}{}\n00ff\n", " ".repeat(300));
        assert!(!is_encrypted(padded.as_bytes()));
        assert!(!is_encrypted_stream(padded.as_bytes()).unwrap());

        let mut one_over = UTF8_BOM.to_vec();
        one_over.extend_from_slice(format!("{HEADER_TAG}{name} \r\n00ff\n").as_bytes());
        assert!(!is_encrypted(&one_over));
        assert!(!is_encrypted_stream(&one_over[..]).unwrap());
    }

    #[test]
    fn header_after_bom_is_recognised() {
        let mut doc = UTF8_BOM.to_vec();
        doc.extend_from_slice(b"NEON-VAULT:alpha\r\nabcd\r\n");
        assert_eq!(password_name(&doc).as_deref(), Some("alpha"));
    }

    #[test]
    fn non_vault_input_has_no_header() {
        assert!(!is_encrypted(b""));
        assert!(!is_encrypted(b"hello world\n"));
        assert!(!is_encrypted(b"NEON-VAULT:alpha"));
        assert!(!is_encrypted(b"NEON-VAULT:\n00\n"));
        assert!(!is_encrypted(b"NEON-VAULT:bad/name\n00\n"));
        assert!(!is_encrypted(b" NEON-VAULT:alpha\n00\n"));
    }

    #[test]
    fn stream_check_reads_only_the_header() {
        let doc = b"NEON-VAULT:alpha\nzz not hex at all\n";
        assert!(is_encrypted_stream(&doc[..]).unwrap());
        assert!(!is_encrypted_stream(&b"plain text"[..]).unwrap());
    }

    #[test]
    fn writer_wraps_at_width() {
        let mut writer = HexLineWriter::new(Vec::new(), 4, LineEnding::CrLf);
        writer.write_all(&[0x01, 0x02, 0x03]).unwrap();
        writer.write_all(&[0xAB]).unwrap();
        let out = writer.finish().unwrap();
        assert_eq!(out, b"0102\r\n03ab\r\n");
    }

    #[test]
    fn reader_ignores_case_and_line_breaks() {
        let body = b"0A0b\r\n  0C\n0d\r\n";
        let mut decoded = Vec::new();
        HexLineReader::new(&body[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, [0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn reader_rejects_odd_digit_count() {
        let mut decoded = Vec::new();
        let err = HexLineReader::new(&b"abc\n"[..])
            .read_to_end(&mut decoded)
            .unwrap_err();
        assert!(matches!(
            body_error_from_io(err),
            NeonVaultError::MalformedVault(_)
        ));
    }

    #[test]
    fn reader_rejects_invalid_digit() {
        let mut decoded = Vec::new();
        let err = HexLineReader::new(&b"ab\nZd\n"[..])
            .read_to_end(&mut decoded)
            .unwrap_err();
        assert!(matches!(
            body_error_from_io(err),
            NeonVaultError::MalformedVault(_)
        ));
    }

    #[test]
    fn check_body_matches_reader_rules() {
        assert!(check_body(b"00ff\r\nAB\n").is_ok());
        assert!(matches!(check_body(b"00f"), Err(BodyError::OddDigitCount)));
        assert!(matches!(
            check_body(b"0g"),
            Err(BodyError::InvalidDigit('g'))
        ));
    }
}
