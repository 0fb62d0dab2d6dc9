//! Message digests with an all-zero sentinel for missing input.
//!
//! `None` and empty input hash to a digest made entirely of zero bytes
//! rather than to the digest of the empty message, so "no content" is
//! recognisable without knowing each algorithm's empty-input constant.

use std::io::{self, Read};

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::errors::Result;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Digest width in bytes.
    pub const fn output_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    /// Hash `data`, returning the zero sentinel for `None` or empty input.
    pub fn digest(self, data: Option<&[u8]>) -> Vec<u8> {
        match data {
            Some(data) if !data.is_empty() => match self {
                Self::Md5 => Md5::digest(data).to_vec(),
                Self::Sha1 => Sha1::digest(data).to_vec(),
                Self::Sha256 => Sha256::digest(data).to_vec(),
                Self::Sha512 => Sha512::digest(data).to_vec(),
            },
            _ => self.sentinel(),
        }
    }

    /// Lowercase hex form of [`HashAlgorithm::digest`].
    pub fn digest_hex(self, data: Option<&[u8]>) -> String {
        hex::encode(self.digest(data))
    }

    /// Hash everything readable from `reader`.
    ///
    /// An empty stream yields the zero sentinel.
    pub fn digest_reader<R: Read>(self, reader: R) -> Result<Vec<u8>> {
        let digest = match self {
            Self::Md5 => hash_reader::<Md5, _>(reader)?,
            Self::Sha1 => hash_reader::<Sha1, _>(reader)?,
            Self::Sha256 => hash_reader::<Sha256, _>(reader)?,
            Self::Sha512 => hash_reader::<Sha512, _>(reader)?,
        };
        Ok(digest.unwrap_or_else(|| self.sentinel()))
    }

    fn sentinel(self) -> Vec<u8> {
        vec![0u8; self.output_len()]
    }
}

/// Returns `None` when the reader produced no bytes.
fn hash_reader<D: Digest, R: Read>(mut reader: R) -> io::Result<Option<Vec<u8>>> {
    let mut hasher = D::new();
    let mut buf = [0u8; 8192];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    if total == 0 {
        return Ok(None);
    }
    Ok(Some(hasher.finalize().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
    ];

    #[test]
    fn missing_and_empty_input_give_zero_sentinel() {
        for algorithm in ALL {
            let zeros = vec![0u8; algorithm.output_len()];
            assert_eq!(algorithm.digest(None), zeros, "{algorithm:?} / None");
            assert_eq!(algorithm.digest(Some(b"".as_slice())), zeros, "{algorithm:?} / empty");
            assert_eq!(algorithm.digest_reader(io::empty()).unwrap(), zeros);
        }
    }

    #[test]
    fn known_digests() {
        assert_eq!(
            HashAlgorithm::Md5.digest_hex(Some(b"abc".as_slice())),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            HashAlgorithm::Sha1.digest_hex(Some(b"abc".as_slice())),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            HashAlgorithm::Sha256.digest_hex(Some(b"abc".as_slice())),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            HashAlgorithm::Sha512.digest(Some(b"abc".as_slice())).len(),
            HashAlgorithm::Sha512.output_len()
        );
    }

    #[test]
    fn reader_matches_buffer_digest() {
        let data = vec![0x61u8; 20_000];
        for algorithm in ALL {
            let from_reader = algorithm.digest_reader(&data[..]).unwrap();
            assert_eq!(from_reader, algorithm.digest(Some(data.as_slice())));
        }
    }
}
