//! Chunk and whole-file fingerprinting.
//!
//! Two operations: [`digest`] computes a fixed-length hex digest over a
//! contiguous byte range, and [`fold`] composes the whole-file digest by
//! feeding each chunk's digest, in chunk-index order, into a fresh hash
//! instance. The whole-file digest is therefore a hash-of-hashes rather
//! than a digest of the raw bytes — that composition is load-bearing for
//! server-side deduplication and must not change without a wire-format
//! version bump.

use md5::{Digest, Md5};
use std::io::{self, Read};
use thiserror::Error;

/// Errors that can occur while fingerprinting.
#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("I/O error reading chunk data: {0}")]
    Read(#[from] io::Error),
}

/// Incremental hasher over a byte stream, mirroring the update/finalize
/// shape of a streaming checksum so chunk bytes never need to be fully
/// buffered before they can be hashed.
pub struct StreamingDigest {
    hasher: Md5,
}

impl StreamingDigest {
    pub fn new() -> Self {
        Self { hasher: Md5::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl Default for StreamingDigest {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the hex digest of an in-memory byte range.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = StreamingDigest::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Compute the hex digest of a byte range read from a stream, without
/// requiring the whole range to be materialized at once.
pub fn digest_reader<R: Read>(mut reader: R, len: u64) -> Result<String, FingerprintError> {
    let mut hasher = StreamingDigest::new();
    let mut buffer = [0u8; 64 * 1024];
    let mut remaining = len;

    while remaining > 0 {
        let want = remaining.min(buffer.len() as u64) as usize;
        let n = reader.read(&mut buffer[..want])?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        remaining -= n as u64;
    }

    Ok(hasher.finalize())
}

/// Fold per-chunk digests (already hex strings, in index order) into the
/// whole-file digest. Each digest's *bytes* (not its hex text) are fed to
/// a fresh hash instance, then finalized.
pub fn fold<I, S>(digests: I) -> Result<String, FingerprintError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = StreamingDigest::new();
    for d in digests {
        let raw = hex::decode(d.as_ref()).map_err(|e| {
            FingerprintError::Read(io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        hasher.update(&raw);
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = digest(b"hello world");
        let b = digest(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32); // MD5 hex is 32 chars
    }

    #[test]
    fn digest_known_value() {
        // MD5("hello world")
        assert_eq!(digest(b"hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn digest_reader_matches_in_memory_digest() {
        let data = vec![0xAAu8; 1024];
        let expected = digest(&data);
        let actual = digest_reader(std::io::Cursor::new(&data), data.len() as u64).unwrap();
        assert_eq!(expected, actual);
    }

    #[test]
    fn fold_is_order_sensitive() {
        let d0 = digest(b"chunk-0");
        let d1 = digest(b"chunk-1");

        let forward = fold([d0.clone(), d1.clone()]).unwrap();
        let backward = fold([d1, d0]).unwrap();

        assert_ne!(forward, backward, "fold must respect chunk-index order");
    }

    #[test]
    fn fold_is_deterministic_for_same_order() {
        let digests = vec![digest(b"a"), digest(b"b"), digest(b"c")];
        let first = fold(digests.clone()).unwrap();
        let second = fold(digests).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn fold_rejects_non_hex_input() {
        let result = fold(["not-hex!!".to_string()]);
        assert!(result.is_err());
    }
}
