//! Integrity: whole-content SHA-256 digests, hex encoded on the wire.

use sha2::{Digest, Sha256};

/// Streaming digest over file content.
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        to_hex(&self.inner.finalize())
    }
}

/// Digest of an in-memory buffer, lowercase hex.
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(bytes);
    hasher.finalize_hex()
}

/// Case-insensitive comparison of two hex digests.
pub fn checksums_match(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn streaming_matches_one_shot() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut hasher = ContentHasher::new();
        for part in data.chunks(777) {
            hasher.update(part);
        }
        assert_eq!(hasher.finalize_hex(), checksum(&data));
    }

    #[test]
    fn match_ignores_case_but_not_content() {
        let digest = checksum(b"hello");
        assert!(checksums_match(&digest.to_uppercase(), &digest));
        assert!(!checksums_match(&checksum(b"hellp"), &digest));
    }
}
