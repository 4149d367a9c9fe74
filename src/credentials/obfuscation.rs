//! Passphrase keystream masking for the credential file.
//!
//! The keystream is SHA-256(passphrase), followed by SHA-256 of the previous
//! digest, repeated until it covers the payload. Payload bytes are XORed with
//! it, so encoding and decoding are the same operation. An empty passphrase
//! leaves the bytes untouched.
//!
//! This deters casual disclosure only. It is not encryption: identical
//! payloads under the same passphrase produce identical output, and nothing
//! detects tampering.

use sha2::{Digest, Sha256};

/// Derives `len` keystream bytes from `passphrase`.
pub fn derive_keystream(passphrase: &str, len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(len);
    let mut digest = Sha256::digest(passphrase.as_bytes());

    while key.len() < len {
        key.extend_from_slice(&digest);
        digest = Sha256::digest(digest);
    }

    key.truncate(len);
    key
}

/// Masks `data` with the passphrase keystream.
pub fn encode(passphrase: &str, data: &[u8]) -> Vec<u8> {
    apply(passphrase, data)
}

/// Reverses [`encode`].
pub fn decode(passphrase: &str, data: &[u8]) -> Vec<u8> {
    apply(passphrase, data)
}

fn apply(passphrase: &str, data: &[u8]) -> Vec<u8> {
    if passphrase.is_empty() {
        return data.to_vec();
    }

    derive_keystream(passphrase, data.len())
        .iter()
        .zip(data)
        .map(|(k, b)| k ^ b)
        .collect()
}
