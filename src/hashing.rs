//! SHA-256 Hashing
//!
//! Single digest primitive for the whole pipeline: event metadata hashes,
//! Merkle leaves and internal nodes all go through here. Digests are stored
//! and displayed as 64-character lowercase hex.

use sha2::{Digest, Sha256};

use crate::error::AuditError;

/// Length of a raw SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Raw 32-byte digest.
pub type RawDigest = [u8; DIGEST_LEN];

/// Compute the SHA-256 digest of arbitrary bytes.
pub fn digest(bytes: &[u8]) -> RawDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Compute the SHA-256 digest of arbitrary bytes as lowercase hex.
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(digest(bytes))
}

/// Decode a hex digest string, rejecting anything that is not exactly
/// 32 bytes of lowercase hex.
pub fn decode_digest(hash: &str) -> Result<RawDigest, AuditError> {
    if hash.len() != DIGEST_LEN * 2 {
        return Err(AuditError::validation(format!(
            "Invalid digest length: {} (expected {} hex characters)",
            hash.len(),
            DIGEST_LEN * 2
        )));
    }
    if hash.bytes().any(|b| b.is_ascii_uppercase()) {
        return Err(AuditError::validation(format!(
            "Digest must be lowercase hex: {}",
            hash
        )));
    }
    let bytes = hex::decode(hash)
        .map_err(|e| AuditError::validation(format!("Invalid hex digest {}: {}", hash, e)))?;
    let mut raw = [0u8; DIGEST_LEN];
    raw.copy_from_slice(&bytes);
    Ok(raw)
}
