//! Merkle Engine
//!
//! Batches event hashes into a binary hash tree, computes the root, and
//! produces/verifies inclusion proofs.
//!
//! Hash construction is domain-separated: leaves are SHA-256(0x00 || metadata
//! hash bytes) and internal nodes are SHA-256(0x01 || left || right), always
//! over raw 32-byte digests rather than hex text. The distinct prefixes
//! prevent an internal node from being replayed as a leaf (and vice versa),
//! and the raw-byte concatenation leaves no ambiguity in how children are
//! combined. A level with an odd number of nodes duplicates its last node to
//! form the final pair; verification applies the same rule.

mod proof;
mod tree;

pub use proof::{verify_proof, MerkleProof, ProofStep, Side};
pub use tree::MerkleTree;

use crate::error::AuditError;
use crate::hashing::{self, RawDigest};

/// Domain tag prepended when hashing a leaf.
const LEAF_TAG: u8 = 0x00;
/// Domain tag prepended when hashing an internal node.
const NODE_TAG: u8 = 0x01;

/// Compute the domain-separated leaf hash from a raw metadata digest.
pub fn leaf_hash_raw(metadata: &RawDigest) -> String {
    let mut input = [0u8; 1 + hashing::DIGEST_LEN];
    input[0] = LEAF_TAG;
    input[1..].copy_from_slice(metadata);
    hashing::digest_hex(&input)
}

/// Compute the domain-separated leaf hash from a hex metadata digest.
pub fn leaf_hash(metadata_hash: &str) -> Result<String, AuditError> {
    Ok(leaf_hash_raw(&hashing::decode_digest(metadata_hash)?))
}

/// Hash two child digests into their parent node.
fn node_hash(left: &RawDigest, right: &RawDigest) -> RawDigest {
    let mut input = [0u8; 1 + 2 * hashing::DIGEST_LEN];
    input[0] = NODE_TAG;
    input[1..1 + hashing::DIGEST_LEN].copy_from_slice(left);
    input[1 + hashing::DIGEST_LEN..].copy_from_slice(right);
    hashing::digest(&input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::digest;

    #[test]
    fn test_leaf_hash_differs_from_plain_digest() {
        let metadata = digest(b"some event");
        let leaf = leaf_hash_raw(&metadata);
        assert_ne!(leaf, hex::encode(metadata));
    }

    #[test]
    fn test_leaf_and_node_domains_are_disjoint() {
        // hashing X as a leaf must never equal hashing X||X as a node
        let x = digest(b"x");
        let as_leaf = leaf_hash_raw(&x);
        let as_node = hex::encode(node_hash(&x, &x));
        assert_ne!(as_leaf, as_node);
    }

    #[test]
    fn test_leaf_hash_rejects_malformed_digest() {
        assert!(leaf_hash("not-a-digest").is_err());
    }
}
