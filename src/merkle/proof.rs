//! Inclusion proofs and their verification.

use serde::{Deserialize, Serialize};

use super::node_hash;
use crate::error::AuditError;
use crate::hashing;

/// Which side of the pair the sibling sits on, from the prover's point of
/// view walking up from the leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One step of an inclusion proof: the sibling digest and its side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: String,
    pub side: Side,
}

/// Inclusion proof tying one leaf to a root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_hash: String,
    pub steps: Vec<ProofStep>,
    pub root: String,
}

impl MerkleProof {
    /// Verify this proof against its own recorded root.
    pub fn verify(&self) -> Result<bool, AuditError> {
        verify_proof(&self.leaf_hash, &self.steps, &self.root)
    }
}

/// Recompute the root upward from `leaf_hash` using the proof steps in
/// order, applying the same concatenation and duplication rules as tree
/// construction, and compare against `claimed_root`.
///
/// Every step is consumed before the comparison; malformed digests are an
/// error, a mismatching root is `Ok(false)`.
pub fn verify_proof(
    leaf_hash: &str,
    steps: &[ProofStep],
    claimed_root: &str,
) -> Result<bool, AuditError> {
    let claimed = hashing::decode_digest(claimed_root)?;
    let mut current = hashing::decode_digest(leaf_hash)?;

    for step in steps {
        let sibling = hashing::decode_digest(&step.sibling)?;
        current = match step.side {
            Side::Right => node_hash(&current, &sibling),
            Side::Left => node_hash(&sibling, &current),
        };
    }

    Ok(current == claimed)
}
