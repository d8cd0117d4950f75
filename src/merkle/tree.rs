//! Merkle tree construction and proof generation.

use tracing::debug;

use super::{node_hash, MerkleProof, ProofStep, Side};
use crate::error::AuditError;
use crate::hashing::{self, RawDigest};

/// A fully materialized Merkle tree over an ordered, closed set of leaf
/// hashes. Level 0 holds the leaves; the last level holds the single root.
///
/// The leaf order is fixed at construction and is part of what the root
/// commits to.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<RawDigest>>,
}

impl MerkleTree {
    /// Build a tree from ordered leaf hashes (lowercase hex digests).
    ///
    /// Adjacent nodes are hashed pairwise level by level; an odd trailing
    /// node is duplicated to form its pair. A single-leaf tree's root is the
    /// leaf itself. Empty input is rejected.
    pub fn build(leaves: &[String]) -> Result<Self, AuditError> {
        if leaves.is_empty() {
            return Err(AuditError::validation(
                "Cannot build Merkle tree from empty leaf set",
            ));
        }

        let mut level: Vec<RawDigest> = leaves
            .iter()
            .map(|h| hashing::decode_digest(h))
            .collect::<Result<_, _>>()?;

        let mut levels = vec![level.clone()];
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                next.push(node_hash(left, right));
            }
            levels.push(next.clone());
            level = next;
        }

        debug!(
            leaves = leaves.len(),
            root = %hex::encode(levels[levels.len() - 1][0]),
            "Built Merkle tree"
        );
        Ok(Self { levels })
    }

    /// The root digest, lowercase hex.
    pub fn root(&self) -> String {
        hex::encode(self.levels[self.levels.len() - 1][0])
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Proof length for any leaf: ceil(log2(leaf_count)), 0 for one leaf.
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Generate the inclusion proof for the leaf at `leaf_index`.
    ///
    /// Deterministic for a given tree: the same index always yields the same
    /// ordered (sibling, side) sequence.
    pub fn prove(&self, leaf_index: usize) -> Result<MerkleProof, AuditError> {
        if leaf_index >= self.leaf_count() {
            return Err(AuditError::validation(format!(
                "Leaf index {} out of range for {} leaves",
                leaf_index,
                self.leaf_count()
            )));
        }

        let mut steps = Vec::with_capacity(self.depth());
        let mut index = leaf_index;
        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling_index, side) = if index % 2 == 0 {
                (index + 1, Side::Right)
            } else {
                (index - 1, Side::Left)
            };
            // Past the end of an odd level the node was paired with itself.
            let sibling = if sibling_index < level.len() {
                level[sibling_index]
            } else {
                level[index]
            };
            steps.push(ProofStep {
                sibling: hex::encode(sibling),
                side,
            });
            index /= 2;
        }

        Ok(MerkleProof {
            leaf_hash: hex::encode(self.levels[0][leaf_index]),
            steps,
            root: self.root(),
        })
    }
}
