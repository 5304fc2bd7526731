//! Hash-lock derivation for single and multi-fill orders
//!
//! One secret produces a plain `keccak256(secret)` lock. Several secrets are
//! committed under a Merkle root so each partial fill can be unlocked by its
//! own secret:
//!
//! - leaf `i` is `keccak256(secret[i])`
//! - the tree node for leaf `i` is `keccak256(u64_be(i) || leaf[i])`, binding
//!   every secret to its fill index
//! - parents hash the sorted pair, an odd trailing node moves up unchanged

use super::types::{keccak256, Hash32, Secret};
use crate::error::{CoordinatorError, CoordinatorResult};

use serde::{Deserialize, Serialize};

/// Commitment gating escrow release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HashLock {
    Single { hash: Hash32 },
    MerkleMultiple { root: Hash32, leaves: Vec<Hash32> },
}

impl HashLock {
    /// Value published with the order
    pub fn commitment(&self) -> Hash32 {
        match self {
            HashLock::Single { hash } => *hash,
            HashLock::MerkleMultiple { root, .. } => *root,
        }
    }

    /// Per-fill secret hashes, in fill index order
    pub fn secret_hashes(&self) -> Vec<Hash32> {
        match self {
            HashLock::Single { hash } => vec![*hash],
            HashLock::MerkleMultiple { leaves, .. } => leaves.clone(),
        }
    }

    pub fn secrets_count(&self) -> usize {
        match self {
            HashLock::Single { .. } => 1,
            HashLock::MerkleMultiple { leaves, .. } => leaves.len(),
        }
    }

    /// Merkle proof for one fill; `None` for single locks or out of range
    pub fn proof(&self, index: usize) -> Option<Vec<Hash32>> {
        match self {
            HashLock::Single { .. } => None,
            HashLock::MerkleMultiple { leaves, .. } => HashLockBuilder::proof(leaves, index),
        }
    }
}

/// Stateless builder; identical secrets in identical order always give the
/// identical lock.
pub struct HashLockBuilder;

impl HashLockBuilder {
    pub fn build(secrets: &[Secret]) -> CoordinatorResult<HashLock> {
        match secrets.len() {
            0 => Err(CoordinatorError::InvalidSecretCount { count: 0 }),
            1 => Ok(HashLock::Single {
                hash: secrets[0].hash(),
            }),
            _ => {
                let leaves: Vec<Hash32> = secrets.iter().map(Secret::hash).collect();
                let root = Self::merkle_root(&leaves);
                Ok(HashLock::MerkleMultiple { root, leaves })
            }
        }
    }

    pub fn merkle_root(leaves: &[Hash32]) -> Hash32 {
        let levels = Self::levels(leaves);
        levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or_else(|| keccak256(&[]))
    }

    /// Sibling hashes from leaf to root. Levels where the node was promoted
    /// contribute nothing.
    pub fn proof(leaves: &[Hash32], index: usize) -> Option<Vec<Hash32>> {
        if index >= leaves.len() {
            return None;
        }

        let levels = Self::levels(leaves);
        let mut proof = Vec::new();
        let mut position = index;
        for level in &levels[..levels.len() - 1] {
            let sibling = position ^ 1;
            if sibling < level.len() {
                proof.push(level[sibling]);
            }
            position /= 2;
        }
        Some(proof)
    }

    pub fn verify(root: &Hash32, index: usize, leaf: &Hash32, proof: &[Hash32]) -> bool {
        let node = proof
            .iter()
            .fold(Self::leaf_node(index as u64, leaf), |node, sibling| {
                Self::hash_pair(&node, sibling)
            });
        node == *root
    }

    fn levels(leaves: &[Hash32]) -> Vec<Vec<Hash32>> {
        let mut level: Vec<Hash32> = leaves
            .iter()
            .enumerate()
            .map(|(i, leaf)| Self::leaf_node(i as u64, leaf))
            .collect();
        let mut levels = vec![level.clone()];

        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| {
                    if pair.len() == 2 {
                        Self::hash_pair(&pair[0], &pair[1])
                    } else {
                        pair[0]
                    }
                })
                .collect();
            levels.push(level.clone());
        }

        levels
    }

    fn leaf_node(index: u64, leaf: &Hash32) -> Hash32 {
        let mut buf = [0u8; 40];
        buf[..8].copy_from_slice(&index.to_be_bytes());
        buf[8..].copy_from_slice(leaf.as_bytes());
        keccak256(&buf)
    }

    fn hash_pair(a: &Hash32, b: &Hash32) -> Hash32 {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(lo.as_bytes());
        buf[32..].copy_from_slice(hi.as_bytes());
        keccak256(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets(n: u8) -> Vec<Secret> {
        (0..n).map(|i| Secret::from_bytes([i + 1; 32])).collect()
    }

    #[test]
    fn test_empty_secret_list_rejected() {
        let err = HashLockBuilder::build(&[]).unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidSecretCount { count: 0 }));
    }

    #[test]
    fn test_single_secret_gives_single_lock() {
        let s = secrets(1);
        let lock = HashLockBuilder::build(&s).unwrap();
        assert_eq!(lock, HashLock::Single { hash: s[0].hash() });
        assert_eq!(lock.secret_hashes(), vec![s[0].hash()]);
        assert!(lock.proof(0).is_none());
    }

    #[test]
    fn test_multiple_secrets_give_merkle_lock() {
        for n in 2..=7u8 {
            let s = secrets(n);
            let lock = HashLockBuilder::build(&s).unwrap();
            match &lock {
                HashLock::MerkleMultiple { leaves, .. } => {
                    assert_eq!(leaves.len(), n as usize);
                    assert_eq!(leaves[0], s[0].hash());
                }
                other => panic!("expected merkle lock, got {:?}", other),
            }
            assert_eq!(lock.secrets_count(), n as usize);
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let s = secrets(5);
        assert_eq!(
            HashLockBuilder::build(&s).unwrap(),
            HashLockBuilder::build(&s.clone()).unwrap()
        );
    }

    #[test]
    fn test_secret_order_changes_root() {
        let s = secrets(3);
        let mut reversed = s.clone();
        reversed.reverse();
        assert_ne!(
            HashLockBuilder::build(&s).unwrap().commitment(),
            HashLockBuilder::build(&reversed).unwrap().commitment()
        );
    }

    #[test]
    fn test_two_leaf_root() {
        let s = secrets(2);
        let lock = HashLockBuilder::build(&s).unwrap();
        let n0 = HashLockBuilder::leaf_node(0, &s[0].hash());
        let n1 = HashLockBuilder::leaf_node(1, &s[1].hash());
        assert_eq!(lock.commitment(), HashLockBuilder::hash_pair(&n0, &n1));
        assert_eq!(
            HashLockBuilder::hash_pair(&n0, &n1),
            HashLockBuilder::hash_pair(&n1, &n0)
        );
    }

    #[test]
    fn test_proofs_verify_for_every_fill() {
        let s = secrets(5);
        let lock = HashLockBuilder::build(&s).unwrap();
        let root = lock.commitment();
        for (i, secret) in s.iter().enumerate() {
            let proof = lock.proof(i).unwrap();
            assert!(HashLockBuilder::verify(&root, i, &secret.hash(), &proof));
            // A secret presented for the wrong fill index must not verify
            let wrong = (i + 1) % s.len();
            assert!(!HashLockBuilder::verify(&root, wrong, &secret.hash(), &proof));
        }
        assert!(lock.proof(5).is_none());
    }
}
