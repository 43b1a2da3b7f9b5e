//! The domain-separated binary Merkle tree used by `BatchAnchorPipeline`
//! (§4.8), and the generic fold used to validate a `ChainedInclusionProof`
//! layer (§3) or an EVM transactions/receipts-root inclusion proof (§4.2).

use crate::hash::{tagged_sha256, CERTEN_LEAF_V1, CERTEN_NODE_V1};
use certen_types::error::CryptoError;
use certen_types::model::{MerkleProof, MerkleStep, Position};

/// Hashes a single leaf value under the batch pipeline's leaf domain tag.
pub fn leaf_hash(tx_hash: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    tagged_sha256(CERTEN_LEAF_V1, &[tx_hash])
}

fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    tagged_sha256(CERTEN_NODE_V1, &[left, right])
}

/// A built Merkle tree over a sealed batch's leaves: the root, and for each
/// leaf index the ordered (sibling, position) path from leaf to root.
pub struct MerkleTree {
    pub root: [u8; 32],
    pub paths: Vec<Vec<MerkleStep>>,
}

/// Builds the tree for one batch. Leaves are hashed from `tx_hashes` in
/// insertion order; an odd node at any level is duplicated, never promoted
/// unhashed. Size-1 and size-2 batches are handled by the same fold, with no
/// special-casing (§8 boundary behaviors: a size-1 batch's root is the leaf
/// hash and its path is empty; a size-2 batch's paths each have length 1).
pub fn build_tree(tx_hashes: &[[u8; 32]]) -> Result<MerkleTree, CryptoError> {
    if tx_hashes.is_empty() {
        return Err(CryptoError::OperationFailed(
            "cannot build a Merkle tree over zero leaves".into(),
        ));
    }

    let mut level: Vec<[u8; 32]> = tx_hashes
        .iter()
        .map(leaf_hash)
        .collect::<Result<_, _>>()?;
    // paths[i] accumulates the steps for original leaf i, level by level.
    let mut paths: Vec<Vec<MerkleStep>> = vec![Vec::new(); tx_hashes.len()];
    // indices[i] = this leaf's position within the current level.
    let mut indices: Vec<usize> = (0..tx_hashes.len()).collect();

    while level.len() > 1 {
        let mut next_level = Vec::with_capacity(level.len().div_ceil(2));
        for pair_index in 0..level.len().div_ceil(2) {
            let left_idx = pair_index * 2;
            let right_idx = left_idx + 1;
            let left = level[left_idx];
            let right = if right_idx < level.len() {
                level[right_idx]
            } else {
                level[left_idx]
            };
            next_level.push(node_hash(&left, &right)?);

            for (leaf_i, &cur_idx) in indices.iter().enumerate() {
                if cur_idx == left_idx {
                    paths[leaf_i].push(MerkleStep {
                        sibling: right,
                        position: Position::Right,
                    });
                } else if cur_idx == right_idx {
                    paths[leaf_i].push(MerkleStep {
                        sibling: left,
                        position: Position::Left,
                    });
                }
            }
        }
        for idx in indices.iter_mut() {
            *idx /= 2;
        }
        level = next_level;
    }

    Ok(MerkleTree {
        root: level[0],
        paths,
    })
}

/// Folds a `(leaf, path)` pair and returns the resulting root, per
/// `Position` — used to verify both batch Merkle proofs and EVM
/// transactions/receipts-root inclusion proofs, which share this shape.
pub fn fold_proof(proof: &MerkleProof) -> Result<[u8; 32], CryptoError> {
    let mut acc = proof.leaf;
    for step in &proof.steps {
        acc = match step.position {
            Position::Left => node_hash(&step.sibling, &acc)?,
            Position::Right => node_hash(&acc, &step.sibling)?,
        };
    }
    Ok(acc)
}

/// Verifies a stored `(leaf, path)` pair against its batch's recorded root
/// (§8 invariant 4, Merkle soundness).
pub fn verify_proof(proof: &MerkleProof) -> Result<bool, CryptoError> {
    Ok(fold_proof(proof)? == proof.root)
}

/// Folds one `ChainedInclusionProof` layer's steps, for use with
/// `ProofLayer::verify`. Uses the same internal-node domain tag as the batch
/// tree so a single Merkle implementation backs both §3 and §4.8.
pub fn fold_step(acc: &[u8; 32], step: &MerkleStep) -> [u8; 32] {
    let (left, right) = match step.position {
        Position::Left => (&step.sibling, acc),
        Position::Right => (acc, &step.sibling),
    };
    node_hash(left, right).unwrap_or(*acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_batch_root_is_leaf_hash() {
        let tx = [7u8; 32];
        let tree = build_tree(&[tx]).unwrap();
        assert_eq!(tree.root, leaf_hash(&tx).unwrap());
        assert!(tree.paths[0].is_empty());
    }

    #[test]
    fn two_leaf_batch_paths_have_length_one() {
        let txs = [[1u8; 32], [2u8; 32]];
        let tree = build_tree(&txs).unwrap();
        assert_eq!(tree.paths[0].len(), 1);
        assert_eq!(tree.paths[1].len(), 1);
        let expected_root =
            node_hash(&leaf_hash(&txs[0]).unwrap(), &leaf_hash(&txs[1]).unwrap()).unwrap();
        assert_eq!(tree.root, expected_root);
    }

    #[test]
    fn every_leaf_path_folds_to_the_root() {
        let txs: Vec<[u8; 32]> = (0..7u8).map(|i| [i; 32]).collect();
        let tree = build_tree(&txs).unwrap();
        for (i, tx) in txs.iter().enumerate() {
            let proof = MerkleProof {
                leaf: leaf_hash(tx).unwrap(),
                root: tree.root,
                steps: tree.paths[i].clone(),
            };
            assert!(verify_proof(&proof).unwrap(), "leaf {i} did not fold to root");
        }
    }

    #[test]
    fn odd_level_duplicates_last_node() {
        let txs: Vec<[u8; 32]> = (0..3u8).map(|i| [i; 32]).collect();
        let tree = build_tree(&txs).unwrap();
        let l0 = leaf_hash(&txs[0]).unwrap();
        let l1 = leaf_hash(&txs[1]).unwrap();
        let l2 = leaf_hash(&txs[2]).unwrap();
        let top_left = node_hash(&l0, &l1).unwrap();
        let top_right = node_hash(&l2, &l2).unwrap();
        assert_eq!(tree.root, node_hash(&top_left, &top_right).unwrap());
    }
}
