//! Inclusion proof for an accumulator leaf.

use ark_bn254::Fr;

use super::tree::AccumulatorError;
use crate::poseidon::poseidon_hash_two;

/// Sibling hashes from the leaf level upwards, with one direction bit per
/// level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InclusionProof {
    siblings: Vec<Fr>,

    /// Direction at each level: true = current node is right child
    directions: Vec<bool>,
}

impl InclusionProof {
    /// Build a path from caller-supplied parts.
    pub fn try_new(siblings: Vec<Fr>, directions: Vec<bool>) -> Result<Self, AccumulatorError> {
        if siblings.len() != directions.len() {
            return Err(AccumulatorError::PathLengthMismatch {
                siblings: siblings.len(),
                directions: directions.len(),
            });
        }
        Ok(Self {
            siblings,
            directions,
        })
    }

    /// Panics if the lengths differ; use [`InclusionProof::try_new`] for
    /// untrusted input.
    pub fn new(siblings: Vec<Fr>, directions: Vec<bool>) -> Self {
        assert_eq!(
            siblings.len(),
            directions.len(),
            "siblings and directions must have same length"
        );
        Self {
            siblings,
            directions,
        }
    }

    pub fn siblings(&self) -> &[Fr] {
        &self.siblings
    }

    pub fn directions(&self) -> &[bool] {
        &self.directions
    }

    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Leaf index encoded by the direction bits.
    pub fn index(&self) -> u64 {
        self.directions
            .iter()
            .enumerate()
            .fold(0u64, |acc, (level, &is_right)| {
                acc | ((is_right as u64) << level)
            })
    }

    /// Recompute the root from `leaf` along this path.
    pub fn compute_root(&self, leaf: Fr) -> Fr {
        let mut current = leaf;
        for (sibling, &is_right) in self.siblings.iter().zip(self.directions.iter()) {
            current = if is_right {
                poseidon_hash_two(*sibling, current)
            } else {
                poseidon_hash_two(current, *sibling)
            };
        }
        current
    }

    pub fn verify(&self, leaf: Fr, root: Fr) -> bool {
        self.compute_root(leaf) == root
    }
}

#[cfg(test)]
mod proof_tests {
    use super::*;

    #[test]
    fn test_proof_structure() {
        let siblings = vec![Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)];
        let directions = vec![false, true, true];

        let proof = InclusionProof::new(siblings.clone(), directions.clone());

        assert_eq!(proof.depth(), 3);
        assert_eq!(proof.siblings(), &siblings);
        assert_eq!(proof.directions(), &directions);
        assert_eq!(proof.index(), 6);
    }

    #[test]
    fn test_direction_changes_root() {
        let siblings = vec![Fr::from(1u64), Fr::from(2u64)];
        let left = InclusionProof::new(siblings.clone(), vec![false, false]);
        let right = InclusionProof::new(siblings, vec![true, false]);

        let leaf = Fr::from(100u64);
        assert_ne!(left.compute_root(leaf), right.compute_root(leaf));
    }

    #[test]
    #[should_panic]
    fn test_mismatched_lengths_panic() {
        InclusionProof::new(vec![Fr::from(1u64)], vec![]);
    }

    #[test]
    fn test_try_new_rejects_mismatched_lengths() {
        assert_eq!(
            InclusionProof::try_new(vec![Fr::from(1u64)], vec![]),
            Err(AccumulatorError::PathLengthMismatch {
                siblings: 1,
                directions: 0
            })
        );
        let proof = InclusionProof::try_new(vec![Fr::from(1u64)], vec![true]).unwrap();
        assert_eq!(proof.index(), 1);
    }
}
