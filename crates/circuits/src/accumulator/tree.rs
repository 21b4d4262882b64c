//! Accumulator construction.
//!
//! The tree has exactly `2^depth` leaf slots. Slots past the populated prefix
//! hold the zero leaf, so only nodes covering the prefix are stored; every
//! other node equals the root of an all-zero subtree at its level.

use ark_bn254::Fr;
use ark_ff::Zero;
use rayon::prelude::*;
use thiserror::Error;

use crate::poseidon::poseidon_hash_two;
use super::proof::InclusionProof;

/// Default tree depth (16 levels = 65,536 leaves).
pub const DEFAULT_DEPTH: usize = 16;

/// Leaf indices are `u64`, and positions are shifted by the depth.
pub const MAX_DEPTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccumulatorError {
    #[error("leaf index {index} is outside a tree of capacity {capacity}")]
    IndexOutOfRange { index: u64, capacity: u64 },
    #[error("{leaves} leaves exceed capacity {capacity}")]
    CapacityExceeded { leaves: usize, capacity: u64 },
    #[error("unsupported tree depth {0}")]
    InvalidDepth(usize),
    #[error("path has {siblings} siblings but {directions} directions")]
    PathLengthMismatch { siblings: usize, directions: usize },
}

/// Merkle accumulator built in one pass from its complete leaf list.
///
/// There is no incremental update: any change to the leaf set is a full
/// rebuild via [`Accumulator::build`].
#[derive(Clone, Debug)]
pub struct Accumulator {
    depth: usize,

    /// levels[0] = populated leaves, levels[depth] = [root] (or empty)
    levels: Vec<Vec<Fr>>,

    /// defaults[i] = root of an all-zero subtree of height i
    defaults: Vec<Fr>,
}

impl Accumulator {
    /// Build the accumulator for `leaves` at `depth`.
    pub fn build(leaves: Vec<Fr>, depth: usize) -> Result<Self, AccumulatorError> {
        if depth == 0 || depth > MAX_DEPTH {
            return Err(AccumulatorError::InvalidDepth(depth));
        }
        let capacity = 1u64 << depth;
        if leaves.len() as u64 > capacity {
            return Err(AccumulatorError::CapacityExceeded {
                leaves: leaves.len(),
                capacity,
            });
        }

        let defaults = Self::compute_defaults(depth);
        let mut levels = Vec::with_capacity(depth + 1);
        levels.push(leaves);

        for level in 0..depth {
            let pad = defaults[level];
            let parents: Vec<Fr> = levels[level]
                .par_chunks(2)
                .map(|pair| match pair {
                    [left, right] => poseidon_hash_two(*left, *right),
                    [left] => poseidon_hash_two(*left, pad),
                    _ => unreachable!("par_chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(parents);
        }

        Ok(Self {
            depth,
            levels,
            defaults,
        })
    }

    /// An accumulator holding no leaves.
    pub fn empty(depth: usize) -> Result<Self, AccumulatorError> {
        Self::build(Vec::new(), depth)
    }

    /// Roots of all-zero subtrees for heights `0..=depth`.
    fn compute_defaults(depth: usize) -> Vec<Fr> {
        let mut defaults = Vec::with_capacity(depth + 1);
        defaults.push(Fr::zero());
        for level in 0..depth {
            let prev = defaults[level];
            defaults.push(poseidon_hash_two(prev, prev));
        }
        defaults
    }

    fn node(&self, level: usize, index: u64) -> Fr {
        self.levels[level]
            .get(index as usize)
            .copied()
            .unwrap_or(self.defaults[level])
    }

    /// Current root.
    pub fn root(&self) -> Fr {
        self.node(self.depth, 0)
    }

    /// Inclusion proof for the leaf slot at `index`.
    ///
    /// Slots past the populated prefix are valid and prove the zero leaf.
    pub fn proof(&self, index: u64) -> Result<InclusionProof, AccumulatorError> {
        if index >= self.capacity() {
            return Err(AccumulatorError::IndexOutOfRange {
                index,
                capacity: self.capacity(),
            });
        }

        let mut siblings = Vec::with_capacity(self.depth);
        let mut directions = Vec::with_capacity(self.depth);

        let mut current = index;
        for level in 0..self.depth {
            siblings.push(self.node(level, current ^ 1));
            directions.push(current & 1 == 1); // true if current is right child
            current >>= 1;
        }

        Ok(InclusionProof::new(siblings, directions))
    }

    /// Leaf at `index` (zero past the populated prefix).
    pub fn leaf(&self, index: u64) -> Result<Fr, AccumulatorError> {
        if index >= self.capacity() {
            return Err(AccumulatorError::IndexOutOfRange {
                index,
                capacity: self.capacity(),
            });
        }
        Ok(self.node(0, index))
    }

    /// Position of the first populated leaf equal to `leaf`.
    pub fn position(&self, leaf: &Fr) -> Option<u64> {
        self.levels[0]
            .iter()
            .position(|l| l == leaf)
            .map(|i| i as u64)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    /// Number of populated leaves.
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    /// Populated leaves in index order.
    pub fn leaves(&self) -> &[Fr] {
        &self.levels[0]
    }

    /// Root of an all-zero subtree of the given height.
    pub fn default_at_level(&self, level: usize) -> Fr {
        self.defaults[level]
    }
}
