//! Fixed-depth binary Merkle accumulator over leaf commitments.
//!
//! This module provides:
//! - Native construction from an ordered leaf list, padded with zero leaves
//! - Inclusion proofs (siblings + direction bits, leaf to root)
//! - An in-circuit gadget recomputing the root from a path

mod gadgets;
mod proof;
mod tree;


pub use gadgets::{compute_root_from_path, InclusionProofVar};
pub use proof::InclusionProof;
pub use tree::{Accumulator, AccumulatorError, DEFAULT_DEPTH, MAX_DEPTH};
