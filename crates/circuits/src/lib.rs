//! Commitments, accumulator and ZK membership circuit for the identity
//! registry.
//!
//! This crate provides:
//! - `field`: canonical decimal encoding for BN254 scalars
//! - `hasher`: identity and leaf commitments (Poseidon)
//! - `accumulator`: fixed-depth Merkle accumulator and inclusion proofs
//! - `IdentityMembershipCircuit`: prove an active leaf is under a public root

pub mod accumulator;
pub mod field;
pub mod hasher;
pub mod membership;
pub mod poseidon;

#[cfg(test)]
mod tests;

pub use accumulator::{Accumulator, AccumulatorError, InclusionProof, DEFAULT_DEPTH};
pub use field::{fr_from_decimal, fr_to_decimal, EncodingError};
pub use hasher::{identity_commitment, leaf_commitment, IdentityFields, StatusTag};
pub use membership::{IdentityMembershipCircuit, MEMBERSHIP_CIRCUIT_ID};

use ark_bn254::Fr;

/// Common type aliases
pub type ConstraintF = Fr;
