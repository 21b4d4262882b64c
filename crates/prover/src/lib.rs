//! Proof generation library for identity membership.
//!
//! This crate provides utilities for:
//! - Circuit-specific setup (generating proving and verifying keys)
//! - Proof generation for the membership circuit
//! - Local proof verification

pub mod prove;
pub mod setup;
pub mod verify;

pub use prove::{prove_membership, ProofWithInputs, ProveError};
pub use setup::{load_or_setup, setup_membership, CircuitKeyPair, SetupError};
pub use verify::{verify_membership, verify_membership_bytes, VerifyError};

use ark_bn254::Fr;

/// Common field type for all operations
pub type ConstraintF = Fr;
