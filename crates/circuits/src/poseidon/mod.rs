//! Poseidon hash function for BN254.
//!
//! Native functions compute commitments and tree nodes; the gadgets recompute
//! the same values inside the membership circuit.

mod config;
mod gadgets;
mod native;


pub use config::poseidon_config;
pub use gadgets::{poseidon_hash_many_var, poseidon_hash_two_var};
pub use native::{poseidon_hash_many, poseidon_hash_two};
