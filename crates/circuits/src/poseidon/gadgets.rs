//! In-circuit Poseidon.
//!
//! The membership circuit uses `poseidon_hash_many_var` for the identity
//! tuple and the `(identity, salt, tag)` leaf, and `poseidon_hash_two_var`
//! for every node on the accumulator path. Both must agree bit for bit with
//! their native counterparts, or honest proofs fail against published roots.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

use super::config::poseidon_config;

/// Accumulator node: `H(left, right)`.
pub fn poseidon_hash_two_var(
    cs: ConstraintSystemRef<Fr>,
    left: &FpVar<Fr>,
    right: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    poseidon_hash_many_var(cs, &[left.clone(), right.clone()])
}

/// Absorb `inputs` in order and squeeze one element.
pub fn poseidon_hash_many_var(
    cs: ConstraintSystemRef<Fr>,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::new(cs, poseidon_config());
    for input in inputs {
        sponge.absorb(input)?;
    }
    sponge
        .squeeze_field_elements(1)?
        .pop()
        .ok_or(SynthesisError::AssignmentMissing)
}
