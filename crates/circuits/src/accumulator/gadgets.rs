//! In-circuit root recomputation from an inclusion path.

use ark_bn254::Fr;
use ark_r1cs_std::{boolean::Boolean, fields::fp::FpVar, prelude::*};
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

use crate::poseidon::poseidon_hash_two_var;
use super::proof::InclusionProof;

/// Circuit variable representation of an inclusion proof.
#[derive(Clone)]
pub struct InclusionProofVar {
    siblings: Vec<FpVar<Fr>>,
    directions: Vec<Boolean<Fr>>,
}

impl InclusionProofVar {
    /// Allocate a proof as witness variables.
    pub fn new_witness(
        cs: ConstraintSystemRef<Fr>,
        proof: &InclusionProof,
    ) -> Result<Self, SynthesisError> {
        let siblings = proof
            .siblings()
            .iter()
            .map(|h| FpVar::new_witness(cs.clone(), || Ok(*h)))
            .collect::<Result<Vec<_>, _>>()?;

        let directions = proof
            .directions()
            .iter()
            .map(|&b| Boolean::new_witness(cs.clone(), || Ok(b)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            siblings,
            directions,
        })
    }

    pub fn depth(&self) -> usize {
        self.siblings.len()
    }
}

/// Compute the root hash from a leaf and inclusion path in-circuit.
pub fn compute_root_from_path(
    cs: ConstraintSystemRef<Fr>,
    leaf: &FpVar<Fr>,
    proof: &InclusionProofVar,
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut current = leaf.clone();

    for (sibling, is_right) in proof.siblings.iter().zip(proof.directions.iter()) {
        // If is_right: H(sibling, current), else H(current, sibling)
        let left = is_right.select(sibling, &current)?;
        let right = is_right.select(&current, sibling)?;

        current = poseidon_hash_two_var(cs.clone(), &left, &right)?;
    }

    Ok(current)
}
