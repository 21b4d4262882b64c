//! Local proof verification for the membership circuit.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, Proof, VerifyingKey};
use ark_serialize::CanonicalDeserialize;
use ark_snark::SNARK;
use thiserror::Error;

/// Errors during verification
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Verification failed: {0}")]
    Verification(String),
    #[error("Invalid public inputs: expected 2, got {0}")]
    InvalidInputs(usize),
    #[error("Malformed proof: {0}")]
    MalformedProof(String),
}

/// Verify a membership proof against `[root, identity_commitment]`
pub fn verify_membership(
    vk: &VerifyingKey<Bn254>,
    proof: &Proof<Bn254>,
    public_inputs: &[Fr],
) -> Result<bool, VerifyError> {
    if public_inputs.len() != 2 {
        return Err(VerifyError::InvalidInputs(public_inputs.len()));
    }

    Groth16::<Bn254>::verify(vk, public_inputs, proof)
        .map_err(|e| VerifyError::Verification(e.to_string()))
}

/// Verify a compressed membership proof
pub fn verify_membership_bytes(
    vk: &VerifyingKey<Bn254>,
    proof_bytes: &[u8],
    public_inputs: &[Fr],
) -> Result<bool, VerifyError> {
    let proof = Proof::<Bn254>::deserialize_compressed(proof_bytes)
        .map_err(|e| VerifyError::MalformedProof(e.to_string()))?;
    verify_membership(vk, &proof, public_inputs)
}
