//! Proof generation for the membership circuit.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, Proof};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{rngs::StdRng, SeedableRng};
use thiserror::Error;

use identity_circuits::{
    hasher::identity_commitment_from_encoded, leaf_commitment, EncodingError, IdentityFields,
    IdentityMembershipCircuit, InclusionProof, StatusTag,
};

use crate::setup::CircuitKeyPair;

/// Errors during proof generation
#[derive(Error, Debug)]
pub enum ProveError {
    #[error("Proof generation failed: {0}")]
    ProofGeneration(String),
    #[error("Invalid witness: {0}")]
    InvalidWitness(String),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// A proof with its public inputs
#[derive(Clone, Debug)]
pub struct ProofWithInputs {
    pub proof: Proof<Bn254>,
    /// `[root, identity_commitment]`
    pub public_inputs: Vec<Fr>,
}

impl ProofWithInputs {
    /// Serialize proof to bytes
    pub fn serialize_proof(&self) -> Result<Vec<u8>, ProveError> {
        let mut bytes = Vec::new();
        self.proof
            .serialize_compressed(&mut bytes)
            .map_err(|e| ProveError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize proof from bytes
    pub fn deserialize_proof(bytes: &[u8]) -> Result<Proof<Bn254>, ProveError> {
        Proof::deserialize_compressed(bytes).map_err(|e| ProveError::Serialization(e.to_string()))
    }
}

/// Generate a membership proof for `fields` under `root`.
///
/// The witness is checked natively first so a bad path fails fast instead of
/// producing an unverifiable proof.
pub fn prove_membership(
    keys: &CircuitKeyPair,
    fields: &IdentityFields,
    salt: Fr,
    path: InclusionProof,
    root: Fr,
) -> Result<ProofWithInputs, ProveError> {
    if path.depth() != keys.depth {
        return Err(ProveError::InvalidWitness(format!(
            "path depth {} does not match key depth {}",
            path.depth(),
            keys.depth
        )));
    }

    let encoded = fields.encode()?;
    let identity = identity_commitment_from_encoded(&encoded);
    let leaf = leaf_commitment(identity, salt, StatusTag::Active);
    if !path.verify(leaf, root) {
        return Err(ProveError::InvalidWitness(
            "active leaf is not included under the claimed root".into(),
        ));
    }

    let circuit = IdentityMembershipCircuit::from_encoded(encoded, salt, path, root);

    let mut rng = StdRng::from_entropy();
    let proof = Groth16::<Bn254>::prove(&keys.proving_key, circuit, &mut rng)
        .map_err(|e| ProveError::ProofGeneration(e.to_string()))?;

    Ok(ProofWithInputs {
        proof,
        public_inputs: vec![root, identity],
    })
}
