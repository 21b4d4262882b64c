//! Proving seam.

use std::sync::Arc;

use ark_bn254::Fr;
use async_trait::async_trait;
use identity_circuits::{IdentityFields, InclusionProof, MEMBERSHIP_CIRCUIT_ID};
use identity_prover::{prove_membership, CircuitKeyPair, ProveError};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ProverError {
    #[error("unknown circuit `{0}`")]
    UnknownCircuit(String),
    #[error("proving failed: {0}")]
    Failed(String),
    #[error("proving task aborted: {0}")]
    Aborted(String),
}

impl From<ProveError> for ProverError {
    fn from(e: ProveError) -> Self {
        ProverError::Failed(e.to_string())
    }
}

/// Witness for one membership proof.
#[derive(Clone, Debug)]
pub struct ProofRequest {
    pub fields: IdentityFields,
    pub salt: Fr,
    pub siblings: Vec<Fr>,
    /// true = current node is the right child
    pub directions: Vec<bool>,
    pub claimed_root: Fr,
}

/// Proof bytes and public signals; `public_signals[0]` is the attested root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofBundle {
    pub proof: Vec<u8>,
    pub public_signals: Vec<Fr>,
}

#[async_trait]
pub trait Prover: Send + Sync {
    async fn prove(&self, circuit_id: &str, request: ProofRequest) -> Result<ProofBundle, ProverError>;
}

/// Groth16 prover over the membership circuit keys.
pub struct Groth16Prover {
    keys: Arc<CircuitKeyPair>,
}

impl Groth16Prover {
    pub fn new(keys: Arc<CircuitKeyPair>) -> Self {
        Self { keys }
    }

    pub fn depth(&self) -> usize {
        self.keys.depth
    }
}

#[async_trait]
impl Prover for Groth16Prover {
    async fn prove(&self, circuit_id: &str, request: ProofRequest) -> Result<ProofBundle, ProverError> {
        if circuit_id != MEMBERSHIP_CIRCUIT_ID {
            return Err(ProverError::UnknownCircuit(circuit_id.to_string()));
        }
        let path = InclusionProof::try_new(request.siblings, request.directions)
            .map_err(|e| ProverError::Failed(e.to_string()))?;

        let keys = self.keys.clone();
        let bundle = tokio::task::spawn_blocking(move || -> Result<ProofBundle, ProverError> {
            let result = prove_membership(
                &keys,
                &request.fields,
                request.salt,
                path,
                request.claimed_root,
            )?;
            Ok(ProofBundle {
                proof: result.serialize_proof()?,
                public_signals: result.public_inputs,
            })
        })
        .await
        .map_err(|e| ProverError::Aborted(e.to_string()))??;

        debug!(bytes = bundle.proof.len(), "membership proof generated");
        Ok(bundle)
    }
}
