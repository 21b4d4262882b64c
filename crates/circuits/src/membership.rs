//! Identity membership circuit.
//!
//! Proves knowledge of identity fields and a salt whose active leaf
//! commitment is included in the accumulator under a public root.
//!
//! Public inputs, in order: `[root, identity_commitment]`.
//!
//! The identity commitment is public so the ledger can check it against its
//! approved set; the fields, salt and position stay private.

use ark_bn254::Fr;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use crate::accumulator::{compute_root_from_path, InclusionProof, InclusionProofVar};
use crate::field::EncodingError;
use crate::hasher::{
    identity_commitment_from_encoded, identity_commitment_var, leaf_commitment_var,
    IdentityFields, StatusTag,
};

/// Identifier under which the membership circuit's keys are stored.
pub const MEMBERSHIP_CIRCUIT_ID: &str = "membership";

/// Membership circuit over an accumulator of fixed depth.
#[derive(Clone)]
pub struct IdentityMembershipCircuit {
    /// Public: accumulator root
    pub root: Option<Fr>,
    /// Public: identity commitment
    pub identity_commitment: Option<Fr>,

    /// Encoded identity fields
    pub fields: Option<[Fr; 4]>,
    /// Per-record salt
    pub salt: Option<Fr>,
    /// Inclusion path for the active leaf
    pub path: Option<InclusionProof>,

    depth: usize,
}

impl IdentityMembershipCircuit {
    /// Create an empty circuit for setup.
    /// Uses dummy values that produce valid constraint structure.
    pub fn empty(depth: usize) -> Self {
        let dummy_path = InclusionProof::new(vec![Fr::from(0u64); depth], vec![false; depth]);

        Self {
            root: Some(Fr::from(0u64)),
            identity_commitment: Some(Fr::from(0u64)),
            fields: Some([Fr::from(0u64); 4]),
            salt: Some(Fr::from(0u64)),
            path: Some(dummy_path),
            depth,
        }
    }

    /// Create a circuit with witnesses. The identity commitment is derived
    /// from the fields.
    pub fn new(
        fields: &IdentityFields,
        salt: Fr,
        path: InclusionProof,
        root: Fr,
    ) -> Result<Self, EncodingError> {
        let encoded = fields.encode()?;
        Ok(Self::from_encoded(encoded, salt, path, root))
    }

    pub fn from_encoded(encoded: [Fr; 4], salt: Fr, path: InclusionProof, root: Fr) -> Self {
        let depth = path.depth();
        Self {
            root: Some(root),
            identity_commitment: Some(identity_commitment_from_encoded(&encoded)),
            fields: Some(encoded),
            salt: Some(salt),
            path: Some(path),
            depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Public inputs in allocation order.
    pub fn public_inputs(&self) -> Option<Vec<Fr>> {
        Some(vec![self.root?, self.identity_commitment?])
    }
}

impl ConstraintSynthesizer<Fr> for IdentityMembershipCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // === Allocate public inputs ===
        let root_var = FpVar::new_input(cs.clone(), || {
            self.root.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let identity_var = FpVar::new_input(cs.clone(), || {
            self.identity_commitment
                .ok_or(SynthesisError::AssignmentMissing)
        })?;

        // === Allocate identity witnesses ===
        let field_vars = (0..4)
            .map(|i| {
                FpVar::new_witness(cs.clone(), || {
                    self.fields
                        .map(|f| f[i])
                        .ok_or(SynthesisError::AssignmentMissing)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let salt_var = FpVar::new_witness(cs.clone(), || {
            self.salt.ok_or(SynthesisError::AssignmentMissing)
        })?;

        // === Allocate inclusion path ===
        let path = self.path.ok_or(SynthesisError::AssignmentMissing)?;
        if path.depth() != self.depth {
            return Err(SynthesisError::Unsatisfiable);
        }
        let path_var = InclusionProofVar::new_witness(cs.clone(), &path)?;

        // === Constraint 1: identity commitment matches the public input ===
        let computed_identity = identity_commitment_var(cs.clone(), &field_vars)?;
        computed_identity.enforce_equal(&identity_var)?;

        // === Constraint 2: active leaf is included under the root ===
        let tag = FpVar::constant(StatusTag::Active.to_field());
        let leaf = leaf_commitment_var(cs.clone(), &computed_identity, &salt_var, &tag)?;
        let computed_root = compute_root_from_path(cs, &leaf, &path_var)?;
        computed_root.enforce_equal(&root_var)?;

        Ok(())
    }
}
