//! Identity and leaf commitments.
//!
//! An identity commitment binds the four identity fields in a fixed order. A
//! leaf commitment binds that identity commitment to a per-record salt and a
//! status tag, so revoking an identity changes its leaf without moving it.

use ark_bn254::Fr;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};
use serde::{Deserialize, Serialize};

use crate::field::{fr_from_decimal, text_to_fr, EncodingError};
use crate::poseidon::{poseidon_hash_many, poseidon_hash_many_var};

/// Text fields are packed into one scalar, so they must stay below 32 bytes.
pub const MAX_TEXT_BYTES: usize = 31;

/// Raw identity fields as supplied by the subject.
///
/// These values are never persisted; only their commitment is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityFields {
    /// National identification number (decimal).
    pub national_id: String,
    pub full_name: String,
    /// Birth date as a decimal numeral, e.g. `19900101`.
    pub birth_date: String,
    pub secret_key: String,
}

impl IdentityFields {
    pub fn new(
        national_id: impl Into<String>,
        full_name: impl Into<String>,
        birth_date: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            national_id: national_id.into(),
            full_name: full_name.into(),
            birth_date: birth_date.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Encode the fields as scalars in commitment order.
    pub fn encode(&self) -> Result<[Fr; 4], EncodingError> {
        Ok([
            fr_from_decimal("national_id", self.national_id.trim())?,
            text_to_fr("full_name", &self.full_name, MAX_TEXT_BYTES)?,
            fr_from_decimal("birth_date", self.birth_date.trim())?,
            text_to_fr("secret_key", &self.secret_key, MAX_TEXT_BYTES)?,
        ])
    }
}

/// Status tag folded into the leaf commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusTag {
    Revoked = 0,
    Active = 1,
}

impl StatusTag {
    pub fn to_field(self) -> Fr {
        Fr::from(self as u64)
    }
}

/// Commit to a set of identity fields.
pub fn identity_commitment(fields: &IdentityFields) -> Result<Fr, EncodingError> {
    Ok(identity_commitment_from_encoded(&fields.encode()?))
}

pub fn identity_commitment_from_encoded(encoded: &[Fr; 4]) -> Fr {
    poseidon_hash_many(encoded)
}

/// Commit to an accumulator leaf: H(identity_commitment, salt, tag).
pub fn leaf_commitment(identity_commitment: Fr, salt: Fr, tag: StatusTag) -> Fr {
    poseidon_hash_many(&[identity_commitment, salt, tag.to_field()])
}

/// In-circuit identity commitment over already-encoded fields.
pub fn identity_commitment_var(
    cs: ConstraintSystemRef<Fr>,
    encoded: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    poseidon_hash_many_var(cs, encoded)
}

/// In-circuit leaf commitment.
pub fn leaf_commitment_var(
    cs: ConstraintSystemRef<Fr>,
    identity_commitment: &FpVar<Fr>,
    salt: &FpVar<Fr>,
    tag: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    poseidon_hash_many_var(
        cs,
        &[identity_commitment.clone(), salt.clone(), tag.clone()],
    )
}
