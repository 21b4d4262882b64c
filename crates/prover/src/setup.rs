//! Setup utilities for generating proving and verifying keys.

use std::path::{Path, PathBuf};

use ark_bn254::Bn254;
use ark_groth16::{Groth16, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{rngs::StdRng, CryptoRng, RngCore, SeedableRng};
use thiserror::Error;

use identity_circuits::{IdentityMembershipCircuit, MEMBERSHIP_CIRCUIT_ID};

/// Errors that can occur during setup
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Circuit setup failed: {0}")]
    CircuitSetup(String),
    #[error("Serialization failed: {0}")]
    Serialization(String),
    #[error("Deserialization failed: {0}")]
    Deserialization(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Keys for the membership circuit at one tree depth
#[derive(Clone)]
pub struct CircuitKeyPair {
    pub depth: usize,
    pub proving_key: ProvingKey<Bn254>,
    pub verifying_key: VerifyingKey<Bn254>,
}

impl CircuitKeyPair {
    /// Serialize proving key to bytes
    pub fn serialize_pk(&self) -> Result<Vec<u8>, SetupError> {
        let mut bytes = Vec::new();
        self.proving_key
            .serialize_compressed(&mut bytes)
            .map_err(|e| SetupError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    /// Serialize verifying key to bytes
    pub fn serialize_vk(&self) -> Result<Vec<u8>, SetupError> {
        let mut bytes = Vec::new();
        self.verifying_key
            .serialize_compressed(&mut bytes)
            .map_err(|e| SetupError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize proving key from bytes
    pub fn deserialize_pk(bytes: &[u8]) -> Result<ProvingKey<Bn254>, SetupError> {
        ProvingKey::deserialize_compressed(bytes)
            .map_err(|e| SetupError::Deserialization(e.to_string()))
    }

    /// Deserialize verifying key from bytes
    pub fn deserialize_vk(bytes: &[u8]) -> Result<VerifyingKey<Bn254>, SetupError> {
        VerifyingKey::deserialize_compressed(bytes)
            .map_err(|e| SetupError::Deserialization(e.to_string()))
    }

    /// Key file path without extension, e.g. `keys/membership_d16`.
    pub fn file_stem(dir: &Path, depth: usize) -> PathBuf {
        dir.join(format!("{}_d{}", MEMBERSHIP_CIRCUIT_ID, depth))
    }

    /// Save both keys to a directory
    pub fn save_to_directory(&self, dir: &Path) -> Result<(), SetupError> {
        std::fs::create_dir_all(dir)?;
        let stem = Self::file_stem(dir, self.depth);
        std::fs::write(stem.with_extension("pk"), self.serialize_pk()?)?;
        std::fs::write(stem.with_extension("vk"), self.serialize_vk()?)?;
        Ok(())
    }

    /// Load both keys for `depth` from a directory
    pub fn load_from_directory(dir: &Path, depth: usize) -> Result<Self, SetupError> {
        let stem = Self::file_stem(dir, depth);
        Ok(Self {
            depth,
            proving_key: Self::deserialize_pk(&std::fs::read(stem.with_extension("pk"))?)?,
            verifying_key: Self::deserialize_vk(&std::fs::read(stem.with_extension("vk"))?)?,
        })
    }

    /// Whether keys for `depth` exist in `dir`
    pub fn exists_in(dir: &Path, depth: usize) -> bool {
        let stem = Self::file_stem(dir, depth);
        stem.with_extension("pk").exists() && stem.with_extension("vk").exists()
    }
}

/// Run circuit-specific setup for the membership circuit at `depth`
pub fn setup_membership<R: RngCore + CryptoRng>(
    rng: &mut R,
    depth: usize,
) -> Result<CircuitKeyPair, SetupError> {
    let circuit = IdentityMembershipCircuit::empty(depth);
    let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(circuit, rng)
        .map_err(|e| SetupError::CircuitSetup(e.to_string()))?;

    Ok(CircuitKeyPair {
        depth,
        proving_key: pk,
        verifying_key: vk,
    })
}

/// Load keys for `depth` from `dir`, running setup and saving them if absent
pub fn load_or_setup(dir: &Path, depth: usize) -> Result<CircuitKeyPair, SetupError> {
    if CircuitKeyPair::exists_in(dir, depth) {
        return CircuitKeyPair::load_from_directory(dir, depth);
    }
    let mut rng = StdRng::from_entropy();
    let keys = setup_membership(&mut rng, depth)?;
    keys.save_to_directory(dir)?;
    Ok(keys)
}
