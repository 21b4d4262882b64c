//! Snapshot format.
//!
//! A snapshot is a JSON document holding the accumulator (root, depth,
//! ordered leaves) and every record. Field elements are decimal strings.
//! Decoding rebuilds the accumulator and refuses snapshots whose stored root
//! or record indices disagree with the leaves.

use ark_bn254::Fr;
use identity_circuits::field::{decimal, decimal_vec, fr_to_decimal};
use identity_circuits::{Accumulator, AccumulatorError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::IdentityRecord;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),
    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotTree {
    #[serde(with = "decimal")]
    pub root: Fr,
    #[serde(with = "decimal_vec")]
    pub leaves: Vec<Fr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub total_records: usize,
    /// Records holding a leaf (approved, verified or revoked).
    pub accumulated_records: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub created_at: u64,
    pub depth: usize,
    pub merkle_tree: SnapshotTree,
    pub records: Vec<IdentityRecord>,
    pub metadata: SnapshotMetadata,
}

impl Snapshot {
    pub fn capture(acc: &Accumulator, records: Vec<IdentityRecord>, created_at: u64) -> Self {
        let accumulated_records = records.iter().filter(|r| r.leaf_index.is_some()).count();
        Self {
            version: SNAPSHOT_VERSION,
            created_at,
            depth: acc.depth(),
            merkle_tree: SnapshotTree {
                root: acc.root(),
                leaves: acc.leaves().to_vec(),
            },
            metadata: SnapshotMetadata {
                total_records: records.len(),
                accumulated_records,
            },
            records,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate a snapshot, returning it with its rebuilt
    /// accumulator.
    pub fn decode(bytes: &[u8]) -> Result<(Self, Accumulator), SnapshotError> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }

        let acc = Accumulator::build(snapshot.merkle_tree.leaves.clone(), snapshot.depth)?;
        if acc.root() != snapshot.merkle_tree.root {
            return Err(SnapshotError::Inconsistent(format!(
                "stored root {} does not match leaves (computed {})",
                fr_to_decimal(&snapshot.merkle_tree.root),
                fr_to_decimal(&acc.root())
            )));
        }

        for record in &snapshot.records {
            let Some(index) = record.leaf_index else {
                continue;
            };
            let expected = record.leaf();
            if expected.is_none() || acc.leaf(index).ok() != expected {
                return Err(SnapshotError::Inconsistent(format!(
                    "record `{}` does not match leaf {}",
                    record.subject_id, index
                )));
            }
        }

        Ok((snapshot, acc))
    }
}
