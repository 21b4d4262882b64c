//! Local record store.
//!
//! Holds per-subject records and the cached accumulator. Stores are purely
//! mechanical; the engine serializes every writer.

mod json;
mod memory;


use ark_bn254::Fr;
use identity_circuits::field::{decimal, decimal_vec};
use identity_circuits::{Accumulator, AccumulatorError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{IdentityRecord, Status};

pub use json::JsonFileStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Cached accumulator: root plus the ordered leaf list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTree {
    #[serde(with = "decimal")]
    pub root: Fr,
    #[serde(with = "decimal_vec")]
    pub leaves: Vec<Fr>,
    pub depth: usize,
    pub saved_at: u64,
}

impl CachedTree {
    pub fn from_accumulator(acc: &Accumulator, saved_at: u64) -> Self {
        Self {
            root: acc.root(),
            leaves: acc.leaves().to_vec(),
            depth: acc.depth(),
            saved_at,
        }
    }

    /// Rebuild the accumulator from the cached leaves.
    pub fn to_accumulator(&self) -> Result<Accumulator, AccumulatorError> {
        Accumulator::build(self.leaves.clone(), self.depth)
    }
}

/// Persistence for records and the cached accumulator.
pub trait RecordStore: Send + Sync {
    fn get(&self, subject_id: &str) -> Result<Option<IdentityRecord>, StoreError>;

    /// Insert or replace the record keyed by its subject.
    fn put(&mut self, record: IdentityRecord) -> Result<(), StoreError>;

    /// Insert or replace several records in one write.
    fn put_all(&mut self, records: Vec<IdentityRecord>) -> Result<(), StoreError> {
        for record in records {
            self.put(record)?;
        }
        Ok(())
    }

    /// All records, ordered by subject.
    fn all(&self) -> Result<Vec<IdentityRecord>, StoreError>;

    fn list_by_status(&self, status: Status) -> Result<Vec<IdentityRecord>, StoreError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|r| r.status == status)
            .collect())
    }

    /// Replace every record, e.g. after restoring from a snapshot.
    fn replace_all(&mut self, records: Vec<IdentityRecord>) -> Result<(), StoreError>;

    /// Drop all records and the cached accumulator.
    fn clear(&mut self) -> Result<(), StoreError>;

    fn save_tree(&mut self, tree: &CachedTree) -> Result<(), StoreError>;

    fn load_tree(&self) -> Result<Option<CachedTree>, StoreError>;
}
