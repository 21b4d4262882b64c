//! JSON file store.
//!
//! Two independent files under the data directory:
//! - `records.json`: subject -> record
//! - `accumulator.json`: cached root, leaves, depth and timestamp
//!
//! Each file is rewritten whole via a temporary file and a rename, so a crash
//! leaves either the old or the new contents.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use super::{CachedTree, RecordStore, StoreError};
use crate::record::IdentityRecord;

const RECORDS_FILE: &str = "records.json";
const TREE_FILE: &str = "accumulator.json";

pub struct JsonFileStore {
    dir: PathBuf,
    records: BTreeMap<String, IdentityRecord>,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let path = dir.join(RECORDS_FILE);
        let records = if path.exists() {
            serde_json::from_slice(&fs::read(&path)?)?
        } else {
            BTreeMap::new()
        };
        debug!(dir = %dir.display(), records = records.len(), "opened record store");

        Ok(Self { dir, records })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn flush_records(&self) -> Result<(), StoreError> {
        write_atomic(&self.dir.join(RECORDS_FILE), &self.records)
    }
}

pub(crate) fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl RecordStore for JsonFileStore {
    fn get(&self, subject_id: &str) -> Result<Option<IdentityRecord>, StoreError> {
        Ok(self.records.get(subject_id).cloned())
    }

    fn put(&mut self, record: IdentityRecord) -> Result<(), StoreError> {
        self.records.insert(record.subject_id.clone(), record);
        self.flush_records()
    }

    fn put_all(&mut self, records: Vec<IdentityRecord>) -> Result<(), StoreError> {
        for record in records {
            self.records.insert(record.subject_id.clone(), record);
        }
        self.flush_records()
    }

    fn all(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        Ok(self.records.values().cloned().collect())
    }

    fn replace_all(&mut self, records: Vec<IdentityRecord>) -> Result<(), StoreError> {
        self.records = records
            .into_iter()
            .map(|r| (r.subject_id.clone(), r))
            .collect();
        self.flush_records()
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.records.clear();
        for file in [RECORDS_FILE, TREE_FILE] {
            let path = self.dir.join(file);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn save_tree(&mut self, tree: &CachedTree) -> Result<(), StoreError> {
        write_atomic(&self.dir.join(TREE_FILE), tree)
    }

    fn load_tree(&self) -> Result<Option<CachedTree>, StoreError> {
        let path = self.dir.join(TREE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&fs::read(path)?)?))
    }
}
