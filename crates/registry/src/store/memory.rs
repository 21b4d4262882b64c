use std::collections::BTreeMap;

use super::{CachedTree, RecordStore, StoreError};
use crate::record::IdentityRecord;

/// In-memory record store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, IdentityRecord>,
    tree: Option<CachedTree>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, subject_id: &str) -> Result<Option<IdentityRecord>, StoreError> {
        Ok(self.records.get(subject_id).cloned())
    }

    fn put(&mut self, record: IdentityRecord) -> Result<(), StoreError> {
        self.records.insert(record.subject_id.clone(), record);
        Ok(())
    }

    fn all(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        Ok(self.records.values().cloned().collect())
    }

    fn replace_all(&mut self, records: Vec<IdentityRecord>) -> Result<(), StoreError> {
        self.records = records
            .into_iter()
            .map(|r| (r.subject_id.clone(), r))
            .collect();
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.records.clear();
        self.tree = None;
        Ok(())
    }

    fn save_tree(&mut self, tree: &CachedTree) -> Result<(), StoreError> {
        self.tree = Some(tree.clone());
        Ok(())
    }

    fn load_tree(&self) -> Result<Option<CachedTree>, StoreError> {
        Ok(self.tree.clone())
    }
}
