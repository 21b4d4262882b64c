//! Reconciliation engine.
//!
//! Owns the accumulator cache and keeps the local record store, the
//! snapshot store and the ledger consistent:
//!
//! - every rebuild (approve, revoke, manual rebuild) runs under the tree
//!   write lock from enumeration through publication;
//! - verifications hold the tree read lock, upgrading to the write lock only
//!   for a single snapshot reload when the cached root and the ledger root
//!   disagree.
//!
//! Lock order is tree, then records.

mod reconcile;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use ark_bn254::Fr;
use identity_circuits::field::{decimal, decimal_opt, fr_to_decimal};
use identity_circuits::{identity_commitment, Accumulator, IdentityFields, MEMBERSHIP_CIRCUIT_ID};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::RegistryError;
use crate::ledger::{Ledger, ProofSubmission, TxRef};
use crate::prover::{ProofRequest, Prover};
use crate::record::{now_ms, random_salt, IdentityRecord, Status, Transition};
use crate::snapshot::{ContentId, Snapshot, SnapshotStore};
use crate::store::{CachedTree, RecordStore};

/// Outcome of a rebuild-and-publish sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    #[serde(with = "decimal")]
    pub root: Fr,
    pub leaf_count: usize,
    pub snapshot_id: ContentId,
    /// `None` when a publish with an unknown outcome was confirmed by
    /// re-reading the ledger root.
    pub tx: Option<TxRef>,
}

/// A record after a state change, with the rebuild it triggered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub record: IdentityRecord,
    pub rebuild: RebuildReport,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub record: IdentityRecord,
    pub tx: TxRef,
    #[serde(with = "decimal")]
    pub root: Fr,
    pub leaf_index: u64,
    /// Whether a snapshot reload was needed.
    pub reloaded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeInfo {
    #[serde(with = "decimal")]
    pub local_root: Fr,
    #[serde(with = "decimal_opt")]
    pub ledger_root: Option<Fr>,
    pub in_sync: Option<bool>,
    pub depth: usize,
    pub capacity: u64,
    pub leaf_count: usize,
    pub pending: usize,
    pub approved: usize,
    pub verified: usize,
    pub revoked: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub verified: usize,
    pub revoked: usize,
    pub leaf_count: usize,
    pub last_tree_update: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeValidation {
    pub valid: bool,
    pub issues: Vec<String>,
}

pub struct ReconciliationEngine {
    config: EngineConfig,
    tree: RwLock<Accumulator>,
    records: Mutex<Box<dyn RecordStore>>,
    ledger: Arc<dyn Ledger>,
    snapshots: Arc<dyn SnapshotStore>,
    prover: Arc<dyn Prover>,
}

impl ReconciliationEngine {
    /// Create an engine, restoring the cached accumulator from `store`.
    ///
    /// A missing or unusable cache is rebuilt locally from the stored
    /// records; nothing is published.
    pub fn new(
        config: EngineConfig,
        store: Box<dyn RecordStore>,
        ledger: Arc<dyn Ledger>,
        snapshots: Arc<dyn SnapshotStore>,
        prover: Arc<dyn Prover>,
    ) -> Result<Self, RegistryError> {
        let cached = match store.load_tree()? {
            Some(cached) if cached.depth == config.depth => match cached.to_accumulator() {
                Ok(acc) if acc.root() == cached.root => Some(acc),
                Ok(_) | Err(_) => {
                    warn!("cached accumulator is inconsistent, rebuilding from records");
                    None
                }
            },
            Some(cached) => {
                warn!(
                    cached_depth = cached.depth,
                    depth = config.depth,
                    "cached accumulator has a different depth, rebuilding from records"
                );
                None
            }
            None => None,
        };

        let tree = match cached {
            Some(acc) => acc,
            None => reconcile::build_from_records(store.all()?, config.depth)?.0,
        };
        info!(
            root = %fr_to_decimal(&tree.root()),
            leaves = tree.len(),
            depth = config.depth,
            "reconciliation engine ready"
        );

        Ok(Self {
            config,
            tree: RwLock::new(tree),
            records: Mutex::new(store),
            ledger,
            snapshots,
            prover,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a pending record for `subject_id`.
    ///
    /// Repeating a submission with identical fields returns the existing
    /// record unchanged.
    pub async fn submit(
        &self,
        subject_id: &str,
        fields: &IdentityFields,
    ) -> Result<IdentityRecord, RegistryError> {
        let commitment = identity_commitment(fields)?;
        let mut store = self.records.lock().await;

        if let Some(existing) = store.get(subject_id)? {
            if existing.identity_commitment == commitment {
                debug!(subject = subject_id, "repeated submission");
                return Ok(existing);
            }
            return Err(RegistryError::InvalidState {
                subject: subject_id.to_string(),
                status: existing.status,
                operation: "submit",
            });
        }

        let duplicate = store
            .all()?
            .iter()
            .any(|r| r.identity_commitment == commitment && r.status != Status::Revoked);
        if duplicate {
            return Err(RegistryError::DuplicateSubmission);
        }

        let record = IdentityRecord::pending(subject_id, commitment, random_salt(), now_ms());
        store.put(record.clone())?;
        info!(subject = subject_id, "identity submitted");
        Ok(record)
    }

    /// Approve a pending record and publish the rebuilt accumulator.
    pub async fn approve(&self, subject_id: &str) -> Result<StateChange, RegistryError> {
        let mut tree = self.tree.write().await;
        let approved = self.transitioned(subject_id, Transition::Approve, None).await?;
        let rebuild = self.rebuild_locked(&mut tree, Some(approved)).await?;
        info!(subject = subject_id, root = %fr_to_decimal(&rebuild.root), "identity approved");
        Ok(StateChange {
            record: self.require_record(subject_id).await?,
            rebuild,
        })
    }

    /// Revoke an approved or verified record. Its leaf stays in place with
    /// the revoked status tag.
    pub async fn revoke(&self, subject_id: &str, reason: &str) -> Result<StateChange, RegistryError> {
        let mut tree = self.tree.write().await;
        let revoked = self
            .transitioned(subject_id, Transition::Revoke, Some(reason))
            .await?;
        let rebuild = self.rebuild_locked(&mut tree, Some(revoked)).await?;
        info!(subject = subject_id, reason, "identity revoked");
        Ok(StateChange {
            record: self.require_record(subject_id).await?,
            rebuild,
        })
    }

    /// Rebuild the accumulator from the current records and publish it.
    pub async fn rebuild_and_publish(&self) -> Result<RebuildReport, RegistryError> {
        let mut tree = self.tree.write().await;
        self.rebuild_locked(&mut tree, None).await
    }

    /// Prove membership for `subject_id` and submit the proof to the ledger.
    pub async fn verify(
        &self,
        subject_id: &str,
        fields: &IdentityFields,
    ) -> Result<Verification, RegistryError> {
        let commitment = identity_commitment(fields)?;
        self.check_verifiable(&self.require_record(subject_id).await?, commitment)?;

        let ledger_root = self.ledger.current_root().await?;
        let mut reloaded = false;
        let tree = {
            let tree = self.tree.read().await;
            if tree.root() == ledger_root {
                tree
            } else {
                drop(tree);
                let mut tree = self.tree.write().await;
                // Re-read under the write lock; no rebuild can publish now.
                let ledger_root = self.ledger.current_root().await?;
                if tree.root() != ledger_root {
                    self.reload_locked(&mut tree, ledger_root).await?;
                    reloaded = true;
                }
                RwLockWriteGuard::downgrade(tree)
            }
        };
        let root = tree.root();

        // The reload may have replaced the record set.
        let record = self.require_record(subject_id).await?;
        self.check_verifiable(&record, commitment)?;

        let leaf = record
            .leaf()
            .ok_or_else(|| RegistryError::LeafNotFound(subject_id.to_string()))?;
        let leaf_index = tree
            .position(&leaf)
            .ok_or_else(|| RegistryError::LeafNotFound(subject_id.to_string()))?;
        if record.leaf_index != Some(leaf_index) {
            debug!(
                subject = subject_id,
                cached = ?record.leaf_index,
                actual = leaf_index,
                "stored leaf index is stale"
            );
        }
        let path = tree.proof(leaf_index)?;

        let bundle = self
            .prover
            .prove(
                MEMBERSHIP_CIRCUIT_ID,
                ProofRequest {
                    fields: fields.clone(),
                    salt: record.salt,
                    siblings: path.siblings().to_vec(),
                    directions: path.directions().to_vec(),
                    claimed_root: root,
                },
            )
            .await?;

        let attested = bundle.public_signals.first().copied();
        if attested != Some(root) {
            return Err(RegistryError::RootMismatch {
                local: attested.map(|r| fr_to_decimal(&r)).unwrap_or_default(),
                ledger: fr_to_decimal(&root),
            });
        }

        let tx = self
            .ledger
            .submit_proof(ProofSubmission {
                proof: bundle.proof,
                public_signals: bundle.public_signals,
            })
            .await?;

        let mut store = self.records.lock().await;
        let mut record = store
            .get(subject_id)?
            .ok_or_else(|| RegistryError::NotFound(subject_id.to_string()))?;
        record
            .transition(Transition::Verify, now_ms())
            .map_err(|status| RegistryError::InvalidState {
                subject: subject_id.to_string(),
                status,
                operation: Transition::Verify.name(),
            })?;
        record.leaf_index = Some(leaf_index);
        record.verification_tx = Some(tx.clone());
        store.put(record.clone())?;
        drop(store);
        drop(tree);

        info!(subject = subject_id, leaf_index, reloaded, "identity verified");
        Ok(Verification {
            record,
            tx,
            root,
            leaf_index,
            reloaded,
        })
    }

    /// Replace the local state with the ledger's snapshot, even if the roots
    /// already agree.
    pub async fn reload_from_snapshot_store(&self) -> Result<Fr, RegistryError> {
        let mut tree = self.tree.write().await;
        let ledger_root = self.ledger.current_root().await?;
        self.reload_locked(&mut tree, ledger_root).await?;
        Ok(tree.root())
    }

    /// Upload the current local state to the snapshot store.
    ///
    /// The ledger is not told about the new snapshot.
    pub async fn save_snapshot(&self) -> Result<ContentId, RegistryError> {
        let tree = self.tree.read().await;
        let records = self.records.lock().await.all()?;
        let blob = Snapshot::capture(&tree, records, now_ms()).encode()?;
        let id = self.snapshots.put(blob).await?;
        info!(id = %id, "snapshot saved");
        Ok(id)
    }

    /// Drop every local record and the cached accumulator.
    pub async fn reset(&self) -> Result<(), RegistryError> {
        let mut tree = self.tree.write().await;
        self.records.lock().await.clear()?;
        *tree = Accumulator::empty(self.config.depth)?;
        warn!("local registry state cleared");
        Ok(())
    }

    pub async fn record(&self, subject_id: &str) -> Result<Option<IdentityRecord>, RegistryError> {
        Ok(self.records.lock().await.get(subject_id)?)
    }

    pub async fn has_submitted(&self, subject_id: &str) -> Result<bool, RegistryError> {
        Ok(self.record(subject_id).await?.is_some())
    }

    /// Approved locally, or approved on the ledger.
    pub async fn is_approved(&self, subject_id: &str) -> Result<bool, RegistryError> {
        let Some(record) = self.record(subject_id).await? else {
            return Ok(false);
        };
        if record.status.is_active() {
            return Ok(true);
        }
        if record.status == Status::Revoked {
            return Ok(false);
        }
        Ok(self.ledger.is_approved(&record.identity_commitment).await?)
    }

    pub async fn is_verified(&self, subject_id: &str) -> Result<bool, RegistryError> {
        Ok(self
            .record(subject_id)
            .await?
            .is_some_and(|r| r.status == Status::Verified))
    }

    pub async fn pending_records(&self) -> Result<Vec<IdentityRecord>, RegistryError> {
        Ok(self.records.lock().await.list_by_status(Status::Pending)?)
    }

    /// Look up the commitment of `fields` in the ledger's approved set.
    pub async fn check_identity_approval(
        &self,
        fields: &IdentityFields,
    ) -> Result<(Fr, bool), RegistryError> {
        let commitment = identity_commitment(fields)?;
        let approved = self.ledger.is_approved(&commitment).await?;
        Ok((commitment, approved))
    }

    pub async fn current_root(&self) -> Result<Fr, RegistryError> {
        Ok(self.ledger.current_root().await?)
    }

    /// Local and ledger view of the accumulator. An unreachable ledger is
    /// reported as an unknown root rather than an error.
    pub async fn tree_info(&self) -> Result<TreeInfo, RegistryError> {
        let (local_root, depth, capacity, leaf_count) = {
            let tree = self.tree.read().await;
            (tree.root(), tree.depth(), tree.capacity(), tree.len())
        };
        let stats = self.stats().await?;
        let ledger_root = match self.ledger.current_root().await {
            Ok(root) => Some(root),
            Err(e) => {
                warn!(error = %e, "ledger root unavailable");
                None
            }
        };
        Ok(TreeInfo {
            local_root,
            in_sync: ledger_root.map(|r| r == local_root),
            ledger_root,
            depth,
            capacity,
            leaf_count,
            pending: stats.pending,
            approved: stats.approved,
            verified: stats.verified,
            revoked: stats.revoked,
        })
    }

    pub async fn stats(&self) -> Result<RegistryStats, RegistryError> {
        let leaf_count = self.tree.read().await.len();
        let store = self.records.lock().await;
        let mut stats = RegistryStats {
            leaf_count,
            last_tree_update: store.load_tree()?.map(|t| t.saved_at),
            ..RegistryStats::default()
        };
        for record in store.all()? {
            stats.total += 1;
            match record.status {
                Status::Pending => stats.pending += 1,
                Status::Approved => stats.approved += 1,
                Status::Verified => stats.verified += 1,
                Status::Revoked => stats.revoked += 1,
            }
        }
        Ok(stats)
    }

    /// Check that every accumulated record points at its own leaf and that
    /// no leaf is unaccounted for.
    pub async fn validate_tree(&self) -> Result<TreeValidation, RegistryError> {
        let tree = self.tree.read().await;
        let records = self.records.lock().await.all()?;
        let mut issues = Vec::new();
        let mut mapped = vec![false; tree.len()];

        for record in &records {
            match (record.leaf(), record.leaf_index) {
                (None, None) => {}
                (None, Some(index)) => issues.push(format!(
                    "pending record `{}` has leaf index {}",
                    record.subject_id, index
                )),
                (Some(_), None) => {
                    issues.push(format!("record `{}` has no leaf index", record.subject_id))
                }
                (Some(leaf), Some(index)) => match tree.leaf(index) {
                    Ok(actual) if actual == leaf && (index as usize) < mapped.len() => {
                        if mapped[index as usize] {
                            issues.push(format!("leaf {} is claimed twice", index));
                        }
                        mapped[index as usize] = true;
                    }
                    _ => issues.push(format!(
                        "record `{}` does not match leaf {}",
                        record.subject_id, index
                    )),
                },
            }
        }
        for (index, _) in mapped.iter().enumerate().filter(|(_, m)| !**m) {
            issues.push(format!("leaf {} belongs to no record", index));
        }

        Ok(TreeValidation {
            valid: issues.is_empty(),
            issues,
        })
    }

    async fn require_record(&self, subject_id: &str) -> Result<IdentityRecord, RegistryError> {
        self.record(subject_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(subject_id.to_string()))
    }

    fn check_verifiable(&self, record: &IdentityRecord, commitment: Fr) -> Result<(), RegistryError> {
        if !record.status.is_active() {
            return Err(RegistryError::InvalidState {
                subject: record.subject_id.clone(),
                status: record.status,
                operation: Transition::Verify.name(),
            });
        }
        if record.identity_commitment != commitment {
            return Err(RegistryError::IdentityMismatch(record.subject_id.clone()));
        }
        Ok(())
    }

    /// The record after `transition`, not yet persisted. The rebuild stores
    /// it together with the accumulator it produced.
    async fn transitioned(
        &self,
        subject_id: &str,
        transition: Transition,
        reason: Option<&str>,
    ) -> Result<IdentityRecord, RegistryError> {
        let mut record = self.require_record(subject_id).await?;
        record
            .transition(transition, now_ms())
            .map_err(|status| RegistryError::InvalidState {
                subject: subject_id.to_string(),
                status,
                operation: transition.name(),
            })?;
        if let Some(reason) = reason {
            record.revocation_reason = Some(reason.to_string());
        }
        Ok(record)
    }
}

/// Cached tree for the store, stamped now.
fn cached_tree(acc: &Accumulator) -> CachedTree {
    CachedTree::from_accumulator(acc, now_ms())
}
