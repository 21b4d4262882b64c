//! Rebuild, publish and reload.

use std::collections::BTreeMap;

use ark_bn254::Fr;
use identity_circuits::field::fr_to_decimal;
use identity_circuits::Accumulator;
use tracing::{info, warn};

use super::{cached_tree, RebuildReport, ReconciliationEngine};
use crate::error::RegistryError;
use crate::ledger::{LedgerError, RootUpdate, TxRef};
use crate::record::{now_ms, IdentityRecord, Status};
use crate::snapshot::{Snapshot, SnapshotError};

/// Build the accumulator from every record that has been approved and
/// assign leaf indices.
///
/// Records that already hold a leaf keep their relative order; newly
/// approved ones follow in approval order, ties broken by subject. Revoked
/// records keep their position with the revoked status tag.
pub(super) fn build_from_records(
    records: Vec<IdentityRecord>,
    depth: usize,
) -> Result<(Accumulator, Vec<IdentityRecord>), RegistryError> {
    let mut members: Vec<IdentityRecord> = records
        .into_iter()
        .filter(|r| r.approved_at.is_some() && r.leaf().is_some())
        .collect();
    members.sort_by(|a, b| {
        (a.leaf_index.is_none(), a.leaf_index, a.approved_at)
            .cmp(&(b.leaf_index.is_none(), b.leaf_index, b.approved_at))
            .then_with(|| a.subject_id.cmp(&b.subject_id))
    });

    let leaves = members.iter().filter_map(IdentityRecord::leaf).collect();
    let acc = Accumulator::build(leaves, depth)?;
    for (index, record) in members.iter_mut().enumerate() {
        record.leaf_index = Some(index as u64);
    }
    Ok((acc, members))
}

/// Commitment -> approved flag. A commitment held by an active record and a
/// revoked one counts as approved.
fn approved_set(members: &[IdentityRecord]) -> Vec<(Fr, bool)> {
    let mut set: BTreeMap<Fr, bool> = BTreeMap::new();
    for record in members {
        let active = record.status.is_active();
        set.entry(record.identity_commitment)
            .and_modify(|approved| *approved |= active)
            .or_insert(active);
    }
    set.into_iter().collect()
}

/// Snapshot records win for every subject they cover. Local records the
/// snapshot does not know survive; any accumulator state they claim was never
/// published, so they return to pending with their salt intact.
fn merge_snapshot_records(
    local: Vec<IdentityRecord>,
    snapshot: Vec<IdentityRecord>,
) -> Vec<IdentityRecord> {
    let mut merged: BTreeMap<String, IdentityRecord> = local
        .into_iter()
        .map(|mut record| {
            if record.status != Status::Pending || record.leaf_index.is_some() {
                record.status = Status::Pending;
                record.leaf_index = None;
                record.approved_at = None;
                record.verified_at = None;
                record.revoked_at = None;
                record.revocation_reason = None;
                record.verification_tx = None;
            }
            (record.subject_id.clone(), record)
        })
        .collect();
    for record in snapshot {
        merged.insert(record.subject_id.clone(), record);
    }
    merged.into_values().collect()
}

impl ReconciliationEngine {
    /// Enumerate, build, persist, snapshot and publish. The caller holds the
    /// tree write lock for the whole sequence.
    ///
    /// `changed` is a record whose new status is applied only if the build
    /// succeeds; a failed build persists nothing. Local state is committed
    /// before publication, so a failed publish leaves the local root ahead of
    /// the ledger until the next rebuild or reload.
    pub(super) async fn rebuild_locked(
        &self,
        tree: &mut Accumulator,
        changed: Option<IdentityRecord>,
    ) -> Result<RebuildReport, RegistryError> {
        let (acc, members, records) = {
            let mut store = self.records.lock().await;
            let mut current = store.all()?;
            if let Some(changed) = &changed {
                match current.iter_mut().find(|r| r.subject_id == changed.subject_id) {
                    Some(slot) => *slot = changed.clone(),
                    None => current.push(changed.clone()),
                }
            }
            let (acc, members) = build_from_records(current, self.config.depth)?;
            if let Some(changed) = changed {
                store.put(changed)?;
            }
            store.put_all(members.clone())?;
            store.save_tree(&cached_tree(&acc))?;
            (acc, members, store.all()?)
        };

        let blob = Snapshot::capture(&acc, records, now_ms()).encode()?;
        let root = acc.root();
        let leaf_count = acc.len();
        *tree = acc;

        let snapshot_id = self.snapshots.put(blob).await?;
        let tx = self
            .publish_confirmed(RootUpdate {
                root,
                commitments: approved_set(&members),
                snapshot_id: Some(snapshot_id.clone()),
            })
            .await?;

        info!(
            root = %fr_to_decimal(&root),
            leaves = leaf_count,
            snapshot = %snapshot_id,
            "accumulator rebuilt and published"
        );
        Ok(RebuildReport {
            root,
            leaf_count,
            snapshot_id,
            tx,
        })
    }

    /// Publish `update`, treating a transport failure as an unknown outcome:
    /// the ledger root is re-read before any retry, and a root that already
    /// matches counts as success.
    async fn publish_confirmed(&self, update: RootUpdate) -> Result<Option<TxRef>, RegistryError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.ledger.publish_root(update.clone()).await {
                Ok(tx) => return Ok(Some(tx)),
                Err(LedgerError::Rejected(reason)) => {
                    return Err(RegistryError::LedgerRejected(reason))
                }
                Err(LedgerError::Transport(reason)) => reason,
            };
            warn!(attempt, error = %err, "ledger publish outcome unknown");

            match self.ledger.current_root().await {
                Ok(root) if root == update.root => {
                    info!(attempt, "ledger already holds the published root");
                    return Ok(None);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "could not confirm ledger root"),
            }

            if attempt >= self.config.publish_attempts {
                return Err(RegistryError::Transport(err));
            }
            tokio::time::sleep(self.config.publish_backoff).await;
        }
    }

    /// Replace the accumulator with the ledger's current snapshot and merge
    /// its records into the local ones. Nothing is persisted unless the
    /// snapshot's root equals `ledger_root`.
    pub(super) async fn reload_locked(
        &self,
        tree: &mut Accumulator,
        ledger_root: Fr,
    ) -> Result<(), RegistryError> {
        let mismatch = |local: &Fr| RegistryError::RootMismatch {
            local: fr_to_decimal(local),
            ledger: fr_to_decimal(&ledger_root),
        };

        let Some(id) = self.ledger.current_snapshot_id().await? else {
            warn!("ledger has no snapshot to reload from");
            return Err(mismatch(&tree.root()));
        };
        info!(snapshot = %id, "reloading accumulator from snapshot store");

        let blob = self.snapshots.get(&id).await?;
        let (snapshot, acc) = Snapshot::decode(&blob)?;
        if acc.depth() != self.config.depth {
            return Err(SnapshotError::Inconsistent(format!(
                "snapshot depth {} does not match configured depth {}",
                acc.depth(),
                self.config.depth
            ))
            .into());
        }
        if acc.root() != ledger_root {
            warn!(
                snapshot_root = %fr_to_decimal(&acc.root()),
                ledger_root = %fr_to_decimal(&ledger_root),
                "reloaded snapshot does not match the ledger"
            );
            return Err(mismatch(&acc.root()));
        }

        {
            let mut store = self.records.lock().await;
            let merged = merge_snapshot_records(store.all()?, snapshot.records);
            store.replace_all(merged)?;
            store.save_tree(&cached_tree(&acc))?;
        }
        *tree = acc;
        info!(root = %fr_to_decimal(&ledger_root), "local state reloaded from snapshot");
        Ok(())
    }
}
