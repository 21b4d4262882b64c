//! Engine scenarios against in-memory and file-backed collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ark_bn254::Fr;
use async_trait::async_trait;
use identity_circuits::{
    identity_commitment, leaf_commitment, AccumulatorError, IdentityFields, InclusionProof,
    StatusTag,
};

use super::*;
use crate::ledger::{LedgerError, LedgerInfo, LocalLedger, RootUpdate};
use crate::prover::{ProofBundle, ProverError};
use crate::snapshot::{MemorySnapshotStore, SnapshotStoreError};
use crate::store::{JsonFileStore, MemoryStore};

const DEPTH: usize = 4;

fn config() -> EngineConfig {
    EngineConfig {
        depth: DEPTH,
        publish_attempts: 3,
        publish_backoff: Duration::from_millis(1),
    }
}

fn person(name: &str, nik: u64) -> IdentityFields {
    IdentityFields::new(nik.to_string(), name, "19900101", format!("{}-key", name))
}

fn alice() -> IdentityFields {
    person("alice", 1001)
}

fn bob() -> IdentityFields {
    person("bob", 1002)
}

/// Proves natively: opens the path and reports the root it reaches.
#[derive(Default)]
struct WitnessProver {
    calls: AtomicUsize,
    forged_root: Option<Fr>,
}

#[async_trait]
impl Prover for WitnessProver {
    async fn prove(&self, circuit_id: &str, request: ProofRequest) -> Result<ProofBundle, ProverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(circuit_id, MEMBERSHIP_CIRCUIT_ID);

        let id = identity_commitment(&request.fields).map_err(|e| ProverError::Failed(e.to_string()))?;
        let leaf = leaf_commitment(id, request.salt, StatusTag::Active);
        let root = InclusionProof::new(request.siblings, request.directions).compute_root(leaf);
        if root != request.claimed_root {
            return Err(ProverError::Failed("witness does not open the claimed root".into()));
        }
        Ok(ProofBundle {
            proof: b"witness".to_vec(),
            public_signals: vec![self.forged_root.unwrap_or(root), id],
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Fault {
    None,
    /// Fail the next n publishes without applying them.
    DropRequest(u32),
    /// Apply the next n publishes, then report a transport failure.
    LoseReceipt(u32),
    Reject,
}

struct FlakyLedger {
    inner: LocalLedger,
    fault: std::sync::Mutex<Fault>,
    publishes: AtomicUsize,
}

impl FlakyLedger {
    fn new(fault: Fault) -> Self {
        Self {
            inner: LocalLedger::new(),
            fault: std::sync::Mutex::new(fault),
            publishes: AtomicUsize::new(0),
        }
    }

    fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    fn next_fault(&self) -> Fault {
        let mut fault = self.fault.lock().unwrap();
        let current = *fault;
        *fault = match current {
            Fault::DropRequest(n) if n > 1 => Fault::DropRequest(n - 1),
            Fault::LoseReceipt(n) if n > 1 => Fault::LoseReceipt(n - 1),
            Fault::Reject => Fault::Reject,
            _ => Fault::None,
        };
        current
    }
}

#[async_trait]
impl Ledger for FlakyLedger {
    async fn current_root(&self) -> Result<Fr, LedgerError> {
        self.inner.current_root().await
    }

    async fn is_approved(&self, commitment: &Fr) -> Result<bool, LedgerError> {
        self.inner.is_approved(commitment).await
    }

    async fn current_snapshot_id(&self) -> Result<Option<ContentId>, LedgerError> {
        self.inner.current_snapshot_id().await
    }

    async fn publish_root(&self, update: RootUpdate) -> Result<TxRef, LedgerError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        match self.next_fault() {
            Fault::None => self.inner.publish_root(update).await,
            Fault::DropRequest(_) => Err(LedgerError::Transport("connection reset".into())),
            Fault::LoseReceipt(_) => {
                self.inner.publish_root(update).await?;
                Err(LedgerError::Transport("timed out waiting for receipt".into()))
            }
            Fault::Reject => Err(LedgerError::Rejected("registry is paused".into())),
        }
    }

    async fn submit_proof(&self, submission: ProofSubmission) -> Result<TxRef, LedgerError> {
        self.inner.submit_proof(submission).await
    }

    async fn info(&self) -> Result<LedgerInfo, LedgerError> {
        self.inner.info().await
    }
}

/// Snapshot store that counts reads.
#[derive(Default)]
struct CountingSnapshots {
    inner: MemorySnapshotStore,
    gets: AtomicUsize,
}

impl CountingSnapshots {
    fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for CountingSnapshots {
    async fn put(&self, blob: Vec<u8>) -> Result<ContentId, SnapshotStoreError> {
        self.inner.put(blob).await
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, SnapshotStoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id).await
    }
}

struct Harness {
    engine: ReconciliationEngine,
    ledger: Arc<FlakyLedger>,
    snapshots: Arc<CountingSnapshots>,
    prover: Arc<WitnessProver>,
}

fn harness_with(store: Box<dyn RecordStore>, ledger: Arc<FlakyLedger>, snapshots: Arc<CountingSnapshots>) -> Harness {
    let prover = Arc::new(WitnessProver::default());
    let engine = ReconciliationEngine::new(
        config(),
        store,
        ledger.clone(),
        snapshots.clone(),
        prover.clone(),
    )
    .unwrap();
    Harness {
        engine,
        ledger,
        snapshots,
        prover,
    }
}

fn harness(fault: Fault) -> Harness {
    harness_with(
        Box::new(MemoryStore::new()),
        Arc::new(FlakyLedger::new(fault)),
        Arc::new(CountingSnapshots::default()),
    )
}

async fn local_root(engine: &ReconciliationEngine) -> Fr {
    engine.tree_info().await.unwrap().local_root
}

#[tokio::test]
async fn test_submit_creates_pending_record() {
    let h = harness(Fault::None);
    let record = h.engine.submit("alice", &alice()).await.unwrap();

    assert_eq!(record.status, Status::Pending);
    assert_eq!(record.identity_commitment, identity_commitment(&alice()).unwrap());
    assert_eq!(record.leaf_index, None);
    assert!(h.engine.has_submitted("alice").await.unwrap());
    assert_eq!(h.engine.pending_records().await.unwrap(), vec![record]);
    // Submission alone publishes nothing
    assert_eq!(h.ledger.publishes(), 0);
}

#[tokio::test]
async fn test_duplicate_identity_under_new_subject() {
    let h = harness(Fault::None);
    h.engine.submit("alice", &alice()).await.unwrap();

    let err = h.engine.submit("mallory", &alice()).await.unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateSubmission));
    assert!(!h.engine.has_submitted("mallory").await.unwrap());
}

#[tokio::test]
async fn test_duplicate_allowed_after_revocation() {
    let h = harness(Fault::None);
    h.engine.submit("alice", &alice()).await.unwrap();
    h.engine.approve("alice").await.unwrap();
    h.engine.revoke("alice", "lost credentials").await.unwrap();

    let record = h.engine.submit("alice-2", &alice()).await.unwrap();
    assert_eq!(record.status, Status::Pending);
}

#[tokio::test]
async fn test_resubmission_by_same_subject() {
    let h = harness(Fault::None);
    let first = h.engine.submit("alice", &alice()).await.unwrap();
    let again = h.engine.submit("alice", &alice()).await.unwrap();
    assert_eq!(first, again, "salt must not be regenerated");

    let err = h.engine.submit("alice", &bob()).await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::InvalidState { status: Status::Pending, operation: "submit", .. }
    ));
}

#[tokio::test]
async fn test_submit_rejects_malformed_fields() {
    let h = harness(Fault::None);
    let mut fields = alice();
    fields.national_id = "10O1".into();
    let err = h.engine.submit("alice", &fields).await.unwrap_err();
    assert!(matches!(err, RegistryError::Encoding(_)));
    assert!(err.is_caller_error());
}

#[tokio::test]
async fn test_approve_requires_pending_record() {
    let h = harness(Fault::None);
    assert!(matches!(
        h.engine.approve("ghost").await.unwrap_err(),
        RegistryError::NotFound(_)
    ));

    h.engine.submit("alice", &alice()).await.unwrap();
    h.engine.approve("alice").await.unwrap();
    assert!(matches!(
        h.engine.approve("alice").await.unwrap_err(),
        RegistryError::InvalidState { status: Status::Approved, operation: "approve", .. }
    ));
}

#[tokio::test]
async fn test_approve_publishes_root_and_snapshot() {
    let h = harness(Fault::None);
    h.engine.submit("alice", &alice()).await.unwrap();
    let change = h.engine.approve("alice").await.unwrap();

    assert_eq!(change.record.status, Status::Approved);
    assert_eq!(change.record.leaf_index, Some(0));
    assert!(change.record.approved_at.is_some());
    assert_eq!(change.rebuild.leaf_count, 1);
    assert!(change.rebuild.tx.is_some());

    assert_eq!(h.ledger.current_root().await.unwrap(), change.rebuild.root);
    assert_eq!(local_root(&h.engine).await, change.rebuild.root);
    assert!(h
        .ledger
        .is_approved(&change.record.identity_commitment)
        .await
        .unwrap());
    assert_eq!(
        h.ledger.current_snapshot_id().await.unwrap(),
        Some(change.rebuild.snapshot_id.clone())
    );

    // The published snapshot decodes to the same accumulator
    let blob = h.snapshots.inner.get(&change.rebuild.snapshot_id).await.unwrap();
    let (snapshot, acc) = Snapshot::decode(&blob).unwrap();
    assert_eq!(acc.root(), change.rebuild.root);
    assert_eq!(snapshot.records, vec![change.record]);
}

#[tokio::test]
async fn test_verify_after_later_approval() {
    let h = harness(Fault::None);
    h.engine.submit("alice", &alice()).await.unwrap();
    h.engine.submit("bob", &bob()).await.unwrap();
    let r1 = h.engine.approve("alice").await.unwrap().rebuild.root;
    let r2 = h.engine.approve("bob").await.unwrap().rebuild.root;
    assert_ne!(r1, r2);

    let v = h.engine.verify("alice", &alice()).await.unwrap();
    assert_eq!(v.root, r2);
    assert_eq!(v.leaf_index, 0);
    assert!(!v.reloaded);
    assert_eq!(v.record.status, Status::Verified);
    assert_eq!(v.record.verification_tx.as_deref(), Some(v.tx.as_str()));
    assert!(h.engine.is_verified("alice").await.unwrap());
    assert_eq!(h.ledger.info().await.unwrap().verifications, 1);

    let v = h.engine.verify("bob", &bob()).await.unwrap();
    assert_eq!(v.leaf_index, 1);

    // Verified records may verify again
    h.engine.verify("alice", &alice()).await.unwrap();
    assert_eq!(h.snapshots.gets(), 0);
}

#[tokio::test]
async fn test_verify_rejects_wrong_fields_and_status() {
    let h = harness(Fault::None);
    h.engine.submit("alice", &alice()).await.unwrap();

    assert!(matches!(
        h.engine.verify("alice", &alice()).await.unwrap_err(),
        RegistryError::InvalidState { status: Status::Pending, operation: "verify", .. }
    ));

    h.engine.approve("alice").await.unwrap();
    assert!(matches!(
        h.engine.verify("alice", &bob()).await.unwrap_err(),
        RegistryError::IdentityMismatch(_)
    ));
    assert!(matches!(
        h.engine.verify("ghost", &alice()).await.unwrap_err(),
        RegistryError::NotFound(_)
    ));
    assert_eq!(h.prover.calls.load(Ordering::SeqCst), 0);
}

fn copy_store(from: &std::path::Path, to: &std::path::Path) {
    std::fs::create_dir_all(to).unwrap();
    for file in ["records.json", "accumulator.json"] {
        std::fs::copy(from.join(file), to.join(file)).unwrap();
    }
}

#[tokio::test]
async fn test_stale_cache_reloads_once() {
    let dir = tempfile::tempdir().unwrap();
    let live_dir = dir.path().join("live");
    let stale_dir = dir.path().join("stale");

    let live = harness_with(
        Box::new(JsonFileStore::open(&live_dir).unwrap()),
        Arc::new(FlakyLedger::new(Fault::None)),
        Arc::new(CountingSnapshots::default()),
    );
    live.engine.submit("alice", &alice()).await.unwrap();
    live.engine.submit("bob", &bob()).await.unwrap();
    let r1 = live.engine.approve("alice").await.unwrap().rebuild.root;
    copy_store(&live_dir, &stale_dir);
    let r2 = live.engine.approve("bob").await.unwrap().rebuild.root;

    // Same ledger and snapshot store, local files frozen at r1
    let stale = harness_with(
        Box::new(JsonFileStore::open(&stale_dir).unwrap()),
        live.ledger.clone(),
        live.snapshots.clone(),
    );
    let info = stale.engine.tree_info().await.unwrap();
    assert_eq!(info.local_root, r1);
    assert_eq!(info.in_sync, Some(false));

    let gets = stale.snapshots.gets();
    let v = stale.engine.verify("alice", &alice()).await.unwrap();
    assert!(v.reloaded);
    assert_eq!(v.root, r2);
    assert_eq!(v.leaf_index, 0);
    assert_eq!(stale.snapshots.gets(), gets + 1);

    // Reloaded records and tree were persisted
    assert_eq!(
        stale.engine.record("bob").await.unwrap().unwrap().status,
        Status::Approved
    );
    let reopened = JsonFileStore::open(&stale_dir).unwrap();
    assert_eq!(reopened.load_tree().unwrap().unwrap().root, r2);

    // Now in sync: no further reload
    let v = stale.engine.verify("bob", &bob()).await.unwrap();
    assert!(!v.reloaded);
    assert_eq!(stale.snapshots.gets(), gets + 1);
}

#[tokio::test]
async fn test_reload_to_wrong_root_fails_without_mutation() {
    let h = harness(Fault::None);
    h.engine.submit("alice", &alice()).await.unwrap();
    let change = h.engine.approve("alice").await.unwrap();

    // Ledger moves to a root no snapshot backs
    h.ledger
        .inner
        .publish_root(RootUpdate {
            root: Fr::from(999u64),
            commitments: vec![(change.record.identity_commitment, true)],
            snapshot_id: None,
        })
        .await
        .unwrap();

    let before = h.engine.record("alice").await.unwrap();
    let err = h.engine.verify("alice", &alice()).await.unwrap_err();
    assert!(matches!(err, RegistryError::RootMismatch { .. }));

    assert_eq!(h.snapshots.gets(), 1, "exactly one reload attempt");
    assert_eq!(h.engine.record("alice").await.unwrap(), before);
    assert_eq!(local_root(&h.engine).await, change.rebuild.root);
    assert_eq!(h.prover.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.ledger.info().await.unwrap().verifications, 0);
}

#[tokio::test]
async fn test_rejected_publish_leaves_local_ahead() {
    let h = harness(Fault::Reject);
    h.engine.submit("alice", &alice()).await.unwrap();

    let err = h.engine.approve("alice").await.unwrap_err();
    assert!(matches!(err, RegistryError::LedgerRejected(_)));
    assert_eq!(h.ledger.publishes(), 1, "rejections are not retried");

    // Local state committed, ledger untouched
    assert_eq!(
        h.engine.record("alice").await.unwrap().unwrap().status,
        Status::Approved
    );
    assert_eq!(h.ledger.current_root().await.unwrap(), Fr::from(0u64));

    // Ledger has no snapshot to reconcile with
    let err = h.engine.verify("alice", &alice()).await.unwrap_err();
    assert!(matches!(err, RegistryError::RootMismatch { .. }));
    assert_eq!(h.snapshots.gets(), 0);
}

#[tokio::test]
async fn test_reload_keeps_records_missing_from_snapshot() {
    let h = harness(Fault::None);
    h.engine.submit("alice", &alice()).await.unwrap();
    let published = h.engine.approve("alice").await.unwrap().rebuild;
    h.engine.submit("bob", &bob()).await.unwrap();
    let carol = person("carol", 1003);
    let carol_salt = h.engine.submit("carol", &carol).await.unwrap().salt;

    // Carol's approval is committed locally but never reaches the ledger
    *h.ledger.fault.lock().unwrap() = Fault::Reject;
    assert!(h.engine.approve("carol").await.is_err());
    *h.ledger.fault.lock().unwrap() = Fault::None;

    let v = h.engine.verify("alice", &alice()).await.unwrap();
    assert!(v.reloaded);
    assert_eq!(v.root, published.root);

    let bob = h.engine.record("bob").await.unwrap().unwrap();
    assert_eq!(bob.status, Status::Pending);

    let carol_record = h.engine.record("carol").await.unwrap().unwrap();
    assert_eq!(carol_record.status, Status::Pending);
    assert_eq!(carol_record.leaf_index, None);
    assert_eq!(carol_record.approved_at, None);
    assert_eq!(carol_record.salt, carol_salt);
    assert!(h.engine.validate_tree().await.unwrap().valid);

    // Carol can go through approval again
    let change = h.engine.approve("carol").await.unwrap();
    assert_eq!(change.record.leaf_index, Some(1));
    h.engine.verify("carol", &carol).await.unwrap();
}

#[tokio::test]
async fn test_capacity_exceeded_persists_nothing() {
    let h = harness(Fault::None);
    let capacity = 1usize << DEPTH;
    for i in 0..capacity {
        let subject = format!("member-{:02}", i);
        h.engine.submit(&subject, &person(&subject, 5000 + i as u64)).await.unwrap();
        h.engine.approve(&subject).await.unwrap();
    }
    let full = h.engine.tree_info().await.unwrap();
    assert_eq!(full.leaf_count, capacity);

    h.engine.submit("late", &person("late", 9999)).await.unwrap();
    let err = h.engine.approve("late").await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Accumulator(AccumulatorError::CapacityExceeded { .. })
    ));

    let late = h.engine.record("late").await.unwrap().unwrap();
    assert_eq!(late.status, Status::Pending);
    assert_eq!(late.approved_at, None);
    assert_eq!(late.leaf_index, None);

    // The registry keeps working after the failed approval
    assert_eq!(local_root(&h.engine).await, full.local_root);
    assert!(h.engine.validate_tree().await.unwrap().valid);
    h.engine.rebuild_and_publish().await.unwrap();
    h.engine.revoke("member-00", "expired").await.unwrap();
    h.engine.verify("member-01", &person("member-01", 5001)).await.unwrap();
    assert!(matches!(
        h.engine.approve("late").await.unwrap_err(),
        RegistryError::Accumulator(_)
    ));
}

#[tokio::test]
async fn test_lost_receipt_is_confirmed_by_reading_root() {
    let h = harness(Fault::LoseReceipt(1));
    h.engine.submit("alice", &alice()).await.unwrap();

    let change = h.engine.approve("alice").await.unwrap();
    assert_eq!(change.rebuild.tx, None);
    assert_eq!(h.ledger.publishes(), 1, "no retry once the root is confirmed");
    assert_eq!(h.ledger.current_root().await.unwrap(), change.rebuild.root);
}

#[tokio::test]
async fn test_dropped_publish_is_retried() {
    let h = harness(Fault::DropRequest(2));
    h.engine.submit("alice", &alice()).await.unwrap();

    let change = h.engine.approve("alice").await.unwrap();
    assert!(change.rebuild.tx.is_some());
    assert_eq!(h.ledger.publishes(), 3);
    assert_eq!(h.ledger.current_root().await.unwrap(), change.rebuild.root);
}

#[tokio::test]
async fn test_publish_gives_up_after_configured_attempts() {
    let h = harness(Fault::DropRequest(10));
    h.engine.submit("alice", &alice()).await.unwrap();

    let err = h.engine.approve("alice").await.unwrap_err();
    assert!(matches!(err, RegistryError::Transport(_)));
    assert_eq!(h.ledger.publishes(), 3);
}

#[tokio::test]
async fn test_revoke_keeps_leaf_position() {
    let h = harness(Fault::None);
    h.engine.submit("alice", &alice()).await.unwrap();
    h.engine.submit("bob", &bob()).await.unwrap();
    h.engine.approve("alice").await.unwrap();
    let before = h.engine.approve("bob").await.unwrap().rebuild.root;

    let change = h.engine.revoke("alice", "fraud").await.unwrap();
    assert_eq!(change.record.status, Status::Revoked);
    assert_eq!(change.record.leaf_index, Some(0));
    assert_eq!(change.record.revocation_reason.as_deref(), Some("fraud"));
    assert_eq!(change.rebuild.leaf_count, 2);
    assert_ne!(change.rebuild.root, before);

    let alice_id = identity_commitment(&alice()).unwrap();
    assert!(!h.ledger.is_approved(&alice_id).await.unwrap());
    assert!(!h.engine.is_approved("alice").await.unwrap());

    assert!(matches!(
        h.engine.verify("alice", &alice()).await.unwrap_err(),
        RegistryError::InvalidState { status: Status::Revoked, .. }
    ));
    let v = h.engine.verify("bob", &bob()).await.unwrap();
    assert_eq!(v.leaf_index, 1);

    assert!(matches!(
        h.engine.revoke("alice", "again").await.unwrap_err(),
        RegistryError::InvalidState { operation: "revoke", .. }
    ));
}

#[tokio::test]
async fn test_republishing_same_root_is_noop() {
    let h = harness(Fault::None);
    h.engine.submit("alice", &alice()).await.unwrap();
    let first = h.engine.approve("alice").await.unwrap().rebuild;
    let nonce = h.ledger.info().await.unwrap().publish_nonce;

    let again = h.engine.rebuild_and_publish().await.unwrap();
    assert_eq!(again.root, first.root);
    assert_eq!(again.tx, first.tx);
    assert_eq!(h.ledger.info().await.unwrap().publish_nonce, nonce);
}

#[tokio::test]
async fn test_forged_prover_root_is_rejected() {
    let ledger = Arc::new(FlakyLedger::new(Fault::None));
    let snapshots = Arc::new(CountingSnapshots::default());
    let prover = Arc::new(WitnessProver {
        forged_root: Some(Fr::from(5u64)),
        ..WitnessProver::default()
    });
    let engine = ReconciliationEngine::new(
        config(),
        Box::new(MemoryStore::new()),
        ledger.clone(),
        snapshots,
        prover,
    )
    .unwrap();

    engine.submit("alice", &alice()).await.unwrap();
    engine.approve("alice").await.unwrap();
    assert!(matches!(
        engine.verify("alice", &alice()).await.unwrap_err(),
        RegistryError::RootMismatch { .. }
    ));
    assert_eq!(ledger.info().await.unwrap().verifications, 0);
    assert!(!engine.is_verified("alice").await.unwrap());
}

#[tokio::test]
async fn test_queries_and_stats() {
    let h = harness(Fault::None);
    h.engine.submit("alice", &alice()).await.unwrap();
    h.engine.submit("bob", &bob()).await.unwrap();
    h.engine.submit("carol", &person("carol", 1003)).await.unwrap();
    h.engine.approve("alice").await.unwrap();
    h.engine.approve("bob").await.unwrap();
    h.engine.verify("bob", &bob()).await.unwrap();

    assert!(h.engine.is_approved("alice").await.unwrap());
    assert!(!h.engine.is_approved("carol").await.unwrap());
    assert!(!h.engine.is_approved("ghost").await.unwrap());
    assert!(h.engine.is_verified("bob").await.unwrap());

    let (commitment, approved) = h.engine.check_identity_approval(&alice()).await.unwrap();
    assert_eq!(commitment, identity_commitment(&alice()).unwrap());
    assert!(approved);
    assert!(!h.engine.check_identity_approval(&person("dave", 9)).await.unwrap().1);

    let info = h.engine.tree_info().await.unwrap();
    assert_eq!(info.in_sync, Some(true));
    assert_eq!(info.depth, DEPTH);
    assert_eq!(info.capacity, 16);
    assert_eq!(info.leaf_count, 2);
    assert_eq!(h.engine.current_root().await.unwrap(), info.local_root);

    let stats = h.engine.stats().await.unwrap();
    assert_eq!(
        (stats.total, stats.pending, stats.approved, stats.verified, stats.revoked),
        (3, 1, 1, 1, 0)
    );
    assert_eq!(stats.leaf_count, 2);
    assert!(stats.last_tree_update.is_some());

    let validation = h.engine.validate_tree().await.unwrap();
    assert!(validation.valid, "{:?}", validation.issues);
}

#[tokio::test]
async fn test_validate_tree_reports_inconsistencies() {
    let mut approved = crate::record::IdentityRecord::pending("alice", Fr::from(1u64), Fr::from(2u64), 0);
    approved.transition(Transition::Approve, 1).unwrap();
    approved.leaf_index = Some(1);

    let mut store = MemoryStore::new();
    let acc = Accumulator::build(vec![approved.leaf().unwrap(), Fr::from(77u64)], DEPTH).unwrap();
    store.save_tree(&CachedTree::from_accumulator(&acc, 1)).unwrap();
    store.put(approved).unwrap();

    let h = harness_with(
        Box::new(store),
        Arc::new(FlakyLedger::new(Fault::None)),
        Arc::new(CountingSnapshots::default()),
    );
    let validation = h.engine.validate_tree().await.unwrap();
    assert!(!validation.valid);
    assert_eq!(validation.issues.len(), 3, "{:?}", validation.issues);
}

#[tokio::test]
async fn test_save_snapshot_and_forced_reload() {
    let h = harness(Fault::None);
    h.engine.submit("alice", &alice()).await.unwrap();
    let published = h.engine.approve("alice").await.unwrap().rebuild;

    let id = h.engine.save_snapshot().await.unwrap();
    let (snapshot, _) = Snapshot::decode(&h.snapshots.inner.get(&id).await.unwrap()).unwrap();
    assert_eq!(snapshot.merkle_tree.root, published.root);

    // Submissions made after the last publish survive a forced reload
    h.engine.submit("bob", &bob()).await.unwrap();
    let root = h.engine.reload_from_snapshot_store().await.unwrap();
    assert_eq!(root, published.root);
    assert_eq!(
        h.engine.record("bob").await.unwrap().unwrap().status,
        Status::Pending
    );
    assert_eq!(h.snapshots.gets(), 1);
}

#[tokio::test]
async fn test_reset_clears_local_state() {
    let h = harness(Fault::None);
    h.engine.submit("alice", &alice()).await.unwrap();
    h.engine.approve("alice").await.unwrap();

    h.engine.reset().await.unwrap();
    assert!(!h.engine.has_submitted("alice").await.unwrap());
    let info = h.engine.tree_info().await.unwrap();
    assert_eq!(info.leaf_count, 0);
    assert_eq!(info.in_sync, Some(false));
    assert_eq!(h.engine.stats().await.unwrap(), RegistryStats::default());
}

#[tokio::test]
async fn test_engine_restores_cached_tree() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(FlakyLedger::new(Fault::None));
    let snapshots = Arc::new(CountingSnapshots::default());
    let root = {
        let h = harness_with(
            Box::new(JsonFileStore::open(dir.path()).unwrap()),
            ledger.clone(),
            snapshots.clone(),
        );
        h.engine.submit("alice", &alice()).await.unwrap();
        h.engine.approve("alice").await.unwrap().rebuild.root
    };

    let h = harness_with(
        Box::new(JsonFileStore::open(dir.path()).unwrap()),
        ledger,
        snapshots,
    );
    assert_eq!(local_root(&h.engine).await, root);
    h.engine.verify("alice", &alice()).await.unwrap();
    assert_eq!(h.snapshots.gets(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_serialize() {
    let h = harness(Fault::None);
    let engine = Arc::new(h.engine);
    let subjects: Vec<String> = (0..6).map(|i| format!("subject-{}", i)).collect();
    for (i, s) in subjects.iter().enumerate() {
        engine.submit(s, &person(s, 2000 + i as u64)).await.unwrap();
    }

    let tasks: Vec<_> = subjects
        .iter()
        .cloned()
        .map(|s| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.approve(&s).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let info = engine.tree_info().await.unwrap();
    assert_eq!(info.leaf_count, 6);
    assert_eq!(info.in_sync, Some(true));
    assert!(engine.validate_tree().await.unwrap().valid);

    let mut indices: Vec<u64> = Vec::new();
    for s in &subjects {
        indices.push(engine.record(s).await.unwrap().unwrap().leaf_index.unwrap());
    }
    indices.sort_unstable();
    assert_eq!(indices, (0..6).collect::<Vec<u64>>());

    for (i, s) in subjects.iter().enumerate() {
        engine.verify(s, &person(s, 2000 + i as u64)).await.unwrap();
    }
}

#[tokio::test]
async fn test_groth16_end_to_end() {
    use identity_prover::setup_membership;
    use rand::{rngs::StdRng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(3);
    let keys = Arc::new(setup_membership(&mut rng, DEPTH).unwrap());
    let ledger = Arc::new(LocalLedger::new().with_verifying_key(keys.verifying_key.clone()));
    let engine = ReconciliationEngine::new(
        config(),
        Box::new(MemoryStore::new()),
        ledger.clone(),
        Arc::new(MemorySnapshotStore::new()),
        Arc::new(crate::prover::Groth16Prover::new(keys)),
    )
    .unwrap();

    engine.submit("alice", &alice()).await.unwrap();
    engine.submit("bob", &bob()).await.unwrap();
    engine.approve("alice").await.unwrap();
    engine.approve("bob").await.unwrap();

    let v = engine.verify("alice", &alice()).await.unwrap();
    assert_eq!(v.leaf_index, 0);
    assert_eq!(ledger.info().await.unwrap().verifications, 1);
}
