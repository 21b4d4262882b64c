//! Identity registry: local records, authoritative ledger and
//! content-addressed snapshots kept consistent around one Merkle accumulator.
//!
//! The [`ReconciliationEngine`] owns the accumulator cache and drives every
//! state change. Ledger, snapshot storage and proving are reached through
//! the [`Ledger`], [`SnapshotStore`] and [`Prover`] traits.

pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod prover;
pub mod record;
pub mod snapshot;
pub mod store;

pub use config::{ConfigError, EngineConfig, RegistryConfig};
pub use engine::{
    RebuildReport, ReconciliationEngine, RegistryStats, StateChange, TreeInfo, TreeValidation,
    Verification,
};
pub use error::RegistryError;
pub use ledger::{Ledger, LedgerError, LedgerInfo, LocalLedger, ProofSubmission, RootUpdate, TxRef};
pub use prover::{Groth16Prover, ProofBundle, ProofRequest, Prover, ProverError};
pub use record::{IdentityRecord, Status, Transition};
pub use snapshot::{
    ContentId, DirectorySnapshotStore, GatewaySnapshotStore, MemorySnapshotStore, Snapshot,
    SnapshotError, SnapshotStore, SnapshotStoreError,
};
pub use store::{CachedTree, JsonFileStore, MemoryStore, RecordStore, StoreError};
