//! Engine-level errors.

use identity_circuits::{AccumulatorError, EncodingError};
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::prover::ProverError;
use crate::record::Status;
use crate::snapshot::{SnapshotError, SnapshotStoreError};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("an active record with the same identity already exists")]
    DuplicateSubmission,

    #[error("no record for subject `{0}`")]
    NotFound(String),

    #[error("cannot {operation} subject `{subject}` in status {status}")]
    InvalidState {
        subject: String,
        status: Status,
        operation: &'static str,
    },

    #[error("identity fields do not match the record for subject `{0}`")]
    IdentityMismatch(String),

    /// Local accumulator root and ledger root still disagree after the one
    /// permitted reload. Both roots are decimal strings.
    #[error("root mismatch: local {local}, ledger {ledger}")]
    RootMismatch { local: String, ledger: String },

    #[error("ledger rejected: {0}")]
    LedgerRejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("leaf for subject `{0}` is not in the accumulator")]
    LeafNotFound(String),

    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    SnapshotStore(#[from] SnapshotStoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Prover(#[from] ProverError),
}

impl From<LedgerError> for RegistryError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Rejected(reason) => RegistryError::LedgerRejected(reason),
            LedgerError::Transport(reason) => RegistryError::Transport(reason),
        }
    }
}

impl RegistryError {
    /// Errors caused by the caller's input or the subject's state.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            RegistryError::Encoding(_)
                | RegistryError::DuplicateSubmission
                | RegistryError::NotFound(_)
                | RegistryError::InvalidState { .. }
                | RegistryError::IdentityMismatch(_)
        )
    }
}
