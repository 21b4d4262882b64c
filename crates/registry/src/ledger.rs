//! Authoritative ledger seam.
//!
//! The ledger holds the last published root, the approved-commitment set and
//! optionally the content id of the snapshot behind the root. [`LocalLedger`]
//! is an in-process implementation, optionally journaled to a JSON file,
//! that checks membership proofs with the circuit's verifying key.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ark_bn254::{Bn254, Fr};
use ark_ff::Zero;
use ark_groth16::VerifyingKey;
use async_trait::async_trait;
use identity_circuits::field::{decimal, fr_to_decimal};
use identity_prover::verify_membership_bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::snapshot::ContentId;

/// Ledger transaction reference (hex digest).
pub type TxRef = String;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger processed the call and refused it.
    #[error("ledger rejected: {0}")]
    Rejected(String),
    /// The outcome is unknown.
    #[error("ledger transport error: {0}")]
    Transport(String),
}

/// Root publication: root, commitment -> approved flag, snapshot id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootUpdate {
    pub root: Fr,
    pub commitments: Vec<(Fr, bool)>,
    pub snapshot_id: Option<ContentId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofSubmission {
    pub proof: Vec<u8>,
    pub public_signals: Vec<Fr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInfo {
    #[serde(with = "decimal")]
    pub root: Fr,
    pub approved_count: usize,
    pub publish_nonce: u64,
    pub verifications: u64,
    pub snapshot_id: Option<ContentId>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn current_root(&self) -> Result<Fr, LedgerError>;

    async fn is_approved(&self, commitment: &Fr) -> Result<bool, LedgerError>;

    async fn current_snapshot_id(&self) -> Result<Option<ContentId>, LedgerError>;

    /// Publish a new root. Publishing the current root again is a no-op.
    async fn publish_root(&self, update: RootUpdate) -> Result<TxRef, LedgerError>;

    /// Verify a membership proof whose first public signal is the root.
    async fn submit_proof(&self, submission: ProofSubmission) -> Result<TxRef, LedgerError>;

    async fn info(&self) -> Result<LedgerInfo, LedgerError>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct LedgerState {
    #[serde(with = "decimal")]
    root: Fr,
    /// decimal commitment -> approved
    approved: BTreeMap<String, bool>,
    snapshot_id: Option<ContentId>,
    nonce: u64,
    verifications: u64,
    last_publish_tx: Option<TxRef>,
}

impl LedgerState {
    fn tx_ref(&self, kind: &str, payload: &str) -> TxRef {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update(self.nonce.to_be_bytes());
        hasher.update(payload.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// In-process ledger.
pub struct LocalLedger {
    state: RwLock<LedgerState>,
    journal: Option<PathBuf>,
    verifying_key: Option<VerifyingKey<Bn254>>,
}

impl LocalLedger {
    /// A fresh ledger with root zero and nothing approved.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState {
                root: Fr::zero(),
                ..LedgerState::default()
            }),
            journal: None,
            verifying_key: None,
        }
    }

    /// Open a ledger journaled at `path`, restoring its state if present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let path = path.into();
        let state = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
        } else {
            LedgerState::default()
        };
        info!(journal = %path.display(), nonce = state.nonce, "opened ledger journal");
        Ok(Self {
            state: RwLock::new(state),
            journal: Some(path),
            verifying_key: None,
        })
    }

    /// Check submitted proofs with `vk`. Without a key, proofs are accepted
    /// on their public signals alone.
    pub fn with_verifying_key(mut self, vk: VerifyingKey<Bn254>) -> Self {
        self.verifying_key = Some(vk);
        self
    }

    async fn persist(&self, state: &LedgerState) -> Result<(), LedgerError> {
        let Some(path) = &self.journal else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))
    }
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for LocalLedger {
    async fn current_root(&self) -> Result<Fr, LedgerError> {
        Ok(self.state.read().await.root)
    }

    async fn is_approved(&self, commitment: &Fr) -> Result<bool, LedgerError> {
        let key = fr_to_decimal(commitment);
        Ok(self.state.read().await.approved.get(&key).copied().unwrap_or(false))
    }

    async fn current_snapshot_id(&self) -> Result<Option<ContentId>, LedgerError> {
        Ok(self.state.read().await.snapshot_id.clone())
    }

    async fn publish_root(&self, update: RootUpdate) -> Result<TxRef, LedgerError> {
        let mut state = self.state.write().await;
        if state.nonce > 0 && state.root == update.root {
            debug!(root = %fr_to_decimal(&update.root), "root already published");
            if let Some(tx) = &state.last_publish_tx {
                return Ok(tx.clone());
            }
        }

        let mut next = state.clone();
        next.root = update.root;
        next.approved = update
            .commitments
            .iter()
            .map(|(c, approved)| (fr_to_decimal(c), *approved))
            .collect();
        if update.snapshot_id.is_some() {
            next.snapshot_id = update.snapshot_id;
        }
        next.nonce += 1;
        let tx = next.tx_ref("publish", &fr_to_decimal(&next.root));
        next.last_publish_tx = Some(tx.clone());

        self.persist(&next).await?;
        *state = next;
        info!(
            root = %fr_to_decimal(&state.root),
            nonce = state.nonce,
            approved = state.approved.values().filter(|a| **a).count(),
            "ledger root published"
        );
        Ok(tx)
    }

    async fn submit_proof(&self, submission: ProofSubmission) -> Result<TxRef, LedgerError> {
        let mut state = self.state.write().await;

        let &[root, identity] = submission.public_signals.as_slice() else {
            return Err(LedgerError::Rejected(format!(
                "expected 2 public signals, got {}",
                submission.public_signals.len()
            )));
        };
        if root != state.root {
            return Err(LedgerError::Rejected("proof is not against the current root".into()));
        }
        if !state
            .approved
            .get(&fr_to_decimal(&identity))
            .copied()
            .unwrap_or(false)
        {
            return Err(LedgerError::Rejected("identity is not approved".into()));
        }
        if let Some(vk) = &self.verifying_key {
            match verify_membership_bytes(vk, &submission.proof, &submission.public_signals) {
                Ok(true) => {}
                Ok(false) => return Err(LedgerError::Rejected("invalid proof".into())),
                Err(e) => {
                    warn!(error = %e, "proof verification error");
                    return Err(LedgerError::Rejected(e.to_string()));
                }
            }
        }

        let mut next = state.clone();
        next.nonce += 1;
        next.verifications += 1;
        let tx = next.tx_ref("verify", &fr_to_decimal(&identity));

        self.persist(&next).await?;
        *state = next;
        info!(verifications = state.verifications, "membership proof accepted");
        Ok(tx)
    }

    async fn info(&self) -> Result<LedgerInfo, LedgerError> {
        let state = self.state.read().await;
        Ok(LedgerInfo {
            root: state.root,
            approved_count: state.approved.values().filter(|a| **a).count(),
            publish_nonce: state.nonce,
            verifications: state.verifications,
            snapshot_id: state.snapshot_id.clone(),
        })
    }
}
