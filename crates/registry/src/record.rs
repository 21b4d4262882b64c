//! Identity records and their lifecycle.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use ark_bn254::Fr;
use identity_circuits::field::decimal;
use identity_circuits::{leaf_commitment, StatusTag};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Approved,
    Verified,
    Revoked,
}

/// Operations that move a record between statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Approve,
    Verify,
    Revoke,
}

impl Transition {
    pub fn name(self) -> &'static str {
        match self {
            Transition::Approve => "approve",
            Transition::Verify => "verify",
            Transition::Revoke => "revoke",
        }
    }
}

impl Status {
    /// Transition table. `None` means the transition is not allowed.
    pub fn apply(self, transition: Transition) -> Option<Status> {
        use Status::*;
        use Transition::*;
        match (self, transition) {
            (Pending, Approve) => Some(Approved),
            (Approved | Verified, Verify) => Some(Verified),
            (Approved | Verified, Revoke) => Some(Revoked),
            _ => None,
        }
    }

    /// Status tag of the record's leaf, or `None` if it has no leaf.
    pub fn tag(self) -> Option<StatusTag> {
        match self {
            Status::Pending => None,
            Status::Approved | Status::Verified => Some(StatusTag::Active),
            Status::Revoked => Some(StatusTag::Revoked),
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, Status::Approved | Status::Verified)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Approved => "approved",
            Status::Verified => "verified",
            Status::Revoked => "revoked",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-subject record. Raw identity fields are never stored here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub subject_id: String,
    #[serde(with = "decimal")]
    pub identity_commitment: Fr,
    #[serde(with = "decimal")]
    pub salt: Fr,
    /// Position in the accumulator as of the last rebuild.
    pub leaf_index: Option<u64>,
    pub status: Status,
    pub submitted_at: u64,
    pub approved_at: Option<u64>,
    pub verified_at: Option<u64>,
    pub revoked_at: Option<u64>,
    pub revocation_reason: Option<String>,
    pub verification_tx: Option<String>,
}

impl IdentityRecord {
    pub fn pending(subject_id: impl Into<String>, identity_commitment: Fr, salt: Fr, now: u64) -> Self {
        Self {
            subject_id: subject_id.into(),
            identity_commitment,
            salt,
            leaf_index: None,
            status: Status::Pending,
            submitted_at: now,
            approved_at: None,
            verified_at: None,
            revoked_at: None,
            revocation_reason: None,
            verification_tx: None,
        }
    }

    /// Leaf commitment for the record's current status.
    pub fn leaf(&self) -> Option<Fr> {
        self.status
            .tag()
            .map(|tag| leaf_commitment(self.identity_commitment, self.salt, tag))
    }

    /// Apply `transition`, stamping its timestamp. On failure the record is
    /// unchanged and the current status is returned.
    pub fn transition(&mut self, transition: Transition, now: u64) -> Result<(), Status> {
        let next = self.status.apply(transition).ok_or(self.status)?;
        match transition {
            Transition::Approve => self.approved_at = Some(now),
            Transition::Verify => self.verified_at = Some(now),
            Transition::Revoke => self.revoked_at = Some(now),
        }
        self.status = next;
        Ok(())
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Fresh 128-bit salt.
pub fn random_salt() -> Fr {
    Fr::from(rand::random::<u128>())
}
