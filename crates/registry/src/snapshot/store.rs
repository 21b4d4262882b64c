//! Snapshot storage backends.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Hex SHA-256 of a snapshot blob.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn of(blob: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(blob)))
    }

    /// Parse a content id, accepting only 64 lowercase hex digits.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        valid.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
pub enum SnapshotStoreError {
    #[error("snapshot {0} not found")]
    NotFound(ContentId),
    #[error("snapshot {id} failed digest check")]
    DigestMismatch { id: ContentId },
    #[error("snapshot store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot gateway timed out after {0:?}")]
    Timeout(Duration),
    #[error("snapshot {id} unavailable from {attempts} gateway(s): {last}")]
    Unavailable {
        id: ContentId,
        attempts: usize,
        last: String,
    },
}

/// Content-addressed blob storage.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store `blob`, returning its content id. Storing the same blob twice
    /// yields the same id.
    async fn put(&self, blob: Vec<u8>) -> Result<ContentId, SnapshotStoreError>;

    /// Fetch the exact bytes stored under `id`.
    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, SnapshotStoreError>;
}

/// In-memory snapshot store.
#[derive(Default)]
pub struct MemorySnapshotStore {
    blobs: RwLock<std::collections::HashMap<ContentId, Vec<u8>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn put(&self, blob: Vec<u8>) -> Result<ContentId, SnapshotStoreError> {
        let id = ContentId::of(&blob);
        self.blobs.write().await.insert(id.clone(), blob);
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, SnapshotStoreError> {
        self.blobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SnapshotStoreError::NotFound(id.clone()))
    }
}

/// Snapshot store backed by a directory of `<content id>.json` files.
pub struct DirectorySnapshotStore {
    dir: PathBuf,
}

impl DirectorySnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, id: &ContentId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl SnapshotStore for DirectorySnapshotStore {
    async fn put(&self, blob: Vec<u8>) -> Result<ContentId, SnapshotStoreError> {
        let id = ContentId::of(&blob);
        let path = self.path(&id);
        if tokio::fs::try_exists(&path).await? {
            return Ok(id);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &blob).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(id = %id, bytes = blob.len(), "stored snapshot");
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, SnapshotStoreError> {
        let blob = match tokio::fs::read(self.path(id)).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SnapshotStoreError::NotFound(id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        if ContentId::of(&blob) != *id {
            return Err(SnapshotStoreError::DigestMismatch { id: id.clone() });
        }
        Ok(blob)
    }
}

/// Multi-gateway snapshot store.
///
/// Writes must reach the primary gateway; mirrors are written best-effort.
/// Reads try every gateway in order, each bounded by `timeout`, and fail only
/// when all of them do. A blob whose digest does not match the requested id
/// counts as a failed gateway.
pub struct GatewaySnapshotStore {
    gateways: Vec<Arc<dyn SnapshotStore>>,
    timeout: Duration,
}

impl GatewaySnapshotStore {
    pub fn new(
        primary: Arc<dyn SnapshotStore>,
        mirrors: Vec<Arc<dyn SnapshotStore>>,
        timeout: Duration,
    ) -> Self {
        let mut gateways = Vec::with_capacity(mirrors.len() + 1);
        gateways.push(primary);
        gateways.extend(mirrors);
        Self { gateways, timeout }
    }

    pub fn gateway_count(&self) -> usize {
        self.gateways.len()
    }
}

#[async_trait]
impl SnapshotStore for GatewaySnapshotStore {
    async fn put(&self, blob: Vec<u8>) -> Result<ContentId, SnapshotStoreError> {
        let id = tokio::time::timeout(self.timeout, self.gateways[0].put(blob.clone()))
            .await
            .map_err(|_| SnapshotStoreError::Timeout(self.timeout))??;

        for (i, mirror) in self.gateways.iter().enumerate().skip(1) {
            match tokio::time::timeout(self.timeout, mirror.put(blob.clone())).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(gateway = i, id = %id, error = %e, "snapshot mirror write failed"),
                Err(_) => warn!(gateway = i, id = %id, "snapshot mirror write timed out"),
            }
        }
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, SnapshotStoreError> {
        let mut last = String::new();
        for (i, gateway) in self.gateways.iter().enumerate() {
            match tokio::time::timeout(self.timeout, gateway.get(id)).await {
                Ok(Ok(blob)) if ContentId::of(&blob) == *id => return Ok(blob),
                Ok(Ok(_)) => {
                    warn!(gateway = i, id = %id, "snapshot gateway returned a blob with the wrong digest");
                    last = SnapshotStoreError::DigestMismatch { id: id.clone() }.to_string();
                }
                Ok(Err(e)) => {
                    warn!(gateway = i, id = %id, error = %e, "snapshot gateway failed");
                    last = e.to_string();
                }
                Err(_) => {
                    warn!(gateway = i, id = %id, "snapshot gateway timed out");
                    last = SnapshotStoreError::Timeout(self.timeout).to_string();
                }
            }
        }
        Err(SnapshotStoreError::Unavailable {
            id: id.clone(),
            attempts: self.gateways.len(),
            last,
        })
    }
}
