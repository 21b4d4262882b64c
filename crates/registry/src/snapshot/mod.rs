//! Content-addressed snapshots of the accumulator and every record.

mod codec;
mod store;


pub use codec::{Snapshot, SnapshotError, SnapshotMetadata, SnapshotTree, SNAPSHOT_VERSION};
pub use store::{
    ContentId, DirectorySnapshotStore, GatewaySnapshotStore, MemorySnapshotStore, SnapshotStore,
    SnapshotStoreError,
};
