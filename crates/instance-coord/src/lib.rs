//! Coordination of cooperating local assistant instances
//!
//! Each process publishes an [`InstanceRecord`] through a [`StatusStore`]
//! and reads its peers' records to report advisory health. Instance 0 is the
//! master for the lifetime of the cluster; there is no election. When the
//! master shuts down it publishes the request, and workers follow.

mod coordinator;
mod error;
mod record;
mod store;

pub use coordinator::{
    assess_peers, ClusterStatus, CoordinatorConfig, HeartbeatHandle, InstanceCoordinator,
    PeerStatus,
};
pub use error::{CoordError, Result};
pub use record::{now_millis, Health, InstanceRecord, Role};
pub use store::{FileStatusStore, MemoryStatusStore, StatusStore};
