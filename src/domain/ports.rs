//! Domain Ports - Core trait definitions for the volume tracker
//!
//! The REST layer talks to the topology core only through
//! [`TopologyExecutor`]. Executors are selected by name at startup.

use crate::error::Result;
use crate::tracker::events::TopologyEvent;
use crate::tracker::node::{PeerAttributes, PeerDetail, PeerId, PeerIdentity};
use crate::tracker::registry::RegistryStatsSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// =============================================================================
// Response Records
// =============================================================================

/// Brief summary of a tracked volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSummary {
    /// Opaque volume identifier
    pub id: String,
    /// Number of peers attached to the volume
    pub count: usize,
}

/// Where a peer should attach: directly (empty `parents`) or through the
/// single listed intermediary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentsResponse {
    pub peer_id: PeerId,
    pub parents: Vec<PeerIdentity>,
}

impl ParentsResponse {
    pub fn is_direct(&self) -> bool {
        self.parents.is_empty()
    }
}

// =============================================================================
// Topology Executor Port
// =============================================================================

/// Trait for attachment topology executors
///
/// Operations never perform I/O, so the trait is synchronous.
pub trait TopologyExecutor: Send + Sync {
    /// Executor name as used in configuration
    fn name(&self) -> &'static str;

    /// Brief summary of every tracked volume
    fn list_volumes(&self) -> Vec<VolumeSummary>;

    /// Peer details of one volume; empty for an unknown volume
    fn volume_detail(&self, volume_id: &str) -> Vec<PeerDetail>;

    /// Confirm a peer and record its connection details
    fn add_metadata(
        &self,
        volume_id: &str,
        peer_id: Option<&str>,
        attrs: PeerAttributes,
    ) -> Result<PeerIdentity>;

    /// Remove a peer from a volume
    fn delete_metadata(&self, volume_id: &str, peer_id: &str) -> Result<()>;

    /// Resolve the parent a peer should attach through, registering a new
    /// pending peer when only a host is given
    fn get_parents(
        &self,
        volume_id: &str,
        peer_id: Option<&str>,
        host: Option<&str>,
    ) -> Result<ParentsResponse>;

    /// Current parents of every peer registered under a host
    fn status_for_host(&self, host: &str) -> Vec<ParentsResponse>;

    /// Snapshot of executor statistics
    fn stats(&self) -> RegistryStatsSnapshot;

    /// Subscribe to topology events
    fn subscribe(&self) -> broadcast::Receiver<TopologyEvent>;
}
