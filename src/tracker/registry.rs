//! Volume Registry
//!
//! Process-wide registry holding one attachment tree per volume plus a
//! secondary index from host to the peers registered under it.
//!
//! Each tree sits behind its own lock. The volume map and the host index are
//! sharded maps, so a host bucket is guarded by its shard lock. Locks are
//! always taken tree first, host index second.

use super::events::TopologyEvent;
use super::node::{PeerAttributes, PeerDetail, PeerId, PeerIdentity, PeerNode, PeerStatus};
use super::tree::VolumeTree;
use crate::domain::ports::{ParentsResponse, TopologyExecutor, VolumeSummary};
use crate::error::{Error, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Default capacity of the topology event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Shared handle to one volume's tree
pub type SharedTree = Arc<RwLock<VolumeTree>>;

/// Host index entry. Peer IDs are only unique within a volume.
pub type HostEntry = (String, PeerId);

// =============================================================================
// Registry Statistics
// =============================================================================

/// Counters across all volumes
#[derive(Debug, Default)]
pub struct RegistryStats {
    pub volumes: AtomicU64,
    pub peers: AtomicU64,
    pub attachments: AtomicU64,
    pub detachments: AtomicU64,
    pub pruned: AtomicU64,
    pub confirmations: AtomicU64,
}

impl RegistryStats {
    fn snapshot(&self, hosts: u64) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            volumes: self.volumes.load(Ordering::Relaxed),
            peers: self.peers.load(Ordering::Relaxed),
            hosts,
            attachments: self.attachments.load(Ordering::Relaxed),
            detachments: self.detachments.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
            confirmations: self.confirmations.load(Ordering::Relaxed),
        }
    }

    fn record_removed(&self, count: u64) {
        self.peers.fetch_sub(count, Ordering::Relaxed);
    }
}

/// Snapshot of registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStatsSnapshot {
    pub volumes: u64,
    pub peers: u64,
    pub hosts: u64,
    pub attachments: u64,
    pub detachments: u64,
    pub pruned: u64,
    pub confirmations: u64,
}

// =============================================================================
// Volume Registry
// =============================================================================

/// Registry of per-volume attachment trees
pub struct VolumeRegistry {
    /// Trees by volume ID, created on first reference
    volumes: DashMap<String, SharedTree>,
    /// host -> {(volume_id, peer_id)}
    hosts: DashMap<String, BTreeSet<HostEntry>>,
    stats: RegistryStats,
    event_sender: broadcast::Sender<TopologyEvent>,
}

impl std::fmt::Debug for VolumeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeRegistry")
            .field("volumes", &self.volumes.len())
            .field("hosts", &self.hosts.len())
            .finish()
    }
}

impl Default for VolumeRegistry {
    fn default() -> Self {
        let (event_sender, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            volumes: DashMap::new(),
            hosts: DashMap::new(),
            stats: RegistryStats::default(),
            event_sender,
        }
    }
}

impl VolumeRegistry {
    /// Create a new registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a registry with a custom event channel capacity
    pub fn with_event_capacity(capacity: usize) -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            event_sender,
            ..Self::default()
        })
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        self.event_sender.subscribe()
    }

    /// Get the tree of a volume if it is tracked
    pub fn tree(&self, volume_id: &str) -> Option<SharedTree> {
        self.volumes.get(volume_id).map(|entry| entry.value().clone())
    }

    fn tree_or_create(&self, volume_id: &str) -> SharedTree {
        if let Some(tree) = self.tree(volume_id) {
            return tree;
        }

        let mut created = false;
        let tree = self
            .volumes
            .entry(volume_id.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(RwLock::new(VolumeTree::new(volume_id)))
            })
            .value()
            .clone();

        if created {
            self.stats.volumes.fetch_add(1, Ordering::Relaxed);
            info!(volume_id, "Tracking new volume");
            self.emit(TopologyEvent::VolumeCreated {
                volume_id: volume_id.to_string(),
            });
        }

        tree
    }

    fn emit(&self, event: TopologyEvent) {
        let _ = self.event_sender.send(event);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Brief summary of every tracked volume, sorted by ID
    pub fn list_volumes(&self) -> Vec<VolumeSummary> {
        let mut volumes: Vec<VolumeSummary> = self
            .volumes
            .iter()
            .map(|entry| VolumeSummary {
                id: entry.key().clone(),
                count: entry.value().read().count(),
            })
            .collect();
        volumes.sort_by(|a, b| a.id.cmp(&b.id));
        volumes
    }

    /// Details of every peer of a volume in level order
    pub fn volume_detail(&self, volume_id: &str) -> Vec<PeerDetail> {
        let Some(tree) = self.tree(volume_id) else {
            return Vec::new();
        };
        let tree = tree.read();
        tree.level_order()
            .into_iter()
            .flatten()
            .filter_map(|peer_id| tree.get(&peer_id).map(PeerNode::detail))
            .collect()
    }

    /// Current parents of every peer registered under a host
    pub fn status_for_host(&self, host: &str) -> Vec<ParentsResponse> {
        // Copy the bucket out so no host lock is held while trees are locked
        let entries: Vec<HostEntry> = match self.hosts.get(host) {
            Some(bucket) => bucket.iter().cloned().collect(),
            None => return Vec::new(),
        };

        let mut status = Vec::with_capacity(entries.len());
        for (volume_id, peer_id) in entries {
            let Some(tree) = self.tree(&volume_id) else {
                warn!(host, %peer_id, %volume_id, "Host index refers to an unknown volume");
                continue;
            };
            let tree = tree.read();
            let Some(idx) = tree.idx_of(&peer_id) else {
                warn!(host, %peer_id, %volume_id, "Host index refers to a departed peer");
                continue;
            };
            let parents = match tree.parent(idx) {
                Some(parent) if !parent.fake_root => vec![parent.identity()],
                _ => Vec::new(),
            };
            status.push(ParentsResponse { peer_id, parents });
        }

        status
    }

    /// Get statistics
    pub fn stats(&self) -> RegistryStatsSnapshot {
        self.stats.snapshot(self.hosts.len() as u64)
    }

    // =========================================================================
    // Topology Operations
    // =========================================================================

    /// Confirm a peer on a tracked volume, creating it if needed
    pub fn add_metadata(
        &self,
        volume_id: &str,
        peer_id: Option<&str>,
        mut attrs: PeerAttributes,
    ) -> Result<PeerIdentity> {
        debug!(
            volume_id,
            host = ?attrs.host,
            port = ?attrs.port,
            iqn = ?attrs.iqn,
            lun = ?attrs.lun,
            "Adding volume metadata"
        );

        let tree = self
            .tree(volume_id)
            .ok_or_else(|| Error::not_found("volume", volume_id))?;
        let peer_id = peer_id.filter(|id| !id.is_empty()).map(PeerId::from);
        attrs.status = Some(PeerStatus::Ok);

        let mut tree = tree.write();
        let previous_host = peer_id
            .as_ref()
            .and_then(|id| tree.get(id))
            .and_then(|node| node.host.clone());

        let upserted = tree.update_nodes(peer_id, attrs)?;
        let identity = upserted.identity;

        self.reindex_host(
            previous_host.as_deref(),
            identity.host.as_deref(),
            volume_id,
            &identity.peer_id,
        );

        self.stats.confirmations.fetch_add(1, Ordering::Relaxed);
        if upserted.created {
            self.stats.peers.fetch_add(1, Ordering::Relaxed);
            self.stats.attachments.fetch_add(1, Ordering::Relaxed);
            self.emit(attached_event(&tree, &identity.peer_id)?);
        } else {
            self.emit(TopologyEvent::PeerConfirmed {
                volume_id: volume_id.to_string(),
                peer_id: identity.peer_id.to_string(),
            });
        }

        Ok(identity)
    }

    /// Remove a peer from a volume
    pub fn delete_metadata(&self, volume_id: &str, peer_id: &str) -> Result<()> {
        if peer_id.is_empty() {
            return Err(Error::invalid("peer_id", "peer_id must not be empty"));
        }

        let tree = self
            .tree(volume_id)
            .ok_or_else(|| Error::not_found("volume", volume_id))?;
        let peer_id = PeerId::from(peer_id);

        let mut tree = tree.write();
        let host = tree
            .get(&peer_id)
            .ok_or_else(|| Error::not_found("peer", peer_id.as_str()))?
            .host
            .clone();

        if let Some(host) = host.as_deref() {
            if let Err(e) = self.remove_host_index(host, volume_id, &peer_id) {
                debug!(volume_id, %peer_id, "No host index entry to remove: {}", e);
            }
        }

        let removal = tree
            .remove_by_peer_id(&peer_id)
            .map_err(|e| e.into_not_found("peer", peer_id.as_str()))?;

        for node in &removal.pruned {
            if let Some(host) = node.host.as_deref() {
                let _ = self.remove_host_index(host, volume_id, &node.peer_id);
            }
        }

        let removed = 1 + removal.pruned.len() as u64;
        self.stats.record_removed(removed);
        self.stats.detachments.fetch_add(1, Ordering::Relaxed);
        self.stats
            .pruned
            .fetch_add(removal.pruned.len() as u64, Ordering::Relaxed);

        info!(volume_id, %peer_id, pruned = removal.pruned.len(), "Removed peer");

        if !removal.pruned.is_empty() {
            self.emit(TopologyEvent::SubtreePruned {
                volume_id: volume_id.to_string(),
                root_peer_id: peer_id.to_string(),
                pruned: removal.pruned.iter().map(|n| n.peer_id.to_string()).collect(),
            });
        }
        self.emit(TopologyEvent::PeerDetached {
            volume_id: volume_id.to_string(),
            peer_id: peer_id.to_string(),
        });

        Ok(())
    }

    /// Resolve where a peer should attach.
    ///
    /// With only a host, a new pending peer is registered under that host.
    pub fn get_parents(
        &self,
        volume_id: &str,
        peer_id: Option<&str>,
        host: Option<&str>,
    ) -> Result<ParentsResponse> {
        let peer_id = peer_id.filter(|id| !id.is_empty());
        let host = host.filter(|h| !h.is_empty());

        if peer_id.is_none() && host.is_none() {
            return Err(Error::invalid("peer_id", "peer_id or host must be given"));
        }
        if volume_id.is_empty() {
            return Err(Error::invalid("volume_id", "volume_id must not be empty"));
        }

        let tree = self.tree_or_create(volume_id);

        match (peer_id, host) {
            (Some(peer_id), _) => {
                let peer_id = PeerId::from(peer_id);
                let tree = tree.read();
                let parents = upstream_of(&tree, &peer_id)?;
                Ok(ParentsResponse { peer_id, parents })
            }
            (None, Some(host)) => {
                let peer_id = PeerId::generate();
                debug!(volume_id, host, %peer_id, "Registering pending peer");

                let node = PeerNode::with_attributes(
                    peer_id.clone(),
                    PeerAttributes::default()
                        .with_host(host)
                        .with_status(PeerStatus::Pending),
                );

                let mut tree = tree.write();
                tree.insert_by_node(node)?;
                self.add_host_index(host, volume_id, &peer_id)?;

                let parents = upstream_of(&tree, &peer_id)?;

                self.stats.peers.fetch_add(1, Ordering::Relaxed);
                self.stats.attachments.fetch_add(1, Ordering::Relaxed);
                self.emit(attached_event(&tree, &peer_id)?);

                Ok(ParentsResponse { peer_id, parents })
            }
            (None, None) => Err(Error::invalid("peer_id", "peer_id or host must be given")),
        }
    }

    // =========================================================================
    // Host Index
    // =========================================================================

    /// Record that a peer of a volume lives on a host
    pub fn add_host_index(&self, host: &str, volume_id: &str, peer_id: &PeerId) -> Result<()> {
        let mut bucket = self.hosts.entry(host.to_string()).or_default();
        if !bucket.insert((volume_id.to_string(), peer_id.clone())) {
            return Err(Error::duplicate(format!(
                "{}/{} on host {}",
                volume_id, peer_id, host
            )));
        }
        Ok(())
    }

    /// Forget a peer's host index entry
    pub fn remove_host_index(&self, host: &str, volume_id: &str, peer_id: &PeerId) -> Result<()> {
        let entry = (volume_id.to_string(), peer_id.clone());
        let removed = self
            .hosts
            .get_mut(host)
            .map(|mut bucket| bucket.remove(&entry))
            .unwrap_or(false);

        if !removed {
            return Err(Error::not_found(
                "host index entry",
                format!("{}/{}/{}", host, volume_id, peer_id),
            ));
        }

        self.hosts.remove_if(host, |_, bucket| bucket.is_empty());
        Ok(())
    }

    /// Keep a peer indexed under its current host
    fn reindex_host(
        &self,
        previous: Option<&str>,
        current: Option<&str>,
        volume_id: &str,
        peer_id: &PeerId,
    ) {
        if let Some(previous) = previous {
            if Some(previous) != current {
                let _ = self.remove_host_index(previous, volume_id, peer_id);
            }
        }
        if let Some(current) = current {
            self.hosts
                .entry(current.to_string())
                .or_default()
                .insert((volume_id.to_string(), peer_id.clone()));
        }
    }
}

fn attached_event(tree: &VolumeTree, peer_id: &PeerId) -> Result<TopologyEvent> {
    let attached_at = tree
        .get(peer_id)
        .ok_or_else(|| Error::not_found("peer", peer_id.as_str()))?
        .attached_at;
    let parent = upstream_of(tree, peer_id)?
        .first()
        .map(|p| p.peer_id.to_string());

    Ok(TopologyEvent::PeerAttached {
        volume_id: tree.volume_id().to_string(),
        peer_id: peer_id.to_string(),
        parent,
        attached_at,
    })
}

/// Parents a peer should attach through: empty when its parent is the root
/// of the tree or it is the root itself
fn upstream_of(tree: &VolumeTree, peer_id: &PeerId) -> Result<Vec<PeerIdentity>> {
    let idx = tree
        .idx_of(peer_id)
        .ok_or_else(|| Error::not_found("peer", peer_id.as_str()))?;

    Ok(match tree[idx].parent {
        Some(parent) if Some(parent) != tree.root_idx() => vec![tree[parent].identity()],
        _ => Vec::new(),
    })
}

impl TopologyExecutor for VolumeRegistry {
    fn name(&self) -> &'static str {
        "btree"
    }

    fn list_volumes(&self) -> Vec<VolumeSummary> {
        VolumeRegistry::list_volumes(self)
    }

    fn volume_detail(&self, volume_id: &str) -> Vec<PeerDetail> {
        VolumeRegistry::volume_detail(self, volume_id)
    }

    fn add_metadata(
        &self,
        volume_id: &str,
        peer_id: Option<&str>,
        attrs: PeerAttributes,
    ) -> Result<PeerIdentity> {
        VolumeRegistry::add_metadata(self, volume_id, peer_id, attrs)
    }

    fn delete_metadata(&self, volume_id: &str, peer_id: &str) -> Result<()> {
        VolumeRegistry::delete_metadata(self, volume_id, peer_id)
    }

    fn get_parents(
        &self,
        volume_id: &str,
        peer_id: Option<&str>,
        host: Option<&str>,
    ) -> Result<ParentsResponse> {
        VolumeRegistry::get_parents(self, volume_id, peer_id, host)
    }

    fn status_for_host(&self, host: &str) -> Vec<ParentsResponse> {
        VolumeRegistry::status_for_host(self, host)
    }

    fn stats(&self) -> RegistryStatsSnapshot {
        VolumeRegistry::stats(self)
    }

    fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        VolumeRegistry::subscribe(self)
    }
}
