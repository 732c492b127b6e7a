//! Volume Tree
//!
//! Bounded fan-out binary tree recording which peer attaches through which
//! for a single volume. Nodes live in an arena and link to each other by
//! [`NodeIdx`]; the `peer_id -> NodeIdx` map is a lookup index only.

use super::node::{NodeIdx, PeerAttributes, PeerId, PeerIdentity, PeerNode};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

// =============================================================================
// Operation Results
// =============================================================================

/// Outcome of removing a node
#[derive(Debug, Clone)]
pub struct Removal {
    /// The node that was asked to be removed
    pub removed: PeerNode,
    /// Descendants torn down along with a pending node
    pub pruned: Vec<PeerNode>,
}

/// Outcome of an upsert
#[derive(Debug, Clone)]
pub struct Upserted {
    pub identity: PeerIdentity,
    /// True if the peer did not exist before
    pub created: bool,
    /// Descendants dropped because the peer is now pending
    pub pruned: Vec<PeerNode>,
}

// =============================================================================
// Volume Tree
// =============================================================================

/// Attachment tree for one volume
#[derive(Debug)]
pub struct VolumeTree {
    volume_id: String,
    root: Option<NodeIdx>,
    slots: Vec<Option<PeerNode>>,
    free: Vec<usize>,
    nodes: HashMap<PeerId, NodeIdx>,
}

impl VolumeTree {
    /// Create a tree anchored on a sentinel root
    pub fn new(volume_id: impl Into<String>) -> Self {
        let mut tree = Self::empty(volume_id);
        let sentinel = tree.alloc(PeerNode::sentinel());
        tree.root = Some(sentinel);
        tree
    }

    /// Create a tree with no root; the first inserted peer becomes the root
    pub fn empty(volume_id: impl Into<String>) -> Self {
        Self {
            volume_id: volume_id.into(),
            root: None,
            slots: Vec::new(),
            free: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    /// Create a tree rooted on a real peer
    pub fn with_root(volume_id: impl Into<String>, mut root: PeerNode) -> Self {
        let mut tree = Self::empty(volume_id);
        root.parent = None;
        root.left = None;
        root.right = None;
        root.fake_root = false;
        let peer_id = root.peer_id.clone();
        let idx = tree.alloc(root);
        tree.root = Some(idx);
        tree.nodes.insert(peer_id, idx);
        tree
    }

    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    /// Number of real peers in the tree
    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.nodes.contains_key(peer_id)
    }

    pub fn root(&self) -> Option<&PeerNode> {
        self.root.and_then(|idx| self.node(idx))
    }

    pub fn root_idx(&self) -> Option<NodeIdx> {
        self.root
    }

    pub fn node(&self, idx: NodeIdx) -> Option<&PeerNode> {
        self.slots.get(idx.0).and_then(Option::as_ref)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerNode> {
        self.nodes.get(peer_id).and_then(|&idx| self.node(idx))
    }

    pub fn idx_of(&self, peer_id: &PeerId) -> Option<NodeIdx> {
        self.nodes.get(peer_id).copied()
    }

    pub fn parent(&self, idx: NodeIdx) -> Option<&PeerNode> {
        self.node(idx)
            .and_then(|node| node.parent)
            .and_then(|parent| self.node(parent))
    }

    pub fn left(&self, idx: NodeIdx) -> Option<&PeerNode> {
        self.node(idx)
            .and_then(|node| node.left)
            .and_then(|left| self.node(left))
    }

    pub fn right(&self, idx: NodeIdx) -> Option<&PeerNode> {
        self.node(idx)
            .and_then(|node| node.right)
            .and_then(|right| self.node(right))
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Breadth-first search for the shallowest, leftmost node a new peer can
    /// attach to.
    ///
    /// Prefers nodes that are [`available`](PeerNode::available). When every
    /// node with a free slot is unconfirmed, falls back to the first of those
    /// in level order. Returns `None` only when the tree has no root.
    pub fn find_available_slot(&self) -> Option<NodeIdx> {
        let root = self.root?;
        let mut queue = VecDeque::from([root]);
        let mut fallback = None;

        while let Some(idx) = queue.pop_front() {
            let node = &self[idx];
            if node.available() {
                return Some(idx);
            }
            if fallback.is_none() && node.has_free_slot() {
                fallback = Some(idx);
            }
            queue.extend(node.left);
            queue.extend(node.right);
        }

        fallback
    }

    /// Parent of a peer. `None` means the peer is the root.
    pub fn get_node_parent(&self, peer_id: &PeerId) -> Result<Option<&PeerNode>> {
        let idx = self
            .idx_of(peer_id)
            .ok_or_else(|| Error::not_found("peer", peer_id.as_str()))?;
        Ok(self.parent(idx))
    }

    /// Real peers grouped by depth, left to right
    pub fn level_order(&self) -> Vec<Vec<PeerId>> {
        let mut levels = Vec::new();
        let mut current: Vec<NodeIdx> = self.root.into_iter().collect();

        while !current.is_empty() {
            let mut next = Vec::with_capacity(current.len() * 2);
            let mut level = Vec::with_capacity(current.len());
            for idx in current {
                let node = &self[idx];
                if !node.fake_root {
                    level.push(node.peer_id.clone());
                }
                next.extend(node.left);
                next.extend(node.right);
            }
            if !level.is_empty() {
                levels.push(level);
            }
            current = next;
        }

        levels
    }

    /// Identities of all real peers in level order
    pub fn peers(&self) -> Vec<PeerIdentity> {
        self.level_order()
            .into_iter()
            .flatten()
            .filter_map(|peer_id| self.get(&peer_id).map(PeerNode::identity))
            .collect()
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Attach a detached node at the first available slot
    pub fn insert_by_node(&mut self, mut node: PeerNode) -> Result<NodeIdx> {
        if node.fake_root {
            return Err(Error::invalid("new_node", "a sentinel root cannot be inserted"));
        }
        if self.nodes.contains_key(&node.peer_id) {
            return Err(Error::invalid(
                "new_node",
                format!("peer {} already exists in volume {}", node.peer_id, self.volume_id),
            ));
        }
        if node.has_parent() {
            return Err(Error::invalid(
                "new_node",
                format!("peer {} already has a parent", node.peer_id),
            ));
        }

        let slot = self.find_available_slot();
        node.left = None;
        node.right = None;
        node.parent = slot;
        node.attached_at = chrono::Utc::now();

        let peer_id = node.peer_id.clone();
        let idx = self.alloc(node);
        match slot {
            Some(parent) => self.link_child(parent, idx),
            None => self.root = Some(idx),
        }
        self.nodes.insert(peer_id, idx);

        debug!(
            volume_id = %self.volume_id,
            peer_id = %self[idx].peer_id,
            parent = ?slot.map(|p| self[p].peer_id.to_string()),
            "Attached peer"
        );

        Ok(idx)
    }

    /// Attach a bare peer by ID
    pub fn insert_by_peer_id(&mut self, peer_id: impl Into<PeerId>) -> Result<NodeIdx> {
        let peer_id = peer_id.into();
        if self.nodes.contains_key(&peer_id) {
            return Err(Error::duplicate(peer_id.to_string()));
        }
        self.insert_by_node(PeerNode::new(peer_id))
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Remove a node, reattaching its children in its place.
    ///
    /// A pending node takes its whole subtree with it.
    pub fn remove_by_node(&mut self, target: NodeIdx) -> Result<Removal> {
        let node = self
            .node(target)
            .ok_or_else(|| Error::invalid("node", "the node to be removed is not in the tree"))?;
        if node.fake_root {
            return Err(Error::invalid("node", "the sentinel root cannot be removed"));
        }

        let pruned = if node.is_pending() && node.has_children() {
            self.prune_subtrees(target)
        } else {
            Vec::new()
        };

        let (parent, left, right) = {
            let node = &self[target];
            (node.parent, node.left, node.right)
        };

        let up = match (left, right) {
            (Some(left), Some(right)) => {
                let graft = self.spine_graft_point(left);
                self.link_child(graft, right);
                Some(left)
            }
            (Some(left), None) => Some(left),
            (None, Some(right)) => Some(right),
            (None, None) => None,
        };

        if let Some(up) = up {
            self[up].parent = parent;
        }
        if let Some(parent) = parent {
            let parent = &mut self[parent];
            if parent.left == Some(target) {
                parent.left = up;
            } else {
                parent.right = up;
            }
        }
        if self.root == Some(target) {
            self.root = up;
        }

        let removed = self.release(target);
        debug!(
            volume_id = %self.volume_id,
            peer_id = %removed.peer_id,
            pruned = pruned.len(),
            "Detached peer"
        );

        Ok(Removal { removed, pruned })
    }

    /// Remove a peer by ID
    pub fn remove_by_peer_id(&mut self, peer_id: &PeerId) -> Result<Removal> {
        let idx = self
            .idx_of(peer_id)
            .ok_or_else(|| Error::not_found("peer", peer_id.as_str()))?;
        self.remove_by_node(idx)
    }

    // =========================================================================
    // Upsert
    // =========================================================================

    /// Create or update a peer.
    ///
    /// A peer left in `pending` status loses all of its descendants.
    pub fn update_nodes(&mut self, peer_id: Option<PeerId>, attrs: PeerAttributes) -> Result<Upserted> {
        let peer_id = peer_id.unwrap_or_else(PeerId::generate);

        let (idx, created) = match self.idx_of(&peer_id) {
            Some(idx) => {
                self[idx].apply(attrs);
                (idx, false)
            }
            None => {
                debug!(volume_id = %self.volume_id, peer_id = %peer_id, "Creating peer on update");
                let idx = self.insert_by_node(PeerNode::with_attributes(peer_id, attrs))?;
                (idx, true)
            }
        };

        let pruned = if self[idx].is_pending() && self[idx].has_children() {
            self.prune_subtrees(idx)
        } else {
            Vec::new()
        };

        Ok(Upserted {
            identity: self[idx].identity(),
            created,
            pruned,
        })
    }

    // =========================================================================
    // Invariants
    // =========================================================================

    /// Check structural invariants, describing the first violation found
    pub fn validate(&self) -> Result<()> {
        let violation = |msg: String| Err(Error::Internal(format!("volume {}: {}", self.volume_id, msg)));

        let mut reachable = HashSet::new();
        let mut real = 0usize;

        if let Some(root) = self.root {
            let Some(node) = self.node(root) else {
                return violation("root index is dangling".into());
            };
            if node.parent.is_some() {
                return violation(format!("root {} has a parent", node.peer_id));
            }

            let mut queue = VecDeque::from([root]);
            while let Some(idx) = queue.pop_front() {
                if !reachable.insert(idx) {
                    return violation(format!("node slot {} reached twice", idx.0));
                }
                let node = &self[idx];
                if node.fake_root {
                    if Some(idx) != self.root {
                        return violation("sentinel below the root".into());
                    }
                } else {
                    real += 1;
                    if self.nodes.get(&node.peer_id) != Some(&idx) {
                        return violation(format!("peer {} missing from index", node.peer_id));
                    }
                }
                for child in [node.left, node.right].into_iter().flatten() {
                    match self.node(child) {
                        Some(c) if c.parent == Some(idx) => queue.push_back(child),
                        Some(c) => {
                            return violation(format!(
                                "peer {} does not point back to parent {}",
                                c.peer_id, node.peer_id
                            ))
                        }
                        None => return violation(format!("peer {} has a dangling child", node.peer_id)),
                    }
                }
            }
        }

        if real != self.nodes.len() {
            return violation(format!(
                "{} peers reachable but {} indexed",
                real,
                self.nodes.len()
            ));
        }
        let live = self.slots.iter().filter(|slot| slot.is_some()).count();
        if live != reachable.len() {
            return violation(format!("{} live slots but {} reachable", live, reachable.len()));
        }

        Ok(())
    }

    // =========================================================================
    // Arena Internals
    // =========================================================================

    fn alloc(&mut self, node: PeerNode) -> NodeIdx {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                NodeIdx(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeIdx(self.slots.len() - 1)
            }
        }
    }

    /// Free a slot and drop its index entry. Links of the returned node are
    /// cleared since they no longer refer to anything.
    fn release(&mut self, idx: NodeIdx) -> PeerNode {
        let mut node = self.slots[idx.0]
            .take()
            .unwrap_or_else(|| panic!("released an empty node slot {}", idx.0));
        self.free.push(idx.0);
        if self.nodes.get(&node.peer_id) == Some(&idx) {
            self.nodes.remove(&node.peer_id);
        }
        node.parent = None;
        node.left = None;
        node.right = None;
        node
    }

    fn link_child(&mut self, parent: NodeIdx, child: NodeIdx) {
        self[child].parent = Some(parent);
        let parent = &mut self[parent];
        if parent.left.is_none() {
            parent.left = Some(child);
        } else {
            parent.right = Some(child);
        }
    }

    /// Walk the left-child chain from `start` to the first available node.
    /// If the chain ends first, its last node has an empty left slot.
    fn spine_graft_point(&self, start: NodeIdx) -> NodeIdx {
        let mut current = start;
        loop {
            let node = &self[current];
            if node.available() {
                return current;
            }
            match node.left {
                Some(next) => current = next,
                None => return current,
            }
        }
    }

    /// Detach and free every descendant of `idx`
    fn prune_subtrees(&mut self, idx: NodeIdx) -> Vec<PeerNode> {
        let (left, right) = {
            let node = &mut self[idx];
            (node.left.take(), node.right.take())
        };

        let mut stack: Vec<NodeIdx> = left.into_iter().chain(right).collect();
        let mut pruned = Vec::new();
        while let Some(child) = stack.pop() {
            let node = &self[child];
            stack.extend(node.left);
            stack.extend(node.right);
            pruned.push(self.release(child));
        }

        if !pruned.is_empty() {
            debug!(
                volume_id = %self.volume_id,
                peer_id = %self[idx].peer_id,
                pruned = pruned.len(),
                "Pruned descendants of pending peer"
            );
        }

        pruned
    }
}

/// Panics if `idx` does not refer to a live node
impl std::ops::Index<NodeIdx> for VolumeTree {
    type Output = PeerNode;

    fn index(&self, idx: NodeIdx) -> &PeerNode {
        self.slots[idx.0]
            .as_ref()
            .unwrap_or_else(|| panic!("dangling node index {}", idx.0))
    }
}

impl std::ops::IndexMut<NodeIdx> for VolumeTree {
    fn index_mut(&mut self, idx: NodeIdx) -> &mut PeerNode {
        self.slots[idx.0]
            .as_mut()
            .unwrap_or_else(|| panic!("dangling node index {}", idx.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::node::PeerStatus;
    use assert_matches::assert_matches;

    fn ok_peer(peer_id: &str, host: &str) -> PeerNode {
        PeerNode::with_attributes(
            peer_id,
            PeerAttributes::default()
                .with_host(host)
                .with_port(3260)
                .with_status(PeerStatus::Ok),
        )
    }

    fn pending_peer(peer_id: &str) -> PeerNode {
        PeerNode::with_attributes(
            peer_id,
            PeerAttributes::default().with_status(PeerStatus::Pending),
        )
    }

    fn name(node: Option<&PeerNode>) -> Option<String> {
        node.map(|n| n.peer_id.to_string())
    }

    /// root(n1(n3, -), n2)
    fn build_tree() -> VolumeTree {
        let mut tree = VolumeTree::with_root("vol-1", ok_peer("root", "root.local"));
        tree.insert_by_node(ok_peer("n1", "localhost")).unwrap();
        tree.insert_by_node(ok_peer("n2", "foo")).unwrap();
        tree.insert_by_node(ok_peer("n3", "bar")).unwrap();
        tree
    }

    #[test]
    fn test_find_available_slot() {
        let tree = build_tree();
        let slot = tree.find_available_slot().unwrap();
        assert_eq!(tree[slot].peer_id.as_str(), "n1");
    }

    #[test]
    fn test_insert_by_node() {
        let mut tree = build_tree();
        let idx = tree.insert_by_node(ok_peer("n4", "www.wtf.org")).unwrap();

        assert_eq!(tree.count(), 5);
        let n1 = tree.idx_of(&"n1".into()).unwrap();
        assert_eq!(name(tree.right(n1)), Some("n4".into()));
        assert_eq!(name(tree.parent(idx)), Some("n1".into()));
        tree.validate().unwrap();
    }

    #[test]
    fn test_insert_rejects_existing_or_attached_nodes() {
        let mut tree = build_tree();

        let err = tree.insert_by_node(ok_peer("n1", "localhost")).unwrap_err();
        assert_matches!(err, Error::InvalidParameter { .. });

        let mut attached = ok_peer("n9", "baz");
        attached.parent = Some(NodeIdx(0));
        let err = tree.insert_by_node(attached).unwrap_err();
        assert_matches!(err, Error::InvalidParameter { .. });

        assert_eq!(tree.count(), 4);
    }

    #[test]
    fn test_insert_by_peer_id() {
        let mut tree = build_tree();
        tree.insert_by_peer_id("n4").unwrap();
        assert_eq!(tree.count(), 5);

        let err = tree.insert_by_peer_id("n4").unwrap_err();
        assert_matches!(err, Error::DuplicateItem { .. });
    }

    #[test]
    fn test_remove_by_peer_id() {
        let mut tree = build_tree();
        let removal = tree.remove_by_peer_id(&"n1".into()).unwrap();

        assert_eq!(removal.removed.peer_id.as_str(), "n1");
        assert!(removal.pruned.is_empty());
        assert_eq!(tree.count(), 3);

        let root = tree.root_idx().unwrap();
        assert_eq!(name(tree.left(root)), Some("n3".into()));
        assert_eq!(
            name(tree.get_node_parent(&"n3".into()).unwrap()),
            Some("root".into())
        );

        tree.remove_by_peer_id(&"n2".into()).unwrap();
        assert!(tree.right(root).is_none());
        tree.validate().unwrap();
    }

    #[test]
    fn test_remove_unknown_peer() {
        let mut tree = build_tree();
        let err = tree.remove_by_peer_id(&"missing".into()).unwrap_err();
        assert_matches!(err, Error::NotFound { .. });
    }

    #[test]
    fn test_remove_root() {
        let mut tree = build_tree();
        let removal = tree.remove_by_peer_id(&"root".into()).unwrap();

        assert_eq!(removal.removed.peer_id.as_str(), "root");
        assert_eq!(tree.count(), 3);
        assert_eq!(tree.root().unwrap().peer_id.as_str(), "n1");

        let n1 = tree.root_idx().unwrap();
        assert_eq!(name(tree.right(n1)), Some("n2".into()));
        assert_eq!(
            name(tree.get_node_parent(&"n2".into()).unwrap()),
            Some("n1".into())
        );
        tree.validate().unwrap();
    }

    #[test]
    fn test_remove_last_peer_empties_tree() {
        let mut tree = VolumeTree::with_root("vol-1", ok_peer("root", "h"));
        tree.remove_by_peer_id(&"root".into()).unwrap();
        assert!(tree.root().is_none());
        assert_eq!(tree.count(), 0);

        tree.insert_by_node(ok_peer("next", "h")).unwrap();
        assert_eq!(tree.root().unwrap().peer_id.as_str(), "next");
        tree.validate().unwrap();
    }

    #[test]
    fn test_get_node_parent() {
        let tree = build_tree();
        assert_eq!(
            name(tree.get_node_parent(&"n1".into()).unwrap()),
            Some("root".into())
        );
        assert!(tree.get_node_parent(&"root".into()).unwrap().is_none());
        assert_eq!(
            name(tree.get_node_parent(&"n2".into()).unwrap()),
            Some("root".into())
        );
        assert_eq!(
            name(tree.get_node_parent(&"n3".into()).unwrap()),
            Some("n1".into())
        );

        let err = tree.get_node_parent(&"missing".into()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_complete_tree_fill_order() {
        for n in 1..=40usize {
            let mut tree = VolumeTree::empty("vol-1");
            let ids: Vec<PeerId> = (0..n).map(|i| PeerId::new(format!("p{i}"))).collect();
            for id in &ids {
                tree.insert_by_node(ok_peer(id.as_str(), "h")).unwrap();
            }

            let levels = tree.level_order();
            let full_levels = (usize::BITS - 1 - n.leading_zeros()) as usize;
            for (depth, level) in levels.iter().enumerate().take(full_levels) {
                assert_eq!(level.len(), 1 << depth, "level {depth} of {n} not full");
            }
            assert_eq!(levels.len(), full_levels + 1);

            // Level order equals insertion order: no gaps, filled left to right
            let flat: Vec<PeerId> = levels.into_iter().flatten().collect();
            assert_eq!(flat, ids);
            tree.validate().unwrap();
        }
    }

    #[test]
    fn test_sentinel_tree_excludes_sentinel() {
        let mut tree = VolumeTree::new("vol-1");
        assert_eq!(tree.count(), 0);
        assert!(tree.root().unwrap().fake_root);
        assert!(tree.level_order().is_empty());

        tree.insert_by_node(ok_peer("p1", "h1")).unwrap();
        tree.insert_by_node(ok_peer("p2", "h2")).unwrap();
        tree.insert_by_node(ok_peer("p3", "h3")).unwrap();

        assert_eq!(tree.count(), 3);
        assert!(tree.get_node_parent(&"p1".into()).unwrap().unwrap().fake_root);
        assert_eq!(
            name(tree.get_node_parent(&"p3".into()).unwrap()),
            Some("p1".into())
        );

        let sentinel = tree.root_idx().unwrap();
        let err = tree.remove_by_node(sentinel).unwrap_err();
        assert_matches!(err, Error::InvalidParameter { .. });
        tree.validate().unwrap();
    }

    #[test]
    fn test_pending_peers_fall_back_to_first_free_slot() {
        let mut tree = VolumeTree::new("vol-1");
        tree.insert_by_node(pending_peer("p1")).unwrap();
        tree.insert_by_node(pending_peer("p2")).unwrap();

        let slot = tree.find_available_slot().unwrap();
        assert_eq!(tree[slot].peer_id.as_str(), "p1");

        tree.insert_by_node(pending_peer("p3")).unwrap();
        tree.insert_by_node(pending_peer("p4")).unwrap();
        tree.insert_by_node(pending_peer("p5")).unwrap();
        assert_eq!(
            name(tree.get_node_parent(&"p5".into()).unwrap()),
            Some("p2".into())
        );
        tree.validate().unwrap();
    }

    #[test]
    fn test_ok_peer_preferred_over_shallower_pending() {
        let mut tree = VolumeTree::new("vol-1");
        tree.insert_by_node(pending_peer("p1")).unwrap();
        tree.insert_by_node(ok_peer("p2", "h2")).unwrap();

        tree.insert_by_node(ok_peer("p3", "h3")).unwrap();
        assert_eq!(
            name(tree.get_node_parent(&"p3".into()).unwrap()),
            Some("p2".into())
        );
    }

    #[test]
    fn test_removing_pending_peer_cascades() {
        let mut tree = VolumeTree::new("vol-1");
        for id in ["p1", "p2", "p3", "p4", "p5", "p6", "p7"] {
            tree.insert_by_node(pending_peer(id)).unwrap();
        }
        // sentinel(p1(p3(p7, -), p4), p2(p5, p6))
        assert_eq!(tree.count(), 7);

        let removal = tree.remove_by_peer_id(&"p1".into()).unwrap();
        let mut pruned: Vec<String> = removal.pruned.iter().map(|n| n.peer_id.to_string()).collect();
        pruned.sort();

        assert_eq!(pruned, vec!["p3", "p4", "p7"]);
        assert_eq!(tree.count(), 3);
        assert!(!tree.contains(&"p7".into()));
        assert!(tree.get_node_parent(&"p2".into()).unwrap().unwrap().fake_root);
        tree.validate().unwrap();
    }

    #[test]
    fn test_removing_ok_peer_keeps_children() {
        let mut tree = VolumeTree::new("vol-1");
        for id in ["p1", "p2", "p3", "p4"] {
            tree.insert_by_node(ok_peer(id, "h")).unwrap();
        }
        // sentinel(p1(p3, p4), p2)
        tree.remove_by_peer_id(&"p1".into()).unwrap();

        assert_eq!(tree.count(), 3);
        assert!(tree.get_node_parent(&"p3".into()).unwrap().unwrap().fake_root);
        assert_eq!(
            name(tree.get_node_parent(&"p4".into()).unwrap()),
            Some("p3".into())
        );
        tree.validate().unwrap();
    }

    #[test]
    fn test_spine_walk_bottoms_out_on_unavailable_chain() {
        let mut tree = VolumeTree::with_root("vol-1", ok_peer("r", "h"));
        for id in ["a", "b", "c", "d", "e"] {
            tree.insert_by_node(ok_peer(id, "h")).unwrap();
        }
        // r(a(c, d), b(e, -)); make the left spine below r unconfirmed
        let a = tree.idx_of(&"a".into()).unwrap();
        let c = tree.idx_of(&"c".into()).unwrap();
        tree[a].status = Some(PeerStatus::Other("draining".into()));
        tree[c].status = Some(PeerStatus::Other("draining".into()));

        tree.remove_by_peer_id(&"r".into()).unwrap();

        assert_eq!(tree.root().unwrap().peer_id.as_str(), "a");
        assert_eq!(name(tree.left(c)), Some("b".into()));
        assert_eq!(tree.count(), 5);
        tree.validate().unwrap();
    }

    #[test]
    fn test_update_nodes_creates_and_updates() {
        let mut tree = VolumeTree::new("vol-1");
        let created = tree
            .update_nodes(
                Some("p1".into()),
                PeerAttributes::default().with_host("h1").with_status(PeerStatus::Ok),
            )
            .unwrap();
        assert!(created.created);
        assert_eq!(created.identity.host.as_deref(), Some("h1"));

        let updated = tree
            .update_nodes(Some("p1".into()), PeerAttributes::default().with_port(3260))
            .unwrap();
        assert!(!updated.created);
        assert_eq!(updated.identity.host.as_deref(), Some("h1"));
        assert_eq!(updated.identity.port, Some(3260));
        assert_eq!(tree.count(), 1);
    }

    #[test]
    fn test_update_nodes_generates_peer_id() {
        let mut tree = VolumeTree::new("vol-1");
        let upserted = tree.update_nodes(None, PeerAttributes::default()).unwrap();
        assert!(tree.contains(&upserted.identity.peer_id));
    }

    #[test]
    fn test_update_to_pending_prunes_children() {
        let mut tree = VolumeTree::new("vol-1");
        for id in ["p1", "p2", "p3", "p4", "p5"] {
            tree.insert_by_node(ok_peer(id, "h")).unwrap();
        }
        // sentinel(p1(p3, p4), p2(p5, -))
        let upserted = tree
            .update_nodes(
                Some("p1".into()),
                PeerAttributes::default().with_status(PeerStatus::Pending),
            )
            .unwrap();

        assert_eq!(upserted.pruned.len(), 2);
        assert_eq!(tree.count(), 3);
        let p1 = tree.idx_of(&"p1".into()).unwrap();
        assert!(tree.left(p1).is_none());
        assert!(tree.right(p1).is_none());
        tree.validate().unwrap();
    }

    #[test]
    fn test_lookups_do_not_mutate() {
        let tree = build_tree();
        let before = tree.level_order();
        let _ = tree.get_node_parent(&"n3".into());
        let _ = tree.peers();
        assert_eq!(tree.level_order(), before);
    }

    #[test]
    fn test_arena_slots_are_reused() {
        let mut tree = build_tree();
        tree.remove_by_peer_id(&"n2".into()).unwrap();
        tree.insert_by_node(ok_peer("n5", "h")).unwrap();
        assert_eq!(tree.slots.len(), 4);
        tree.validate().unwrap();
    }
}
