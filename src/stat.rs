//! Per-node bound and pruning state.
//!
//! Every node of a [`SpaceTree`] carries exactly one [`NodeStat`]. On the point
//! tree the dual-tree traversal is its only writer and the reducer only reads it;
//! on the centroid tree only `centroid` is used.

use crate::tree::{NodeId, SpaceTree};
use ndarray::{Array1, ArrayView2};
use std::fmt;

/// Relative slack applied when re-validating a static pruning decision.
///
/// Movement bounds are accumulated in floating point over many iterations; the
/// slack keeps the comparison on the safe side of the rounding error.
pub const STATIC_PRUNE_SLACK: f64 = 1e-10;

/// Bounds and pruning state attached to a single tree node.
#[derive(Debug, Clone)]
pub struct NodeStat {
    /// Upper bound on the distance from any point in the subtree to its nearest centroid.
    pub upper_bound: f64,
    /// Lower bound on the distance from any point in the subtree to any centroid
    /// other than `owner`.
    pub lower_bound: f64,
    /// Cluster that owns every point of the subtree, when known.
    pub owner: Option<usize>,
    /// Number of centroids ruled out for the whole subtree in the current pass.
    pub pruned: usize,
    /// Ownership was settled in an earlier iteration and is still valid.
    pub static_pruned: bool,
    /// Owner movement accumulated since `static_pruned` was set.
    pub static_upper_bound_movement: f64,
    /// Largest non-owner movement accumulated since `static_pruned` was set.
    pub static_lower_bound_movement: f64,
    /// Mean position of all points in the subtree.
    pub centroid: Array1<f64>,
    /// Arena identity of the node's real parent.
    pub true_parent: Option<NodeId>,
    /// Arena identities of the node's real children.
    pub true_children: Vec<NodeId>,
}

impl Default for NodeStat {
    fn default() -> Self {
        Self {
            upper_bound: f64::INFINITY,
            lower_bound: f64::INFINITY,
            owner: None,
            pruned: 0,
            static_pruned: false,
            static_upper_bound_movement: 0.0,
            static_lower_bound_movement: 0.0,
            centroid: Array1::zeros(0),
            true_parent: None,
            true_children: Vec::new(),
        }
    }
}

impl NodeStat {
    /// Build the statistic of a freshly constructed node.
    ///
    /// The centroid is the count-weighted mean of the node's own points and its
    /// children's centroids, so children must be finished before their parent.
    ///
    /// # Panics
    ///
    /// Panics if the node has no descendants.
    pub fn from_node(tree: &SpaceTree, data: &ArrayView2<f64>, id: NodeId) -> Self {
        let node = tree.node(id);
        assert!(node.count() > 0, "node statistic requires at least one descendant");

        let mut centroid = Array1::zeros(data.ncols());
        for &i in tree.owned_points(id) {
            centroid += &data.row(i);
        }
        for &child in node.children() {
            let child = tree.node(child);
            centroid.scaled_add(child.count() as f64, &child.stat.centroid);
        }
        centroid /= node.count() as f64;

        Self {
            centroid,
            true_parent: node.parent(),
            true_children: node.children().to_vec(),
            ..Default::default()
        }
    }

    /// Forget the previous pass's bounds before a fresh traversal.
    pub fn reset(&mut self) {
        self.upper_bound = f64::INFINITY;
        self.lower_bound = f64::INFINITY;
        self.owner = None;
        self.pruned = 0;
    }

    /// Freeze the current bounds as a static pruning decision.
    pub fn mark_static(&mut self) {
        debug_assert!(self.owner.is_some());
        self.static_pruned = true;
        self.static_upper_bound_movement = 0.0;
        self.static_lower_bound_movement = 0.0;
    }

    pub fn clear_static(&mut self) {
        self.static_pruned = false;
        self.static_upper_bound_movement = 0.0;
        self.static_lower_bound_movement = 0.0;
    }

    /// Add one iteration's centroid movement to the accumulators.
    pub fn accumulate_movement(&mut self, owner_movement: f64, other_movement: f64) {
        self.static_upper_bound_movement += owner_movement;
        self.static_lower_bound_movement += other_movement;
    }

    /// Upper bound on the distance to the owner, valid for the current centroids.
    pub fn moved_upper_bound(&self) -> f64 {
        self.upper_bound + self.static_upper_bound_movement
    }

    /// Lower bound on the distance to any non-owner, valid for the current centroids.
    pub fn moved_lower_bound(&self) -> f64 {
        (self.lower_bound - self.static_lower_bound_movement).max(0.0)
    }

    /// Whether the frozen owner is still provably nearest for the whole subtree.
    pub fn static_prune_holds(&self) -> bool {
        if !self.static_pruned || self.owner.is_none() {
            return false;
        }
        // no competing centroid at all (k == 1)
        if self.lower_bound.is_infinite() {
            return true;
        }
        let slack = STATIC_PRUNE_SLACK
            * (self.upper_bound
                + self.lower_bound
                + self.static_upper_bound_movement
                + self.static_lower_bound_movement);
        self.moved_upper_bound() + slack < self.lower_bound - self.static_lower_bound_movement
    }
}

impl fmt::Display for NodeStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "NodeStat:")?;
        writeln!(f, "  upper bound: {}", self.upper_bound)?;
        writeln!(f, "  lower bound: {}", self.lower_bound)?;
        writeln!(f, "  pruned: {}", self.pruned)?;
        writeln!(f, "  static pruned: {}", self.static_pruned)?;
        match self.owner {
            Some(owner) => writeln!(f, "  owner: {}", owner),
            None => writeln!(f, "  owner: unknown"),
        }
    }
}
