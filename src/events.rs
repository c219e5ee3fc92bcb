//! Value objects produced over the course of one batch cycle.
//!
//! Grounded in `original_source/prodr/ensemble/types/events.py`;
//! `NodeSplitEvent` additionally carries the two
//! children's index partitions directly (rather than requiring callers to
//! reach back into the tree for them), which is what lets
//! `ClusterHandler::handle_split` stay decoupled from the tree/forest
//! types entirely.

use crate::flat_tree::Node;
use crate::micro_cluster::MicroCluster;

/// A single point's insertion into a leaf.
#[derive(Debug, Clone, Copy)]
pub struct InsertionEvent {
    /// The point's global index.
    pub data_index: usize,
    /// The leaf it landed in.
    pub node: Node,
}

/// A leaf splitting into two children.
#[derive(Debug, Clone)]
pub struct NodeSplitEvent {
    /// The node that was a leaf and is now internal.
    pub parent: Node,
    /// The new left child.
    pub left_child: Node,
    /// The new right child.
    pub right_child: Node,
    /// The indices that were partitioned into `left_child`.
    pub left_indices: Vec<usize>,
    /// The indices that were partitioned into `right_child`.
    pub right_indices: Vec<usize>,
}

/// A micro-cluster fracturing into two or more components because enough
/// tree splits decremented its internal co-occurrence weight below
/// threshold.
#[derive(Debug, Clone)]
pub struct MicroClusterSplitEvent {
    /// The micro-cluster that was dirty and has been removed.
    pub parent: MicroCluster,
    /// Its replacement components.
    pub children: Vec<MicroCluster>,
    /// Whichever child retained the parent's head point.
    pub inheritor: MicroCluster,
}

/// Two or more micro-clusters (plus, usually, some brand-new points)
/// merging into one because a new point bridges them.
#[derive(Debug, Clone)]
pub struct MicroClusterMergeEvent {
    /// The pre-merge constituent micro-clusters that were removed.
    pub merged: Vec<MicroCluster>,
    /// The resulting merged micro-cluster.
    pub head: MicroCluster,
}

/// A brand-new micro-cluster, seeded from new points with no connection to
/// any existing one above threshold.
#[derive(Debug, Clone)]
pub struct MicroClusterCreationEvent {
    /// The new micro-cluster.
    pub created: MicroCluster,
}

/// The result of one call to `Ensemble::update`.
#[derive(Debug, Clone, Default)]
pub struct ClusterUpdateEvent {
    /// Micro-clusters that fractured this cycle.
    pub split_events: Vec<MicroClusterSplitEvent>,
    /// Micro-clusters that merged this cycle.
    pub merge_events: Vec<MicroClusterMergeEvent>,
    /// Micro-clusters created fresh this cycle.
    pub creation_events: Vec<MicroClusterCreationEvent>,
}
