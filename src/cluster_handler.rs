//! Maintains micro-clusters as connected components of the ensemble's
//! co-occurrence graph across three events: initialization, tree splits,
//! and new-point insertion.
//!
//! Grounded in `original_source/prodr/ensemble/components/cluster_handler.py`
//! and its three collaborators `cluster_generation.py` (initialization),
//! `cluster_split.py` (split handling) and `insertion_handler.py` (insertion
//! handling). This type owns no reference to the forest or data store: its
//! callers (`Ensemble`) hand it plain leaf groupings, split events and
//! co-occurrence tallies already computed from those, which keeps the
//! borrow graph in `Ensemble::update` simple (`Ensemble` needs to mutate its
//! store, forest and handler together in one method).

use std::collections::HashMap;

use crate::cooccurrence::{connected_components, SparseSymmetric};
use crate::events::{MicroClusterCreationEvent, MicroClusterMergeEvent, MicroClusterSplitEvent, NodeSplitEvent};
use crate::micro_cluster::MicroCluster;

/// Tuning shared by all three handler operations.
#[derive(Debug, Clone, Copy)]
pub struct ClusterHandlerConfig {
    /// Initialization does not run until the first tree's leaf count
    /// exceeds this.
    pub min_leaves_for_init: usize,
    /// The minimum co-occurrence weight (number of trees placing two points
    /// in the same leaf) for an edge to count as a cluster connection.
    pub cooccurrence_threshold: i64,
}

impl Default for ClusterHandlerConfig {
    fn default() -> Self {
        Self { min_leaves_for_init: 8, cooccurrence_threshold: 1 }
    }
}

/// Builds a local-index co-occurrence matrix for `indices` from raw global
/// pairwise tallies, keeping only the entries between members of the group.
/// Used for initialization, where the accumulated leaf tally is stored raw
/// (thresholding happens only when an edge is needed for connectivity).
fn cooccurrence_for_group(indices: &[usize], tally: &HashMap<(usize, usize), i64>) -> SparseSymmetric {
    let position: HashMap<usize, usize> = indices.iter().enumerate().map(|(local, &global)| (global, local)).collect();
    let mut co = SparseSymmetric::new();
    for (&(a, b), &count) in tally {
        if let (Some(&pa), Some(&pb)) = (position.get(&a), position.get(&b)) {
            co.add(pa, pb, count);
        }
    }
    co
}

/// Like [`cooccurrence_for_group`], but drops entries below `threshold`
/// first. Mirrors `count_cooccurrence`'s own early threshold filter for
/// new-point tallies (`original_source/.../cooccurrence_count.py`): a fresh
/// micro-cluster seeded from new points only ever stores edges that already
/// qualify as graph connections.
fn cooccurrence_for_group_at_threshold(indices: &[usize], tally: &HashMap<(usize, usize), i64>, threshold: i64) -> SparseSymmetric {
    let position: HashMap<usize, usize> = indices.iter().enumerate().map(|(local, &global)| (global, local)).collect();
    let mut co = SparseSymmetric::new();
    for (&(a, b), &count) in tally {
        if count < threshold {
            continue;
        }
        if let (Some(&pa), Some(&pb)) = (position.get(&a), position.get(&b)) {
            co.add(pa, pb, count);
        }
    }
    co
}

pub struct ClusterHandler {
    config: ClusterHandlerConfig,
    micro_clusters: Vec<MicroCluster>,
    initialized: bool,
}

impl ClusterHandler {
    /// A handler with no micro-clusters yet, waiting for the first tree to
    /// grow enough leaves.
    pub fn new(config: ClusterHandlerConfig) -> Self {
        Self { config, micro_clusters: Vec::new(), initialized: false }
    }

    /// Whether [`Self::maybe_initialize`] has already run.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The currently tracked micro-clusters.
    pub fn micro_clusters(&self) -> &[MicroCluster] {
        &self.micro_clusters
    }

    /// The micro-cluster currently holding `global_index`.
    ///
    /// # Panics
    /// Panics with an [`crate::error::Error::UnknownIndex`]-describing
    /// message if `global_index` is not a member of any tracked
    /// micro-cluster. A miss here is an internal invariant violation (every
    /// known point belongs to exactly one micro-cluster
    /// once the handler is initialized), not a condition callers should
    /// recover from.
    pub fn micro_cluster_for(&self, global_index: usize) -> &MicroCluster {
        self.micro_clusters
            .iter()
            .find(|mc| mc.indices().contains(&global_index))
            .unwrap_or_else(|| panic!("{}", crate::error::Error::UnknownIndex(global_index)))
    }

    /// If not yet initialized and `first_tree_leaf_count` exceeds
    /// `min_leaves_for_init`, seeds the initial set of micro-clusters from
    /// the ensemble's current leaf co-occurrence and returns one creation
    /// event per resulting component. A no-op (returning no events) on
    /// every other call.
    pub fn maybe_initialize(&mut self, first_tree_leaf_count: usize, leaf_groups_by_tree: &[Vec<Vec<usize>>]) -> Vec<MicroClusterCreationEvent> {
        if self.initialized || first_tree_leaf_count <= self.config.min_leaves_for_init {
            return Vec::new();
        }
        self.initialized = true;

        let mut tally: HashMap<(usize, usize), i64> = HashMap::new();
        let mut seen = std::collections::BTreeSet::new();
        for tree_groups in leaf_groups_by_tree {
            for group in tree_groups {
                for &idx in group {
                    seen.insert(idx);
                }
                for i in 0..group.len() {
                    for j in (i + 1)..group.len() {
                        let (a, b) = (group[i], group[j]);
                        let key = if a <= b { (a, b) } else { (b, a) };
                        *tally.entry(key).or_insert(0) += 1;
                    }
                }
            }
        }

        if seen.is_empty() {
            return Vec::new();
        }
        let all_indices: Vec<usize> = seen.into_iter().collect();
        let position: HashMap<usize, usize> = all_indices.iter().enumerate().map(|(local, &global)| (global, local)).collect();
        let edges: Vec<(usize, usize)> = tally
            .iter()
            .filter(|&(_, &count)| count >= self.config.cooccurrence_threshold)
            .map(|(&(a, b), _)| (position[&a], position[&b]))
            .collect();

        let (n_components, labels) = connected_components(all_indices.len(), edges.into_iter());
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n_components];
        for (local, &label) in labels.iter().enumerate() {
            groups[label].push(all_indices[local]);
        }

        let mut events = Vec::with_capacity(groups.len());
        for mut global_ids in groups {
            global_ids.sort_unstable();
            let head = global_ids[0];
            let co = cooccurrence_for_group(&global_ids, &tally);
            let mc = MicroCluster::new(global_ids, head, co);
            events.push(MicroClusterCreationEvent { created: mc.clone() });
            self.micro_clusters.push(mc);
        }
        events
    }

    /// Applies every tree's split events for the current batch, decrementing
    /// co-occurrence between points a split separated, then recomputes
    /// components for any micro-cluster whose weights fell below threshold.
    /// Accumulates across *all* trees' splits before checking dirtiness, so
    /// a micro-cluster that several trees' splits touch is only re-split
    /// once per batch.
    pub fn handle_split(&mut self, split_events_by_tree: &[Vec<NodeSplitEvent>]) -> Vec<MicroClusterSplitEvent> {
        if self.micro_clusters.is_empty() {
            return Vec::new();
        }

        let mut global_to_slot: HashMap<usize, usize> = HashMap::new();
        for (slot, mc) in self.micro_clusters.iter().enumerate() {
            for &idx in mc.indices() {
                global_to_slot.insert(idx, slot);
            }
        }

        let mut working = self.micro_clusters.clone();
        for splits in split_events_by_tree {
            for event in splits {
                let mut left_by_slot: HashMap<usize, Vec<usize>> = HashMap::new();
                for &l in &event.left_indices {
                    if let Some(&slot) = global_to_slot.get(&l) {
                        left_by_slot.entry(slot).or_default().push(l);
                    }
                }
                let mut right_by_slot: HashMap<usize, Vec<usize>> = HashMap::new();
                for &r in &event.right_indices {
                    if let Some(&slot) = global_to_slot.get(&r) {
                        right_by_slot.entry(slot).or_default().push(r);
                    }
                }
                for (slot, lefts) in &left_by_slot {
                    let Some(rights) = right_by_slot.get(slot) else { continue };
                    let mc = &mut working[*slot];
                    for &l in lefts {
                        for &r in rights {
                            if let (Some(pl), Some(pr)) = (mc.local_index_of(l), mc.local_index_of(r)) {
                                mc.decrement_cooccurrence(pl, pr, 1);
                            }
                        }
                    }
                }
            }
        }

        let mut rebuilt = Vec::with_capacity(working.len());
        let mut events = Vec::new();
        for mc in working {
            if mc.is_dirty(self.config.cooccurrence_threshold) {
                log::debug!("micro-cluster (head {}) is dirty, recomputing components", mc.head());
                let children = mc.split(self.config.cooccurrence_threshold);
                let inheritor = children
                    .iter()
                    .find(|child| child.indices().contains(&mc.head()))
                    .cloned()
                    .unwrap_or_else(|| children[0].clone());
                rebuilt.extend(children.iter().cloned());
                events.push(MicroClusterSplitEvent { parent: mc, children, inheritor });
            } else {
                rebuilt.push(mc);
            }
        }
        self.micro_clusters = rebuilt;
        events
    }

    /// Absorbs `new_points` into existing or brand-new micro-clusters, given
    /// the raw pairwise co-occurrence tallies (global index, global index,
    /// weight) between every pair that shares a leaf this batch, restricted
    /// to pairs touching at least one new point.
    ///
    /// Builds one graph node per existing micro-cluster plus one per new
    /// point, connects two nodes whenever their tally is at or above
    /// threshold, and takes connected components: a component spanning one
    /// micro-cluster and some new points absorbs them; a component spanning
    /// several micro-clusters merges them (and any new points bridging
    /// them); a component with no existing micro-cluster becomes brand new.
    pub fn handle_insertion(&mut self, new_points: &[usize], pairwise_tallies: &[(usize, usize, i64)]) -> (Vec<MicroClusterMergeEvent>, Vec<MicroClusterCreationEvent>) {
        if new_points.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let n_mc = self.micro_clusters.len();
        let mut global_to_slot: HashMap<usize, usize> = HashMap::new();
        for (slot, mc) in self.micro_clusters.iter().enumerate() {
            for &idx in mc.indices() {
                global_to_slot.insert(idx, slot);
            }
        }
        let mut new_point_node: HashMap<usize, usize> = HashMap::new();
        for (i, &p) in new_points.iter().enumerate() {
            new_point_node.insert(p, n_mc + i);
        }
        let total_nodes = n_mc + new_points.len();

        let node_of = |global: usize| -> Option<usize> {
            global_to_slot.get(&global).copied().or_else(|| new_point_node.get(&global).copied())
        };

        let mut tally_lookup: HashMap<(usize, usize), i64> = HashMap::new();
        for &(a, b, count) in pairwise_tallies {
            let key = if a <= b { (a, b) } else { (b, a) };
            *tally_lookup.entry(key).or_insert(0) += count;
        }

        let edges: Vec<(usize, usize)> = pairwise_tallies
            .iter()
            .filter(|&&(_, _, count)| count >= self.config.cooccurrence_threshold)
            .filter_map(|&(a, b, _)| Some((node_of(a)?, node_of(b)?)))
            .collect();

        let (n_components, labels) = connected_components(total_nodes, edges.into_iter());
        let mut mc_slots_by_label: Vec<Vec<usize>> = vec![Vec::new(); n_components];
        let mut new_points_by_label: Vec<Vec<usize>> = vec![Vec::new(); n_components];
        for node in 0..total_nodes {
            let label = labels[node];
            if node < n_mc {
                mc_slots_by_label[label].push(node);
            } else {
                new_points_by_label[label].push(new_points[node - n_mc]);
            }
        }

        let mut merge_events = Vec::new();
        let mut creation_events = Vec::new();
        let mut rebuilt = Vec::with_capacity(n_components);

        for label in 0..n_components {
            let mc_slots = &mc_slots_by_label[label];
            let new_pts = &new_points_by_label[label];
            if mc_slots.is_empty() && new_pts.is_empty() {
                continue;
            }
            if mc_slots.is_empty() {
                let mut indices = new_pts.clone();
                indices.sort_unstable();
                let head = indices[0];
                let co = cooccurrence_for_group_at_threshold(&indices, &tally_lookup, self.config.cooccurrence_threshold);
                let mc = MicroCluster::new(indices, head, co);
                creation_events.push(MicroClusterCreationEvent { created: mc.clone() });
                rebuilt.push(mc);
            } else if mc_slots.len() == 1 && new_pts.is_empty() {
                rebuilt.push(self.micro_clusters[mc_slots[0]].clone());
            } else {
                let merged: Vec<MicroCluster> = mc_slots.iter().map(|&s| self.micro_clusters[s].clone()).collect();

                // Each existing micro-cluster's own co-occurrence sub-matrix is
                // already correct and must be preserved, not rebuilt from
                // `tally_lookup` (which only records pairs touching a new
                // point). Block-diagonal merge keeps every constituent's
                // internal edges intact; a second pass below patches in the
                // new-point<->old-point (and new-point<->new-point) edges
                // `tally_lookup` recorded, mirroring spec.md §4.6 step 3's
                // "patch in the real new-point<->old-point co-occurrence
                // counts ... via update_cooccurrence_count".
                let mut blocks = merged.clone();
                if !new_pts.is_empty() {
                    let mut new_ids = new_pts.clone();
                    new_ids.sort_unstable();
                    let new_head = new_ids[0];
                    let new_co = cooccurrence_for_group_at_threshold(&new_ids, &tally_lookup, self.config.cooccurrence_threshold);
                    blocks.push(MicroCluster::new(new_ids, new_head, new_co));
                }

                let mut block_of: HashMap<usize, usize> = HashMap::new();
                for (bi, block) in blocks.iter().enumerate() {
                    for &idx in block.indices() {
                        block_of.insert(idx, bi);
                    }
                }

                let mut head_mc = MicroCluster::merge(&blocks);
                for (&(a, b), &count) in &tally_lookup {
                    if count < self.config.cooccurrence_threshold {
                        // Mirrors `count_cooccurrence`'s own early threshold
                        // filter in the source: only edges that already meet
                        // threshold get patched in here.
                        continue;
                    }
                    let (Some(&ba), Some(&bb)) = (block_of.get(&a), block_of.get(&b)) else { continue };
                    if ba == bb {
                        // Already captured by that block's own sub-matrix.
                        continue;
                    }
                    if let (Some(la), Some(lb)) = (head_mc.local_index_of(a), head_mc.local_index_of(b)) {
                        head_mc.update_cooccurrence(la, lb, count);
                    }
                }

                merge_events.push(MicroClusterMergeEvent { merged, head: head_mc.clone() });
                rebuilt.push(head_mc);
            }
        }

        self.micro_clusters = rebuilt;
        (merge_events, creation_events)
    }
}
