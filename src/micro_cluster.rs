//! Micro-clusters: connected components of the co-occurrence graph.
//!
//! Grounded in `original_source/prodr/ensemble/components/micro_cluster.py`.
//! The Python side identifies a micro-cluster by Python object identity
//! (`id(self)`), which downstream code relies on when deciding whether two
//! references denote "the same" cluster across mutation. Rust has no
//! analogue to object identity for an owned, cloneable struct, so identity
//! is made explicit: every micro-cluster carries an [`McId`] assigned from a
//! process-wide counter at construction, and equality/hashing are defined
//! purely in terms of that id.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::cooccurrence::SparseSymmetric;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// A micro-cluster's identity, stable across clones and mutation of its
/// contents. Two [`MicroCluster`]s with different ids are different
/// clusters even if their indices happen to coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct McId(u64);

impl McId {
    fn fresh() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A connected component of the thresholded co-occurrence graph: a set of
/// global data indices believed to belong to the same underlying cluster,
/// plus the co-occurrence weights between them and a distinguished "head"
/// representative.
#[derive(Debug, Clone)]
pub struct MicroCluster {
    id: McId,
    /// Global data-store indices belonging to this micro-cluster, in a
    /// fixed order that defines the local index space of `cooccurrence`.
    indices: Vec<usize>,
    /// The global index of this micro-cluster's representative point.
    /// Always a member of `indices`.
    head: usize,
    /// Local (0-based, `indices`-order) co-occurrence weights among this
    /// micro-cluster's own members.
    cooccurrence: SparseSymmetric,
}

impl MicroCluster {
    /// Builds a fresh micro-cluster with a brand-new id. `head` must be one
    /// of `indices`.
    ///
    /// # Panics
    /// Panics if `indices` is empty or does not contain `head`.
    pub fn new(indices: Vec<usize>, head: usize, cooccurrence: SparseSymmetric) -> Self {
        assert!(!indices.is_empty(), "a micro-cluster must have at least one member");
        assert!(indices.contains(&head), "head must be a member index");
        Self {
            id: McId::fresh(),
            indices,
            head,
            cooccurrence,
        }
    }

    /// This micro-cluster's stable identity.
    pub fn id(&self) -> McId {
        self.id
    }

    /// The global indices of this micro-cluster's members.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of member points.
    pub fn size(&self) -> usize {
        self.indices.len()
    }

    /// The global index of the representative point.
    pub fn head(&self) -> usize {
        self.head
    }

    /// This micro-cluster's internal co-occurrence matrix, in local
    /// (`indices`-order) index space.
    pub fn cooccurrence(&self) -> &SparseSymmetric {
        &self.cooccurrence
    }

    /// The local (0-based) position of global index `global`, if it is a
    /// member.
    pub fn local_index_of(&self, global: usize) -> Option<usize> {
        self.indices.iter().position(|&i| i == global)
    }

    /// Whether any internal co-occurrence weight has fallen below
    /// `threshold`: the component may no longer be connected and should be
    /// recomputed by [`Self::split`].
    pub fn is_dirty(&self, threshold: i64) -> bool {
        self.cooccurrence.is_dirty(threshold)
    }

    /// Adjusts the co-occurrence weight between two of this micro-cluster's
    /// local member positions by `delta`, symmetrically. Mirrors
    /// `update_cooccurrence_count` (spec.md §4.5): negative deltas clamp at
    /// zero and zero entries are dropped, handled by the underlying
    /// [`SparseSymmetric`].
    pub fn update_cooccurrence(&mut self, local_a: usize, local_b: usize, delta: i64) {
        self.cooccurrence.add(local_a, local_b, delta);
    }

    /// Decrements the co-occurrence weight between two of this
    /// micro-cluster's local member positions, e.g. when a tree split
    /// separates them into different leaves.
    pub fn decrement_cooccurrence(&mut self, local_a: usize, local_b: usize, delta: i64) {
        self.update_cooccurrence(local_a, local_b, -delta);
    }

    /// Recomputes connected components over the internal graph at
    /// `threshold`, returning one [`MicroCluster`] per surviving component.
    /// Each keeps a fresh id; the component containing the old head keeps
    /// that point as its head, falling back to its first member otherwise.
    pub fn split(&self, threshold: i64) -> Vec<MicroCluster> {
        let filtered = self.cooccurrence.filter_ge(threshold);
        let n = self.indices.len();
        let (n_components, labels) = crate::cooccurrence::connected_components(n, filtered.entries().map(|(r, c, _)| (r, c)));

        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n_components];
        for (local, &label) in labels.iter().enumerate() {
            groups[label].push(local);
        }

        groups
            .into_iter()
            .map(|local_ids| {
                let global_ids: Vec<usize> = local_ids.iter().map(|&l| self.indices[l]).collect();
                let sub = filtered.submatrix(&local_ids);
                let head = if local_ids.iter().any(|&l| self.indices[l] == self.head) {
                    self.head
                } else {
                    global_ids[0]
                };
                MicroCluster::new(global_ids, head, sub)
            })
            .collect()
    }

    /// Merges `clusters` (which must be non-overlapping) into one, unioning
    /// their indices and placing their co-occurrence matrices block-diagonal
    /// (no cross-cluster co-occurrence is known yet; a later insertion cycle
    /// will add any edges the merge itself introduced). Mirrors
    /// `cluster_merging.py`'s stable sort by size descending: the largest
    /// input cluster is the "head_micro_cluster" of the merge and its head
    /// point becomes the merged head, ties broken by input order.
    ///
    /// # Panics
    /// Panics if `clusters` is empty.
    pub fn merge(clusters: &[MicroCluster]) -> MicroCluster {
        assert!(!clusters.is_empty(), "merge requires at least one micro-cluster");

        let head_cluster = clusters
            .iter()
            .enumerate()
            .max_by_key(|(order, c)| (c.size(), std::cmp::Reverse(*order)))
            .map(|(_, c)| c)
            .expect("clusters is non-empty");
        let head = head_cluster.head;

        let mut indices = Vec::new();
        let mut parts: Vec<(&SparseSymmetric, usize)> = Vec::with_capacity(clusters.len());
        for c in clusters {
            parts.push((&c.cooccurrence, indices.len()));
            indices.extend_from_slice(&c.indices);
        }
        let cooccurrence = SparseSymmetric::block_diag(&parts);
        MicroCluster::new(indices, head, cooccurrence)
    }
}

impl PartialEq for MicroCluster {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MicroCluster {}

impl std::hash::Hash for MicroCluster {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mc_with_edge(a: usize, b: usize, weight: i64) -> MicroCluster {
        let mut co = SparseSymmetric::new();
        co.add(0, 1, weight);
        MicroCluster::new(vec![a, b], a, co)
    }

    #[test]
    fn new_assigns_unique_ids() {
        let a = mc_with_edge(0, 1, 5);
        let b = mc_with_edge(2, 3, 5);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn split_below_threshold_fractures_into_singletons() {
        let mc = mc_with_edge(10, 20, 1);
        assert!(mc.is_dirty(2));

        let parts = mc.split(2);
        assert_eq!(parts.len(), 2);
        let mut heads: Vec<usize> = parts.iter().map(MicroCluster::head).collect();
        heads.sort_unstable();
        assert_eq!(heads, vec![10, 20]);
    }

    #[test]
    fn split_above_threshold_keeps_one_component_and_preserves_head() {
        let mc = mc_with_edge(10, 20, 5);
        assert!(!mc.is_dirty(2));

        let parts = mc.split(2);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].head(), 10);
        assert_eq!(parts[0].size(), 2);
    }

    #[test]
    fn merge_unions_indices_with_no_cross_edges() {
        let a = mc_with_edge(0, 1, 3);
        let b = mc_with_edge(2, 3, 4);
        let merged = MicroCluster::merge(&[a, b]);

        assert_eq!(merged.indices(), &[0, 1, 2, 3]);
        assert_eq!(merged.head(), 0);
        assert_eq!(merged.cooccurrence().get(0, 1), 3);
        assert_eq!(merged.cooccurrence().get(2, 3), 4);
        assert_eq!(merged.cooccurrence().get(1, 2), 0);
    }

    #[test]
    fn merge_head_comes_from_the_largest_input_cluster() {
        let small = mc_with_edge(0, 1, 3);
        let mut co = SparseSymmetric::new();
        co.add(0, 1, 1);
        co.add(1, 2, 1);
        let large = MicroCluster::new(vec![10, 11, 12], 11, co);

        let merged = MicroCluster::merge(&[small, large]);
        assert_eq!(merged.head(), 11);
    }

    #[test]
    fn local_index_of_finds_member_position() {
        let mc = mc_with_edge(7, 9, 1);
        assert_eq!(mc.local_index_of(9), Some(1));
        assert_eq!(mc.local_index_of(42), None);
    }
}
