//! Sparse symmetric co-occurrence matrices and connected components.
//!
//! Grounded in `original_source/prodr/ensemble/utils/cluster/cooccurrence_count.py`
//! and `cluster_operations.py` (the `scipy.sparse` CSR matrices, bulk COO
//! edits, `sum_duplicates`/`eliminate_zeros`, `connected_components`).
//! A CSR store with an auxiliary COO buffer is one valid shape for this;
//! here a single `HashMap` keyed by the canonical `(min, max)` pair plays
//! both roles, since at these micro-cluster scales a hash map is simpler
//! and just as fast as juggling two representations.
//!
//! Connected components are computed with `petgraph::unionfind::UnionFind`,
//! the standard union-find structure for this exact task.

use std::collections::HashMap;

use petgraph::unionfind::UnionFind;

/// A symmetric, non-negative, integer-valued sparse matrix with no stored
/// zero entries. Indexed by local (within-micro-cluster) row/column ids.
#[derive(Debug, Clone, Default)]
pub struct SparseSymmetric {
    entries: HashMap<(usize, usize), i64>,
}

fn canonical(r: usize, c: usize) -> (usize, usize) {
    if r <= c {
        (r, c)
    } else {
        (c, r)
    }
}

impl SparseSymmetric {
    /// An empty matrix.
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// The value stored at `(r, c)` (and, by symmetry, `(c, r)`); `0` if
    /// absent.
    pub fn get(&self, r: usize, c: usize) -> i64 {
        self.entries.get(&canonical(r, c)).copied().unwrap_or(0)
    }

    /// Adds `delta` to both `(r, c)` and `(c, r)`. Negative results clamp to
    /// zero; zero entries are dropped rather than stored.
    pub fn add(&mut self, r: usize, c: usize, delta: i64) {
        let key = canonical(r, c);
        let new_value = (self.entries.get(&key).copied().unwrap_or(0) + delta).max(0);
        if new_value == 0 {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, new_value);
        }
    }

    /// Sets a raw value, bypassing the symmetric-delta bookkeeping of
    /// [`Self::add`]. Used internally to build filtered/merged matrices
    /// where the stored values are already known to be correct and
    /// non-zero.
    fn set_raw(&mut self, r: usize, c: usize, value: i64) {
        if value != 0 {
            self.entries.insert(canonical(r, c), value);
        }
    }

    /// Whether any stored entry is below `threshold`. Such entries are no
    /// longer valid graph edges, so the component structure may have
    /// fractured.
    pub fn is_dirty(&self, threshold: i64) -> bool {
        self.entries.values().any(|&v| v < threshold)
    }

    /// Iterates the stored `(r, c, value)` triples, `r < c`.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, i64)> + '_ {
        self.entries.iter().map(|(&(r, c), &v)| (r, c, v))
    }

    /// The matrix restricted to entries with value `>= threshold`.
    pub fn filter_ge(&self, threshold: i64) -> SparseSymmetric {
        let mut out = SparseSymmetric::new();
        for (r, c, v) in self.entries() {
            if v >= threshold {
                out.set_raw(r, c, v);
            }
        }
        out
    }

    /// The principal sub-matrix over `local_ids`, remapped to the compact
    /// index space `0..local_ids.len()`.
    pub fn submatrix(&self, local_ids: &[usize]) -> SparseSymmetric {
        let position: HashMap<usize, usize> = local_ids.iter().enumerate().map(|(new, &old)| (old, new)).collect();
        let mut out = SparseSymmetric::new();
        for (r, c, v) in self.entries() {
            if let (Some(&nr), Some(&nc)) = (position.get(&r), position.get(&c)) {
                out.set_raw(nr, nc, v);
            }
        }
        out
    }

    /// Concatenates `parts` block-diagonally: part `i`, whose own indices
    /// run `0..size_i`, is placed at rows/columns `[offset_i,
    /// offset_i+size_i)` with no cross-block entries.
    pub fn block_diag(parts: &[(&SparseSymmetric, usize)]) -> SparseSymmetric {
        let mut out = SparseSymmetric::new();
        for (part, offset) in parts {
            for (r, c, v) in part.entries() {
                out.set_raw(r + offset, c + offset, v);
            }
        }
        out
    }
}

/// Computes undirected connected components over `n` nodes given an edge
/// iterator, returning `(n_components, labels)` where `labels[i]` is the
/// component index of node `i`. Component labels are assigned in order of
/// first appearance among `0..n`.
pub fn connected_components(n: usize, edges: impl Iterator<Item = (usize, usize)>) -> (usize, Vec<usize>) {
    if n == 0 {
        return (0, Vec::new());
    }
    let mut uf = UnionFind::<usize>::new(n);
    for (a, b) in edges {
        uf.union(a, b);
    }

    let mut label_of_root: HashMap<usize, usize> = HashMap::new();
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let root = uf.find(i);
        let next_label = label_of_root.len();
        let label = *label_of_root.entry(root).or_insert(next_label);
        labels.push(label);
    }

    (label_of_root.len(), labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_symmetric_and_clamps_negative_to_zero() {
        let mut m = SparseSymmetric::new();
        m.add(0, 1, 3);
        assert_eq!(m.get(0, 1), 3);
        assert_eq!(m.get(1, 0), 3);

        m.add(0, 1, -5);
        assert_eq!(m.get(0, 1), 0);
        assert_eq!(m.entries().count(), 0);
    }

    #[test]
    fn is_dirty_detects_sub_threshold_entries() {
        let mut m = SparseSymmetric::new();
        m.add(0, 1, 4);
        assert!(!m.is_dirty(3));
        m.add(0, 1, -2);
        assert!(m.is_dirty(3));
    }

    #[test]
    fn connected_components_groups_transitively() {
        let edges = vec![(0, 1), (1, 2), (3, 4)];
        let (n_components, labels) = connected_components(5, edges.into_iter());
        assert_eq!(n_components, 2);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn submatrix_remaps_indices() {
        let mut m = SparseSymmetric::new();
        m.add(0, 2, 5);
        m.add(1, 2, 7);

        let sub = m.submatrix(&[2, 0]);
        assert_eq!(sub.get(0, 1), 5);
        assert_eq!(sub.get(0, 0), 0);
    }

    #[test]
    fn block_diag_has_no_cross_block_entries() {
        let mut a = SparseSymmetric::new();
        a.add(0, 1, 2);
        let mut b = SparseSymmetric::new();
        b.add(0, 1, 9);

        let merged = SparseSymmetric::block_diag(&[(&a, 0), (&b, 2)]);
        assert_eq!(merged.get(0, 1), 2);
        assert_eq!(merged.get(2, 3), 9);
        assert_eq!(merged.get(1, 2), 0);
    }
}
