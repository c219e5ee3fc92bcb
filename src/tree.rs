//! A single Adaptive Progressive Tree: lazy splitting with
//! depth-synchronized random-projection hyperplanes.
//!
//! Grounded in `original_source/prodr/apforest/aptree.py` and
//! `apforest/utils/traverse_to_leaf.py`. "Depth-synchronized" means every
//! leaf at depth *k* that splits during the same tree reuses one normal,
//! drawn lazily the first time that depth is split and cached for the
//! tree's lifetime; this keeps the tree's partitioning consistent even
//! though leaves are split independently as they fill up.

use std::collections::{HashMap, VecDeque};

use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::data::DataStore;
use crate::events::{InsertionEvent, NodeSplitEvent};
use crate::flat_tree::{FlatTree, NodeId};
use crate::hyperplane::{generate_hyperplane, project_rows};

/// Per-tree tuning. Each tree in a forest is built with the same config but
/// an independent seed.
#[derive(Debug, Clone, Copy)]
pub struct AptConfig {
    /// A leaf with more than this many points is split on the next
    /// `insert_batch` call.
    pub leaf_capacity: usize,
    /// Seeds this tree's private RNG.
    pub seed: u64,
}

impl Default for AptConfig {
    fn default() -> Self {
        Self { leaf_capacity: 8, seed: 0 }
    }
}

/// One Adaptive Progressive Tree.
#[derive(Debug, Clone)]
pub struct Apt {
    config: AptConfig,
    tree: FlatTree,
    /// The shared random-projection normal for each depth that has produced
    /// a split so far, keyed by the depth of the nodes being split (i.e.
    /// the parent's depth).
    normals_by_depth: HashMap<usize, Vec<f64>>,
    rng: ChaCha8Rng,
}

impl Apt {
    /// A tree with just an empty root leaf.
    pub fn new(config: AptConfig) -> Self {
        Self {
            config,
            tree: FlatTree::new(),
            normals_by_depth: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
        }
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.leaf_ids().len()
    }

    /// The ids of all current leaves, in ascending node-id order.
    pub fn leaf_ids(&self) -> Vec<NodeId> {
        (0..self.tree.len()).map(NodeId).filter(|&id| self.tree.is_leaf(id)).collect()
    }

    /// Groups of global indices, one per current leaf.
    pub fn leaf_index_groups(&self) -> Vec<Vec<usize>> {
        self.leaf_ids().iter().map(|&id| self.tree.indices(id).to_vec()).collect()
    }

    /// Routes each row of `rows` (global indices `start..start+rows.nrows()`
    /// into the data store) to its destination leaf, recording an
    /// [`InsertionEvent`] per point, then drains a work queue seeded with
    /// every current leaf: any leaf left over `leaf_capacity` is split and
    /// its two new children are enqueued in turn, so a single oversized leaf
    /// (e.g. one batch landing many points in the same leaf at once) can
    /// cascade through several splits in one call, each recording a
    /// [`NodeSplitEvent`].
    ///
    /// A split that would leave one side empty is skipped for this cycle
    /// (logged at `warn`); the leaf is simply left oversized until a future
    /// batch's points break the tie.
    pub fn insert_batch(&mut self, rows: Array2<f64>, start: usize, store: &DataStore) -> (Vec<InsertionEvent>, Vec<NodeSplitEvent>) {
        let mut insertions = Vec::with_capacity(rows.nrows());
        for (offset, row) in rows.rows().into_iter().enumerate() {
            let global_index = start + offset;
            let leaf_id = self.traverse_row(row);
            self.tree.push_index(leaf_id, global_index);
            insertions.push(InsertionEvent {
                data_index: global_index,
                node: self.tree.node(leaf_id),
            });
        }

        let mut splits = Vec::new();
        let mut queue: VecDeque<NodeId> = self.leaf_ids().into();
        while let Some(leaf_id) = queue.pop_front() {
            if self.tree.indices(leaf_id).len() <= self.config.leaf_capacity {
                continue;
            }
            if let Some(event) = self.try_split(leaf_id, store) {
                queue.push_back(event.left_child.id);
                queue.push_back(event.right_child.id);
                splits.push(event);
            }
        }
        (insertions, splits)
    }

    fn traverse_row(&mut self, row: ndarray::ArrayView1<f64>) -> NodeId {
        let max_depth = self.tree.max_depth();
        let mut projection = Vec::with_capacity(max_depth + 1);
        for depth in 0..=max_depth {
            let normal = self.normals_by_depth.get(&depth);
            let value = match normal {
                Some(n) => row.iter().zip(n).map(|(a, b)| a * b).sum(),
                // No split has happened at this depth yet in this tree; the
                // value is never read by `FlatTree::traverse` for a node at
                // this depth because such a node is still a leaf.
                None => 0.0,
            };
            projection.push(value);
        }
        self.tree.traverse(&projection)
    }

    fn try_split(&mut self, leaf_id: NodeId, store: &DataStore) -> Option<NodeSplitEvent> {
        let parent = self.tree.node(leaf_id);
        let indices = self.tree.indices(leaf_id).to_vec();
        let rows = store.rows_f64(&indices);

        let cached_normal = self.normals_by_depth.get(&parent.depth).cloned();
        let hyperplane = generate_hyperplane(rows.view(), cached_normal, &mut self.rng);
        self.normals_by_depth.entry(parent.depth).or_insert_with(|| hyperplane.normal.clone());

        let projections = project_rows(rows.view(), &hyperplane.normal);
        let mut left_indices = Vec::new();
        let mut right_indices = Vec::new();
        for (&global_index, &proj) in indices.iter().zip(&projections) {
            if proj >= hyperplane.offset {
                left_indices.push(global_index);
            } else {
                right_indices.push(global_index);
            }
        }

        if left_indices.is_empty() || right_indices.is_empty() {
            log::warn!(
                "leaf {:?} at depth {} did not split: all {} points fell on one side of the hyperplane",
                leaf_id,
                parent.depth,
                indices.len()
            );
            return None;
        }

        let (left_id, right_id) = self.tree.split(leaf_id, left_indices.clone(), right_indices.clone(), hyperplane.offset);
        log::debug!("leaf {:?} split at depth {} into {} left / {} right", leaf_id, parent.depth, left_indices.len(), right_indices.len());

        Some(NodeSplitEvent {
            parent,
            left_child: self.tree.node(left_id),
            right_child: self.tree.node(right_id),
            left_indices,
            right_indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batch_from_rows_f64;

    fn store_with(rows: Vec<Vec<f64>>) -> DataStore {
        let mut store = DataStore::new();
        store.append(batch_from_rows_f64(rows)).unwrap();
        store
    }

    #[test]
    fn single_small_batch_stays_one_leaf() {
        let mut apt = Apt::new(AptConfig { leaf_capacity: 8, seed: 1 });
        let store = store_with(vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 2.0]]);
        let rows = store.range_f64(0, 3);
        let (insertions, splits) = apt.insert_batch(rows, 0, &store);
        assert_eq!(insertions.len(), 3);
        assert!(splits.is_empty());
        assert_eq!(apt.leaf_count(), 1);
    }

    #[test]
    fn overflowing_leaf_splits_into_two_nonempty_children() {
        let mut apt = Apt::new(AptConfig { leaf_capacity: 3, seed: 7 });
        let rows_vec: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64, 0.0]).collect();
        let store = store_with(rows_vec);
        let rows = store.range_f64(0, 6);
        let (_, splits) = apt.insert_batch(rows, 0, &store);

        assert_eq!(splits.len(), 1);
        let event = &splits[0];
        assert!(!event.left_indices.is_empty());
        assert!(!event.right_indices.is_empty());
        assert_eq!(event.left_indices.len() + event.right_indices.len(), 6);
        assert_eq!(apt.leaf_count(), 2);
    }

    #[test]
    fn one_oversized_batch_cascades_through_several_splits() {
        let mut apt = Apt::new(AptConfig { leaf_capacity: 2, seed: 5 });
        let rows_vec: Vec<Vec<f64>> = (0..32).map(|i| vec![i as f64, (i * 3 % 7) as f64]).collect();
        let store = store_with(rows_vec);
        let rows = store.range_f64(0, 32);
        let (_, splits) = apt.insert_batch(rows, 0, &store);

        assert!(splits.len() > 1, "a single batch of 32 points into a leaf of capacity 2 must split more than once");
        for leaf_id in apt.leaf_ids() {
            assert!(apt.tree.indices(leaf_id).len() <= apt.config.leaf_capacity);
        }
    }

    #[test]
    fn identical_points_do_not_split() {
        let mut apt = Apt::new(AptConfig { leaf_capacity: 3, seed: 3 });
        let rows_vec: Vec<Vec<f64>> = (0..6).map(|_| vec![5.0, 5.0]).collect();
        let store = store_with(rows_vec);
        let rows = store.range_f64(0, 6);
        let (_, splits) = apt.insert_batch(rows, 0, &store);

        assert!(splits.is_empty());
        assert_eq!(apt.leaf_count(), 1);
    }
}
