//! The APT Forest: an ensemble of independently-seeded [`Apt`] trees,
//! updated in parallel.
//!
//! Grounded in `original_source/prodr/apforest/forest.py`. Each tree is
//! built with the same [`AptConfig`] shape but a distinct seed derived from
//! the forest's own seed, so a forest's behavior is fully determined by one
//! top-level seed. Per-tree work fans out over a `rayon` thread pool sized
//! `min(16, n_trees)`, built once in [`AptForest::new`] and reused across
//! every batch rather than rebuilt per call.

use ndarray::Array2;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::data::DataStore;
use crate::events::{InsertionEvent, NodeSplitEvent};
use crate::tree::{Apt, AptConfig};

/// Forest-level tuning.
#[derive(Debug, Clone, Copy)]
pub struct ForestConfig {
    /// Number of trees in the ensemble.
    pub n_trees: usize,
    /// Per-tree leaf capacity, shared by every tree.
    pub leaf_capacity: usize,
    /// Seeds the forest; tree `i` is seeded with `seed.wrapping_add(i)`.
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self { n_trees: 10, leaf_capacity: 8, seed: 0 }
    }
}

/// The outcome of routing one batch through every tree in the forest.
pub struct ForestUpdate {
    /// Per-tree insertion events, indexed the same as the forest's trees.
    pub insertions_by_tree: Vec<Vec<InsertionEvent>>,
    /// Per-tree split events, indexed the same as the forest's trees.
    pub splits_by_tree: Vec<Vec<NodeSplitEvent>>,
}

pub struct AptForest {
    config: ForestConfig,
    trees: Vec<Apt>,
    pool: ThreadPool,
}

impl AptForest {
    /// Builds an ensemble of `config.n_trees` empty trees and a sized
    /// thread pool for updating them in parallel.
    pub fn new(config: ForestConfig) -> Self {
        let trees = (0..config.n_trees)
            .map(|i| {
                Apt::new(AptConfig {
                    leaf_capacity: config.leaf_capacity,
                    seed: config.seed.wrapping_add(i as u64),
                })
            })
            .collect();
        let pool_size = config.n_trees.max(1).min(16);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(pool_size)
            .build()
            .expect("thread pool construction with a positive thread count does not fail");
        Self { config, trees, pool }
    }

    /// Number of trees in the ensemble.
    pub fn n_trees(&self) -> usize {
        self.config.n_trees
    }

    /// The ensemble's trees, for read-only inspection (e.g. leaf groupings).
    pub fn trees(&self) -> &[Apt] {
        &self.trees
    }

    /// Number of leaves the first tree currently has. Used to gate
    /// micro-cluster initialization: the cluster handler does not start
    /// tracking micro-clusters until this exceeds its configured threshold.
    pub fn first_tree_leaf_count(&self) -> usize {
        self.trees.first().map_or(0, Apt::leaf_count)
    }

    /// Routes `rows` (global indices `start..start+rows.nrows()`) through
    /// every tree in parallel, returning each tree's insertion and split
    /// events.
    pub fn insert_batch(&mut self, rows: &Array2<f64>, start: usize, store: &DataStore) -> ForestUpdate {
        let results: Vec<(Vec<InsertionEvent>, Vec<NodeSplitEvent>)> = self.pool.install(|| {
            self.trees
                .par_iter_mut()
                .map(|tree| tree.insert_batch(rows.clone(), start, store))
                .collect()
        });

        let mut insertions_by_tree = Vec::with_capacity(results.len());
        let mut splits_by_tree = Vec::with_capacity(results.len());
        for (insertions, splits) in results {
            insertions_by_tree.push(insertions);
            splits_by_tree.push(splits);
        }
        ForestUpdate { insertions_by_tree, splits_by_tree }
    }

    /// For each tree, the groups of global indices sharing a leaf. Used by
    /// the cluster handler to find co-occurring points across the whole
    /// ensemble.
    pub fn leaf_index_groups(&self) -> Vec<Vec<Vec<usize>>> {
        self.trees.iter().map(Apt::leaf_index_groups).collect()
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
    fn insert_batch_fans_out_across_all_trees() {
        let mut forest = AptForest::new(ForestConfig { n_trees: 4, leaf_capacity: 100, seed: 42 });
        let store = store_with(vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 2.0]]);
        let rows = store.range_f64(0, 3);

        let update = forest.insert_batch(&rows, 0, &store);
        assert_eq!(update.insertions_by_tree.len(), 4);
        for insertions in &update.insertions_by_tree {
            assert_eq!(insertions.len(), 3);
        }
    }

    #[test]
    fn different_tree_seeds_can_diverge_in_split_behavior() {
        let mut forest = AptForest::new(ForestConfig { n_trees: 8, leaf_capacity: 2, seed: 1 });
        let rows_vec: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let store = store_with(rows_vec);
        let rows = store.range_f64(0, 10);

        let update = forest.insert_batch(&rows, 0, &store);
        let total_splits: usize = update.splits_by_tree.iter().map(Vec::len).sum();
        assert!(total_splits > 0);
    }

    #[test]
    fn leaf_index_groups_has_one_outer_entry_per_tree() {
        let forest = AptForest::new(ForestConfig { n_trees: 3, leaf_capacity: 8, seed: 0 });
        assert_eq!(forest.leaf_index_groups().len(), 3);
    }
}
