#![warn(clippy::all)]

//! Progressive ensemble clustering over streaming, high-dimensional data.
//!
//! An [`Ensemble`] maintains a forest of randomly-projected, lazily-split
//! trees (an [`AptForest`] of [`Apt`](tree::Apt) trees) and derives
//! micro-clusters from the co-occurrence of points across that forest as
//! batches arrive. See [`Ensemble::update`] for the entry point.

pub mod cluster_handler;
pub mod cooccurrence;
pub mod data;
pub mod ensemble;
pub mod error;
pub mod events;
pub mod flat_tree;
pub mod forest;
pub mod hyperplane;
pub mod micro_cluster;
pub mod number;
pub mod tree;

pub use data::{Batch, DataStore, Dtype};
pub use ensemble::{Ensemble, EnsembleConfig};
pub use error::Error;
pub use events::{ClusterUpdateEvent, InsertionEvent, MicroClusterCreationEvent, MicroClusterMergeEvent, MicroClusterSplitEvent, NodeSplitEvent};
pub use forest::{AptForest, ForestConfig};
pub use micro_cluster::{McId, MicroCluster};
pub use tree::{Apt, AptConfig};
