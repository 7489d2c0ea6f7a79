//! # dualtree-kmeans-rs
//!
//! Exact Lloyd k-means with dual-tree accelerated assignment, compatible with
//! ndarray.
//!
//! ## Features
//!
//! - **Dual-tree assignment**: A kd-tree over the points and a kd-tree over the
//!   centroids are traversed together, and whole blocks of (point, centroid)
//!   pairs are discarded when distance bounds prove them irrelevant
//! - **Static pruning**: Subtrees whose owner cannot change after the centroids
//!   move keep their assignment without being visited again
//! - **Exact**: Every iteration produces the same assignment as brute force
//! - **Parallel computation**: Uses rayon for per-point work
//! - **FAISS/scikit-learn compatible API**: Familiar `train()`, `fit()`, `predict()` interface
//!
//! ## Example
//!
//! ```rust
//! use dualtree_kmeans_rs::{DualTreeKMeans, KMeansConfig};
//! use ndarray::Array2;
//! use ndarray_rand::RandomExt;
//! use ndarray_rand::rand_distr::Uniform;
//!
//! // Generate random data
//! let data = Array2::random((1000, 4), Uniform::new(-1.0, 1.0));
//!
//! // Create and train the model
//! let mut kmeans = DualTreeKMeans::new(4, 10);
//! kmeans.train(&data.view()).unwrap();
//!
//! // Get cluster assignments
//! let labels = kmeans.predict(&data.view()).unwrap();
//! assert_eq!(labels.len(), 1000);
//! ```
//!
//! ## Custom Configuration
//!
//! ```rust
//! use dualtree_kmeans_rs::{DualTreeKMeans, KMeansConfig, KMeansPlusPlus};
//! use ndarray::Array2;
//! use ndarray_rand::RandomExt;
//! use ndarray_rand::rand_distr::Uniform;
//!
//! let data = Array2::random((5000, 3), Uniform::new(-1.0, 1.0));
//!
//! let config = KMeansConfig {
//!     k: 50,
//!     max_iters: 100,
//!     tol: 1e-6,
//!     seed: 42,
//!     leaf_size: 32,
//!     centroid_leaf_size: 1,
//!     static_pruning: true,
//!     verify: false,
//! };
//!
//! let mut kmeans = DualTreeKMeans::with_config(config).with_seeding(KMeansPlusPlus);
//! let labels = kmeans.fit_predict(&data.view()).unwrap();
//! ```
//!
//! ## Functional interface
//!
//! ```rust
//! use dualtree_kmeans_rs::kmeans;
//! use ndarray::array;
//!
//! let points = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
//! let (centroids, assignments, iterations) = kmeans(&points.view(), 2, 25, 1e-8).unwrap();
//! assert_eq!(centroids.nrows(), 2);
//! assert_eq!(assignments.len(), 6);
//! assert!(iterations >= 1);
//! ```
//!
//! ## Logging
//!
//! Progress is reported through the `log` facade: one `info` line per run,
//! per-iteration `debug` lines with pruning counters, and a `warn` when a
//! cluster stays empty.

mod algorithm;
mod config;
mod distance;
mod error;
mod kmeans;
mod reduce;
mod seeding;
mod stat;
mod traversal;
mod tree;

pub use algorithm::{
    kmeans, kmeans_brute_force, kmeans_dual_tree, kmeans_with_seeding, KMeansResult, Lloyd, Phase,
};
pub use config::KMeansConfig;
pub use distance::{brute_force_assign, euclidean};
pub use error::{KMeansError, KMeansWarning};
pub use kmeans::DualTreeKMeans;
pub use reduce::{reduce, Reduction};
pub use seeding::{GivenCentroids, KMeansPlusPlus, RandomSeeding, Seeding};
pub use stat::NodeStat;
pub use traversal::{
    reduce_bounds, verify_assignments, BoundSummary, DualTreeAssigner, PointBounds,
    TraversalStats,
};
pub use tree::{Bound, Node, NodeId, SpaceTree};
