use thiserror::Error;

/// Error types for the dual-tree k-means library
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KMeansError {
    /// The dataset contains no points
    #[error("Dataset is empty")]
    EmptyDataset,

    /// The number of clusters k is invalid (must be in 1..=n_points)
    #[error("Invalid k value: {0}")]
    InvalidK(String),

    /// The spatial index could not be built over the given points.
    /// Callers can fall back to brute-force assignment.
    #[error("Tree construction failed: {0}")]
    TreeConstructionFailure(String),

    /// Model has not been fitted yet
    #[error("Model has not been fitted. Call train() or fit() first.")]
    NotFitted,

    /// Dimension mismatch between data and model
    #[error("Dimension mismatch: {0}")]
    InvalidDimensions(String),
}

/// Recoverable conditions reported alongside a successful run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KMeansWarning {
    /// A cluster received no points for several consecutive iterations.
    /// Its previous centroid was kept.
    #[error("Cluster {cluster} has been empty for {empty_iterations} consecutive iterations")]
    NumericalDegeneracy {
        cluster: usize,
        empty_iterations: usize,
    },
}
