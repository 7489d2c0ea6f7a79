/// Configuration for the DualTreeKMeans algorithm
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    /// Number of clusters
    pub k: usize,

    /// Maximum number of iterations
    pub max_iters: usize,

    /// Convergence tolerance. When the total centroid shift is below this threshold,
    /// the algorithm stops early. Set to negative value to disable early stopping.
    pub tol: f64,

    /// Random seed for centroid initialization
    pub seed: u64,

    /// Maximum number of points stored in a leaf of the point tree.
    pub leaf_size: usize,

    /// Maximum number of centroids stored in a leaf of the centroid tree.
    pub centroid_leaf_size: usize,

    /// Carry ownership of stable subtrees across iterations instead of
    /// re-traversing them.
    pub static_pruning: bool,

    /// Cross-check every assignment pass against brute force and panic on
    /// disagreement. Expensive; meant for tests and debugging.
    pub verify: bool,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 8,
            max_iters: 25,
            tol: 1e-8,
            seed: 0,
            leaf_size: 20,
            centroid_leaf_size: 1,
            static_pruning: true,
            verify: false,
        }
    }
}

impl KMeansConfig {
    /// Create a new configuration with the specified number of clusters
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    /// Set the maximum number of iterations
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Set the convergence tolerance
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the point-tree leaf size
    pub fn with_leaf_size(mut self, leaf_size: usize) -> Self {
        self.leaf_size = leaf_size;
        self
    }

    /// Set the centroid-tree leaf size
    pub fn with_centroid_leaf_size(mut self, leaf_size: usize) -> Self {
        self.centroid_leaf_size = leaf_size;
        self
    }

    /// Enable or disable static pruning carry-over
    pub fn with_static_pruning(mut self, enabled: bool) -> Self {
        self.static_pruning = enabled;
        self
    }

    /// Enable or disable brute-force verification of every pass
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let config = KMeansConfig::new(4)
            .with_max_iters(7)
            .with_tol(-1.0)
            .with_seed(3)
            .with_leaf_size(5)
            .with_centroid_leaf_size(2)
            .with_static_pruning(false)
            .with_verify(true);

        assert_eq!(config.k, 4);
        assert_eq!(config.max_iters, 7);
        assert_eq!(config.tol, -1.0);
        assert_eq!(config.seed, 3);
        assert_eq!(config.leaf_size, 5);
        assert_eq!(config.centroid_leaf_size, 2);
        assert!(!config.static_pruning);
        assert!(config.verify);
    }
}
