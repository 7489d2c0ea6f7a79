use crate::algorithm::{kmeans_with_seeding, KMeansResult};
use crate::config::KMeansConfig;
use crate::error::KMeansError;
use crate::reduce::assignments;
use crate::seeding::{RandomSeeding, Seeding};
use crate::traversal::DualTreeAssigner;
use crate::tree::SpaceTree;
use ndarray::{Array1, Array2, ArrayView2};

/// Dual-tree accelerated k-means clustering compatible with ndarray.
///
/// Every Lloyd iteration assigns points through a simultaneous traversal of a
/// tree over the points and a tree over the centroids, producing exactly the
/// assignment brute force would. It provides an API similar to FAISS and
/// scikit-learn.
///
/// # Example
///
/// ```
/// use dualtree_kmeans_rs::DualTreeKMeans;
/// use ndarray::Array2;
/// use ndarray_rand::RandomExt;
/// use ndarray_rand::rand_distr::Uniform;
///
/// // Generate random data
/// let data = Array2::random((1000, 8), Uniform::new(-1.0, 1.0));
///
/// // Create and train the model
/// let mut kmeans = DualTreeKMeans::new(8, 10);
/// kmeans.train(&data.view()).unwrap();
///
/// // Get cluster assignments
/// let labels = kmeans.predict(&data.view()).unwrap();
/// ```
pub struct DualTreeKMeans {
    /// Model configuration
    config: KMeansConfig,

    /// Number of features (dimensions)
    d: usize,

    /// Initial centroid selection
    seeding: Box<dyn Seeding>,

    /// Trained centroids (None if not yet fitted)
    centroids: Option<Array2<f64>>,

    /// Full output of the last training run
    result: Option<KMeansResult>,
}

impl DualTreeKMeans {
    /// Create a new DualTreeKMeans instance with default configuration.
    ///
    /// # Arguments
    ///
    /// * `d` - Number of features (dimensions) in the data
    /// * `k` - Number of clusters
    ///
    /// An invalid `k` is reported by the first call to `train()`.
    pub fn new(d: usize, k: usize) -> Self {
        Self {
            config: KMeansConfig::new(k),
            d,
            seeding: Box::new(RandomSeeding),
            centroids: None,
            result: None,
        }
    }

    /// Create a new DualTreeKMeans instance with custom configuration.
    ///
    /// The number of features is taken from the first training call.
    pub fn with_config(config: KMeansConfig) -> Self {
        Self {
            d: 0,
            config,
            seeding: Box::new(RandomSeeding),
            centroids: None,
            result: None,
        }
    }

    /// Replace the initial centroid strategy.
    pub fn with_seeding<S: Seeding + 'static>(mut self, seeding: S) -> Self {
        self.seeding = Box::new(seeding);
        self
    }

    /// Train the k-means model on the given data.
    ///
    /// This method mimics the FAISS `train()` API.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The data is empty
    /// - `k` is zero or larger than the number of samples
    /// - Data dimensions don't match (for subsequent calls)
    /// - The point tree cannot be built (non-finite values, zero features)
    pub fn train(&mut self, data: &ArrayView2<f64>) -> Result<(), KMeansError> {
        let n_features = data.ncols();

        // Set dimensions on first call, validate on subsequent calls
        if self.d == 0 {
            self.d = n_features;
        } else if n_features != self.d {
            return Err(KMeansError::InvalidDimensions(format!(
                "Expected {} features, got {}",
                self.d, n_features
            )));
        }

        let result = kmeans_with_seeding(data, &self.config, self.seeding.as_ref())?;

        self.centroids = Some(result.centroids.clone());
        self.result = Some(result);
        Ok(())
    }

    /// Fit the model to the data. Equivalent to `train()`.
    pub fn fit(&mut self, data: &ArrayView2<f64>) -> Result<&mut Self, KMeansError> {
        self.train(data)?;
        Ok(self)
    }

    /// Predict cluster assignments for new data.
    ///
    /// Runs a single dual-tree pass over `data` against the trained centroids.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The model has not been fitted yet
    /// - Data dimensions don't match the training data
    /// - The data is empty
    pub fn predict(&self, data: &ArrayView2<f64>) -> Result<Array1<usize>, KMeansError> {
        let centroids = self.centroids.as_ref().ok_or(KMeansError::NotFitted)?;

        let n_features = data.ncols();
        if n_features != self.d {
            return Err(KMeansError::InvalidDimensions(format!(
                "Expected {} features, got {}",
                self.d, n_features
            )));
        }

        let mut assigner = DualTreeAssigner::new(*data, self.config.leaf_size, false)?;
        let centroid_tree = SpaceTree::build(&centroids.view(), self.config.centroid_leaf_size)?;
        let stats = assigner.assign(&centroids.view(), &centroid_tree);
        log::debug!(
            "Predicted {} points: {} pairs pruned of {}",
            data.nrows(),
            stats.pruned_pairs,
            stats.total_pairs()
        );

        Ok(assignments(assigner.tree(), assigner.bounds()))
    }

    /// Fit the model and return the assignments of the final iteration.
    pub fn fit_predict(&mut self, data: &ArrayView2<f64>) -> Result<Array1<usize>, KMeansError> {
        self.train(data)?;
        let result = self.result.as_ref().ok_or(KMeansError::NotFitted)?;
        Ok(result.assignments.clone())
    }

    /// Get the centroids of the fitted model.
    pub fn centroids(&self) -> Option<&Array2<f64>> {
        self.centroids.as_ref()
    }

    /// Iterations, termination reason, cluster sizes, warnings and traversal
    /// counters of the last training run.
    pub fn result(&self) -> Option<&KMeansResult> {
        self.result.as_ref()
    }

    /// Get the number of clusters.
    pub fn k(&self) -> usize {
        self.config.k
    }

    /// Get the number of features (dimensions).
    pub fn d(&self) -> usize {
        self.d
    }

    /// Get the configuration.
    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::brute_force_assign;
    use crate::seeding::{GivenCentroids, KMeansPlusPlus};
    use ndarray::{array, Array2};
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    #[test]
    fn test_dualtree_kmeans_new() {
        let kmeans = DualTreeKMeans::new(128, 10);
        assert_eq!(kmeans.k(), 10);
        assert_eq!(kmeans.d(), 128);
        assert!(kmeans.centroids().is_none());
        assert!(kmeans.result().is_none());
    }

    #[test]
    fn test_dualtree_kmeans_train() {
        let data = Array2::random((500, 6), Uniform::new(-1.0, 1.0));
        let mut kmeans = DualTreeKMeans::new(6, 5);

        kmeans.train(&data.view()).unwrap();

        let centroids = kmeans.centroids().unwrap();
        assert_eq!(centroids.nrows(), 5);
        assert_eq!(centroids.ncols(), 6);

        let result = kmeans.result().unwrap();
        assert!(result.termination.is_terminal());
        assert_eq!(result.cluster_sizes.iter().sum::<usize>(), 500);
    }

    #[test]
    fn test_dualtree_kmeans_fit() {
        let data = Array2::random((500, 4), Uniform::new(-1.0, 1.0));
        let mut kmeans = DualTreeKMeans::new(4, 5).with_seeding(KMeansPlusPlus);

        let result = kmeans.fit(&data.view());
        assert!(result.is_ok());
        assert!(kmeans.centroids().is_some());
    }

    #[test]
    fn test_dualtree_kmeans_predict() {
        let train_data = Array2::random((500, 5), Uniform::new(-1.0, 1.0));
        let test_data = Array2::random((100, 5), Uniform::new(-1.0, 1.0));

        let mut kmeans = DualTreeKMeans::new(5, 8);
        kmeans.train(&train_data.view()).unwrap();

        let labels = kmeans.predict(&test_data.view()).unwrap();
        assert_eq!(labels.len(), 100);

        let centroids = kmeans.centroids().unwrap();
        assert_eq!(labels, brute_force_assign(&test_data.view(), &centroids.view()));
    }

    #[test]
    fn test_dualtree_kmeans_fit_predict() {
        let data = Array2::random((300, 3), Uniform::new(-1.0, 1.0));
        let mut kmeans = DualTreeKMeans::new(3, 4);

        let labels = kmeans.fit_predict(&data.view()).unwrap();
        assert_eq!(labels.len(), 300);
        assert!(labels.iter().all(|&label| label < 4));
        assert!(kmeans.centroids().is_some());
    }

    #[test]
    fn test_dualtree_kmeans_given_centroids() {
        let data = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let mut kmeans = DualTreeKMeans::new(1, 2).with_seeding(GivenCentroids(array![[0.0], [10.0]]));

        let labels = kmeans.fit_predict(&data.view()).unwrap();
        assert_eq!(labels, array![0, 0, 0, 1, 1, 1]);
        assert_eq!(kmeans.centroids().unwrap(), &array![[1.0], [11.0]]);
    }

    #[test]
    fn test_dualtree_kmeans_predict_before_fit() {
        let data = Array2::random((100, 8), Uniform::new(-1.0, 1.0));
        let kmeans = DualTreeKMeans::new(8, 5);

        let result = kmeans.predict(&data.view());
        assert!(matches!(result, Err(KMeansError::NotFitted)));
    }

    #[test]
    fn test_dualtree_kmeans_dimension_mismatch() {
        let train_data = Array2::random((100, 8), Uniform::new(-1.0, 1.0));
        let test_data = Array2::random((50, 16), Uniform::new(-1.0, 1.0));

        let mut kmeans = DualTreeKMeans::new(8, 5);
        kmeans.train(&train_data.view()).unwrap();

        let result = kmeans.predict(&test_data.view());
        assert!(matches!(result, Err(KMeansError::InvalidDimensions(_))));
    }

    #[test]
    fn test_dualtree_kmeans_k_zero() {
        let data = Array2::random((10, 2), Uniform::new(-1.0, 1.0));
        let mut kmeans = DualTreeKMeans::new(2, 0);

        let result = kmeans.train(&data.view());
        assert!(matches!(result, Err(KMeansError::InvalidK(_))));
        assert!(kmeans.centroids().is_none());
    }
}
