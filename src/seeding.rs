//! Initial centroid selection.

use crate::distance::euclidean;
use crate::error::KMeansError;
use ndarray::{Array2, ArrayView2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Strategy for choosing the initial centroids.
pub trait Seeding: Send + Sync {
    /// Return a `(k, n_features)` matrix of initial centroids for `data`.
    fn seed(
        &self,
        data: &ArrayView2<f64>,
        k: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<Array2<f64>, KMeansError>;
}

/// Pick `k` distinct data points uniformly at random.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSeeding;

impl Seeding for RandomSeeding {
    fn seed(
        &self,
        data: &ArrayView2<f64>,
        k: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<Array2<f64>, KMeansError> {
        let indices: Vec<usize> = (0..data.nrows()).collect();
        let selected: Vec<usize> = indices.choose_multiple(rng, k).cloned().collect();

        let mut centroids = Array2::zeros((k, data.ncols()));
        for (centroid_idx, &data_idx) in selected.iter().enumerate() {
            centroids.row_mut(centroid_idx).assign(&data.row(data_idx));
        }

        Ok(centroids)
    }
}

/// k-means++: each new centroid is sampled with probability proportional to
/// its squared distance from the nearest centroid chosen so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct KMeansPlusPlus;

impl Seeding for KMeansPlusPlus {
    fn seed(
        &self,
        data: &ArrayView2<f64>,
        k: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<Array2<f64>, KMeansError> {
        let n = data.nrows();
        let mut centroids = Array2::zeros((k, data.ncols()));

        let first = rng.gen_range(0..n);
        centroids.row_mut(0).assign(&data.row(first));

        let mut nearest: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| euclidean(&data.row(i), &data.row(first)))
            .collect();

        for j in 1..k {
            let weights: Vec<f64> = nearest.iter().map(|d| d * d).collect();
            let chosen = match WeightedIndex::new(&weights) {
                Ok(dist) => dist.sample(rng),
                // every point coincides with a chosen centroid
                Err(_) => rng.gen_range(0..n),
            };
            centroids.row_mut(j).assign(&data.row(chosen));

            let centroid = centroids.row(j);
            nearest.par_iter_mut().enumerate().for_each(|(i, best)| {
                *best = best.min(euclidean(&data.row(i), &centroid));
            });
        }

        Ok(centroids)
    }
}

/// Use caller-supplied centroids as-is.
#[derive(Debug, Clone)]
pub struct GivenCentroids(pub Array2<f64>);

impl Seeding for GivenCentroids {
    fn seed(
        &self,
        data: &ArrayView2<f64>,
        k: usize,
        _rng: &mut ChaCha8Rng,
    ) -> Result<Array2<f64>, KMeansError> {
        if self.0.nrows() != k {
            return Err(KMeansError::InvalidK(format!(
                "{} initial centroids given for k = {}",
                self.0.nrows(),
                k
            )));
        }
        if self.0.ncols() != data.ncols() {
            return Err(KMeansError::InvalidDimensions(format!(
                "Expected {} features, got {}",
                data.ncols(),
                self.0.ncols()
            )));
        }
        Ok(self.0.clone())
    }
}
