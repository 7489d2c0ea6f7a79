use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;

/// Euclidean distance between two vectors.
///
/// Every exact distance in the crate goes through this function, so the
/// tree traversal and the brute-force reference agree bit for bit.
#[inline]
pub fn euclidean(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Find the nearest centroid of a single point by scanning every centroid.
///
/// Ties resolve to the lowest cluster index.
pub fn nearest_centroid(point: &ArrayView1<f64>, centroids: &ArrayView2<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (j, centroid) in centroids.outer_iter().enumerate() {
        let dist = euclidean(point, &centroid);
        if dist < best.1 {
            best = (j, dist);
        }
    }
    best
}

/// Assign every point to its nearest centroid by brute force.
///
/// This is the non-accelerated baseline: callers fall back to it when a tree
/// cannot be built, and verification mode compares every dual-tree pass against it.
pub fn brute_force_assign(data: &ArrayView2<f64>, centroids: &ArrayView2<f64>) -> Array1<usize> {
    let labels: Vec<usize> = (0..data.nrows())
        .into_par_iter()
        .map(|i| nearest_centroid(&data.row(i), centroids).0)
        .collect();

    Array1::from_vec(labels)
}

/// Distance moved by each centroid between two iterations
pub fn centroid_movements(
    old_centroids: &ArrayView2<f64>,
    new_centroids: &ArrayView2<f64>,
) -> Vec<f64> {
    (0..old_centroids.nrows())
        .into_par_iter()
        .map(|i| euclidean(&old_centroids.row(i), &new_centroids.row(i)))
        .collect()
}

/// Compute centroid shift (sum of L2 norms of centroid movements)
pub fn compute_centroid_shift(
    old_centroids: &ArrayView2<f64>,
    new_centroids: &ArrayView2<f64>,
) -> f64 {
    centroid_movements(old_centroids, new_centroids).iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_euclidean() {
        let a = array![0.0, 0.0, 0.0];
        let b = array![1.0, 2.0, 2.0];

        assert_relative_eq!(euclidean(&a.view(), &b.view()), 3.0, epsilon = 1e-12);
        assert_eq!(euclidean(&a.view(), &a.view()), 0.0);
    }

    #[test]
    fn test_brute_force_assign() {
        let data = array![[0.0, 0.0], [10.0, 10.0], [5.0, 5.0], [9.0, 8.0]];
        let centroids = array![[0.0, 0.0], [10.0, 10.0]];

        let labels = brute_force_assign(&data.view(), &centroids.view());

        assert_eq!(labels[0], 0);
        assert_eq!(labels[1], 1);
        // (5,5) is equidistant; the lowest index wins
        assert_eq!(labels[2], 0);
        assert_eq!(labels[3], 1);
    }

    #[test]
    fn test_nearest_centroid_tie_takes_lowest_index() {
        let centroids = array![[1.0], [-1.0], [1.0]];
        let point = array![0.0];

        let (j, dist) = nearest_centroid(&point.view(), &centroids.view());
        assert_eq!(j, 0);
        assert_relative_eq!(dist, 1.0);
    }

    #[test]
    fn test_centroid_shift() {
        let old = array![[0.0, 0.0], [1.0, 1.0]];
        let new = array![[1.0, 0.0], [1.0, 4.0]];

        let movements = centroid_movements(&old.view(), &new.view());
        assert_relative_eq!(movements[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(movements[1], 3.0, epsilon = 1e-12);

        let shift = compute_centroid_shift(&old.view(), &new.view());
        assert_relative_eq!(shift, 4.0, epsilon = 1e-12);
    }
}
