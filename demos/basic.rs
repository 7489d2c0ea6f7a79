//! Basic example demonstrating dualtree-kmeans-rs usage
//!
//! Run with: RUST_LOG=debug cargo run --example basic --release

use dualtree_kmeans_rs::{DualTreeKMeans, KMeansConfig, KMeansPlusPlus};
use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

fn main() {
    env_logger::init();

    println!("=== dualtree-kmeans-rs example ===\n");

    // Generate synthetic data: 3 clusters in 2D for easy visualization
    let n_samples = 3000;
    let n_features = 2;
    let n_clusters = 3;

    println!("Generating {} samples with {} features...", n_samples, n_features);

    let centers = [[-5.0, -5.0], [0.0, 5.0], [5.0, -5.0]];
    let noise = Array2::random((n_samples, n_features), Uniform::new(-1.0, 1.0));
    let data = Array2::from_shape_fn((n_samples, n_features), |(i, j)| {
        centers[i % n_clusters][j] + noise[[i, j]]
    });

    println!("True cluster centers:");
    for (i, center) in centers.iter().enumerate() {
        println!("  Cluster {}: ({:.2}, {:.2})", i, center[0], center[1]);
    }
    println!();

    let config = KMeansConfig::new(n_clusters)
        .with_max_iters(100)
        .with_tol(1e-6)
        .with_seed(42);

    println!("Running k-means with k={}...\n", n_clusters);

    let mut kmeans = DualTreeKMeans::with_config(config).with_seeding(KMeansPlusPlus);
    let labels = kmeans.fit_predict(&data.view()).expect("Training failed");

    println!("Learned centroids:");
    let centroids = kmeans.centroids().expect("model is fitted");
    for (i, centroid) in centroids.outer_iter().enumerate() {
        println!("  Centroid {}: ({:.4}, {:.4})", i, centroid[0], centroid[1]);
    }
    println!();

    let result = kmeans.result().expect("model is fitted");
    println!(
        "Stopped after {} iterations ({:?})",
        result.n_iterations, result.termination
    );
    println!(
        "Pairs: {} compared, {} pruned, {} carried over statically",
        result.stats.base_case_pairs, result.stats.pruned_pairs, result.stats.static_pairs
    );
    println!();

    println!("Cluster distribution:");
    for (i, count) in result.cluster_sizes.iter().enumerate() {
        println!(
            "  Cluster {}: {} samples ({:.1}%)",
            i,
            count,
            (*count as f64 / n_samples as f64) * 100.0
        );
    }
    println!();

    println!("First 10 sample assignments:");
    for i in 0..10 {
        println!(
            "  Sample {} at ({:.2}, {:.2}) -> Cluster {}",
            i,
            data[[i, 0]],
            data[[i, 1]],
            labels[i]
        );
    }

    println!("\n=== Done! ===");
}
