//! Turn the ownership left by a traversal pass into next-iteration centroids.

use crate::traversal::PointBounds;
use crate::tree::{NodeId, SpaceTree};
use ndarray::{Array1, Array2, ArrayView2};

/// Output of the reducer for one iteration
#[derive(Debug, Clone)]
pub struct Reduction {
    /// Per-cluster means; empty clusters keep their previous centroid
    pub centroids: Array2<f64>,
    /// Cluster index of every point
    pub assignments: Array1<usize>,
    /// Number of points per cluster
    pub counts: Vec<usize>,
    /// Clusters that received no points
    pub empty_clusters: Vec<usize>,
}

/// Walk the point tree once, visiting whole subtrees where ownership is
/// uniform and single points elsewhere.
fn walk<F>(tree: &SpaceTree, bounds: &PointBounds, id: NodeId, visit: &mut F)
where
    F: FnMut(NodeId, Option<usize>, usize),
{
    let node = tree.node(id);
    if let Some(owner) = node.stat.owner {
        visit(id, None, owner);
    } else if node.is_leaf() {
        for &i in tree.points(id) {
            let owner = bounds
                .owner(i)
                .unwrap_or_else(|| panic!("point {} has no owner after a full pass", i));
            visit(id, Some(i), owner);
        }
    } else {
        for &child in node.children() {
            walk(tree, bounds, child, visit);
        }
    }
}

/// Cluster index of every point after a pass.
pub fn assignments(tree: &SpaceTree, bounds: &PointBounds) -> Array1<usize> {
    let mut labels = Array1::zeros(tree.num_points());
    walk(tree, bounds, tree.root(), &mut |id, point, owner| match point {
        Some(i) => labels[i] = owner,
        None => tree.points(id).iter().for_each(|&i| labels[i] = owner),
    });
    labels
}

/// Accumulate per-cluster sums and counts and produce the new centroids.
///
/// Uniformly owned subtrees contribute `count * centroid` in one step. A cluster
/// with no points keeps `previous`'s row.
pub fn reduce(tree: &SpaceTree, bounds: &PointBounds, data: &ArrayView2<f64>, previous: &ArrayView2<f64>) -> Reduction {
    let (k, d) = previous.dim();
    let mut sums: Array2<f64> = Array2::zeros((k, d));
    let mut counts = vec![0usize; k];
    let mut labels = Array1::zeros(tree.num_points());

    walk(tree, bounds, tree.root(), &mut |id, point, owner| match point {
        Some(i) => {
            sums.row_mut(owner).scaled_add(1.0, &data.row(i));
            counts[owner] += 1;
            labels[i] = owner;
        }
        None => {
            let node = tree.node(id);
            sums.row_mut(owner)
                .scaled_add(node.count() as f64, &node.stat.centroid);
            counts[owner] += node.count();
            tree.points(id).iter().for_each(|&i| labels[i] = owner);
        }
    });

    let mut centroids = previous.to_owned();
    let mut empty_clusters = Vec::new();
    for (cluster_idx, &count) in counts.iter().enumerate() {
        if count > 0 {
            let mean = &sums.row(cluster_idx) / count as f64;
            centroids.row_mut(cluster_idx).assign(&mean);
        } else {
            empty_clusters.push(cluster_idx);
        }
    }

    Reduction {
        centroids,
        assignments: labels,
        counts,
        empty_clusters,
    }
}
