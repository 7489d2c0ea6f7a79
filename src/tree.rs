//! Arena-allocated space-partitioning tree.
//!
//! Nodes live in a flat `Vec` and refer to each other through [`NodeId`]
//! indices. Points are never moved: the tree keeps a permutation of dataset
//! indices, and every node owns a contiguous range of it. Splits are median
//! splits on the widest dimension, so the depth is `O(log n)`.

use crate::distance::euclidean;
use crate::error::KMeansError;
use crate::stat::NodeStat;
use ndarray::{ArrayView1, ArrayView2};

/// Relative slack applied to triangle-inequality bounds that mix several
/// rounded distances.
pub const BOUND_SLACK: f64 = 1e-12;

/// Index of a node inside its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Axis-aligned bounding box of a set of points.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    lo: Vec<f64>,
    hi: Vec<f64>,
}

impl Bound {
    /// Smallest box containing the given rows of `data`.
    pub fn enclosing(data: &ArrayView2<f64>, indices: &[usize]) -> Self {
        let d = data.ncols();
        let mut lo = vec![f64::INFINITY; d];
        let mut hi = vec![f64::NEG_INFINITY; d];
        for &i in indices {
            for (j, &x) in data.row(i).iter().enumerate() {
                lo[j] = lo[j].min(x);
                hi[j] = hi[j].max(x);
            }
        }
        Self { lo, hi }
    }

    pub fn dim(&self) -> usize {
        self.lo.len()
    }

    /// Dimension with the largest extent, if that extent is non-zero.
    pub fn widest_dimension(&self) -> Option<usize> {
        let (dim, width) = self
            .lo
            .iter()
            .zip(self.hi.iter())
            .map(|(lo, hi)| hi - lo)
            .enumerate()
            .fold((0, 0.0), |best, (j, w)| if w > best.1 { (j, w) } else { best });
        (width > 0.0).then_some(dim)
    }

    /// Minimum possible distance between a point in `self` and a point in `other`.
    ///
    /// Never exceeds the [`euclidean`] distance of any such pair, including
    /// rounding, because every term is a monotone function of the coordinates.
    pub fn min_distance(&self, other: &Bound) -> f64 {
        (0..self.dim())
            .map(|j| {
                let gap = (other.lo[j] - self.hi[j])
                    .max(self.lo[j] - other.hi[j])
                    .max(0.0);
                gap * gap
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Minimum possible distance between a point in `self` and `point`.
    pub fn min_distance_to_point(&self, point: &ArrayView1<f64>) -> f64 {
        point
            .iter()
            .enumerate()
            .map(|(j, &x)| {
                let gap = (x - self.hi[j]).max(self.lo[j] - x).max(0.0);
                gap * gap
            })
            .sum::<f64>()
            .sqrt()
    }

    pub fn contains(&self, point: &ArrayView1<f64>) -> bool {
        point
            .iter()
            .enumerate()
            .all(|(j, &x)| self.lo[j] <= x && x <= self.hi[j])
    }
}

/// A node of a [`SpaceTree`].
#[derive(Debug, Clone)]
pub struct Node {
    bound: Bound,
    begin: usize,
    count: usize,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    furthest_descendant_distance: f64,
    /// Bound and pruning state of this node.
    pub stat: NodeStat,
}

impl Node {
    pub fn bound(&self) -> &Bound {
        &self.bound
    }

    /// Number of points in the subtree.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Upper bound on the distance from the statistic's centroid to any
    /// point of the subtree.
    pub fn furthest_descendant_distance(&self) -> f64 {
        self.furthest_descendant_distance
    }
}

/// Static hierarchical index over a fixed set of points.
#[derive(Debug, Clone)]
pub struct SpaceTree {
    nodes: Vec<Node>,
    indices: Vec<usize>,
    leaf_size: usize,
}

impl SpaceTree {
    /// Build a tree over the rows of `data`.
    ///
    /// # Errors
    ///
    /// - `EmptyDataset` if `data` has no rows
    /// - `TreeConstructionFailure` if the points have no dimensions or any
    ///   coordinate is not finite
    pub fn build(data: &ArrayView2<f64>, leaf_size: usize) -> Result<Self, KMeansError> {
        let n = data.nrows();
        if n == 0 {
            return Err(KMeansError::EmptyDataset);
        }
        if data.ncols() == 0 {
            return Err(KMeansError::TreeConstructionFailure(
                "points have zero dimensions".to_string(),
            ));
        }
        if let Some(((i, j), x)) = data.indexed_iter().find(|(_, x)| !x.is_finite()) {
            return Err(KMeansError::TreeConstructionFailure(format!(
                "coordinate ({}, {}) is not finite: {}",
                i, j, x
            )));
        }

        let mut tree = Self {
            nodes: Vec::with_capacity(2 * n / leaf_size.max(1) + 1),
            indices: (0..n).collect(),
            leaf_size: leaf_size.max(1),
        };
        tree.build_node(data, 0, n, None);

        log::trace!(
            "Built tree: {} points, {} nodes, leaf size {}",
            n,
            tree.nodes.len(),
            tree.leaf_size
        );

        Ok(tree)
    }

    fn build_node(
        &mut self,
        data: &ArrayView2<f64>,
        begin: usize,
        count: usize,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let bound = Bound::enclosing(data, &self.indices[begin..begin + count]);
        let split = if count > self.leaf_size {
            bound.widest_dimension()
        } else {
            None
        };

        self.nodes.push(Node {
            bound,
            begin,
            count,
            parent,
            children: Vec::new(),
            furthest_descendant_distance: 0.0,
            stat: NodeStat::default(),
        });

        // All-duplicate sets have no widest dimension and stay a single leaf.
        if let Some(dim) = split {
            let mid = count / 2;
            self.indices[begin..begin + count].select_nth_unstable_by(mid, |&a, &b| {
                data[[a, dim]].total_cmp(&data[[b, dim]])
            });
            let left = self.build_node(data, begin, mid, Some(id));
            let right = self.build_node(data, begin + mid, count - mid, Some(id));
            self.nodes[id.0].children = vec![left, right];
        }

        let stat = NodeStat::from_node(self, data, id);
        let radius = self.radius_around(data, id, &stat.centroid.view());
        let node = &mut self.nodes[id.0];
        node.stat = stat;
        node.furthest_descendant_distance = radius;

        id
    }

    /// Leaves measure the exact radius; internal nodes bound it through their children.
    fn radius_around(&self, data: &ArrayView2<f64>, id: NodeId, center: &ArrayView1<f64>) -> f64 {
        let node = self.node(id);
        if node.is_leaf() {
            self.points(id)
                .iter()
                .map(|&i| euclidean(center, &data.row(i)))
                .fold(0.0, f64::max)
        } else {
            let radius = node
                .children
                .iter()
                .map(|&c| {
                    let child = self.node(c);
                    euclidean(center, &child.stat.centroid.view())
                        + child.furthest_descendant_distance
                })
                .fold(0.0, f64::max);
            radius * (1.0 + BOUND_SLACK)
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of indexed points.
    pub fn num_points(&self) -> usize {
        self.indices.len()
    }

    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    /// All node ids in construction (pre-)order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Dataset indices of every point in the subtree.
    pub fn points(&self, id: NodeId) -> &[usize] {
        let node = self.node(id);
        &self.indices[node.begin..node.begin + node.count]
    }

    /// Dataset indices of the points held directly by the node (empty for internal nodes).
    pub fn owned_points(&self, id: NodeId) -> &[usize] {
        if self.node(id).is_leaf() {
            self.points(id)
        } else {
            &[]
        }
    }

    /// Minimum distance between a point of `a` and a point of `b`, combining
    /// the bounding boxes with `b`'s centroid and radius.
    pub fn min_distance_between(&self, a: NodeId, other: &SpaceTree, b: NodeId) -> f64 {
        let a = self.node(a);
        let b = other.node(b);
        let rect = a.bound.min_distance(&b.bound);
        let to_center = a.bound.min_distance_to_point(&b.stat.centroid.view());
        let radius = b.furthest_descendant_distance;
        let ball = to_center - radius - BOUND_SLACK * (to_center + radius);
        rect.max(ball)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn random_data(n: usize, d: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array2::random_using((n, d), Uniform::new(-10.0, 10.0), &mut rng)
    }

    #[test]
    fn test_build_covers_every_point_once() {
        let data = random_data(500, 3, 1);
        let tree = SpaceTree::build(&data.view(), 10).unwrap();

        let mut seen = tree.points(tree.root()).to_vec();
        seen.sort_unstable();
        assert_eq!(seen, (0..500).collect::<Vec<_>>());
        assert_eq!(tree.node(tree.root()).count(), 500);
        assert_eq!(tree.num_points(), 500);
        assert_eq!(tree.leaf_size(), 10);
        assert!(!tree.is_empty());
    }

    #[test]
    fn test_structure_invariants() {
        let data = random_data(300, 4, 2);
        let tree = SpaceTree::build(&data.view(), 7).unwrap();

        for id in tree.node_ids() {
            let node = tree.node(id);
            assert!(node.count() > 0);
            if node.is_leaf() {
                assert!(node.count() <= 7);
            } else {
                let total: usize = node.children().iter().map(|&c| tree.node(c).count()).sum();
                assert_eq!(total, node.count());
                for &c in node.children() {
                    assert_eq!(tree.node(c).parent(), Some(id));
                }
            }
            for &i in tree.points(id) {
                assert!(node.bound().contains(&data.row(i)));
                let dist = euclidean(&node.stat.centroid.view(), &data.row(i));
                assert!(dist <= node.furthest_descendant_distance() + 1e-9);
            }
        }
    }

    #[test]
    fn test_depth_is_logarithmic() {
        let data = random_data(1024, 2, 3);
        let tree = SpaceTree::build(&data.view(), 1).unwrap();

        let depth = tree
            .node_ids()
            .map(|id| {
                let mut depth = 0;
                let mut node = tree.node(id);
                while let Some(parent) = node.parent() {
                    depth += 1;
                    node = tree.node(parent);
                }
                depth
            })
            .max()
            .unwrap();
        assert!(depth <= 11, "depth {} too large", depth);
    }

    #[test]
    fn test_duplicates_form_single_leaf() {
        let data = Array2::from_elem((50, 3), 1.5);
        let tree = SpaceTree::build(&data.view(), 4).unwrap();

        assert_eq!(tree.len(), 1);
        assert!(tree.node(tree.root()).is_leaf());
        assert_eq!(tree.node(tree.root()).furthest_descendant_distance(), 0.0);
    }

    #[test]
    fn test_min_distance_is_conservative() {
        let data = random_data(200, 3, 4);
        let centroids = random_data(16, 3, 5);
        let tree = SpaceTree::build(&data.view(), 5).unwrap();
        let centroid_tree = SpaceTree::build(&centroids.view(), 1).unwrap();

        for p in tree.node_ids() {
            for c in centroid_tree.node_ids() {
                let bound = tree.min_distance_between(p, &centroid_tree, c);
                for &i in tree.points(p) {
                    for &j in centroid_tree.points(c) {
                        let dist = euclidean(&data.row(i), &centroids.row(j));
                        assert!(bound <= dist, "bound {} > distance {}", bound, dist);
                    }
                }
            }
        }
    }

    #[test]
    fn test_bound_distances() {
        let a = Bound::enclosing(&array![[0.0, 0.0], [1.0, 1.0]].view(), &[0, 1]);
        let b = Bound::enclosing(&array![[4.0, 5.0], [6.0, 7.0]].view(), &[0, 1]);

        assert_eq!(a.min_distance(&b), 5.0);
        assert_eq!(b.min_distance(&a), 5.0);
        assert_eq!(a.min_distance(&a), 0.0);
        assert_eq!(a.min_distance_to_point(&array![0.5, 0.5].view()), 0.0);
        assert_eq!(a.widest_dimension(), Some(0));
    }

    #[test]
    fn test_rejects_bad_input() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            SpaceTree::build(&empty.view(), 4),
            Err(KMeansError::EmptyDataset)
        ));

        let no_dims = Array2::<f64>::zeros((5, 0));
        assert!(matches!(
            SpaceTree::build(&no_dims.view(), 4),
            Err(KMeansError::TreeConstructionFailure(_))
        ));

        let nan = array![[0.0, 1.0], [f64::NAN, 2.0]];
        assert!(matches!(
            SpaceTree::build(&nan.view(), 4),
            Err(KMeansError::TreeConstructionFailure(_))
        ));
    }
}
