//! Dual-tree nearest-centroid assignment.
//!
//! One pass walks pairs of (point node, centroid node). A pair is pruned when
//! the bounding regions prove that no centroid under the centroid node can beat
//! the best centroid already known for every point under the point node. Point
//! leaves are resolved exactly; everything else recurses, nearest centroid
//! children first, and merges bounds on the way back up.
//!
//! Subtrees whose ownership was settled in an earlier pass are skipped entirely
//! while the accumulated centroid movement cannot have changed the answer.

use crate::distance::{centroid_movements, euclidean};
use crate::error::KMeansError;
use crate::stat::NodeStat;
use crate::tree::{NodeId, SpaceTree};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

/// Best and runner-up distance bookkeeping for every point.
#[derive(Debug, Clone)]
pub struct PointBounds {
    owner: Vec<Option<usize>>,
    upper: Vec<f64>,
    second: Vec<f64>,
}

impl PointBounds {
    pub fn new(n_points: usize) -> Self {
        Self {
            owner: vec![None; n_points],
            upper: vec![f64::INFINITY; n_points],
            second: vec![f64::INFINITY; n_points],
        }
    }

    pub fn len(&self) -> usize {
        self.owner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owner.is_empty()
    }

    /// Best cluster found for point `i`.
    pub fn owner(&self, i: usize) -> Option<usize> {
        self.owner[i]
    }

    /// Exact distance from point `i` to its best cluster.
    pub fn distance(&self, i: usize) -> f64 {
        self.upper[i]
    }

    /// Lower bound on the distance from point `i` to any other cluster
    /// compared at a leaf.
    pub fn second(&self, i: usize) -> f64 {
        self.second[i]
    }

    /// Re-anchor every point on its previous owner at the new centroid positions.
    fn restart(&mut self, points: &ArrayView2<f64>, centroids: &ArrayView2<f64>) -> usize {
        let k = centroids.nrows();
        self.owner
            .par_iter_mut()
            .zip(self.upper.par_iter_mut())
            .zip(self.second.par_iter_mut())
            .enumerate()
            .map(|(i, ((owner, upper), second))| {
                *second = f64::INFINITY;
                match (*owner).filter(|&o| o < k) {
                    Some(o) => {
                        *upper = euclidean(&points.row(i), &centroids.row(o));
                        1usize
                    }
                    None => {
                        *owner = None;
                        *upper = f64::INFINITY;
                        0usize
                    }
                }
            })
            .sum()
    }

    /// Record the exact distance from point `i` to `cluster`.
    ///
    /// Candidates are ordered by (distance, index), so ties go to the lowest index.
    fn offer(&mut self, i: usize, cluster: usize, dist: f64) {
        let better = match self.owner[i] {
            None => true,
            Some(best) => dist < self.upper[i] || (dist == self.upper[i] && cluster < best),
        };
        if better {
            self.second[i] = self.second[i].min(self.upper[i]);
            self.owner[i] = Some(cluster);
            self.upper[i] = dist;
        } else {
            self.second[i] = self.second[i].min(dist);
        }
    }
}

/// Work counters for assignment passes.
///
/// Every (point, centroid) pair of a pass lands in exactly one of
/// `base_case_pairs`, `pruned_pairs` or `static_pairs`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    /// Pairs resolved by exact comparison at a point leaf.
    pub base_case_pairs: usize,
    /// Pairs ruled out by a node-level prune.
    pub pruned_pairs: usize,
    /// Pairs skipped because their point subtree kept its static ownership.
    pub static_pairs: usize,
    /// Distance computations actually performed.
    pub distance_evaluations: usize,
    /// Subtrees whose static ownership survived re-validation.
    pub static_nodes: usize,
}

impl TraversalStats {
    pub fn total_pairs(&self) -> usize {
        self.base_case_pairs + self.pruned_pairs + self.static_pairs
    }

    pub fn accumulate(&mut self, other: &TraversalStats) {
        self.base_case_pairs += other.base_case_pairs;
        self.pruned_pairs += other.pruned_pairs;
        self.static_pairs += other.static_pairs;
        self.distance_evaluations += other.distance_evaluations;
        self.static_nodes += other.static_nodes;
    }
}

/// Merged bounds of a subtree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundSummary {
    pub upper: f64,
    pub lower: f64,
    pub owner: Option<usize>,
}

impl BoundSummary {
    /// Bounds of a node as seen by its parent. Static subtrees report their
    /// frozen bounds widened by the movement since they were frozen.
    pub fn of(stat: &NodeStat) -> Self {
        if stat.static_pruned {
            Self {
                upper: stat.moved_upper_bound(),
                lower: stat.moved_lower_bound(),
                owner: stat.owner,
            }
        } else {
            Self {
                upper: stat.upper_bound,
                lower: stat.lower_bound,
                owner: stat.owner,
            }
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            upper: self.upper.max(other.upper),
            lower: self.lower.min(other.lower),
            owner: if self.owner == other.owner { self.owner } else { None },
        }
    }

    fn write(&self, stat: &mut NodeStat) {
        stat.upper_bound = self.upper;
        stat.lower_bound = self.lower;
        stat.owner = self.owner;
    }
}

/// Per-cluster movement since the previous pass, with the largest movement of
/// any *other* cluster precomputed.
struct Movement {
    per_cluster: Vec<f64>,
    largest: (usize, f64),
    runner_up: f64,
}

impl Movement {
    fn new(per_cluster: Vec<f64>) -> Self {
        let mut largest = (0, 0.0);
        let mut runner_up = 0.0;
        for (j, &m) in per_cluster.iter().enumerate() {
            if m > largest.1 {
                runner_up = largest.1;
                largest = (j, m);
            } else if m > runner_up {
                runner_up = m;
            }
        }
        Self {
            per_cluster,
            largest,
            runner_up,
        }
    }

    fn of(&self, cluster: usize) -> f64 {
        self.per_cluster[cluster]
    }

    fn largest_other(&self, cluster: usize) -> f64 {
        if cluster == self.largest.0 {
            self.runner_up
        } else {
            self.largest.1
        }
    }
}

/// Dual-tree assignment over a fixed point set.
///
/// Owns the point tree and the per-point bounds, which persist between passes
/// so that static pruning can carry ownership forward.
pub struct DualTreeAssigner<'a> {
    points: ArrayView2<'a, f64>,
    tree: SpaceTree,
    bounds: PointBounds,
    previous: Option<Array2<f64>>,
    static_pruning: bool,
}

impl<'a> DualTreeAssigner<'a> {
    /// Build the point tree.
    pub fn new(
        points: ArrayView2<'a, f64>,
        leaf_size: usize,
        static_pruning: bool,
    ) -> Result<Self, KMeansError> {
        let tree = SpaceTree::build(&points, leaf_size)?;
        Ok(Self {
            bounds: PointBounds::new(points.nrows()),
            points,
            tree,
            previous: None,
            static_pruning,
        })
    }

    pub fn tree(&self) -> &SpaceTree {
        &self.tree
    }

    pub fn bounds(&self) -> &PointBounds {
        &self.bounds
    }

    pub fn points(&self) -> ArrayView2<'a, f64> {
        self.points
    }

    /// Run one full assignment pass against `centroids`.
    ///
    /// `centroid_tree` must have been built over exactly these centroids.
    pub fn assign(
        &mut self,
        centroids: &ArrayView2<f64>,
        centroid_tree: &SpaceTree,
    ) -> TraversalStats {
        debug_assert_eq!(centroid_tree.num_points(), centroids.nrows());

        let movement = self
            .previous
            .as_ref()
            .filter(|previous| previous.dim() == centroids.dim())
            .map(|previous| Movement::new(centroid_movements(&previous.view(), centroids)));

        let mut stats = TraversalStats {
            distance_evaluations: self.bounds.restart(&self.points, centroids),
            ..Default::default()
        };
        let root = self.tree.root();
        self.prepare(root, movement.as_ref(), &mut stats);

        let mut rules = DualTreeRules {
            points: self.points.view(),
            centroids: centroids.view(),
            centroid_tree,
            bounds: &mut self.bounds,
            prune_floor: vec![f64::INFINITY; self.tree.len()],
            stats,
        };
        rules.traverse(&mut self.tree, root, centroid_tree.root());
        let DualTreeRules {
            prune_floor, stats, ..
        } = rules;

        reduce_bounds(&mut self.tree, &self.bounds, &prune_floor, root, f64::INFINITY);
        if self.static_pruning {
            mark_static(&mut self.tree, root);
        }
        self.previous = Some(centroids.to_owned());

        stats
    }

    /// Re-validate static subtrees and reset every other node for a fresh pass.
    /// Returns the node's starting upper bound.
    fn prepare(&mut self, id: NodeId, movement: Option<&Movement>, stats: &mut TraversalStats) -> f64 {
        let stat = &mut self.tree.node_mut(id).stat;
        if stat.static_pruned {
            if let (Some(movement), Some(owner)) = (movement, stat.owner) {
                stat.accumulate_movement(movement.of(owner), movement.largest_other(owner));
                if stat.static_prune_holds() {
                    stats.static_nodes += 1;
                    return stat.moved_upper_bound();
                }
            }
            clear_static(&mut self.tree, id);
        }

        self.tree.node_mut(id).stat.reset();
        let upper = if self.tree.node(id).is_leaf() {
            self.tree
                .points(id)
                .iter()
                .map(|&i| self.bounds.distance(i))
                .fold(f64::NEG_INFINITY, f64::max)
        } else {
            let children = self.tree.node(id).children().to_vec();
            children
                .into_iter()
                .map(|child| self.prepare(child, movement, stats))
                .fold(f64::NEG_INFINITY, f64::max)
        };
        self.tree.node_mut(id).stat.upper_bound = upper;
        upper
    }
}

/// Pruning rules and base case of one pass.
struct DualTreeRules<'r> {
    points: ArrayView2<'r, f64>,
    centroids: ArrayView2<'r, f64>,
    centroid_tree: &'r SpaceTree,
    bounds: &'r mut PointBounds,
    /// Smallest prune bound recorded at each point node during this pass.
    prune_floor: Vec<f64>,
    stats: TraversalStats,
}

impl DualTreeRules<'_> {
    fn traverse(&mut self, tree: &mut SpaceTree, p: NodeId, c: NodeId) {
        let centroid_tree = self.centroid_tree;
        let centroid_node = centroid_tree.node(c);
        let pairs = tree.node(p).count() * centroid_node.count();

        // only re-validated static subtrees still carry the flag here
        if tree.node(p).stat.static_pruned {
            self.stats.static_pairs += pairs;
            return;
        }

        let lower = tree.min_distance_between(p, centroid_tree, c);
        if lower > tree.node(p).stat.upper_bound {
            self.prune(tree, p, centroid_node.count(), lower);
            self.stats.pruned_pairs += pairs;
            return;
        }

        if tree.node(p).is_leaf() {
            self.base_case(tree, p, c);
            self.stats.base_case_pairs += pairs;
            return;
        }

        let point_children = tree.node(p).children().to_vec();
        if centroid_node.is_leaf() {
            for pc in point_children {
                self.traverse(tree, pc, c);
            }
        } else {
            for pc in point_children {
                let mut order: Vec<(f64, NodeId)> = centroid_node
                    .children()
                    .iter()
                    .map(|&cc| (tree.min_distance_between(pc, centroid_tree, cc), cc))
                    .collect();
                order.sort_by(|a, b| a.0.total_cmp(&b.0));
                for (_, cc) in order {
                    self.traverse(tree, pc, cc);
                }
            }
        }

        self.merge(tree, p);
    }

    fn prune(&mut self, tree: &mut SpaceTree, p: NodeId, centroids: usize, lower: f64) {
        let stat = &mut tree.node_mut(p).stat;
        stat.pruned += centroids;
        stat.lower_bound = stat.lower_bound.min(lower);
        let floor = &mut self.prune_floor[p.index()];
        *floor = floor.min(lower);
    }

    fn base_case(&mut self, tree: &mut SpaceTree, p: NodeId, c: NodeId) {
        let centroid_tree = self.centroid_tree;
        let candidates = centroid_tree.points(c);
        for &i in tree.points(p) {
            let point = self.points.row(i);
            for &j in candidates {
                // the current owner's distance is already exact
                if self.bounds.owner(i) == Some(j) {
                    continue;
                }
                let dist = euclidean(&point, &self.centroids.row(j));
                debug_assert!(dist.is_finite());
                self.stats.distance_evaluations += 1;
                self.bounds.offer(i, j, dist);
            }
        }

        let summary = leaf_summary(tree, &*self.bounds, p);
        let stat = &mut tree.node_mut(p).stat;
        stat.upper_bound = summary.upper;
        stat.lower_bound = stat.lower_bound.min(summary.lower);
        stat.owner = summary.owner;
    }

    fn merge(&mut self, tree: &mut SpaceTree, p: NodeId) {
        let merged = tree
            .node(p)
            .children()
            .iter()
            .map(|&child| BoundSummary::of(&tree.node(child).stat))
            .reduce(BoundSummary::merge);
        if let Some(merged) = merged {
            let stat = &mut tree.node_mut(p).stat;
            stat.upper_bound = merged.upper;
            stat.lower_bound = stat.lower_bound.min(merged.lower);
            stat.owner = merged.owner;
        }
    }
}

/// Bounds of a leaf computed from its points' exact bookkeeping.
fn leaf_summary(tree: &SpaceTree, bounds: &PointBounds, id: NodeId) -> BoundSummary {
    let mut points = tree.points(id).iter();
    let first = points.next().map(|&i| BoundSummary {
        upper: bounds.distance(i),
        lower: bounds.second(i),
        owner: bounds.owner(i),
    });
    points.fold(
        first.unwrap_or(BoundSummary {
            upper: f64::INFINITY,
            lower: 0.0,
            owner: None,
        }),
        |acc, &i| {
            acc.merge(BoundSummary {
                upper: bounds.distance(i),
                lower: bounds.second(i),
                owner: bounds.owner(i),
            })
        },
    )
}

/// Final bottom-up reduction of a pass.
///
/// A prune recorded at a node bounds the distances of every point beneath it,
/// so prune floors flow down as `inherited` while summaries flow up. The
/// resulting `lower_bound` of each node is valid on its own, which is what
/// static pruning needs.
pub fn reduce_bounds(
    tree: &mut SpaceTree,
    bounds: &PointBounds,
    prune_floor: &[f64],
    id: NodeId,
    inherited: f64,
) -> BoundSummary {
    let node = tree.node(id);
    if node.stat.static_pruned {
        return BoundSummary::of(&node.stat);
    }

    let floor = inherited.min(prune_floor[id.index()]);
    let summary = if node.is_leaf() {
        let leaf = leaf_summary(tree, bounds, id);
        BoundSummary {
            lower: leaf.lower.min(floor),
            ..leaf
        }
    } else {
        let children = node.children().to_vec();
        children
            .into_iter()
            .map(|child| reduce_bounds(tree, bounds, prune_floor, child, floor))
            .reduce(BoundSummary::merge)
            .unwrap_or(BoundSummary {
                upper: f64::INFINITY,
                lower: 0.0,
                owner: None,
            })
    };

    summary.write(&mut tree.node_mut(id).stat);
    summary
}

/// Freeze the topmost subtrees whose ownership is settled.
fn mark_static(tree: &mut SpaceTree, id: NodeId) {
    let stat = &tree.node(id).stat;
    if stat.static_pruned {
        return;
    }
    if stat.owner.is_some() && stat.upper_bound < stat.lower_bound {
        tree.node_mut(id).stat.mark_static();
        return;
    }
    let children = tree.node(id).children().to_vec();
    for child in children {
        mark_static(tree, child);
    }
}

/// Drop static state for a whole subtree; descendants' accumulators stopped
/// being updated when an ancestor was frozen.
fn clear_static(tree: &mut SpaceTree, id: NodeId) {
    let mut stack = vec![id];
    while let Some(node) = stack.pop() {
        tree.node_mut(node).stat.clear_static();
        stack.extend_from_slice(tree.node(node).children());
    }
}

/// Assert that a pass matches brute force for every point.
///
/// # Panics
///
/// Panics on the first disagreement; a mismatch means a bound was not conservative.
pub fn verify_assignments(
    points: &ArrayView2<f64>,
    centroids: &ArrayView2<f64>,
    assignments: &ArrayView1<usize>,
) {
    let expected = crate::distance::brute_force_assign(points, centroids);
    for (i, (&got, &want)) in assignments.iter().zip(expected.iter()).enumerate() {
        assert_eq!(
            got, want,
            "dual-tree assignment of point {} disagrees with brute force",
            i
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::brute_force_assign;
    use crate::reduce::assignments;
    use ndarray::{array, Array2};
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn run_pass(
        assigner: &mut DualTreeAssigner,
        centroids: &Array2<f64>,
    ) -> (ndarray::Array1<usize>, TraversalStats) {
        let centroid_tree = SpaceTree::build(&centroids.view(), 1).unwrap();
        let stats = assigner.assign(&centroids.view(), &centroid_tree);
        let labels = assignments(assigner.tree(), assigner.bounds());
        (labels, stats)
    }

    #[test]
    fn test_single_pass_matches_brute_force() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for &(n, d, k, leaf) in &[(400, 2, 7, 8), (300, 5, 20, 1), (150, 3, 1, 10), (64, 1, 64, 4)] {
            let data = Array2::random_using((n, d), Uniform::new(-3.0, 3.0), &mut rng);
            let centroids = Array2::random_using((k, d), Uniform::new(-3.0, 3.0), &mut rng);

            let mut assigner = DualTreeAssigner::new(data.view(), leaf, true).unwrap();
            let (labels, _) = run_pass(&mut assigner, &centroids);

            assert_eq!(labels, brute_force_assign(&data.view(), &centroids.view()));
        }
    }

    #[test]
    fn test_every_point_gets_an_owner_and_pairs_are_covered() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let data = Array2::random_using((500, 3), Uniform::new(-1.0, 1.0), &mut rng);
        let centroids = Array2::random_using((16, 3), Uniform::new(-1.0, 1.0), &mut rng);

        let mut assigner = DualTreeAssigner::new(data.view(), 10, false).unwrap();
        let (_, stats) = run_pass(&mut assigner, &centroids);

        for i in 0..500 {
            let owner = assigner.bounds().owner(i);
            assert!(matches!(owner, Some(o) if o < 16));
        }
        assert_eq!(stats.total_pairs(), 500 * 16);
        assert_eq!(stats.static_pairs, 0);
        assert!(stats.pruned_pairs > 0, "expected some pruning: {:?}", stats);
    }

    #[test]
    fn test_root_bounds_are_valid() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let data = Array2::random_using((200, 2), Uniform::new(-1.0, 1.0), &mut rng);
        let centroids = Array2::random_using((6, 2), Uniform::new(-1.0, 1.0), &mut rng);

        let mut assigner = DualTreeAssigner::new(data.view(), 4, false).unwrap();
        run_pass(&mut assigner, &centroids);

        let tree = assigner.tree();
        for id in tree.node_ids() {
            let stat = &tree.node(id).stat;
            for &i in tree.points(id) {
                let owner = assigner.bounds().owner(i).unwrap();
                for j in 0..6 {
                    let dist = euclidean(&data.row(i), &centroids.row(j));
                    if j == owner {
                        assert!(dist <= stat.upper_bound);
                    } else {
                        assert!(dist >= stat.lower_bound, "{}", stat);
                    }
                }
                if let Some(node_owner) = stat.owner {
                    assert_eq!(node_owner, owner);
                }
            }
        }
    }

    #[test]
    fn test_static_pruning_matches_fresh_passes() {
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let data = Array2::random_using((600, 2), Uniform::new(-10.0, 10.0), &mut rng);
        let mut centroids = Array2::random_using((12, 2), Uniform::new(-10.0, 10.0), &mut rng);

        let mut with_static = DualTreeAssigner::new(data.view(), 8, true).unwrap();
        let mut without_static = DualTreeAssigner::new(data.view(), 8, false).unwrap();
        let mut static_pairs = 0;

        for _ in 0..8 {
            let (a, stats) = run_pass(&mut with_static, &centroids);
            let (b, _) = run_pass(&mut without_static, &centroids);
            assert_eq!(a, b);
            assert_eq!(a, brute_force_assign(&data.view(), &centroids.view()));
            assert_eq!(stats.total_pairs(), 600 * 12);
            static_pairs += stats.static_pairs;

            let jitter = Array2::random_using((12, 2), Uniform::new(-0.05, 0.05), &mut rng);
            centroids += &jitter;
        }

        assert!(static_pairs > 0, "static pruning never kicked in");
    }

    #[test]
    fn test_static_pruning_survives_large_jump() {
        let mut rng = ChaCha8Rng::seed_from_u64(15);
        let data = Array2::random_using((300, 2), Uniform::new(-5.0, 5.0), &mut rng);
        let mut assigner = DualTreeAssigner::new(data.view(), 5, true).unwrap();

        let first = array![[-3.0, -3.0], [3.0, 3.0], [-3.0, 3.0]];
        let jumped = array![[3.0, 3.0], [-3.0, -3.0], [0.0, 0.0]];
        for centroids in [&first, &first, &jumped, &first] {
            let (labels, _) = run_pass(&mut assigner, centroids);
            assert_eq!(labels, brute_force_assign(&data.view(), &centroids.view()));
        }
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() {
        let data = array![[0.0], [5.0], [10.0]];
        let centroids = array![[10.0], [0.0], [10.0], [0.0]];

        let mut assigner = DualTreeAssigner::new(data.view(), 1, true).unwrap();
        let (labels, _) = run_pass(&mut assigner, &centroids);

        assert_eq!(labels, array![1, 0, 0]);
    }

    #[test]
    fn test_offer_tracks_runner_up() {
        let mut bounds = PointBounds::new(1);
        assert_eq!(bounds.len(), 1);
        assert!(!bounds.is_empty());
        assert_eq!(bounds.owner(0), None);
        bounds.offer(0, 3, 2.0);
        bounds.offer(0, 1, 5.0);
        bounds.offer(0, 2, 1.0);

        assert_eq!(bounds.owner(0), Some(2));
        assert_eq!(bounds.distance(0), 1.0);
        assert_eq!(bounds.second(0), 2.0);
    }

    #[test]
    fn test_assigner_outlives_centroid_views() {
        let data = array![[0.0, 0.0], [1.0, 0.0], [9.0, 9.0], [10.0, 9.0]];
        let mut assigner = DualTreeAssigner::new(data.view(), 1, true).unwrap();

        for shift in [0.0, 0.5, 1.0] {
            let centroids = array![[shift, 0.0], [10.0 - shift, 9.0]];
            let centroid_tree = SpaceTree::build(&centroids.view(), 1).unwrap();
            let stats = assigner.assign(&centroids.view(), &centroid_tree);
            assert_eq!(stats.total_pairs(), 8);
        }

        // centroids and their tree are gone; the pass results stay readable
        assert_eq!(assignments(assigner.tree(), assigner.bounds()), array![0, 0, 1, 1]);
        assert_eq!(assigner.bounds().len(), 4);
    }

    #[test]
    fn test_movement_largest_other() {
        let movement = Movement::new(vec![0.5, 2.0, 1.0]);
        assert_eq!(movement.largest_other(1), 1.0);
        assert_eq!(movement.largest_other(0), 2.0);
        assert_eq!(movement.of(2), 1.0);

        let single = Movement::new(vec![3.0]);
        assert_eq!(single.largest_other(0), 0.0);
    }
}
