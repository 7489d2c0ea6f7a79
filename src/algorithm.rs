use crate::config::KMeansConfig;
use crate::distance::{brute_force_assign, compute_centroid_shift};
use crate::error::{KMeansError, KMeansWarning};
use crate::reduce::{reduce, Reduction};
use crate::seeding::{RandomSeeding, Seeding};
use crate::traversal::{verify_assignments, DualTreeAssigner, TraversalStats};
use crate::tree::SpaceTree;
use ndarray::{Array1, Array2, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Instant;

/// Phases of the Lloyd iteration.
///
/// The centroid tree is rebuilt in its own phase: no traversal may run against
/// bounds computed for centroids that have since moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Build the point tree and seed the centroids
    Initialize,
    /// Build a fresh centroid tree over the current centroids
    RebuildCentroidTree,
    /// Run the dual-tree assignment pass
    Traverse,
    /// Compute next-iteration centroids from the assignment
    Reduce,
    /// Compare centroid displacement and iteration count to the limits
    CheckConvergence,
    /// Centroid shift fell below the tolerance
    Converged,
    /// The iteration cap was hit first
    MaxIterationsReached,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Converged | Phase::MaxIterationsReached)
    }
}

/// Result of the k-means algorithm
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// Final centroids, shape (k, n_features)
    pub centroids: Array2<f64>,
    /// Cluster index of every point, from the last assignment pass
    pub assignments: Array1<usize>,
    /// Number of Lloyd iterations run
    pub n_iterations: usize,
    /// `Converged` or `MaxIterationsReached`
    pub termination: Phase,
    /// Number of points per cluster in the last assignment pass
    pub cluster_sizes: Vec<usize>,
    /// Recoverable conditions met along the way
    pub warnings: Vec<KMeansWarning>,
    /// Traversal work summed over all iterations
    pub stats: TraversalStats,
}

/// Lloyd's algorithm driven by dual-tree assignment.
///
/// Call [`Lloyd::step`] to advance one phase or [`Lloyd::run`] to iterate
/// until a terminal phase.
pub struct Lloyd<'a> {
    data: ArrayView2<'a, f64>,
    config: KMeansConfig,
    seeding: &'a dyn Seeding,
    rng: ChaCha8Rng,
    phase: Phase,
    assigner: Option<DualTreeAssigner<'a>>,
    centroids: Array2<f64>,
    centroid_tree: Option<SpaceTree>,
    reduction: Option<Reduction>,
    iteration: usize,
    empty_streak: Vec<usize>,
    warnings: Vec<KMeansWarning>,
    stats: TraversalStats,
    iter_start: Instant,
}

impl<'a> Lloyd<'a> {
    /// Validate the inputs. Fails before any tree is built or traversed.
    ///
    /// # Errors
    ///
    /// - `EmptyDataset` if `data` has no rows
    /// - `InvalidK` if `k` is zero or larger than the number of points
    pub fn new(
        data: ArrayView2<'a, f64>,
        config: KMeansConfig,
        seeding: &'a dyn Seeding,
    ) -> Result<Self, KMeansError> {
        let n_samples = data.nrows();
        let k = config.k;

        if n_samples == 0 {
            return Err(KMeansError::EmptyDataset);
        }

        if k == 0 {
            return Err(KMeansError::InvalidK(
                "k must be greater than 0".to_string(),
            ));
        }

        if n_samples < k {
            return Err(KMeansError::InvalidK(format!(
                "Number of samples ({}) is less than k ({})",
                n_samples, k
            )));
        }

        Ok(Self {
            data,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            seeding,
            phase: Phase::Initialize,
            assigner: None,
            centroids: Array2::zeros((k, data.ncols())),
            centroid_tree: None,
            reduction: None,
            iteration: 0,
            empty_streak: vec![0; k],
            warnings: Vec::new(),
            stats: TraversalStats::default(),
            iter_start: Instant::now(),
            config,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    /// Execute the current phase and move to the next one.
    pub fn step(&mut self) -> Result<Phase, KMeansError> {
        self.phase = match self.phase {
            Phase::Initialize => self.initialize()?,
            Phase::RebuildCentroidTree => {
                self.iter_start = Instant::now();
                self.centroid_tree = Some(SpaceTree::build(
                    &self.centroids.view(),
                    self.config.centroid_leaf_size,
                )?);
                Phase::Traverse
            }
            Phase::Traverse => self.traverse()?,
            Phase::Reduce => self.reduce()?,
            Phase::CheckConvergence => self.check_convergence()?,
            terminal => terminal,
        };
        Ok(self.phase)
    }

    /// Step until a terminal phase and collect the result.
    pub fn run(mut self) -> Result<KMeansResult, KMeansError> {
        while !self.phase.is_terminal() {
            self.step()?;
        }
        self.finish()
    }

    fn initialize(&mut self) -> Result<Phase, KMeansError> {
        log::info!(
            "Training k-means: {} samples, {} features, {} clusters",
            self.data.nrows(),
            self.data.ncols(),
            self.config.k
        );

        self.assigner = Some(DualTreeAssigner::new(
            self.data,
            self.config.leaf_size,
            self.config.static_pruning,
        )?);
        self.centroids = self.seeding.seed(&self.data, self.config.k, &mut self.rng)?;
        if self.centroids.dim() != (self.config.k, self.data.ncols()) {
            return Err(KMeansError::InvalidDimensions(format!(
                "Seeding returned centroids of shape {:?}, expected ({}, {})",
                self.centroids.dim(),
                self.config.k,
                self.data.ncols()
            )));
        }

        Ok(Phase::RebuildCentroidTree)
    }

    fn traverse(&mut self) -> Result<Phase, KMeansError> {
        let (assigner, centroid_tree) = match (self.assigner.as_mut(), self.centroid_tree.take()) {
            (Some(assigner), Some(tree)) => (assigner, tree),
            _ => return Err(KMeansError::NotFitted),
        };

        let stats = assigner.assign(&self.centroids.view(), &centroid_tree);
        debug_assert_eq!(stats.total_pairs(), self.data.nrows() * self.config.k);
        self.stats.accumulate(&stats);

        log::debug!(
            "  Iteration {}: {} pairs compared, {} pruned, {} static, {} distance evaluations",
            self.iteration + 1,
            stats.base_case_pairs,
            stats.pruned_pairs,
            stats.static_pairs,
            stats.distance_evaluations
        );

        Ok(Phase::Reduce)
    }

    fn reduce(&mut self) -> Result<Phase, KMeansError> {
        let assigner = self.assigner.as_ref().ok_or(KMeansError::NotFitted)?;
        let reduction = reduce(
            assigner.tree(),
            assigner.bounds(),
            &self.data,
            &self.centroids.view(),
        );

        if self.config.verify {
            verify_assignments(
                &self.data,
                &self.centroids.view(),
                &reduction.assignments.view(),
            );
        }

        for (cluster, streak) in self.empty_streak.iter_mut().enumerate() {
            if reduction.empty_clusters.contains(&cluster) {
                *streak += 1;
                log::debug!("  Cluster {} is empty, keeping its centroid", cluster);
                if *streak == 2 {
                    let warning = KMeansWarning::NumericalDegeneracy {
                        cluster,
                        empty_iterations: *streak,
                    };
                    log::warn!("{}", warning);
                    self.warnings.push(warning);
                }
            } else {
                *streak = 0;
            }
        }

        self.reduction = Some(reduction);
        Ok(Phase::CheckConvergence)
    }

    fn check_convergence(&mut self) -> Result<Phase, KMeansError> {
        let reduction = self.reduction.as_ref().ok_or(KMeansError::NotFitted)?;
        self.iteration += 1;

        let shift = compute_centroid_shift(&self.centroids.view(), &reduction.centroids.view());
        self.centroids.assign(&reduction.centroids);

        log::debug!(
            "  Iteration {}/{}: shift = {:.6}, time = {:.4}s",
            self.iteration,
            self.config.max_iters,
            shift,
            self.iter_start.elapsed().as_secs_f64()
        );

        if self.config.tol >= 0.0 && shift < self.config.tol {
            log::info!(
                "  Converged after {} iterations (shift {:.6} < tol {:.6})",
                self.iteration,
                shift,
                self.config.tol
            );
            return Ok(Phase::Converged);
        }

        if self.iteration >= self.config.max_iters {
            log::info!("  Stopped after reaching {} iterations", self.iteration);
            return Ok(Phase::MaxIterationsReached);
        }

        Ok(Phase::RebuildCentroidTree)
    }

    fn finish(self) -> Result<KMeansResult, KMeansError> {
        let reduction = self.reduction.ok_or(KMeansError::NotFitted)?;
        Ok(KMeansResult {
            centroids: self.centroids,
            assignments: reduction.assignments,
            n_iterations: self.iteration,
            termination: self.phase,
            cluster_sizes: reduction.counts,
            warnings: self.warnings,
            stats: self.stats,
        })
    }
}

/// Run dual-tree accelerated k-means with the default random seeding.
pub fn kmeans_dual_tree(
    data: &ArrayView2<f64>,
    config: &KMeansConfig,
) -> Result<KMeansResult, KMeansError> {
    kmeans_with_seeding(data, config, &RandomSeeding)
}

/// Run dual-tree accelerated k-means with a custom seeding strategy.
pub fn kmeans_with_seeding(
    data: &ArrayView2<f64>,
    config: &KMeansConfig,
    seeding: &dyn Seeding,
) -> Result<KMeansResult, KMeansError> {
    Lloyd::new(data.view(), config.clone(), seeding)?.run()
}

/// The stable call contract: `(points, k, max_iterations, threshold)` in,
/// `(centroids, assignments, iterations used)` out.
pub fn kmeans(
    points: &ArrayView2<f64>,
    k: usize,
    max_iterations: usize,
    threshold: f64,
) -> Result<(Array2<f64>, Array1<usize>, usize), KMeansError> {
    let config = KMeansConfig::new(k)
        .with_max_iters(max_iterations)
        .with_tol(threshold);
    let result = kmeans_dual_tree(points, &config)?;
    Ok((result.centroids, result.assignments, result.n_iterations))
}

/// Plain Lloyd iteration with brute-force assignment.
///
/// The non-accelerated reference: same seeding, same convergence rule, no trees.
pub fn kmeans_brute_force(
    data: &ArrayView2<f64>,
    config: &KMeansConfig,
    seeding: &dyn Seeding,
) -> Result<KMeansResult, KMeansError> {
    let n_samples = data.nrows();
    let k = config.k;
    if n_samples == 0 {
        return Err(KMeansError::EmptyDataset);
    }
    if k == 0 || n_samples < k {
        return Err(KMeansError::InvalidK(format!(
            "k = {} with {} samples",
            k, n_samples
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut centroids = seeding.seed(data, k, &mut rng)?;
    let mut assignments = Array1::zeros(n_samples);
    let mut counts = vec![0usize; k];
    let mut n_iterations = 0;
    let mut termination = Phase::MaxIterationsReached;

    while n_iterations < config.max_iters.max(1) {
        n_iterations += 1;
        assignments = brute_force_assign(data, &centroids.view());

        let mut sums: Array2<f64> = Array2::zeros((k, data.ncols()));
        counts = vec![0usize; k];
        for (i, &label) in assignments.iter().enumerate() {
            sums.row_mut(label).scaled_add(1.0, &data.row(i));
            counts[label] += 1;
        }

        let prev_centroids = centroids.clone();
        for (cluster_idx, &count) in counts.iter().enumerate() {
            if count > 0 {
                let mean = &sums.row(cluster_idx) / count as f64;
                centroids.row_mut(cluster_idx).assign(&mean);
            }
        }

        let shift = compute_centroid_shift(&prev_centroids.view(), &centroids.view());
        if config.tol >= 0.0 && shift < config.tol {
            termination = Phase::Converged;
            break;
        }
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        n_iterations,
        termination,
        cluster_sizes: counts,
        warnings: Vec::new(),
        stats: TraversalStats::default(),
    })
}
