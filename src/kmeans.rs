use log::{debug, info};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::error::{KMeansError, KMeansParamsError};

/// Enum representing the distance metric to be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceMetric {
    Euclidean,
}

impl DistanceMetric {
    /// Squared Euclidean distance.
    fn distance<S1, S2>(&self, x: &ArrayBase<S1, Ix1>, y: &ArrayBase<S2, Ix1>) -> f32
    where
        S1: Data<Elem = f32>,
        S2: Data<Elem = f32>,
    {
        match self {
            DistanceMetric::Euclidean => x
                .iter()
                .zip(y.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum(),
        }
    }
}

/// How the first set of centroids is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KMeansInit {
    /// Distinct samples picked uniformly at random.
    Random,
    /// k-means++: each new centroid is drawn with probability proportional
    /// to its distance from the centroids picked so far.
    KMeansPlusPlus,
}

impl KMeansInit {
    fn run<S>(
        &self,
        n_clusters: usize,
        x: &ArrayBase<S, Ix2>,
        metric: DistanceMetric,
        rng: &mut impl Rng,
    ) -> Array2<f32>
    where
        S: Data<Elem = f32> + Sync,
    {
        match self {
            KMeansInit::Random => {
                let indices = rand::seq::index::sample(rng, x.nrows(), n_clusters).into_vec();
                x.select(Axis(0), &indices)
            }
            KMeansInit::KMeansPlusPlus => kmeans_plusplus(n_clusters, x, metric, rng),
        }
    }
}

fn kmeans_plusplus<S>(
    n_clusters: usize,
    x: &ArrayBase<S, Ix2>,
    metric: DistanceMetric,
    rng: &mut impl Rng,
) -> Array2<f32>
where
    S: Data<Elem = f32> + Sync,
{
    let (n_samples, n_features) = x.dim();
    let mut centroids = Array2::<f32>::zeros((n_clusters, n_features));
    centroids
        .row_mut(0)
        .assign(&x.row(rng.gen_range(0..n_samples)));

    for c in 1..n_clusters {
        let (_, dists) = assign_labels(x, &centroids.slice(ndarray::s![..c, ..]), metric);
        // all weights are zero when every sample already sits on a centroid
        let idx = match WeightedIndex::new(dists.iter()) {
            Ok(weights) => weights.sample(rng),
            Err(_) => rng.gen_range(0..n_samples),
        };
        centroids.row_mut(c).assign(&x.row(idx));
    }
    centroids
}

/// Assigns each sample to its closest centroid, returning the labels and the
/// distance to that centroid.
fn assign_labels<S1, S2>(
    x: &ArrayBase<S1, Ix2>,
    centroids: &ArrayBase<S2, Ix2>,
    metric: DistanceMetric,
) -> (Array1<usize>, Array1<f32>)
where
    S1: Data<Elem = f32> + Sync,
    S2: Data<Elem = f32> + Sync,
{
    let n_centroids = centroids.nrows();
    let (labels, dists): (Vec<usize>, Vec<f32>) = (0..x.nrows())
        .into_par_iter()
        .map(|i| {
            let row = x.row(i);
            let mut min_dist = f32::INFINITY;
            let mut min_j = 0;
            for j in 0..n_centroids {
                let dist = metric.distance(&row, &centroids.row(j));
                if dist < min_dist {
                    min_dist = dist;
                    min_j = j;
                }
            }
            (min_j, min_dist)
        })
        .unzip();

    (Array1::from(labels), Array1::from(dists))
}

/// Hyperparameters for Lloyd's k-means.
///
/// ```no_run
/// # use pointclust::{KMeans, PointSet};
/// let points = PointSet::load("points.txt")?;
/// let model = KMeans::new(3).seed(42).fit(&points.view())?;
/// let labels = model.predict(&points.view())?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct KMeans {
    pub n_clusters: usize,
    pub max_iters: usize,
    pub tolerance: f32,
    pub n_runs: usize,
    pub init: KMeansInit,
    pub seed: Option<u64>,
    pub metric: DistanceMetric,
}

impl KMeans {
    /// Creates a new KMeans instance with the given number of clusters.
    pub fn new(n_clusters: usize) -> Self {
        KMeans {
            n_clusters,
            max_iters: 300,
            tolerance: 1e-4,
            n_runs: 10,
            init: KMeansInit::KMeansPlusPlus,
            seed: None,
            metric: DistanceMetric::Euclidean,
        }
    }

    pub fn max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Stop once the summed squared centroid shift drops to this value.
    pub fn tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Number of independent initialisations; the run with the lowest inertia wins.
    pub fn n_runs(mut self, n_runs: usize) -> Self {
        self.n_runs = n_runs;
        self
    }

    pub fn init(mut self, init: KMeansInit) -> Self {
        self.init = init;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    fn validate(&self) -> Result<(), KMeansParamsError> {
        if self.n_clusters == 0 {
            Err(KMeansParamsError::NClusters)
        } else if self.n_runs == 0 {
            Err(KMeansParamsError::NRuns)
        } else if self.max_iters == 0 {
            Err(KMeansParamsError::MaxIters)
        } else if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            Err(KMeansParamsError::Tolerance)
        } else {
            Ok(())
        }
    }

    /// Fits the model to the data.
    pub fn fit<S>(&self, x: &ArrayBase<S, Ix2>) -> Result<FittedKMeans, KMeansError>
    where
        S: Data<Elem = f32> + Sync,
    {
        self.validate()?;
        let n_samples = x.nrows();
        if n_samples < self.n_clusters {
            return Err(KMeansError::NotEnoughPoints {
                n_samples,
                n_clusters: self.n_clusters,
            });
        }

        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut best: Option<FittedKMeans> = None;
        for run in 0..self.n_runs {
            let initial = self.init.run(self.n_clusters, x, self.metric, &mut rng);
            let fitted = self.lloyd(x, initial);
            debug!(
                "run {}: inertia {:.4} after {} iterations",
                run, fitted.inertia, fitted.n_iters
            );
            if best.as_ref().map_or(true, |b| fitted.inertia < b.inertia) {
                best = Some(fitted);
            }
        }

        let best = best.ok_or(KMeansParamsError::NRuns)?;
        info!(
            "fitted {} clusters on {} points, inertia {:.4}",
            self.n_clusters, n_samples, best.inertia
        );
        Ok(best)
    }

    /// Fits the model and returns the labels of the training points.
    pub fn fit_predict<S>(
        &self,
        x: &ArrayBase<S, Ix2>,
    ) -> Result<(FittedKMeans, Array1<usize>), KMeansError>
    where
        S: Data<Elem = f32> + Sync,
    {
        let fitted = self.fit(x)?;
        let labels = fitted.labels.clone();
        Ok((fitted, labels))
    }

    fn lloyd<S>(&self, x: &ArrayBase<S, Ix2>, mut centroids: Array2<f32>) -> FittedKMeans
    where
        S: Data<Elem = f32> + Sync,
    {
        let mut n_iters = 0;
        while n_iters < self.max_iters {
            n_iters += 1;
            let (labels, _) = assign_labels(x, &centroids, self.metric);
            let new_centroids = update_centroids(x, &labels, &centroids);
            let shift: f32 = (&new_centroids - &centroids).mapv(|v| v * v).sum();
            centroids = new_centroids;
            if shift <= self.tolerance {
                break;
            }
        }

        let (labels, dists) = assign_labels(x, &centroids, self.metric);
        FittedKMeans {
            centroids,
            labels,
            inertia: dists.sum(),
            n_iters,
            metric: self.metric,
        }
    }
}

/// Mean of the samples assigned to each cluster. A cluster left without
/// samples keeps its previous centroid.
fn update_centroids<S>(
    x: &ArrayBase<S, Ix2>,
    labels: &Array1<usize>,
    previous: &Array2<f32>,
) -> Array2<f32>
where
    S: Data<Elem = f32>,
{
    let mut sums = Array2::<f32>::zeros(previous.dim());
    let mut counts = vec![0usize; previous.nrows()];
    x.axis_iter(Axis(0))
        .zip(labels.iter())
        .for_each(|(row, &label)| {
            sums.row_mut(label).zip_mut_with(&row, |a, &b| *a += b);
            counts[label] += 1;
        });
    sums.axis_iter_mut(Axis(0))
        .zip(previous.axis_iter(Axis(0)))
        .zip(counts)
        .for_each(|((mut c, prev), count)| {
            if count > 0 {
                c.mapv_inplace(|v| v / count as f32);
            } else {
                c.assign(&prev);
            }
        });
    sums
}

/// A k-means model after fitting.
#[derive(Clone, Debug)]
pub struct FittedKMeans {
    centroids: Array2<f32>,
    labels: Array1<usize>,
    inertia: f32,
    n_iters: usize,
    metric: DistanceMetric,
}

impl FittedKMeans {
    /// One row per cluster.
    pub fn centroids(&self) -> &Array2<f32> {
        &self.centroids
    }

    /// Labels of the points the model was fitted on.
    pub fn labels(&self) -> &Array1<usize> {
        &self.labels
    }

    /// Sum of squared distances of the training points to their centroid.
    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    pub fn n_iters(&self) -> usize {
        self.n_iters
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    /// Predicts the closest cluster each sample in `x` belongs to.
    pub fn predict<S>(&self, x: &ArrayBase<S, Ix2>) -> Result<Array1<usize>, KMeansError>
    where
        S: Data<Elem = f32> + Sync,
    {
        if x.ncols() != self.centroids.ncols() {
            return Err(KMeansError::FeatureMismatch {
                expected: self.centroids.ncols(),
                found: x.ncols(),
            });
        }
        Ok(assign_labels(x, &self.centroids, self.metric).0)
    }

    /// Number of training points per cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_clusters()];
        self.labels.iter().for_each(|&label| counts[label] += 1);
        counts
    }
}
