//! K-Means clustering (Lloyd iterations with seeded k-means++ start)

use crate::error::{Error, Result, Warning};
use crate::features::{Dimension, EncodedFeatures};
use crate::metrics::{squared_distance, ClusterMetrics};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Parameters of one K-Means fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KMeansParams {
    pub n_clusters: usize,
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            n_clusters: 4,
            max_iterations: 300,
            seed: 42,
        }
    }
}

/// Fitted K-Means model with its assignment and quality metrics
#[derive(Debug, Clone, Serialize)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Customer ids, aligned with `labels`
    pub customer_ids: Vec<String>,
    /// Cluster index per customer
    pub labels: Vec<usize>,
    /// Meaning of each centroid coordinate
    pub dimensions: Vec<Dimension>,
    /// Cluster centroids in encoded space
    #[serde(skip)]
    pub centroids: Array2<f64>,
    pub metrics: ClusterMetrics,
    /// Lloyd iterations run
    pub iterations: usize,
    /// Whether assignments stopped changing before the iteration bound
    pub converged: bool,
    /// Empty-cluster re-seeds that happened during fitting
    pub warnings: Vec<Warning>,
}

impl KMeansModel {
    /// Index of the nearest centroid; ties go to the lowest index.
    ///
    /// A fitted point on coincident centroids may carry a different, equally
    /// near label.
    pub fn predict(&self, features: &Array1<f64>) -> Result<usize> {
        if features.len() != self.centroids.ncols() {
            return Err(Error::DimensionMismatch {
                expected: self.centroids.ncols(),
                found: features.len(),
            });
        }
        Ok(nearest_centroid(&features.view(), &self.centroids).0)
    }

    /// Number of customers per cluster
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    /// Cluster of a customer, if it was part of the fit
    pub fn cluster_of(&self, customer_id: &str) -> Option<usize> {
        self.customer_ids
            .iter()
            .position(|id| id == customer_id)
            .map(|i| self.labels[i])
    }
}

/// Validate the requested cluster count against the number of customers.
///
/// Runs before any distance is computed.
pub fn validate_cluster_count(n_clusters: usize, n_customers: usize) -> Result<()> {
    if n_customers < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            found: n_customers,
        });
    }
    if n_clusters <= 1 || n_clusters >= n_customers {
        return Err(Error::InvalidClusterCount {
            requested: n_clusters,
            n_customers: Some(n_customers),
        });
    }
    Ok(())
}

/// Fit K-Means on encoded features
///
/// # Arguments
/// * `features` - Encoded customer vectors, usually a numeric-only view
/// * `params` - Cluster count, iteration bound and seed
///
/// # Returns
/// * Fitted `KMeansModel` with assignments and metrics
pub fn fit_kmeans(features: &EncodedFeatures, params: &KMeansParams) -> Result<KMeansModel> {
    let data = &features.matrix;
    let n = data.nrows();
    let k = params.n_clusters;
    validate_cluster_count(k, n)?;

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut centroids = init_centroids(data, k, &mut rng);
    let mut labels = assign(data, &centroids, None);
    let mut warnings = Vec::new();
    let mut iterations = 0;
    let mut converged = false;

    while iterations < params.max_iterations {
        iterations += 1;
        reseed_empty_clusters(data, &mut centroids, &mut labels, iterations, &mut warnings);
        centroids = update_centroids(data, &labels, k);

        let next = assign(data, &centroids, Some(&labels));
        let changed = next.iter().zip(&labels).filter(|(a, b)| a != b).count();
        debug!("Iteration {}: {} reassignments", iterations, changed);
        if changed == 0 {
            converged = true;
            break;
        }
        labels = next;
    }

    if !converged {
        // the last assignment may have emptied a cluster
        reseed_empty_clusters(data, &mut centroids, &mut labels, iterations, &mut warnings);
        centroids = update_centroids(data, &labels, k);
    }

    let metrics = ClusterMetrics::compute(data, &labels, &centroids);
    info!(
        "K-Means with k={} finished after {} iterations (converged: {}), inertia {:.4}",
        k, iterations, converged, metrics.inertia
    );

    Ok(KMeansModel {
        n_clusters: k,
        customer_ids: features.customer_ids.clone(),
        labels,
        dimensions: features.dimensions.clone(),
        centroids,
        metrics,
        iterations,
        converged,
        warnings,
    })
}

/// k-means++: first centroid uniform, the rest proportional to squared
/// distance from the nearest chosen centroid
fn init_centroids(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = data.nrows();
    let mut centroids = Array2::zeros((k, data.ncols()));

    let first = rng.gen_range(0..n);
    centroids.row_mut(0).assign(&data.row(first));

    let mut nearest: Vec<f64> = data
        .axis_iter(Axis(0))
        .map(|p| squared_distance(&p, &centroids.row(0)))
        .collect();

    for c in 1..k {
        let total: f64 = nearest.iter().sum();
        let selected = if total == 0.0 {
            rng.gen_range(0..n)
        } else {
            let threshold = rng.gen::<f64>() * total;
            let mut cumsum = 0.0;
            let mut selected = nearest.iter().rposition(|&d| d > 0.0).unwrap_or(n - 1);
            for (j, &d) in nearest.iter().enumerate() {
                cumsum += d;
                if d > 0.0 && cumsum >= threshold {
                    selected = j;
                    break;
                }
            }
            selected
        };

        centroids.row_mut(c).assign(&data.row(selected));
        for (j, p) in data.axis_iter(Axis(0)).enumerate() {
            nearest[j] = nearest[j].min(squared_distance(&p, &centroids.row(c)));
        }
    }

    centroids
}

/// Nearest centroid index and squared distance, lowest index on ties
fn nearest_centroid(point: &ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.axis_iter(Axis(0)).enumerate() {
        let d = squared_distance(point, &centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

/// Assign every point to its nearest centroid.
///
/// With `current` labels, a point already sitting on one of the tied nearest
/// centroids keeps it. Duplicate points split across coincident centroids by a
/// re-seed would otherwise bounce back to the lowest index every iteration.
fn assign(data: &Array2<f64>, centroids: &Array2<f64>, current: Option<&[usize]>) -> Vec<usize> {
    let label_of = |i: usize| -> usize {
        let point = data.row(i);
        let (best, distance) = nearest_centroid(&point, centroids);
        match current {
            Some(labels) if squared_distance(&point, &centroids.row(labels[i])) <= distance => labels[i],
            _ => best,
        }
    };

    #[cfg(feature = "parallel")]
    let labels = (0..data.nrows()).into_par_iter().map(label_of).collect();

    #[cfg(not(feature = "parallel"))]
    let labels = (0..data.nrows()).map(label_of).collect();

    labels
}

fn update_centroids(data: &Array2<f64>, labels: &[usize], k: usize) -> Array2<f64> {
    let mut sums = Array2::zeros((k, data.ncols()));
    let mut counts = vec![0usize; k];
    for (point, &c) in data.axis_iter(Axis(0)).zip(labels) {
        let mut row = sums.row_mut(c);
        row += &point;
        counts[c] += 1;
    }
    for (mut row, &count) in sums.axis_iter_mut(Axis(0)).zip(&counts) {
        if count > 0 {
            row /= count as f64;
        }
    }
    sums
}

/// Move the worst-fitting point into each empty cluster.
///
/// The donor is the point farthest from its own centroid among clusters with
/// more than one member, so no other cluster is emptied in the process.
fn reseed_empty_clusters(
    data: &Array2<f64>,
    centroids: &mut Array2<f64>,
    labels: &mut [usize],
    iteration: usize,
    warnings: &mut Vec<Warning>,
) {
    let k = centroids.nrows();
    let mut sizes = vec![0usize; k];
    for &label in labels.iter() {
        sizes[label] += 1;
    }

    for empty in 0..k {
        if sizes[empty] > 0 {
            continue;
        }

        let mut donor: Option<(usize, f64)> = None;
        for (i, &c) in labels.iter().enumerate() {
            if sizes[c] < 2 {
                continue;
            }
            let d = squared_distance(&data.row(i), &centroids.row(c));
            if donor.map_or(true, |(_, best)| d > best) {
                donor = Some((i, d));
            }
        }

        // k < n guarantees a cluster with two members while one is empty
        let Some((i, _)) = donor else { continue };
        sizes[labels[i]] -= 1;
        labels[i] = empty;
        sizes[empty] = 1;
        centroids.row_mut(empty).assign(&data.row(i));

        let reported = warnings
            .iter()
            .any(|w| matches!(w, Warning::EmptyCluster { cluster, .. } if *cluster == empty));
        if reported {
            debug!("Cluster {} emptied again at iteration {}, re-seeded", empty, iteration);
        } else {
            warnings.push(
                Warning::EmptyCluster {
                    cluster: empty,
                    iteration,
                }
                .emit(),
            );
        }
    }
}
