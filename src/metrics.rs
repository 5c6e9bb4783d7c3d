//! Cluster quality metrics computed once after convergence
//!
//! | Metric | Range | Best |
//! |--------|-------|------|
//! | [`inertia`] | [0, inf) | lower |
//! | [`silhouette_score`] | [-1, 1] | higher |
//! | [`davies_bouldin_score`] | [0, inf) | lower |

use ndarray::{Array2, ArrayView1};
use serde::Serialize;

/// The three scalar metrics reported with a clustering
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterMetrics {
    pub inertia: f64,
    /// `None` when fewer than 2 or exactly n clusters are populated
    pub silhouette: Option<f64>,
    pub davies_bouldin: f64,
}

impl ClusterMetrics {
    pub fn compute(features: &Array2<f64>, labels: &[usize], centroids: &Array2<f64>) -> Self {
        Self {
            inertia: inertia(features, labels, centroids),
            silhouette: silhouette_score(features, labels),
            davies_bouldin: davies_bouldin_score(features, labels, centroids),
        }
    }
}

pub(crate) fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

pub(crate) fn euclidean_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Within-cluster sum of squared distances to the assigned centroid
pub fn inertia(features: &Array2<f64>, labels: &[usize], centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .map(|(i, &c)| squared_distance(&features.row(i), &centroids.row(c)))
        .sum()
}

/// Mean silhouette coefficient over all points.
///
/// Points alone in their cluster score 0. Undefined (None) unless the number
/// of populated clusters is in `2..n`.
pub fn silhouette_score(features: &Array2<f64>, labels: &[usize]) -> Option<f64> {
    let n = labels.len();
    let k = labels.iter().max().map_or(0, |&m| m + 1);
    let mut sizes = vec![0usize; k];
    for &label in labels {
        sizes[label] += 1;
    }
    let populated = sizes.iter().filter(|&&s| s > 0).count();
    if populated < 2 || populated >= n {
        return None;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if sizes[own] == 1 {
            continue;
        }

        let mut sums = vec![0.0; k];
        let point = features.row(i);
        for j in 0..n {
            if i != j {
                sums[labels[j]] += euclidean_distance(&point, &features.row(j));
            }
        }

        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }

    Some(total / n as f64)
}

/// Davies-Bouldin index.
///
/// Scatter `S_c` is the mean distance of members to their centroid; each
/// cluster contributes its worst `(S_i + S_j) / d(c_i, c_j)` ratio. Pairs of
/// coincident centroids are skipped.
pub fn davies_bouldin_score(features: &Array2<f64>, labels: &[usize], centroids: &Array2<f64>) -> f64 {
    let k = centroids.nrows();
    if k < 2 {
        return 0.0;
    }

    let mut scatter = vec![0.0; k];
    let mut sizes = vec![0usize; k];
    for (i, &c) in labels.iter().enumerate() {
        scatter[c] += euclidean_distance(&features.row(i), &centroids.row(c));
        sizes[c] += 1;
    }
    for (s, &size) in scatter.iter_mut().zip(&sizes) {
        if size > 0 {
            *s /= size as f64;
        }
    }

    if scatter.iter().all(|&s| s == 0.0) {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..k {
        let worst = (0..k)
            .filter(|&j| j != i)
            .filter_map(|j| {
                let d = euclidean_distance(&centroids.row(i), &centroids.row(j));
                (d > 0.0).then(|| (scatter[i] + scatter[j]) / d)
            })
            .fold(0.0, f64::max);
        total += worst;
    }
    total / k as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> (Array2<f64>, Vec<usize>, Array2<f64>) {
        let features = array![[0.0, 0.0], [0.0, 2.0], [10.0, 0.0], [10.0, 2.0]];
        let labels = vec![0, 0, 1, 1];
        let centroids = array![[0.0, 1.0], [10.0, 1.0]];
        (features, labels, centroids)
    }

    #[test]
    fn test_inertia() {
        let (features, labels, centroids) = two_blobs();
        assert!((inertia(&features, &labels, &centroids) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_silhouette_well_separated() {
        let (features, labels, _) = two_blobs();
        let s = silhouette_score(&features, &labels).unwrap();

        // a = 2, b = (10 + sqrt(104)) / 2 for every point
        let b = (10.0 + 104f64.sqrt()) / 2.0;
        let expected = (b - 2.0) / b;
        assert!((s - expected).abs() < 1e-12);
    }

    #[test]
    fn test_silhouette_undefined_cases() {
        let (features, _, _) = two_blobs();
        assert_eq!(silhouette_score(&features, &[0, 0, 0, 0]), None);
        assert_eq!(silhouette_score(&features, &[0, 1, 2, 3]), None);
    }

    #[test]
    fn test_silhouette_singleton_scores_zero() {
        let features = array![[0.0], [1.0], [10.0]];
        let s = silhouette_score(&features, &[0, 0, 1]).unwrap();
        // points 0 and 1: a = 1, b = 10 and 9
        let expected = ((10.0 - 1.0) / 10.0 + (9.0 - 1.0) / 9.0) / 3.0;
        assert!((s - expected).abs() < 1e-12);
    }

    #[test]
    fn test_davies_bouldin() {
        let (features, labels, centroids) = two_blobs();
        // S = 1 for both clusters, centroid distance 10
        let db = davies_bouldin_score(&features, &labels, &centroids);
        assert!((db - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_davies_bouldin_zero_scatter() {
        let features = array![[0.0], [5.0]];
        let centroids = array![[0.0], [5.0]];
        assert_eq!(davies_bouldin_score(&features, &[0, 1], &centroids), 0.0);
    }
}
