//! Cosine similarity and top-N lookalike ranking

use crate::error::{Error, Result, Warning};
use crate::features::EncodedFeatures;
use clap::ValueEnum;
use linfa_nn::distance::L2Dist;
use linfa_nn::{CommonNearestNeighbour, NearestNeighbour};
use ndarray::{Array2, ArrayView1, Axis};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::info;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// One ranked candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lookalike {
    pub customer_id: String,
    pub score: f64,
}

/// Ranked lookalikes for one query customer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub query_id: String,
    pub lookalikes: Vec<Lookalike>,
}

impl SimilarityResult {
    /// Render as `[(C0002, 0.9123), (C0005, 0.87)]`, scores rounded to 4 decimals
    pub fn format_lookalikes(&self) -> String {
        let pairs: Vec<String> = self
            .lookalikes
            .iter()
            .map(|l| format!("({}, {})", l.customer_id, format_score(l.score)))
            .collect();
        format!("[{}]", pairs.join(", "))
    }
}

/// Round to 4 decimals, always keeping a fractional part (`1.0`, not `1`)
fn format_score(x: f64) -> String {
    let rounded = (x * 10_000.0).round() / 10_000.0;
    // -0.0 prints as "-0"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    let text = rounded.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

/// Cosine similarity, 0 when either vector has zero norm
pub fn cosine_similarity(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    let norm_a = a.dot(a).sqrt();
    let norm_b = b.dot(b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (a.dot(b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Sort by descending score, ties by ascending customer id
fn rank(candidates: &mut [Lookalike]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });
}

fn require_pairs(features: &EncodedFeatures) -> Result<()> {
    if features.len() < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            found: features.len(),
        });
    }
    Ok(())
}

/// Full pairwise cosine similarity matrix
#[derive(Debug, Clone)]
pub struct SimilarityMatrix {
    customer_ids: Vec<String>,
    scores: Array2<f64>,
}

impl SimilarityMatrix {
    /// Compute every pair. Rows are independent, so the `parallel` feature
    /// splits them across threads without changing any value.
    pub fn compute(features: &EncodedFeatures) -> Result<Self> {
        require_pairs(features)?;

        let m = features.len();
        let data = &features.matrix;
        let row_scores = |i: usize| -> Vec<f64> {
            let a = data.row(i);
            (0..m).map(|j| cosine_similarity(&a, &data.row(j))).collect()
        };

        #[cfg(feature = "parallel")]
        let rows: Vec<Vec<f64>> = (0..m).into_par_iter().map(row_scores).collect();
        #[cfg(not(feature = "parallel"))]
        let rows: Vec<Vec<f64>> = (0..m).map(row_scores).collect();

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let found = flat.len();
        let scores = Array2::from_shape_vec((m, m), flat).map_err(|_| Error::DimensionMismatch {
            expected: m * m,
            found,
        })?;

        Ok(Self {
            customer_ids: features.customer_ids.clone(),
            scores,
        })
    }

    pub fn score(&self, i: usize, j: usize) -> f64 {
        self.scores[[i, j]]
    }

    /// Top `n` other customers for the customer at row `query`.
    ///
    /// The query row is removed before ranking rather than relying on its
    /// self-score sorting first.
    pub fn top_n(&self, query: usize, n: usize) -> Vec<Lookalike> {
        let mut candidates: Vec<Lookalike> = self
            .scores
            .row(query)
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != query)
            .map(|(j, &score)| Lookalike {
                customer_id: self.customer_ids[j].clone(),
                score,
            })
            .collect();
        rank(&mut candidates);
        candidates.truncate(n);
        candidates
    }
}

/// Lookalikes for every requested query plus any skipped queries
#[derive(Debug, Clone, Default, Serialize)]
pub struct LookalikeTable {
    pub results: Vec<SimilarityResult>,
    pub warnings: Vec<Warning>,
}

/// Strategy for answering top-N lookalike queries.
///
/// Implementations must return the same contract: self excluded, at most `n`
/// entries, descending score with ascending-id tie break.
pub trait LookalikeSearch {
    fn search(&self, features: &EncodedFeatures, queries: &[String], n: usize) -> Result<LookalikeTable>;
}

/// Resolve query ids to rows, warning about unknown ones
fn resolve_queries(features: &EncodedFeatures, queries: &[String]) -> (Vec<(String, usize)>, Vec<Warning>) {
    let mut resolved = Vec::with_capacity(queries.len());
    let mut warnings = Vec::new();
    for id in queries {
        match features.position(id) {
            Some(row) => resolved.push((id.clone(), row)),
            None => warnings.push(
                Warning::UnknownQueryCustomer {
                    customer_id: id.clone(),
                }
                .emit(),
            ),
        }
    }
    (resolved, warnings)
}

/// Exhaustive search over the full similarity matrix
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactCosine;

impl LookalikeSearch for ExactCosine {
    fn search(&self, features: &EncodedFeatures, queries: &[String], n: usize) -> Result<LookalikeTable> {
        let matrix = SimilarityMatrix::compute(features)?;
        let (resolved, warnings) = resolve_queries(features, queries);

        let results = resolved
            .into_iter()
            .map(|(query_id, row)| SimilarityResult {
                query_id,
                lookalikes: matrix.top_n(row, n),
            })
            .collect::<Vec<_>>();

        info!(
            "Ranked top-{} lookalikes for {} customers over {} candidates",
            n,
            results.len(),
            features.len()
        );
        Ok(LookalikeTable { results, warnings })
    }
}

/// k-d tree search over unit-normalised vectors.
///
/// On the unit sphere Euclidean order matches cosine order, so the tree
/// proposes candidates and each is rescored with exact cosine similarity.
/// Zero vectors cannot be normalised; they stay at the origin, which can
/// leave them out of a neighbourhood the exact search would include.
#[derive(Debug, Clone, Copy, Default)]
pub struct KdTreeCosine;

impl LookalikeSearch for KdTreeCosine {
    fn search(&self, features: &EncodedFeatures, queries: &[String], n: usize) -> Result<LookalikeTable> {
        require_pairs(features)?;

        let mut normalised = features.matrix.clone();
        for mut row in normalised.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|x| x / norm);
            }
        }

        let index = CommonNearestNeighbour::KdTree
            .from_batch(&normalised, L2Dist)
            .map_err(|e| Error::NearestNeighbour(e.to_string()))?;

        let (resolved, warnings) = resolve_queries(features, queries);
        // one extra for the query itself
        let k = (n + 1).min(features.len());

        let mut results = Vec::with_capacity(resolved.len());
        for (query_id, row) in resolved {
            let neighbours = index
                .k_nearest(normalised.row(row), k)
                .map_err(|e| Error::NearestNeighbour(e.to_string()))?;

            let query = features.matrix.row(row);
            let mut candidates: Vec<Lookalike> = neighbours
                .into_iter()
                .filter(|&(_, j)| j != row)
                .map(|(_, j)| Lookalike {
                    customer_id: features.customer_ids[j].clone(),
                    score: cosine_similarity(&query, &features.matrix.row(j)),
                })
                .collect();
            rank(&mut candidates);
            candidates.truncate(n);
            results.push(SimilarityResult {
                query_id,
                lookalikes: candidates,
            });
        }

        info!(
            "Ranked top-{} lookalikes for {} customers with a k-d tree",
            n,
            results.len()
        );
        Ok(LookalikeTable { results, warnings })
    }
}

/// Selectable search implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
pub enum SearchBackend {
    /// Full pairwise matrix
    #[default]
    Exact,
    /// k-d tree candidate search
    KdTree,
}

impl SearchBackend {
    pub fn searcher(self) -> Box<dyn LookalikeSearch> {
        match self {
            SearchBackend::Exact => Box::new(ExactCosine),
            SearchBackend::KdTree => Box::new(KdTreeCosine),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Dimension;
    use crate::features::NumericFeature;
    use ndarray::{array, Array1};
    use proptest::prelude::*;

    fn features(ids: &[&str], matrix: Array2<f64>) -> EncodedFeatures {
        let dims = (0..matrix.ncols())
            .map(|_| Dimension::Numeric(NumericFeature::Quantity))
            .collect();
        EncodedFeatures {
            customer_ids: ids.iter().map(|s| s.to_string()).collect(),
            matrix,
            dimensions: dims,
        }
    }

    fn queries(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cosine_basics() {
        let a = array![1.0, 2.0, 3.0];
        let b = array![-1.0, -2.0, -3.0];
        let zero = array![0.0, 0.0, 0.0];

        assert!((cosine_similarity(&a.view(), &a.view()) - 1.0).abs() < 1e-12);
        assert!((cosine_similarity(&a.view(), &b.view()) + 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&a.view(), &zero.view()), 0.0);
        assert_eq!(cosine_similarity(&zero.view(), &zero.view()), 0.0);
    }

    #[test]
    fn test_self_is_excluded_even_on_ties() {
        // all identical: every score is 1.0
        let f = features(&["C3", "C1", "C2"], Array2::ones((3, 2)));
        let matrix = SimilarityMatrix::compute(&f).unwrap();

        let top = matrix.top_n(1, 5);
        let ids: Vec<&str> = top.iter().map(|l| l.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["C2", "C3"]);
    }

    #[test]
    fn test_top_n_orders_by_score_then_id() {
        let f = features(
            &["A", "B", "C", "D"],
            array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 1.0]],
        );
        let table = ExactCosine.search(&f, &queries(&["A"]), 2).unwrap();
        let result = &table.results[0];

        assert_eq!(result.lookalikes.len(), 2);
        assert_eq!(result.lookalikes[0].customer_id, "C");
        assert_eq!(result.lookalikes[1].customer_id, "D");
        assert_eq!(result.lookalikes[0].score, result.lookalikes[1].score);
    }

    #[test]
    fn test_fewer_candidates_than_n() {
        let f = features(&["A", "B"], array![[1.0, 0.0], [0.5, 0.5]]);
        let table = ExactCosine.search(&f, &queries(&["A"]), 3).unwrap();
        assert_eq!(table.results[0].lookalikes.len(), 1);
    }

    #[test]
    fn test_unknown_query_is_warned_and_skipped() {
        let f = features(&["A", "B"], array![[1.0, 0.0], [0.5, 0.5]]);
        let table = ExactCosine.search(&f, &queries(&["Z", "B"]), 3).unwrap();

        assert_eq!(table.results.len(), 1);
        assert_eq!(
            table.warnings,
            vec![Warning::UnknownQueryCustomer {
                customer_id: "Z".to_string()
            }]
        );
    }

    #[test]
    fn test_single_customer_is_insufficient() {
        let f = features(&["A"], array![[1.0, 0.0]]);
        assert!(matches!(
            ExactCosine.search(&f, &queries(&["A"]), 3),
            Err(Error::InsufficientData { required: 2, found: 1 })
        ));
    }

    #[test]
    fn test_kd_tree_agrees_with_exact_on_distinct_scores() {
        let f = features(
            &["A", "B", "C", "D", "E"],
            array![
                [1.0, 0.1, 0.0],
                [0.9, 0.3, 0.1],
                [0.0, 1.0, 0.2],
                [0.2, 0.1, 1.0],
                [1.0, 0.0, 0.4]
            ],
        );
        let q = queries(&["A", "C", "E"]);
        let exact = ExactCosine.search(&f, &q, 2).unwrap();
        let tree = KdTreeCosine.search(&f, &q, 2).unwrap();

        for (e, t) in exact.results.iter().zip(&tree.results) {
            let e_ids: Vec<&str> = e.lookalikes.iter().map(|l| l.customer_id.as_str()).collect();
            let t_ids: Vec<&str> = t.lookalikes.iter().map(|l| l.customer_id.as_str()).collect();
            assert_eq!(e_ids, t_ids);
        }
    }

    #[test]
    fn test_format_lookalikes() {
        let result = SimilarityResult {
            query_id: "C0001".to_string(),
            lookalikes: vec![
                Lookalike {
                    customer_id: "C0002".to_string(),
                    score: 0.912_345_6,
                },
                Lookalike {
                    customer_id: "C0007".to_string(),
                    score: 0.5,
                },
            ],
        };
        assert_eq!(result.format_lookalikes(), "[(C0002, 0.9123), (C0007, 0.5)]");
    }

    #[test]
    fn test_format_score_keeps_fraction() {
        assert_eq!(format_score(0.999_99), "1.0");
        assert_eq!(format_score(-1.0), "-1.0");
        assert_eq!(format_score(-0.000_01), "0.0");
        assert_eq!(format_score(0.000_1), "0.0001");
        assert_eq!(format_score(-0.25), "-0.25");
    }

    proptest! {
        #[test]
        fn prop_cosine_is_bounded(
            a in prop::collection::vec(-1e3f64..1e3, 4),
            b in prop::collection::vec(-1e3f64..1e3, 4),
        ) {
            let a = Array1::from(a);
            let b = Array1::from(b);
            let s = cosine_similarity(&a.view(), &b.view());
            prop_assert!((-1.0..=1.0).contains(&s));
        }
    }
}
