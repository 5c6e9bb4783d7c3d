//! Run configuration consumed by the pipeline

use crate::error::{Error, Result};
use crate::features::FeatureSet;
use crate::model::KMeansParams;
use crate::similarity::SearchBackend;
use serde::Serialize;

/// Which customers get a lookalike row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QuerySelection {
    /// The first `n` profiled customers by identifier
    FirstN(usize),
    /// An explicit list, in output order
    Explicit(Vec<String>),
}

impl Default for QuerySelection {
    fn default() -> Self {
        QuerySelection::FirstN(20)
    }
}

impl QuerySelection {
    /// Resolve against the sorted profiled customer ids
    pub fn resolve(&self, sorted_ids: &[String]) -> Vec<String> {
        match self {
            QuerySelection::FirstN(n) => sorted_ids.iter().take(*n).cloned().collect(),
            QuerySelection::Explicit(ids) => ids.clone(),
        }
    }
}

/// Lookalike stage settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookalikeConfig {
    pub top_n: usize,
    pub queries: QuerySelection,
    pub features: FeatureSet,
    pub backend: SearchBackend,
}

impl Default for LookalikeConfig {
    fn default() -> Self {
        Self {
            top_n: 3,
            queries: QuerySelection::default(),
            features: FeatureSet::all(),
            backend: SearchBackend::Exact,
        }
    }
}

/// Clustering stage settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentationConfig {
    pub kmeans: KMeansParams,
    pub features: FeatureSet,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            kmeans: KMeansParams::default(),
            features: FeatureSet::numeric_only(),
        }
    }
}

/// Complete configuration of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub lookalike: LookalikeConfig,
    pub segmentation: SegmentationConfig,
}

impl PipelineConfig {
    /// Reject settings that can never succeed, before any data is touched
    pub fn validate(&self) -> Result<()> {
        if self.lookalike.top_n == 0 {
            return Err(Error::InvalidConfig("top_n must be at least 1".to_string()));
        }
        match &self.lookalike.queries {
            QuerySelection::FirstN(0) => {
                return Err(Error::InvalidConfig("query count must be at least 1".to_string()))
            }
            QuerySelection::Explicit(ids) if ids.is_empty() => {
                return Err(Error::InvalidConfig("query list is empty".to_string()))
            }
            _ => {}
        }
        if self.lookalike.features.is_empty() {
            return Err(Error::InvalidConfig(
                "lookalike feature set is empty".to_string(),
            ));
        }
        if self.segmentation.features.is_empty() {
            return Err(Error::InvalidConfig(
                "segmentation feature set is empty".to_string(),
            ));
        }
        if self.segmentation.kmeans.n_clusters <= 1 {
            return Err(Error::InvalidClusterCount {
                requested: self.segmentation.kmeans.n_clusters,
                n_customers: None,
            });
        }
        if self.segmentation.kmeans.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Columns the shared encoder has to be fitted on
    pub fn encoded_features(&self) -> FeatureSet {
        self.lookalike.features.union(&self.segmentation.features)
    }
}
