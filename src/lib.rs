//! custseg: customer lookalike ranking and segmentation
//!
//! Transactions are rolled up into per-customer profiles, encoded once into
//! fixed-width vectors (standardized numerics plus categorical indicators),
//! and then consumed by two independent stages: cosine-similarity lookalike
//! ranking and K-Means clustering with quality metrics.

pub mod cli;
pub mod config;
pub mod data;
pub mod eda;
pub mod error;
pub mod features;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod profile;
pub mod records;
pub mod report;
pub mod similarity;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use config::{LookalikeConfig, PipelineConfig, QuerySelection, SegmentationConfig};
pub use data::load_tables;
pub use eda::EdaSummary;
pub use error::{Error, JoinTable, Result, Warning};
pub use features::{CategoricalFeature, EncodedFeatures, FeatureEncoder, FeatureSet, NumericFeature};
pub use metrics::ClusterMetrics;
pub use model::{fit_kmeans, KMeansModel, KMeansParams};
pub use pipeline::{run, RunOutput};
pub use profile::aggregate_profiles;
pub use records::{Customer, CustomerProfile, Product, Tables, Transaction};
pub use similarity::{
    cosine_similarity, ExactCosine, KdTreeCosine, LookalikeSearch, LookalikeTable, SearchBackend,
    SimilarityMatrix, SimilarityResult,
};
