//! Command-line interface definitions and argument parsing

use crate::config::{LookalikeConfig, PipelineConfig, QuerySelection, SegmentationConfig};
use crate::features::{CategoricalFeature, FeatureSet, NumericFeature};
use crate::model::KMeansParams;
use crate::similarity::SearchBackend;
use clap::Parser;
use std::path::PathBuf;

/// Customer lookalike ranking and K-Means segmentation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Customers CSV (CustomerID,CustomerName,Region,SignupDate)
    #[arg(long, default_value = "Customers.csv")]
    pub customers: PathBuf,

    /// Products CSV (ProductID,ProductName,Category,Price)
    #[arg(long, default_value = "Products.csv")]
    pub products: PathBuf,

    /// Transactions CSV (TransactionID,CustomerID,ProductID,TransactionDate,Quantity,TotalValue)
    #[arg(long, default_value = "Transactions.csv")]
    pub transactions: PathBuf,

    /// Directory for the generated tables, report and plots
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value = "4")]
    pub clusters: usize,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: usize,

    /// Seed for centroid initialization
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of lookalikes per query customer
    #[arg(short = 'n', long, default_value = "3")]
    pub top_n: usize,

    /// Query customers, comma separated. Overrides --query-count
    #[arg(short, long, value_delimiter = ',')]
    pub query: Vec<String>,

    /// Query the first N customers by identifier
    #[arg(long, default_value = "20")]
    pub query_count: usize,

    /// Lookalike search implementation
    #[arg(long, value_enum, default_value_t = SearchBackend::Exact)]
    pub backend: SearchBackend,

    /// Numeric columns used for lookalikes
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [NumericFeature::Quantity, NumericFeature::TotalValue])]
    pub lookalike_numeric: Vec<NumericFeature>,

    /// Categorical columns used for lookalikes
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [CategoricalFeature::Category, CategoricalFeature::Region])]
    pub lookalike_categorical: Vec<CategoricalFeature>,

    /// Numeric columns used for clustering
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [NumericFeature::Quantity, NumericFeature::TotalValue])]
    pub cluster_numeric: Vec<NumericFeature>,

    /// Categorical columns used for clustering
    #[arg(long, value_enum, value_delimiter = ',')]
    pub cluster_categorical: Vec<CategoricalFeature>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Build the pipeline configuration from the parsed flags
    pub fn pipeline_config(&self) -> PipelineConfig {
        let queries = if self.query.is_empty() {
            QuerySelection::FirstN(self.query_count)
        } else {
            QuerySelection::Explicit(self.query.clone())
        };

        PipelineConfig {
            lookalike: LookalikeConfig {
                top_n: self.top_n,
                queries,
                features: FeatureSet::new(
                    self.lookalike_numeric.iter().copied(),
                    self.lookalike_categorical.iter().copied(),
                ),
                backend: self.backend,
            },
            segmentation: SegmentationConfig {
                kmeans: KMeansParams {
                    n_clusters: self.clusters,
                    max_iterations: self.max_iters,
                    seed: self.seed,
                },
                features: FeatureSet::new(
                    self.cluster_numeric.iter().copied(),
                    self.cluster_categorical.iter().copied(),
                ),
            },
        }
    }
}
