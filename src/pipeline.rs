//! End-to-end run: aggregate, encode once, then rank and cluster

use crate::config::PipelineConfig;
use crate::error::{Error, Result, Warning};
use crate::features::{EncodedFeatures, FeatureEncoder};
use crate::model::{fit_kmeans, validate_cluster_count, KMeansModel};
use crate::profile::aggregate_profiles;
use crate::records::{CustomerProfile, Tables};
use crate::similarity::LookalikeTable;
use tracing::info;

/// Everything one run produces. Nothing is written until this exists.
#[derive(Debug)]
pub struct RunOutput {
    pub profiles: Vec<CustomerProfile>,
    pub encoder: FeatureEncoder,
    pub lookalikes: LookalikeTable,
    pub segmentation: KMeansModel,
    /// All recoverable conditions, in the order they were raised
    pub warnings: Vec<Warning>,
}

impl RunOutput {
    /// Rows dropped because a customer or product reference did not resolve
    pub fn dropped_rows(&self) -> usize {
        self.warnings
            .iter()
            .map(|w| match w {
                Warning::MissingJoinKey { dropped, .. } => *dropped,
                _ => 0,
            })
            .sum()
    }
}

/// Aggregated profiles plus the encoder fitted on them
#[derive(Debug)]
pub struct PreparedFeatures {
    pub profiles: Vec<CustomerProfile>,
    pub encoder: FeatureEncoder,
    pub encoded: EncodedFeatures,
    pub warnings: Vec<Warning>,
}

/// Aggregate and encode, failing fast on unusable cluster counts
pub fn prepare(tables: &Tables, config: &PipelineConfig) -> Result<PreparedFeatures> {
    config.validate()?;

    let (profiles, mut warnings) = aggregate_profiles(tables);
    if profiles.len() < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            found: profiles.len(),
        });
    }
    validate_cluster_count(config.segmentation.kmeans.n_clusters, profiles.len())?;

    let (encoder, encoder_warnings) = FeatureEncoder::fit(&profiles, &config.encoded_features())?;
    warnings.extend(encoder_warnings);
    let encoded = encoder.transform(&profiles);

    Ok(PreparedFeatures {
        profiles,
        encoder,
        encoded,
        warnings,
    })
}

/// Lookalike ranking over the configured column subset
pub fn run_lookalikes(prepared: &PreparedFeatures, config: &PipelineConfig) -> Result<LookalikeTable> {
    let view = prepared.encoded.select(&config.lookalike.features)?;
    let queries = config.lookalike.queries.resolve(&view.customer_ids);
    config
        .lookalike
        .backend
        .searcher()
        .search(&view, &queries, config.lookalike.top_n)
}

/// K-Means segmentation over the configured column subset
pub fn run_segmentation(prepared: &PreparedFeatures, config: &PipelineConfig) -> Result<KMeansModel> {
    let view = prepared.encoded.select(&config.segmentation.features)?;
    fit_kmeans(&view, &config.segmentation.kmeans)
}

/// Run both consumers off one shared encoding
pub fn run(tables: &Tables, config: &PipelineConfig) -> Result<RunOutput> {
    let prepared = prepare(tables, config)?;
    let lookalikes = run_lookalikes(&prepared, config)?;
    let segmentation = run_segmentation(&prepared, config)?;

    let PreparedFeatures {
        profiles,
        encoder,
        mut warnings,
        ..
    } = prepared;
    warnings.extend(lookalikes.warnings.iter().cloned());
    warnings.extend(segmentation.warnings.iter().cloned());

    info!(
        "Pipeline finished: {} profiles, {} lookalike rows, {} clusters, {} warnings",
        profiles.len(),
        lookalikes.results.len(),
        segmentation.n_clusters,
        warnings.len()
    );

    Ok(RunOutput {
        profiles,
        encoder,
        lookalikes,
        segmentation,
        warnings,
    })
}
