//! Output artifacts: lookalike table, cluster table and JSON report

use crate::error::{Result, Warning};
use crate::model::KMeansModel;
use crate::pipeline::RunOutput;
use crate::records::CustomerProfile;
use crate::similarity::LookalikeTable;
use crate::viz;
use polars::prelude::*;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const LOOKALIKE_FILE: &str = "Lookalike.csv";
pub const CLUSTERS_FILE: &str = "customer_clusters.csv";
pub const REPORT_FILE: &str = "segmentation_report.json";
pub const SCATTER_FILE: &str = "customer_clusters.svg";
pub const SIZES_FILE: &str = "customer_clusters_sizes.svg";

const ARTIFACT_FILES: [&str; 5] = [LOOKALIKE_FILE, CLUSTERS_FILE, REPORT_FILE, SCATTER_FILE, SIZES_FILE];

/// Build the `CustomerID,SimilarCustomers` frame, one row per query
pub fn lookalike_frame(table: &LookalikeTable) -> Result<DataFrame> {
    let ids: Vec<String> = table.results.iter().map(|r| r.query_id.clone()).collect();
    let similar: Vec<String> = table.results.iter().map(|r| r.format_lookalikes()).collect();
    let df = df!(
        "CustomerID" => ids,
        "SimilarCustomers" => similar,
    )?;
    Ok(df)
}

/// Build the per-customer cluster frame with the raw numeric features
pub fn cluster_frame(model: &KMeansModel, profiles: &[CustomerProfile]) -> Result<DataFrame> {
    let mut ids = Vec::with_capacity(model.labels.len());
    let mut clusters = Vec::with_capacity(model.labels.len());
    let mut quantities = Vec::with_capacity(model.labels.len());
    let mut values = Vec::with_capacity(model.labels.len());

    for (profile, (id, &label)) in profiles.iter().zip(model.customer_ids.iter().zip(&model.labels)) {
        debug_assert_eq!(&profile.customer_id, id);
        ids.push(id.clone());
        clusters.push(label as u32);
        quantities.push(profile.total_quantity);
        values.push(profile.total_value);
    }

    let df = df!(
        "CustomerID" => ids,
        "Cluster" => clusters,
        "Quantity" => quantities,
        "TotalValue" => values,
    )?;
    Ok(df)
}

fn write_frame(mut df: DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

/// Write `Lookalike.csv`
pub fn write_lookalikes_csv(table: &LookalikeTable, path: &Path) -> Result<()> {
    write_frame(lookalike_frame(table)?, path)
}

/// Write the customer to cluster table
pub fn write_cluster_csv(model: &KMeansModel, profiles: &[CustomerProfile], path: &Path) -> Result<()> {
    write_frame(cluster_frame(model, profiles)?, path)
}

/// Per-cluster summary in the JSON report
#[derive(Debug, Serialize)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub size: usize,
    pub centroid: Vec<f64>,
}

/// Machine-readable segmentation report
#[derive(Debug, Serialize)]
pub struct SegmentationReport<'a> {
    pub n_clusters: usize,
    pub n_customers: usize,
    pub inertia: f64,
    pub silhouette: Option<f64>,
    pub davies_bouldin: f64,
    pub iterations: usize,
    pub converged: bool,
    pub dimensions: Vec<String>,
    pub clusters: Vec<ClusterSummary>,
    pub warnings: &'a [Warning],
}

impl<'a> SegmentationReport<'a> {
    pub fn new(model: &KMeansModel, warnings: &'a [Warning]) -> Self {
        let clusters = model
            .cluster_sizes()
            .into_iter()
            .enumerate()
            .map(|(cluster, size)| ClusterSummary {
                cluster,
                size,
                centroid: model.centroids.row(cluster).to_vec(),
            })
            .collect();

        Self {
            n_clusters: model.n_clusters,
            n_customers: model.labels.len(),
            inertia: model.metrics.inertia,
            silhouette: model.metrics.silhouette,
            davies_bouldin: model.metrics.davies_bouldin,
            iterations: model.iterations,
            converged: model.converged,
            dimensions: model.dimensions.iter().map(ToString::to_string).collect(),
            clusters,
            warnings,
        }
    }
}

/// Write the segmentation report as pretty JSON
pub fn write_segmentation_report(report: &SegmentationReport<'_>, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    info!("Wrote segmentation report to {}", path.display());
    Ok(())
}

/// Render every artifact of a run into `dir`
fn render_artifacts(output: &RunOutput, dir: &Path) -> Result<()> {
    write_lookalikes_csv(&output.lookalikes, &dir.join(LOOKALIKE_FILE))?;
    write_cluster_csv(&output.segmentation, &output.profiles, &dir.join(CLUSTERS_FILE))?;

    let report = SegmentationReport::new(&output.segmentation, &output.warnings);
    write_segmentation_report(&report, &dir.join(REPORT_FILE))?;

    viz::create_cluster_scatter(&output.profiles, &output.segmentation, &dir.join(SCATTER_FILE), None)?;
    viz::create_cluster_size_chart(&output.segmentation, &dir.join(SIZES_FILE))?;
    Ok(())
}

/// Render `files` into a staging directory inside `output_dir` and move them
/// into place only once `render` has succeeded. The staging directory is
/// removed on every path out.
fn stage_and_commit<F>(output_dir: &Path, files: &[&str], render: F) -> Result<Vec<PathBuf>>
where
    F: FnOnce(&Path) -> Result<()>,
{
    fs::create_dir_all(output_dir)?;
    let staging = tempfile::Builder::new()
        .prefix(".custseg-")
        .tempdir_in(output_dir)?;
    debug!("Staging artifacts in {}", staging.path().display());

    render(staging.path())?;

    let mut written = Vec::with_capacity(files.len());
    for name in files {
        let target = output_dir.join(name);
        fs::rename(staging.path().join(name), &target)?;
        written.push(target);
    }
    Ok(written)
}

/// Write all artifacts of a successful run to `output_dir`.
///
/// Nothing lands in `output_dir` unless every artifact rendered.
pub fn write_artifacts(output: &RunOutput, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let written = stage_and_commit(output_dir, &ARTIFACT_FILES, |dir| render_artifacts(output, dir))?;
    info!("Artifacts written to {}", output_dir.display());
    Ok(written)
}
