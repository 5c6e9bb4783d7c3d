//! Visualization functions using Plotters for cluster analysis

use crate::error::{Error, Result};
use crate::model::KMeansModel;
use crate::records::CustomerProfile;
use plotters::prelude::*;
use std::fmt::Display;
use std::path::Path;

/// Color palette for different clusters
const CLUSTER_COLORS: [RGBColor; 5] = [RED, BLUE, GREEN, MAGENTA, CYAN];

fn cluster_color(cluster: usize) -> RGBColor {
    CLUSTER_COLORS.get(cluster).copied().unwrap_or(BLACK)
}

fn plot_error(e: impl Display) -> Error {
    Error::Plot(e.to_string())
}

/// Min and max of a series, padded by 5% of the span
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((max - min) * 0.05).max(1.0);
    (min - pad, max + pad)
}

/// Scatter of total quantity against total value, colored by cluster
///
/// # Arguments
/// * `profiles` - Customer profiles, in the order the model was fitted on
/// * `model` - Fitted K-Means model with cluster assignments
/// * `output_path` - Path of the SVG to write
/// * `plot_title` - Title for the plot
pub fn create_cluster_scatter(
    profiles: &[CustomerProfile],
    model: &KMeansModel,
    output_path: &Path,
    plot_title: Option<&str>,
) -> Result<()> {
    let title = plot_title.unwrap_or("Customer Segmentation using KMeans Clustering");

    let (x_min, x_max) = padded_range(profiles.iter().map(|p| p.total_quantity as f64));
    let (y_min, y_max) = padded_range(profiles.iter().map(|p| p.total_value));

    let root = SVGBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc("Total Quantity Purchased")
        .y_desc("Total Value of Transactions")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(plot_error)?;

    for cluster in 0..model.n_clusters {
        let color = cluster_color(cluster);
        let points = profiles
            .iter()
            .zip(&model.labels)
            .filter(|&(_, &label)| label == cluster)
            .map(|(p, _)| (p.total_quantity as f64, p.total_value));

        chart
            .draw_series(points.map(|point| Circle::new(point, 5, color.filled())))
            .map_err(plot_error)?
            .label(format!("Cluster {}", cluster))
            .legend(move |(x, y)| Circle::new((x + 5, y), 5, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    Ok(())
}

/// Bar chart of cluster sizes
pub fn create_cluster_size_chart(model: &KMeansModel, output_path: &Path) -> Result<()> {
    let cluster_sizes = model.cluster_sizes();
    let max_size = cluster_sizes.iter().copied().max().unwrap_or(1) as f64;

    let root = SVGBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Cluster Sizes", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5f64..(model.n_clusters as f64 - 0.5), 0f64..(max_size * 1.1))
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc("Cluster ID")
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(plot_error)?;

    chart
        .draw_series(cluster_sizes.iter().enumerate().map(|(cluster, &size)| {
            Rectangle::new(
                [(cluster as f64 - 0.4, 0.0), (cluster as f64 + 0.4, size as f64)],
                cluster_color(cluster).filled(),
            )
        }))
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    Ok(())
}

/// Print cluster statistics to console
pub fn print_cluster_statistics(model: &KMeansModel) {
    let total = model.labels.len();
    println!("\n=== Cluster Statistics ===");
    println!("Number of clusters: {}", model.n_clusters);
    println!("Total customers: {}", total);
    println!("Inertia (within-cluster sum of squares): {:.4}", model.metrics.inertia);
    match model.metrics.silhouette {
        Some(s) => println!("Silhouette score: {:.4}", s),
        None => println!("Silhouette score: N/A"),
    }
    println!("Davies-Bouldin index: {:.4}", model.metrics.davies_bouldin);

    println!("\nCluster sizes:");
    for (i, size) in model.cluster_sizes().into_iter().enumerate() {
        let percentage = (size as f64 / total as f64) * 100.0;
        println!("  Cluster {}: {} customers ({:.1}%)", i, size, percentage);
    }

    println!("\nCluster centroids (standardized):");
    for (i, centroid) in model.centroids.outer_iter().enumerate() {
        let coords: Vec<String> = centroid.iter().map(|v| format!("{:7.2}", v)).collect();
        println!("  {:7} | {}", i, coords.join(" | "));
    }
}
