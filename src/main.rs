//! custseg: lookalike ranking and customer segmentation CLI
//!
//! Loads the three input tables, runs both analytic stages off one shared
//! encoding, and writes the lookalike table, cluster table, JSON report and
//! plots. Nothing is written unless the whole run succeeds.

use anyhow::{Context, Result};
use clap::Parser;
use custseg::{eda, load_tables, pipeline, report, viz, Args, EdaSummary};
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.pipeline_config();
    config.validate()?;

    let start_time = Instant::now();

    // Step 1: Load the cleaned input tables
    let tables = load_tables(&args.customers, &args.products, &args.transactions)
        .context("failed to load input tables")?;
    println!(
        "✓ Data loaded: {} customers, {} products, {} transactions",
        tables.customers.len(),
        tables.products.len(),
        tables.transactions.len()
    );

    eda::print_eda_summary(&EdaSummary::compute(&tables));

    // Step 2: Profiles, encoding, lookalikes and clusters
    let output = pipeline::run(&tables, &config)?;
    println!(
        "\n✓ Encoded {} customer profiles into {} dimensions",
        output.profiles.len(),
        output.encoder.dimension()
    );

    println!("\n=== Lookalikes ===");
    for result in &output.lookalikes.results {
        println!("  {}: {}", result.query_id, result.format_lookalikes());
    }

    viz::print_cluster_statistics(&output.segmentation);

    // Step 3: Write artifacts, all or nothing
    let artifacts = report::write_artifacts(&output, &args.output_dir)
        .with_context(|| format!("failed to write artifacts to {}", args.output_dir.display()))?;

    if !output.warnings.is_empty() {
        println!("\n=== Warnings ({}) ===", output.warnings.len());
        for warning in &output.warnings {
            println!("  {}", warning);
        }
        println!("  Rows dropped for unresolved references: {}", output.dropped_rows());
    }

    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    for path in &artifacts {
        println!("Saved: {}", path.display());
    }

    Ok(())
}
