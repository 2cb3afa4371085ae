//! Feed Ranker
//!
//! Offline batch pipeline for the content feed:
//! - Time-ranged train/eval/test splits with test-set negative sampling
//! - Trailing-window popularity and static profile features
//! - Wide-table merge and backward as-of binding
//! - Logistic click model training, ranking, and evaluation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use pipeline::{Pipeline, PipelineConfig};
use telemetry::{init_tracing_from_env, metrics};

#[derive(Debug, Parser)]
#[command(name = "feed-ranker", version, about = "Build the feed dataset, features, and click model")]
struct Cli {
    /// Configuration file (TOML); defaults to config/default.toml when present
    #[arg(long, global = true, env = "RANKER_CONFIG")]
    config: Option<PathBuf>,

    /// Override paths.input_data_path
    #[arg(long, global = true)]
    data_path: Option<String>,

    /// Override paths.output_data_root
    #[arg(long, global = true)]
    output_root: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Split the event log into train, eval, and test
    MakeDataset,
    /// Compute every configured feature group
    BuildFeatures,
    /// Merge feature tables into the wide table
    MergeFeatures,
    /// Train the click model
    Train(FeatureArgs),
    /// Score and rank the test split
    Predict(FeatureArgs),
    /// Run every stage in order
    Run(FeatureArgs),
}

#[derive(Debug, Args)]
struct FeatureArgs {
    /// Feature groups to use (repeatable); all groups when omitted
    #[arg(long = "features", value_name = "GROUP")]
    features: Vec<String>,
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing_from_env();

    info!("Starting feed-ranker v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let pipeline = Pipeline::new(config).context("Invalid configuration")?;
    info!(run_id = %pipeline.run_id(), command = ?cli.command, "Configuration loaded");

    let outcome = run(&pipeline, &cli.command);
    log_metrics();

    if let Err(ref e) = outcome {
        error!(error = %e, "Run failed");
    }
    outcome
}

fn run(pipeline: &Pipeline, command: &Command) -> Result<()> {
    match command {
        Command::MakeDataset => {
            pipeline.make_dataset().context("make-dataset failed")?;
        }
        Command::BuildFeatures => {
            pipeline.build_features().context("build-features failed")?;
        }
        Command::MergeFeatures => {
            pipeline.merge_features().context("merge-features failed")?;
        }
        Command::Train(args) => {
            pipeline.train(&args.features).context("train failed")?;
        }
        Command::Predict(args) => {
            pipeline.predict(&args.features).context("predict failed")?;
        }
        Command::Run(args) => {
            pipeline.run_all(&args.features).context("run failed")?;
        }
    }
    Ok(())
}

/// Load configuration from files and environment.
fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let file = match &cli.config {
        Some(path) => config::File::from(path.as_path())
            .required(true)
            .format(config::FileFormat::Toml),
        None => config::File::with_name("config/default")
            .required(false)
            .format(config::FileFormat::Toml),
    };

    let config = config::Config::builder()
        .add_source(file)
        // Override with environment variables, e.g. RANKER__MODEL__EPOCHS=20
        .add_source(
            config::Environment::with_prefix("RANKER")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("features.windows"),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: PipelineConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    if let Some(data_path) = &cli.data_path {
        config.paths.input_data_path = data_path.clone();
    }
    if let Some(output_root) = &cli.output_root {
        config.paths.output_data_root = output_root.clone();
    }

    Ok(config)
}

fn log_metrics() {
    let snapshot = metrics().snapshot();
    info!(
        events_loaded = snapshot.events_loaded,
        duplicate_events = snapshot.duplicate_events,
        train_rows = snapshot.train_rows,
        eval_rows = snapshot.eval_rows,
        test_rows = snapshot.test_rows,
        sparse_users_dropped = snapshot.sparse_users_dropped,
        test_seeds = snapshot.test_seeds,
        test_negatives = snapshot.test_negatives,
        feature_tables_built = snapshot.feature_tables_built,
        feature_rows = snapshot.feature_rows,
        merged_rows = snapshot.merged_rows,
        bound_rows = snapshot.bound_rows,
        epochs_run = snapshot.epochs_run,
        rows_scored = snapshot.rows_scored,
        snapshots_written = snapshot.snapshots_written,
        stage_latency_mean_ms = snapshot.stage_latency_mean_ms,
        "Run metrics"
    );
    for stage in &snapshot.stages {
        info!(stage = %stage.stage, millis = stage.millis, "Stage timing");
    }
}
