//! Covariate stacker.
//!
//! Reads a workflow file naming a reference grid (or an area of interest to
//! build one from the elevation service) and a set of covariate rasters,
//! optionally adds terrain, oblique-coordinate, climate and spectral index
//! layers, aligns everything onto the reference grid and writes one GeoTIFF
//! per band to the output directory.

mod config;
mod run;

use std::path::PathBuf;

use alignment::ResampleMethod;
use anyhow::{Context, Result};
use clap::Parser;
use collaborators::CollaboratorConfig;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "stacker")]
#[command(about = "Align covariate rasters onto a reference grid")]
struct Args {
    /// Workflow file (YAML)
    #[arg(short, long, env = "STACKER_WORKFLOW")]
    workflow: PathBuf,

    /// Override the workflow's output directory
    #[arg(short, long, env = "STACKER_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Override the resampling method (near, bilinear, cubic)
    #[arg(long)]
    resample: Option<ResampleMethod>,

    /// Keep constant layers
    #[arg(long)]
    keep_constant: bool,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder().with_max_level(level).with_target(true);
    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let mut workflow = config::load_workflow(&args.workflow)?;
    if let Some(dir) = args.output_dir {
        workflow.output_dir = dir;
    }
    if args.resample.is_some() || args.keep_constant {
        let mut align = workflow.align_config();
        if let Some(method) = args.resample {
            align.options.method = method;
        }
        if args.keep_constant {
            align.options.remove_constant = false;
        }
        workflow.align = Some(align);
    }

    let collaborators = CollaboratorConfig::from_env();
    collaborators
        .validate()
        .context("Invalid collaborator configuration")?;

    info!(workflow = %args.workflow.display(), "Starting covariate stacker");

    let report = run::run(&workflow, &collaborators).await?;

    info!(layers = ?report.layers, files = report.files.len(), "Done");
    Ok(())
}
