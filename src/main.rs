//! Command-line entrypoint: runs one document through the pipeline and prints the report.
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use rustyrfp::{config, logging, pipeline::Pipeline};

#[derive(Parser)]
#[command(
    name = "rustyrfp",
    about = "Extract intent and a section outline from an RFP document"
)]
struct Cli {
    /// Document to process, as `<dir>/<name>.<extension>`.
    path: PathBuf,
    /// Chunks per extraction batch; overrides EXTRACTION_BATCH_SIZE.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Print the report on a single line.
    #[arg(long)]
    compact: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = config::init_config().context("invalid configuration")?;
    logging::init_tracing();
    config.log_summary();

    let mut pipeline = Pipeline::from_config(config).context("failed to create LLM client")?;
    if let Some(batch_size) = cli.batch_size {
        pipeline = pipeline.with_batch_size(batch_size);
    }

    let path = cli.path.to_string_lossy();
    let report = pipeline
        .run(&path)
        .await
        .with_context(|| format!("failed to process '{path}'"))?;

    let rendered = if cli.compact {
        serde_json::to_string(&report)
    } else {
        serde_json::to_string_pretty(&report)
    }
    .context("failed to render report")?;
    println!("{rendered}");

    Ok(if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
