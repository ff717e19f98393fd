use anyhow::{bail, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use readflow::cli::{Args, Command};
use readflow::config::{AlignConfig, CoverageConfig, DeseqConfig, GeneQuantiConfig};
use readflow::executor::StageResult;
use readflow::stages::{self, VizStage};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing subscriber
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.quiet {
            EnvFilter::new("warn")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command {
        Command::Create { project_path } => {
            stages::create_project(&project_path)?;
            Ok(())
        }
        Command::Align(align_args) => {
            // Configuration is validated before any filesystem access.
            let config = AlignConfig::from_args(&align_args)?;
            let result = stages::run_align(&align_args.common.project_path, &config)?;
            finish("align", result)
        }
        Command::Coverage(coverage_args) => {
            let config = CoverageConfig::from_args(&coverage_args)?;
            let result = stages::run_coverage(&coverage_args.common.project_path, &config)?;
            finish("coverage", result)
        }
        Command::GeneQuanti(quanti_args) => {
            let config = GeneQuantiConfig::from_args(&quanti_args)?;
            let result = stages::run_gene_quanti(&quanti_args.common.project_path, &config)?;
            finish("gene_quanti", result)
        }
        Command::Deseq(deseq_args) => {
            let config = DeseqConfig::from_args(&deseq_args)?;
            let result = stages::run_deseq(&deseq_args.common.project_path, &config)?;
            finish("deseq", result)
        }
        Command::VizAlign(viz) => {
            stages::run_viz(&viz.project_path, VizStage::Align)?;
            Ok(())
        }
        Command::VizGeneQuanti(viz) => {
            stages::run_viz(&viz.project_path, VizStage::GeneQuanti)?;
            Ok(())
        }
        Command::VizDeseq(viz) => {
            stages::run_viz(&viz.project_path, VizStage::Deseq)?;
            Ok(())
        }
    }
}

/// A stage that recorded unit failures exits non-zero; the successful units'
/// artifacts stay on disk for inspection and resumption.
fn finish(stage: &str, result: StageResult) -> Result<()> {
    if !result.is_ok() {
        bail!(
            "{stage}: {} of {} units failed",
            result.failures.len(),
            result.attempted()
        );
    }
    Ok(())
}
