use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use neo_hazard::{
    flatten_with_stats, table, train, write_artifacts, RawApproachDocument, TrainConfig,
};

// ---------- CLI ----------

#[derive(Parser, Debug)]
#[command(name = "neo-hazard", version, about = "Flatten NeoWs feeds and train a hazard classifier")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a NeoWs JSON document into a tidy CSV.
    Flatten {
        /// Input NeoWs JSON path
        #[arg(long = "in")]
        input: PathBuf,
        /// Output CSV path
        #[arg(long)]
        out: PathBuf,
    },
    /// Train on a flattened CSV and save model + metrics.
    Train {
        /// Input CSV features
        #[arg(long = "in")]
        input: PathBuf,
        #[command(flatten)]
        train: TrainArgs,
    },
    /// Flatten, persist the CSV, then train from the persisted CSV.
    Pipeline {
        /// Input NeoWs JSON path
        #[arg(long = "in")]
        input: PathBuf,
        /// Intermediate CSV path
        #[arg(long)]
        csv: PathBuf,
        #[command(flatten)]
        train: TrainArgs,
    },
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Path to save the fitted pipeline; metrics land in the same directory
    #[arg(long)]
    model: PathBuf,
    /// JSON training config (falls back to $NEO_HAZARD_CONFIG, then defaults)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the split seed
    #[arg(long)]
    seed: Option<u64>,
    /// Override the classifier iteration budget
    #[arg(long)]
    max_iter: Option<usize>,
}

impl TrainArgs {
    fn resolve_config(&self) -> Result<TrainConfig> {
        let mut cfg = TrainConfig::resolve(self.config.as_deref())
            .context("failed to load training config")?;
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        if let Some(max_iter) = self.max_iter {
            cfg.max_iter = max_iter;
        }
        Ok(cfg)
    }
}

// ---------- Commands ----------

fn run_flatten(input: &Path, out: &Path) -> Result<()> {
    let doc = RawApproachDocument::load(input)
        .with_context(|| format!("failed to load document {}", input.display()))?;
    let (rows, stats) = flatten_with_stats(&doc);
    tracing::info!(
        "flattened {} dates / {} objects -> {} rows ({} hazardous, {} malformed fields)",
        stats.dates,
        stats.objects,
        stats.rows,
        stats.hazardous_rows,
        stats.malformed_fields
    );
    table::write_rows_to_path(out, &rows)
        .with_context(|| format!("failed to write {}", out.display()))?;
    tracing::info!("wrote {} rows to {}", rows.len(), out.display());
    Ok(())
}

fn run_train(input: &Path, args: &TrainArgs) -> Result<()> {
    let cfg = args.resolve_config()?;
    let rows = table::read_rows_from_path(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    tracing::info!("loaded {} rows from {}", rows.len(), input.display());

    let (pipeline, report) = train(&rows, &cfg).context("training failed; no model written")?;
    println!("{}", report);

    let paths = write_artifacts(&args.model, &pipeline, &report)?;
    println!("Saved model -> {}", paths.model.display());
    println!("Saved metrics -> {}", paths.metrics_text.display());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Flatten { input, out } => run_flatten(&input, &out),
        Command::Train { input, train } => run_train(&input, &train),
        Command::Pipeline { input, csv, train } => {
            run_flatten(&input, &csv)?;
            run_train(&csv, &train)
        }
    }
}
