//! `sem-run` binary: entry point for the SEM training and scoring loop.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sem-run -- run --config sem.json
//! cargo run --bin sem-run -- fit-pca --config sem.json --runs train.txt --components 0.9
//! cargo run --bin sem-run -- merge-lists --dir output --out complete.txt
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sem_train::config::SemConfig;
use sem_train::lists::{merge_run_lists, parse_input, COMPLETION_LISTS};
use sem_train::pca::ComponentSelection;
use sem_train::trainer::Trainer;

/// Command-line arguments for the SEM binary.
#[derive(Parser, Debug)]
#[command(name = "sem-run", version, about = "SEM feature alignment and event segmentation", long_about = None)]
struct Args {
    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train and evaluate over the configured run lists.
    Run {
        /// JSON configuration file. Defaults are used when omitted.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Override the number of epochs.
        #[arg(long)]
        epochs: Option<usize>,

        /// Override the experiment tag.
        #[arg(long)]
        tag: Option<String>,

        /// Override the output directory.
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Fit and persist the PCA reducer on a set of runs.
    FitPca {
        /// JSON configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Run name or `.txt` list of runs.
        #[arg(long)]
        runs: String,

        /// Component count (>= 1) or explained-variance fraction (< 1).
        #[arg(long, default_value_t = 0.9)]
        components: f64,
    },

    /// Intersect the per-modality completion lists.
    MergeLists {
        /// Directory holding the completion lists.
        #[arg(long, value_name = "DIR", default_value = "output")]
        dir: PathBuf,

        /// Output list.
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SemConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            SemConfig::from_json(path).with_context(|| format!("loading {}", path.display()))
        }
        None => {
            info!("No configuration file provided; using defaults");
            Ok(SemConfig::default())
        }
    }
}

fn run(
    config: Option<PathBuf>,
    epochs: Option<usize>,
    tag: Option<String>,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = load_config(config.as_deref())?;
    if let Some(epochs) = epochs {
        config.epochs = epochs;
    }
    if let Some(tag) = tag {
        config.tag = tag;
    }
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    config.validate().context("configuration validation failed")?;

    info!("  tag       : {}", config.tag);
    info!("  epochs    : {}", config.epochs);
    info!("  rate      : {} ms", config.rate_ms);
    info!("  pca       : {}", config.pca);
    info!("  use_cache : {}", config.use_cache);
    info!("  params    : {}", config.sem_params());

    let mut trainer = Trainer::new(config).context("trainer setup failed")?;
    let summary = trainer.iterate()?;
    info!(
        "Finished: {} trained, {} evaluated, {} failed",
        summary.trained, summary.evaluated, summary.failed
    );
    Ok(())
}

fn fit_pca(config: Option<PathBuf>, runs: &str, components: f64) -> anyhow::Result<()> {
    let mut config = load_config(config.as_deref())?;
    // features come from the cached bundles when `use_cache` is set
    config.pca = false;
    config.use_sampler = false;
    config.train = runs.to_owned();
    config.valid = runs.to_owned();
    let pca_tag = config.pca_tag.clone();
    let runs = parse_input(runs, false)?.flatten();
    let trainer = Trainer::new(config)?;
    let reducer = trainer.fit_reducer(&runs, ComponentSelection::from_value(components))?;
    info!("Saved PCA `{}` with {} components", pca_tag, reducer.n_components());
    Ok(())
}

fn merge_lists(dir: &Path, out: &Path) -> anyhow::Result<()> {
    let inputs: Vec<PathBuf> = COMPLETION_LISTS.iter().map(|f| dir.join(f)).collect();
    let merged = merge_run_lists(&inputs, out)?;
    info!("Wrote {} runs to {}", merged.len(), out.display());
    Ok(())
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    info!("SEM pipeline v{}", sem_train::VERSION);

    let result = match args.command {
        Command::Run { config, epochs, tag, output_dir } => run(config, epochs, tag, output_dir),
        Command::FitPca { config, runs, components } => fit_pca(config, &runs, components),
        Command::MergeLists { dir, out } => merge_lists(&dir, &out),
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}
