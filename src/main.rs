//! Command-line interface for blockgen
//!
//! # Usage Examples
//!
//! ## Plan and generate
//! ```bash
//! blockgen block plan -p continuous-1w-small \
//!   --labels 'cluster="one"' --max-time 2019-10-18T00:00:00Z \
//!   | blockgen block gen --output-dir ./genblocks --workers 20
//! ```
//!
//! ## Generate from a spec file
//! ```bash
//! blockgen block gen --output-dir ./genblocks --config blocks.yaml
//! ```
//!
//! Logs go to stderr so `plan` output can be piped.

use anyhow::{Context, Result};
use blockgen::plan::{parse_time_or_duration, to_stream_document};
use blockgen::{generate_all, plan, GenOpts, Profile};
use blockgen_core::{BlockSpec, BlockSpecStream, Labels};
use clap::{Parser, Subcommand};
use std::io::{BufReader, Write};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blockgen")]
#[command(about = "A tool for generating synthetic TSDB blocks")]
#[command(long_about = None)]
struct Cli {
    /// Log filter, e.g. `info` or `append_pipeline=debug` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tools for generating TSDB blocks
    Block {
        #[command(subcommand)]
        command: BlockCommand,
    },
}

#[derive(Subcommand)]
enum BlockCommand {
    /// Generate blocks from a YAML list of block specs, or from a
    /// `---` separated spec stream on stdin
    Gen {
        #[command(flatten)]
        opts: GenOpts,

        /// Path to a YAML list of block specs
        #[arg(long, value_name = "PATH", conflicts_with = "config_content")]
        config: Option<PathBuf>,

        /// Inline YAML list of block specs
        #[arg(long, value_name = "YAML")]
        config_content: Option<String>,
    },

    /// Print the block specs of a hardcoded profile as a YAML stream
    Plan {
        /// Profile to plan
        #[arg(long, short = 'p', value_enum)]
        profile: Profile,

        /// RFC 3339 timestamp, or a duration before now
        #[arg(long, default_value = "30m")]
        max_time: String,

        /// External labels, repeated (format: name="value")
        #[arg(long = "labels", value_name = "LABEL")]
        labels: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Block { command } => match command {
            BlockCommand::Gen {
                opts,
                config,
                config_content,
            } => run_gen(opts, config, config_content).await,
            BlockCommand::Plan {
                profile,
                max_time,
                labels,
            } => run_plan(profile, &max_time, &labels),
        },
    }
}

async fn run_gen(opts: GenOpts, config: Option<PathBuf>, config_content: Option<String>) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, cancelling generation");
            on_signal.cancel();
        }
    });

    let concurrency = opts.concurrency();
    info!(
        "Generating blocks into {} with {} workers",
        opts.output_dir.display(),
        concurrency
    );

    let specs: Option<Vec<BlockSpec>> = if let Some(path) = config {
        Some(
            BlockSpec::list_from_file(&path)
                .with_context(|| format!("Failed to load block specs from {path:?}"))?,
        )
    } else if let Some(content) = config_content {
        Some(BlockSpec::list_from_yaml(&content).context("Failed to parse --config-content")?)
    } else {
        None
    };

    match specs {
        Some(specs) => {
            generate_all(&cancel, concurrency, &opts.output_dir, specs.into_iter().map(Ok)).await?;
        }
        None => {
            info!("No config given, reading block specs from stdin");
            let stream = BlockSpecStream::new(BufReader::new(std::io::stdin()));
            generate_all(&cancel, concurrency, &opts.output_dir, stream).await?;
        }
    }
    Ok(())
}

fn run_plan(profile: Profile, max_time: &str, labels: &[String]) -> Result<()> {
    let external_labels = Labels::parse_flags(labels).context("Invalid --labels")?;
    let max_time = parse_time_or_duration(max_time, chrono::Utc::now())?;
    info!(
        "Planning profile {} ending at {}",
        profile.name(),
        max_time
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    plan(profile, max_time, &external_labels, |spec| {
        out.write_all(to_stream_document(&spec)?.as_bytes())
            .context("Failed to write block spec")
    })?;
    out.flush().context("Failed to flush stdout")?;
    Ok(())
}
