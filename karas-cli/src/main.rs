//! Karas CLI: runs the demonstration training job.
//!
//! Configuration comes from the layered `karas.toml` setup; command-line
//! flags override it for a single run.

mod commands;
mod demo;

use std::path::PathBuf;

use clap::Parser;
use karas_core::{FailurePolicy, TriggerSpec};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Karas: train with triggers, extensions and resumable snapshots
#[derive(Parser, Debug)]
#[command(name = "karas", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (where karas.toml is looked up)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Output directory for logs and snapshots
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Stop trigger, e.g. "10 epochs" or "500 iterations"
    #[arg(long)]
    stop: Option<TriggerSpec>,

    /// Resume from a snapshot file
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Seed for the demo data set
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write scalar and image events as JSON lines
    #[arg(long)]
    events: bool,

    /// Return loop failures as a non-zero exit instead of containing them
    #[arg(long)]
    strict: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default karas.toml in the workspace
    Init,
    /// Show the effective configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Some(command) = cli.command {
        return commands::handle_command(command, &workspace);
    }

    let mut config = karas_core::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Apply CLI overrides
    if let Some(out) = &cli.out {
        config.out = out.clone();
    }
    if let Some(stop) = cli.stop {
        config.stop = stop;
    }
    if cli.events {
        config.events.enabled = true;
    }
    if cli.strict {
        config.failure_policy = FailurePolicy::Propagate;
    }
    if cli.quiet {
        config.print.enabled = false;
    }

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = config.out.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "karas.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let options = demo::DemoOptions {
        seed: cli.seed,
        ..demo::DemoOptions::default()
    };
    let mut trainer = demo::build_trainer(&config, &options)?;
    if let Some(snapshot) = &cli.resume {
        trainer.resume(snapshot)?;
        info!(snapshot = %snapshot.display(), iteration = trainer.iteration(), "resuming");
    }

    trainer.run()?;

    let accuracy = trainer
        .observation()
        .get("test/scalar/accuracy")
        .and_then(|value| value.as_scalar());
    info!(
        iteration = trainer.iteration(),
        epoch = trainer.epoch(),
        elapsed_time = trainer.elapsed_time()?,
        accuracy,
        weights = ?trainer.updater().weights(),
        "done"
    );
    Ok(())
}
