//! Jigsaw CLI: validate raw competition datasets and build training folds and triplets.

mod commands;

use clap::Parser;
use jigsaw_core::ConfigOverrides;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Jigsaw: schema validation, fold assignment and triplet sampling
#[derive(Parser, Debug)]
#[command(name = "jigsaw", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (TOML, or JSON by extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for every random decision of the run
    #[arg(long)]
    seed: Option<u64>,

    /// Directory holding one sub-directory of raw CSV files per dataset
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Schema file, or directory of per-dataset schema files
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Root under which run directories are created
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Validate raw datasets against their schema declarations
    Validate,
    /// Transform an already validated directory
    Transform {
        /// Validated tree (`valid_data/` of a previous run)
        #[arg(long)]
        from: PathBuf,
    },
    /// Validate, then transform the valid tree, in one run directory
    Run,
    /// Inspect schema declarations
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum SchemaAction {
    /// List declared datasets
    List,
    /// Print one dataset declaration
    Show {
        /// Dataset name
        name: String,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the merged configuration as TOML
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Human-readable stderr plus JSON file logging
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

    let log_dir = directories::ProjectDirs::from("dev", "jigsaw", "jigsaw")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "jigsaw.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let overrides = ConfigOverrides {
        seed: cli.seed,
        artifacts_dir: cli.artifacts_dir,
        input_dir: cli.input_dir,
        schema_path: cli.schema,
    };

    commands::handle_command(cli.command, &workspace, cli.config.as_deref(), &overrides)
}
