//! Walking pattern generator CLI.
//!
//! Provides three modes of operation:
//! - `run`: Execute a walk script and write the sampled trajectories
//! - `config`: Print the effective configuration as TOML
//! - `info`: Print crate versions, generators and script commands

mod commands;
mod output;
mod session;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use walkgen_core::config::WalkConfig;
use walkgen_core::error::ConfigError;

use crate::commands::{CommandTable, ScriptError};
use crate::output::OutputFormat;
use crate::session::Session;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Humanoid walking pattern generator.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file. Defaults are used when absent.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a walk script and write the generated samples.
    Run {
        /// Script file, one command per line.
        script: PathBuf,

        /// Output file. Samples go to stdout when absent.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output encoding.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
    },

    /// Print the effective configuration.
    Config,

    /// Print crate information.
    Info,
}

#[derive(Debug, Error)]
enum AppError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("script failed at {0}")]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::ser::Error),
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<WalkConfig, AppError> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            Ok(WalkConfig::from_file(path)?)
        }
        None => Ok(WalkConfig::default()),
    }
}

fn run_script(
    config: WalkConfig,
    script: &Path,
    output: Option<&Path>,
    format: OutputFormat,
) -> Result<(), AppError> {
    let text = std::fs::read_to_string(script).map_err(|source| AppError::Read {
        path: script.to_path_buf(),
        source,
    })?;

    let mut session = Session::new(config)?;
    let executed = CommandTable::new().execute_script(&mut session, &text)?;
    let samples = session.into_samples();
    info!(commands = executed, samples = samples.len(), "walk generated");

    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    match format {
        OutputFormat::Csv => output::write_csv(&samples, writer)?,
        OutputFormat::Jsonl => output::write_json_lines(&samples, writer)?,
    }
    Ok(())
}

fn run_config(config: &WalkConfig) -> Result<(), AppError> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn run_info() {
    println!("walkgen v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("crates:");
    println!("  walkgen-core  {}", env!("CARGO_PKG_VERSION"));
    println!("  walkgen-foot  {}", env!("CARGO_PKG_VERSION"));
    println!("  walkgen-mpc   {}", env!("CARGO_PKG_VERSION"));
    println!("  walkgen-zmp   {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("generators:");
    println!("  heuristic  heuristic-zmp (step sequence, preview control)");
    println!("  qp         online-velocity-reference (velocity tracking MPC)");
    println!();
    println!("commands:");
    for name in CommandTable::new().names() {
        println!("  {name}");
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Run {
            script,
            output,
            format,
        } => run_script(config, &script, output.as_deref(), format),
        Commands::Config => run_config(&config),
        Commands::Info => {
            run_info();
            Ok(())
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
