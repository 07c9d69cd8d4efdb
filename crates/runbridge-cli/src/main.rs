//! runbridge CLI - The `runbridge` command.
//!
//! Runs Rhai programs through a runbridge [`Bridge`](runbridge_core::Bridge):
//! the program executes on a worker thread, stdin lines are submitted as
//! input and output is forwarded to stdout.

mod run;
mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use runbridge_core::{OverlapPolicy, PausePolicy, DEFAULT_CONFIG_TOML};

/// runbridge - Run console programs behind a non-blocking host
#[derive(Parser, Debug)]
#[command(name = "runbridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run interactive console programs on a worker thread", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a program
    Run(RunArgs),

    /// Check a program for syntax errors without running it
    Check {
        /// Path to the program
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show or create the configuration file
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,

        /// Print the configuration file location
        #[arg(long)]
        path: bool,
    },

    /// Show version information
    Version,
}

/// Arguments for `runbridge run`.
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Path to the program to execute
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Who resumes pause checkpoints: auto-resume or host
    #[arg(long, value_name = "POLICY")]
    pub pause: Option<PausePolicy>,

    /// What a new run does while another is in flight: interleave, queue or supersede
    #[arg(long, value_name = "POLICY")]
    pub overlap: Option<OverlapPolicy>,

    /// Pause after every print
    #[arg(long)]
    pub debug: bool,

    /// Print lifecycle events as JSON lines on stderr
    #[arg(long)]
    pub events: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    let code = match args.command {
        Commands::Run(run_args) => run::run_file(run_args)?,
        Commands::Check { file } => check_file(&file)?,
        Commands::Config { init, path } => show_config(init, path)?,
        Commands::Version => {
            println!("runbridge {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Crates:");
            println!("  - runbridge-core: input channel, output forwarding, run controller");
            println!("  - runbridge-rhai: Rhai engine and console API");
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Compile a program and report diagnostics.
fn check_file(file: &Path) -> Result<i32> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let result = runbridge_rhai::check_script(&source);
    if result.is_ok() {
        println!("{}: ok", file.display());
        for name in &result.functions {
            println!("  fn {}", name);
        }
        return Ok(0);
    }

    for diagnostic in &result.diagnostics {
        eprintln!("{}: {}", file.display(), diagnostic);
    }
    Ok(1)
}

fn show_config(init: bool, path_only: bool) -> Result<i32> {
    let path = settings::config_path()?;

    if path_only {
        println!("{}", path.display());
        return Ok(0);
    }

    if init {
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, DEFAULT_CONFIG_TOML)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Created {}", path.display());
        return Ok(0);
    }

    let config = settings::load(None)?;
    print!("{}", config.to_toml_string()?);
    Ok(0)
}
