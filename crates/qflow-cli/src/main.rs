//! qflow Command-Line Interface
//!
//! Drives the interpreter session and the circuit nodes from a terminal.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{bell, check, common, exec};

/// qflow - build quantum circuits node by node on a live interpreter
#[derive(Parser)]
#[command(name = "qflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script through an interpreter session
    Exec {
        /// Script file
        #[arg(short, long, conflicts_with = "code", required_unless_present = "code")]
        file: Option<String>,

        /// Inline script text
        #[arg(long)]
        code: Option<String>,
    },

    /// Start the interpreter and print its banner
    Check,

    /// Build and simulate a Bell pair through the circuit nodes
    Bell {
        /// Number of shots
        #[arg(short, long, default_value = "1024")]
        shots: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let result = match common::load_config(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Exec { file, code } => {
                exec::execute(&config, file.as_deref(), code.as_deref()).await
            }
            Commands::Check => check::execute(&config).await,
            Commands::Bell { shots } => bell::execute(&config, shots).await,
        },
        Err(e) => Err(e),
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
