//! deskhand CLI - the main entry point.
//!
//! Commands:
//! - `init`    - Write a default config and create the workspace
//! - `serve`   - Start the HTTP gateway and the scheduler loop
//! - `run`     - Execute one prompt and print the `ExecutionResult`
//! - `doctor`  - Diagnose configuration problems

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "deskhand",
    about = "deskhand - personal agent backend",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.deskhand/config.toml)
    #[arg(short, long, global = true, env = "DESKHAND_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the workspace
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Start the HTTP gateway and the scheduler loop
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one prompt through the ReAct engine
    Run {
        /// The prompt
        #[arg(short, long)]
        message: String,

        /// Reasoning cycle budget
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Wall-clock budget in seconds
        #[arg(long)]
        timeout: Option<f64>,

        /// Print each event frame as a JSON line instead of the final result
        #[arg(long)]
        stream: bool,
    },

    /// Diagnose configuration problems
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init { force } => commands::init::run(config_path, force)?,
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Run {
            message,
            max_iterations,
            timeout,
            stream,
        } => {
            let options = commands::run::RunOptions {
                message,
                max_iterations,
                timeout_seconds: timeout,
                stream,
            };
            commands::run::run(config_path, options).await?
        }
        Commands::Doctor => commands::doctor::run(config_path)?,
    }

    Ok(())
}

/// Logs go to stderr so `run` output on stdout stays machine-readable.
fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
