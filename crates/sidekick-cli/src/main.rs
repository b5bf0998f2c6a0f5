//! sidekick CLI - chat with a local Gemma model from the terminal.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// sidekick - a local, offline AI assistant
#[derive(Parser)]
#[command(name = "sidekick")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat
    Chat {
        #[command(flatten)]
        runtime: RuntimeArgs,
    },

    /// Ask a single question and print the answer
    Ask {
        /// The question
        message: String,
        #[command(flatten)]
        runtime: RuntimeArgs,
        /// Print the reply as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the local model
    Model {
        #[command(subcommand)]
        command: ModelCommand,
    },

    /// Show information about the sidekick installation
    Info,
}

/// Flags that override the environment for the inference runtime.
#[derive(clap::Args, Debug, Clone, Default)]
pub(crate) struct RuntimeArgs {
    /// Skip the GPU and run on CPU only
    #[arg(long)]
    cpu: bool,
    /// Port for the local llama-server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum ModelCommand {
    /// List installed models
    List,
    /// Download the configured model, or install one from a local file
    Pull {
        /// Install from this file instead of downloading
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show model paths and configuration
    Info,
    /// Remove an installed model (default: the configured model)
    Remove {
        /// Model filename
        file: Option<String>,
    },
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    match cli.command {
        Commands::Chat { runtime } => block_on(commands::chat::run(&runtime)),
        Commands::Ask {
            message,
            runtime,
            json,
        } => block_on(commands::ask::run(&message, &runtime, json)),
        Commands::Model { command } => match command {
            ModelCommand::List => commands::model::list(),
            ModelCommand::Pull { path } => block_on(commands::model::pull(path.as_deref())),
            ModelCommand::Info => commands::model::info(),
            ModelCommand::Remove { file } => commands::model::remove(file.as_deref()),
        },
        Commands::Info => commands::info::run(),
    }
}

fn block_on<F: std::future::Future<Output = miette::Result<()>>>(future: F) -> miette::Result<()> {
    tokio::runtime::Runtime::new()
        .map_err(|e| miette::miette!("Failed to start async runtime: {}", e))?
        .block_on(future)
}
