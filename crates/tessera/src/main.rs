//! Tessera CLI - static site generator with a live-reloading development server.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

use commands::{server::ServerFlags, BuildFlags};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Static site generator with a live-reloading development server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory
    #[arg(short, long, default_value = ".", global = true)]
    source: PathBuf,

    /// Config file (defaults to site.toml in the project directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new site skeleton
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },

    /// Build the site
    Build {
        #[command(flatten)]
        flags: BuildFlags,

        /// Keep running and rebuild on changes
        #[arg(short, long)]
        watch: bool,
    },

    /// Build the site and serve it with live reload
    Server {
        #[command(flatten)]
        flags: BuildFlags,

        #[command(flatten)]
        server: ServerFlags,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt().with_env_filter(filter).with_target(false).init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Init { yes } => {
            commands::init::run(&cli.source, yes)?;
        }
        Commands::Build { flags, watch } => {
            commands::build::run(&cli.source, config, flags, watch).await?;
        }
        Commands::Server { flags, server } => {
            commands::server::run(&cli.source, config, flags, server).await?;
        }
    }

    Ok(())
}
