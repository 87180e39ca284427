//! marlin CLI - enrollment API for the Marlin language school
//!
//! - `serve`: run the HTTP API (PostgreSQL or `--in-memory`)
//! - `migrate`: create the database schema
//! - `config`: show the effective configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod tracing_setup;

use config::MarlinConfig;
use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "marlin",
    author,
    version,
    about = "Student and class group enrollment API for a language school"
)]
struct Cli {
    /// Enable debug logging (RUST_LOG still takes precedence)
    #[arg(long, global = true)]
    debug: bool,

    /// Config file (default: ~/.marlin/config.toml)
    #[arg(long, short = 'c', global = true, env = "MARLIN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(commands::serve::ServeArgs),
    /// Create database tables and indexes
    Migrate(commands::migrate::MigrateArgs),
    /// Show the effective configuration (secrets masked)
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env in the working directory, then ~/.marlin/.env
    dotenvy::dotenv().ok();
    if let Some(home) = dirs::home_dir() {
        dotenvy::from_path(home.join(".marlin/.env")).ok();
    }

    let cli = Cli::parse();
    tracing_setup::init(&TracingConfig { debug: cli.debug }).ok();

    // Resolved without reading the file, so it still works when the file is broken
    if let Commands::Config(args) = &cli.command {
        if args.path {
            let path = cli.config.clone().unwrap_or_else(MarlinConfig::default_path);
            println!("{}", path.display());
            return Ok(());
        }
    }

    let config = MarlinConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve(args) => commands::run_serve(args, &config).await?,
        Commands::Migrate(args) => commands::run_migrate(args, &config).await?,
        Commands::Config(_) => commands::run_config(&config)?,
    }
    Ok(())
}
