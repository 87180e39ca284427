//! Schema setup command

use anyhow::{Context, Result};
use clap::Parser;

use marlin_server::db::{create_pool, migrations};

use crate::config::MarlinConfig;

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

/// Create the tables and indexes if they don't exist yet
pub async fn run_migrate(args: MigrateArgs, config: &MarlinConfig) -> Result<()> {
    let database_url = args
        .database_url
        .or_else(|| config.database.url.clone())
        .context("DATABASE_URL not set. Set via --database-url, DATABASE_URL env, or [database] url in ~/.marlin/config.toml")?;

    let pool = create_pool(&database_url)
        .await
        .context("Failed to create database pool")?;

    migrations::run(&pool)
        .await
        .context("Failed to apply database schema")?;

    pool.close().await;
    println!("✅ Schema is up to date");

    Ok(())
}
