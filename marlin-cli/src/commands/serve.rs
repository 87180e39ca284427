//! HTTP server command
//!
//! Runs the enrollment API against PostgreSQL, or against a throwaway
//! in-memory store with `--in-memory`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use marlin_server::db::{create_pool_with_options, migrations, EnrollmentStore, InMemoryStore, PgStore};
use marlin_server::{run_server, EnrollmentService, ServerConfig};

use crate::config::MarlinConfig;

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (overrides [server] bind, default 127.0.0.1:3030)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Keep everything in memory; data is lost on exit. Ignores any database URL
    #[arg(long)]
    pub in_memory: bool,
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs, config: &MarlinConfig) -> Result<()> {
    let server_config = ServerConfig {
        bind_addr: args.bind.unwrap_or(config.server.bind),
        cors_permissive: args.cors_permissive || config.server.cors_permissive,
    };

    let store: Arc<dyn EnrollmentStore> = if args.in_memory {
        tracing::warn!("using in-memory store, data will not survive a restart");
        Arc::new(InMemoryStore::new())
    } else {
        let database_url = args
            .database_url
            .or_else(|| config.database.url.clone())
            .context("DATABASE_URL not set. Set via --database-url, DATABASE_URL env, [database] url in ~/.marlin/config.toml, or use --in-memory")?;

        let pool = create_pool_with_options(&database_url, config.database.max_connections)
            .await
            .context("Failed to create database pool")?;

        migrations::run(&pool)
            .await
            .context("Failed to apply database schema")?;

        Arc::new(PgStore::new(pool))
    };

    let service = EnrollmentService::new(store, config.policy());

    run_server(service, server_config)
        .await
        .context("Server error")?;

    Ok(())
}
