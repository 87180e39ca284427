use anyhow::{Context, Result};
use clap::Parser;

use crate::config::MarlinConfig;

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Print the config file path (from --config or the default) and exit
    #[arg(long)]
    pub path: bool,
}

/// Print the effective configuration as TOML
pub fn run_config(config: &MarlinConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(&config.redacted())
        .context("Failed to serialize config to TOML")?;

    println!("{}", toml_str);

    Ok(())
}
