//! CLI command implementations.

pub mod diagnose;
pub mod interfaces;
pub mod setup;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

use crate::config::{Config, Overrides};

/// Load the config file (or defaults) and apply CLI/env overrides.
pub fn load_config(path: &Path, overrides: &Overrides) -> Result<Config> {
    let mut config = Config::load_or_default(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config
        .apply_overrides(overrides)
        .context("Invalid command-line override")?;
    debug!(
        "Target {}/{} mtu {}",
        config.host_address, config.netmask, config.mtu
    );
    Ok(config)
}
