//! Configuration resolution for the command line.
//!
//! Flags win over environment variables, which win over built-in defaults.

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::RotationConfig;

/// Command line values that override the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub prefix: Option<String>,
    pub credhub_url: Option<String>,
    pub timeout: Option<u64>,
}

/// Build and validate the rotation config from `overrides` and the process environment.
pub fn resolve_config(overrides: &Overrides) -> Result<RotationConfig> {
    resolve_config_with(overrides, |key| std::env::var(key).ok())
}

/// Same as [`resolve_config`] with an explicit variable lookup.
pub fn resolve_config_with<F>(overrides: &Overrides, lookup: F) -> Result<RotationConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let config = RotationConfig::from_lookup(|key| {
        let flag = match key {
            "CERTROTATE_PREFIX" => overrides.prefix.clone(),
            "CERTROTATE_CREDHUB_URL" => overrides.credhub_url.clone(),
            "CERTROTATE_TIMEOUT_SECONDS" => overrides.timeout.map(|t| t.to_string()),
            _ => None,
        };
        flag.or_else(|| lookup(key))
    })
    .context("Failed to load configuration")?;

    config.validate().context("Invalid configuration")?;
    debug!(
        prefix = %config.prefix,
        credhub_url = %config.credhub.base_url,
        client_id = %config.credhub.client_id,
        "Resolved configuration"
    );
    Ok(config)
}
