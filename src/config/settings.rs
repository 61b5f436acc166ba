//! # Configuration Settings
//!
//! Defines the configuration structure for a rotation run.

use crate::credhub::SecretString;
use crate::errors::{Result, RotationError};
use serde::Deserialize;
use std::time::Duration;
use validator::Validate;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 250;
const DEFAULT_MAX_CONCURRENT_READS: usize = 4;

/// Top-level configuration for one deployment's rotation.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RotationConfig {
    /// Credential prefix of the deployment, e.g. `/director/cf`
    #[validate(length(min = 2, message = "Prefix cannot be empty"))]
    pub prefix: String,

    /// Upper bound on concurrent credential reads during enumeration
    #[validate(range(min = 1, max = 64, message = "Concurrent reads must be between 1 and 64"))]
    pub max_concurrent_reads: usize,

    /// Credential store connection settings
    #[validate(nested)]
    pub credhub: CredhubConfig,
}

/// Credhub connection and OAuth client settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CredhubConfig {
    /// Credhub base URL (e.g., "https://credhub.service.internal:8844")
    #[validate(url(message = "Credhub URL must be a valid URL"))]
    pub base_url: String,

    /// PEM bundle trusted when connecting to Credhub and its auth server
    pub ca_cert: Option<String>,

    /// OAuth client id used for the client-credentials grant
    #[validate(length(min = 1, message = "Credhub client cannot be empty"))]
    pub client_id: String,

    /// OAuth client secret (redacted in logs)
    pub client_secret: SecretString,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub timeout_seconds: u64,

    /// Attempts for idempotent requests that fail transiently
    #[validate(range(min = 1, max = 10, message = "Retries must be between 1 and 10"))]
    pub max_retries: u32,

    /// Base delay between retries; attempt `n` waits `n * retry_delay_ms`
    #[validate(range(max = 10_000, message = "Retry delay must be at most 10000 ms"))]
    pub retry_delay_ms: u64,
}

impl Default for CredhubConfig {
    fn default() -> Self {
        Self {
            base_url: "https://127.0.0.1:8844".to_string(),
            ca_cert: None,
            client_id: String::new(),
            client_secret: SecretString::default(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl CredhubConfig {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Get retry base delay as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl RotationConfig {
    /// Build configuration for `prefix` with default tuning.
    pub fn new(prefix: impl Into<String>, credhub: CredhubConfig) -> Self {
        Self {
            prefix: normalize_prefix(&prefix.into()),
            max_concurrent_reads: DEFAULT_MAX_CONCURRENT_READS,
            credhub,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Each setting reads `CERTROTATE_*` first and falls back to the variable the
    /// credhub CLI uses:
    /// - `CERTROTATE_PREFIX`
    /// - `CERTROTATE_CREDHUB_URL` or `CREDHUB_SERVER`
    /// - `CERTROTATE_CREDHUB_CA_CERT` or `CREDHUB_CA_CERT`
    /// - `CERTROTATE_CREDHUB_CLIENT` or `CREDHUB_CLIENT`
    /// - `CERTROTATE_CREDHUB_SECRET` or `CREDHUB_SECRET`
    /// - `CERTROTATE_TIMEOUT_SECONDS` (default: 30)
    /// - `CERTROTATE_MAX_RETRIES` (default: 3)
    /// - `CERTROTATE_RETRY_DELAY_MS` (default: 250)
    /// - `CERTROTATE_MAX_CONCURRENT_READS` (default: 4)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let either = |primary: &str, fallback: &str| lookup(primary).or_else(|| lookup(fallback));

        let prefix = lookup("CERTROTATE_PREFIX").unwrap_or_default();
        let base_url = either("CERTROTATE_CREDHUB_URL", "CREDHUB_SERVER")
            .ok_or_else(|| RotationError::config("CERTROTATE_CREDHUB_URL must be set"))?;
        let ca_cert = either("CERTROTATE_CREDHUB_CA_CERT", "CREDHUB_CA_CERT")
            .filter(|pem| !pem.trim().is_empty());
        let client_id = either("CERTROTATE_CREDHUB_CLIENT", "CREDHUB_CLIENT").unwrap_or_default();
        let client_secret = either("CERTROTATE_CREDHUB_SECRET", "CREDHUB_SECRET")
            .map(SecretString::new)
            .unwrap_or_default();

        let timeout_seconds =
            parse_or(&lookup, "CERTROTATE_TIMEOUT_SECONDS", DEFAULT_TIMEOUT_SECONDS)?;
        let max_retries = parse_or(&lookup, "CERTROTATE_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        let retry_delay_ms =
            parse_or(&lookup, "CERTROTATE_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS)?;
        let max_concurrent_reads =
            parse_or(&lookup, "CERTROTATE_MAX_CONCURRENT_READS", DEFAULT_MAX_CONCURRENT_READS)?;

        Ok(Self {
            prefix: normalize_prefix(&prefix),
            max_concurrent_reads,
            credhub: CredhubConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                ca_cert,
                client_id,
                client_secret,
                timeout_seconds,
                max_retries,
                retry_delay_ms,
            },
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(RotationError::from)?;

        if !self.prefix.starts_with('/') {
            return Err(RotationError::config("Prefix must be an absolute credential path"));
        }

        if self.credhub.client_secret.is_empty() {
            return Err(RotationError::config("Credhub client secret cannot be empty"));
        }

        Ok(())
    }
}

/// Strip trailing slashes so `<prefix>/<name>` never doubles up.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    trimmed.to_string()
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| RotationError::config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}
