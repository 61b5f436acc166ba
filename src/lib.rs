//! # certrotate
//!
//! Progressive rotation of the certificate authorities of a live deployment whose
//! credentials live in Credhub.
//!
//! Replacing a CA in one step breaks every node that has not yet received the new
//! trust chain. Instead the rotation spans three deploys, driven by a phase credential
//! stored next to the deployment's other credentials:
//!
//! ```text
//! create-and-deploy-transitional-cas
//!   → create-and-deploy-new-child-certs
//!   → remove-legacy-cas
//!   → no-action-required
//! ```
//!
//! Before each deploy [`RotationOrchestrator::prepare_for_new_deploy`] mutates the store
//! for the current phase and returns manifest variable overrides that keep the old CA
//! trusted; after the deploy succeeds [`RotationOrchestrator::post_successful_deploy`]
//! advances the phase.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use certrotate::{HttpCredentialStore, Result, RotationConfig, RotationOrchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = RotationConfig::from_env()?;
//!     config.validate()?;
//!
//!     let store = Arc::new(HttpCredentialStore::new(&config.credhub)?);
//!     let orchestrator = RotationOrchestrator::from_config(store, &config);
//!
//!     let overrides = orchestrator.prepare_for_new_deploy(&CancellationToken::new()).await?;
//!     for (key, pem) in &overrides {
//!         println!("{}: {} bytes", key, pem.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod credhub;
pub mod errors;
pub mod observability;
pub mod rotation;

pub use config::{CredhubConfig, RotationConfig};
pub use credhub::{CredentialStore, HttpCredentialStore, InMemoryCredentialStore};
pub use errors::{Result, RotationError};
pub use rotation::{OverrideMap, RotationOrchestrator, RotationPhase};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
