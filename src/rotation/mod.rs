//! # Certificate Rotation
//!
//! Progressive CA rotation across three deploys:
//!
//! 1. `create-and-deploy-transitional-cas`: every CA gets a new transitional version and
//!    the old certificate is passed to the deploy as an extra trusted CA.
//! 2. `create-and-deploy-new-child-certs`: leaf certificates are deleted so the deploy
//!    reissues them from the new CAs, while the old CA version stays trusted.
//! 3. `remove-legacy-cas`: the transitional flag is cleared and the old CAs drop out.
//!
//! The current step is stored next to the deployment's credentials, so every call works
//! from what the store holds at that moment.

pub mod classifier;
pub mod enumerator;
pub mod orchestrator;
pub mod phase;

use std::collections::BTreeMap;

pub use classifier::classify;
pub use enumerator::{
    CertificateInventory, CredentialEnumerator, CredentialSets, CredentialVersionSet,
};
pub use orchestrator::RotationOrchestrator;
pub use phase::{PhaseTracker, RotationPhase};

/// Manifest variable overrides, keyed by `<name relative to prefix>.certificate`.
pub type OverrideMap = BTreeMap<String, String>;
