//! Rotation phases and their persistence in the credential store.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::credhub::CredentialStore;
use crate::errors::{Result, RotationError};

/// One step of the multi-deploy rotation protocol.
///
/// The wire names are what an operator writes into the phase credential, so they are
/// part of the external contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RotationPhase {
    /// Create a transitional CA for every CA that has none and trust the old one explicitly.
    #[serde(rename = "create-and-deploy-transitional-cas")]
    CreateAndDeployTransitionals,
    /// Delete all leaf certificates and make the oldest CA version the transitional one.
    #[serde(rename = "create-and-deploy-new-child-certs")]
    CreateAndDeployChildCerts,
    /// Drop the transitional flag so only the new CAs remain trusted.
    #[serde(rename = "remove-legacy-cas")]
    RemoveLegacyCAs,
    /// Nothing to do.
    #[default]
    #[serde(rename = "no-action-required")]
    None,
}

impl RotationPhase {
    pub const ALL: [RotationPhase; 4] = [
        RotationPhase::CreateAndDeployTransitionals,
        RotationPhase::CreateAndDeployChildCerts,
        RotationPhase::RemoveLegacyCAs,
        RotationPhase::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RotationPhase::CreateAndDeployTransitionals => "create-and-deploy-transitional-cas",
            RotationPhase::CreateAndDeployChildCerts => "create-and-deploy-new-child-certs",
            RotationPhase::RemoveLegacyCAs => "remove-legacy-cas",
            RotationPhase::None => "no-action-required",
        }
    }

    /// Phase to store after a successful deploy, and whether another deploy is needed.
    pub fn next(&self) -> (RotationPhase, bool) {
        match self {
            RotationPhase::CreateAndDeployTransitionals => {
                (RotationPhase::CreateAndDeployChildCerts, true)
            }
            RotationPhase::CreateAndDeployChildCerts => (RotationPhase::RemoveLegacyCAs, true),
            RotationPhase::RemoveLegacyCAs => (RotationPhase::None, false),
            RotationPhase::None => (RotationPhase::None, false),
        }
    }

    /// 1-based step number for progress messages; `None` for the idle phase.
    pub fn step(&self) -> Option<u8> {
        match self {
            RotationPhase::CreateAndDeployTransitionals => Some(1),
            RotationPhase::CreateAndDeployChildCerts => Some(2),
            RotationPhase::RemoveLegacyCAs => Some(3),
            RotationPhase::None => Option::None,
        }
    }
}

impl fmt::Display for RotationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RotationPhase {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self> {
        RotationPhase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| {
                RotationError::consistency(format!(
                    "unrecognized certificate rotation action requested: {}",
                    s
                ))
            })
    }
}

/// Reads and writes the phase credential `<prefix>/credential_rotation_action`.
#[derive(Clone)]
pub struct PhaseTracker {
    store: Arc<dyn CredentialStore>,
    key: String,
}

impl fmt::Debug for PhaseTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseTracker")
            .field("key", &self.key)
            .finish()
    }
}

impl PhaseTracker {
    pub fn new(store: Arc<dyn CredentialStore>, prefix: &str) -> Self {
        let key = format!("{}/credential_rotation_action", prefix.trim_end_matches('/'));
        Self { store, key }
    }

    /// Name of the phase credential.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current phase; `None` when the credential does not exist.
    pub async fn get(&self) -> Result<RotationPhase> {
        let versions = match self.store.get_credential(&self.key).await {
            Ok(versions) => versions,
            Err(e) if e.is_not_found() => {
                debug!(key = %self.key, "No rotation phase stored, defaulting to none");
                return Ok(RotationPhase::None);
            }
            Err(e) => return Err(e),
        };

        let [version] = versions.as_slice() else {
            return Err(RotationError::consistency(format!(
                "expected one version of '{}', found {}",
                self.key,
                versions.len()
            )));
        };

        let raw = version.as_value().ok_or_else(|| {
            RotationError::consistency(format!(
                "'{}' must be a value credential, found type '{}'",
                self.key,
                version.value.kind()
            ))
        })?;

        raw.trim().parse()
    }

    /// Persist `next`. On failure the stored phase is unchanged from the caller's view.
    pub async fn set(&self, next: RotationPhase) -> Result<()> {
        self.store
            .set_value_credential(&self.key, next.as_str())
            .await?;
        info!(key = %self.key, phase = %next, "Stored rotation phase");
        Ok(())
    }
}
