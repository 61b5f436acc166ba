//! Credential store trait consumed by the rotation orchestrator.

use async_trait::async_trait;

use super::types::CredentialVersion;
use crate::errors::Result;

/// Typed operations against a versioned credential store.
///
/// The orchestrator only ever talks to the store through this trait, so the HTTPS
/// adapter and the in-memory store are interchangeable.
///
/// # Errors
///
/// Implementations report a missing credential as
/// [`RotationError::NotFound`](crate::errors::RotationError::NotFound). Callers rely on
/// that variant to tell "absent" apart from every other failure.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// List the names of all credentials under `path`.
    async fn list_credentials(&self, path: &str) -> Result<Vec<String>>;

    /// Fetch the current versions of a credential, including any transitional one.
    ///
    /// Returns versions in store order. `NotFound` if the credential does not exist.
    async fn get_credential(&self, name: &str) -> Result<Vec<CredentialVersion>>;

    /// Create or overwrite a `value` credential.
    async fn set_value_credential(&self, name: &str, value: &str) -> Result<()>;

    /// Delete a credential and its whole history.
    async fn delete_credential(&self, name: &str) -> Result<()>;

    /// Resolve the certificate id used by the certificates API.
    ///
    /// Exactly one certificate must match `name`; anything else is a consistency error.
    async fn certificate_id(&self, name: &str) -> Result<String>;

    /// Regenerate the certificate, storing the new version as transitional.
    ///
    /// This is not idempotent. Callers must re-read the credential before issuing
    /// it again.
    async fn regenerate_transitional(&self, certificate_id: &str) -> Result<CredentialVersion>;

    /// Make `version_id` the only transitional version of the certificate.
    async fn mark_transitional(&self, certificate_id: &str, version_id: &str) -> Result<()>;

    /// Clear the transitional flag from every version of the certificate.
    async fn clear_transitional(&self, certificate_id: &str) -> Result<()>;
}
