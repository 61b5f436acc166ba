//! Partitioning of a deployment's certificates into CAs and leaves.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use super::classifier::classify;
use crate::credhub::{CredentialStore, CredentialVersion};
use crate::errors::{Result, RotationError};

/// Current versions of one credential, in store order. Never empty.
pub type CredentialVersionSet = Vec<CredentialVersion>;

/// Version sets keyed by credential name, iterated in name order.
pub type CredentialSets = BTreeMap<String, CredentialVersionSet>;

/// Certificates under a prefix, split by CA-ness.
#[derive(Debug, Clone, Default)]
pub struct CertificateInventory {
    pub cas: CredentialSets,
    pub leaves: CredentialSets,
}

/// Lists and classifies the certificate credentials under a prefix.
#[derive(Clone)]
pub struct CredentialEnumerator {
    store: Arc<dyn CredentialStore>,
    max_concurrency: usize,
}

impl std::fmt::Debug for CredentialEnumerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialEnumerator")
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl CredentialEnumerator {
    pub fn new(store: Arc<dyn CredentialStore>, max_concurrency: usize) -> Self {
        Self {
            store,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Certificates under `prefix` whose CA-ness equals `want_ca`.
    pub async fn enumerate_by_caness(
        &self,
        prefix: &str,
        want_ca: bool,
    ) -> Result<CredentialSets> {
        let inventory = self.enumerate(prefix).await?;
        Ok(if want_ca { inventory.cas } else { inventory.leaves })
    }

    /// List every credential under `prefix`, fetch each one's versions and classify it.
    ///
    /// Reads run with bounded concurrency and stop at the first failure; nothing is
    /// returned unless every read and every classification succeeded. A credential
    /// with any CA version is a CA. Only credentials whose certificate versions are
    /// all non-CA count as leaves, so a credential holding a CA can never be
    /// selected for deletion. Non-certificate credentials are ignored.
    pub async fn enumerate(&self, prefix: &str) -> Result<CertificateInventory> {
        let names = self.store.list_credentials(prefix).await?;
        debug!(prefix = %prefix, credentials = names.len(), "Listed credentials");

        let store = &self.store;
        let fetched: Vec<(String, CredentialVersionSet)> = stream::iter(names)
            .map(move |name| async move {
                let versions = store.get_credential(&name).await?;
                Ok::<_, RotationError>((name, versions))
            })
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        let mut inventory = CertificateInventory::default();
        for (name, versions) in fetched {
            if versions.is_empty() {
                return Err(RotationError::consistency(format!(
                    "no versions returned for credential '{}'",
                    name
                )));
            }

            let mut saw_certificate = false;
            let mut is_ca = false;
            for version in &versions {
                if let Some(cert) = version.as_certificate() {
                    saw_certificate = true;
                    is_ca |= classify(&name, cert.certificate.as_bytes())?;
                }
            }

            if !saw_certificate {
                continue;
            }
            debug!(
                credential = %name,
                is_ca = is_ca,
                versions = versions.len(),
                "Classified certificate"
            );
            if is_ca {
                inventory.cas.insert(name, versions);
            } else {
                inventory.leaves.insert(name, versions);
            }
        }

        Ok(inventory)
    }
}
