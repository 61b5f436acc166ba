//! In-memory credential store.
//!
//! Mirrors the Credhub semantics the orchestrator depends on:
//! - a credential keeps its full version history,
//! - `get_credential` returns the current version (latest non-transitional) plus the
//!   transitional version when one exists, oldest first,
//! - regenerating stores the new version as the sole transitional version,
//! - moving or clearing the transitional flag changes which version is current.
//!
//! Every mutation is recorded so tests can assert exactly what a phase did, and any
//! operation kind can be made to fail.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::client::CredentialStore;
use super::types::{CertificateValue, CredentialValue, CredentialVersion};
use crate::errors::{Result, RotationError};

/// Produces the certificate for a regenerated version from the credential name and
/// the current version's certificate.
pub type CertificateIssuer =
    Box<dyn Fn(&str, &CertificateValue) -> CertificateValue + Send + Sync>;

/// Kinds of store operation, used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    List,
    Get,
    SetValue,
    Delete,
    CertificateId,
    Regenerate,
    MarkTransitional,
    ClearTransitional,
}

/// A mutation applied to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    SetValue { name: String, value: String },
    Delete { name: String },
    Regenerate {
        name: String,
        new_version_id: String,
    },
    MarkTransitional { name: String, version_id: String },
    ClearTransitional { name: String },
}

#[derive(Debug, Clone)]
struct StoredCredential {
    certificate_id: Option<String>,
    history: Vec<CredentialVersion>,
}

impl StoredCredential {
    /// Latest non-transitional version plus the transitional one, in history order.
    fn current_view(&self) -> Vec<CredentialVersion> {
        let current_index = self.history.iter().rposition(|v| !v.transitional);
        self.history
            .iter()
            .enumerate()
            .filter(|(i, v)| v.transitional || Some(*i) == current_index)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[derive(Default)]
struct StoreState {
    credentials: BTreeMap<String, StoredCredential>,
    operations: Vec<StoreOperation>,
    failing: HashSet<OperationKind>,
    sequence: u64,
}

impl StoreState {
    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn check(&self, kind: OperationKind) -> Result<()> {
        if self.failing.contains(&kind) {
            return Err(RotationError::transport(format!("injected failure for {:?}", kind)));
        }
        Ok(())
    }

    fn by_certificate_id(
        &mut self,
        certificate_id: &str,
    ) -> Result<(&String, &mut StoredCredential)> {
        self.credentials
            .iter_mut()
            .find(|(_, c)| c.certificate_id.as_deref() == Some(certificate_id))
            .ok_or_else(|| RotationError::not_found(format!("certificate id {}", certificate_id)))
    }
}

/// Credential store held entirely in memory.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    state: Mutex<StoreState>,
    issuer: Option<CertificateIssuer>,
}

impl std::fmt::Debug for InMemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryCredentialStore")
            .field("credentials", &state.credentials.len())
            .field("operations", &state.operations.len())
            .finish()
    }
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `issuer` to produce certificates for regenerated versions.
    ///
    /// Without an issuer a regenerated version reuses the current certificate.
    pub fn with_issuer<F>(mut self, issuer: F) -> Self
    where
        F: Fn(&str, &CertificateValue) -> CertificateValue + Send + Sync + 'static,
    {
        self.issuer = Some(Box::new(issuer));
        self
    }

    /// Timestamp used for seeded and generated versions: a fixed epoch plus `offset` minutes.
    pub fn timestamp(offset: i64) -> DateTime<Utc> {
        let epoch = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        epoch + Duration::minutes(offset)
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a certificate credential with an explicit version history.
    pub fn insert_certificate(&self, name: &str, history: Vec<CredentialVersion>) {
        let mut state = self.lock();
        let id = format!("cert-{}", state.next_sequence());
        let credential = StoredCredential {
            certificate_id: Some(id),
            history,
        };
        state.credentials.insert(name.to_string(), credential);
    }

    /// Seed a value credential.
    pub fn insert_value(&self, name: &str, value: &str) {
        let mut state = self.lock();
        let seq = state.next_sequence();
        let version = CredentialVersion::value(format!("v-{}", seq), Self::timestamp(0), value);
        let credential = StoredCredential {
            certificate_id: None,
            history: vec![version],
        };
        state.credentials.insert(name.to_string(), credential);
    }

    /// Full version history of a credential, oldest first.
    pub fn history(&self, name: &str) -> Option<Vec<CredentialVersion>> {
        self.lock().credentials.get(name).map(|c| c.history.clone())
    }

    /// All mutations applied so far, in order.
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.lock().operations.clone()
    }

    /// Make every subsequent operation of `kind` fail with a transport error.
    pub fn fail_operation(&self, kind: OperationKind) {
        self.lock().failing.insert(kind);
    }

    /// Stop failing operations of `kind`.
    pub fn restore_operation(&self, kind: OperationKind) {
        self.lock().failing.remove(&kind);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn list_credentials(&self, path: &str) -> Result<Vec<String>> {
        let state = self.lock();
        state.check(OperationKind::List)?;

        let scope = format!("{}/", path.trim_end_matches('/'));
        Ok(state
            .credentials
            .keys()
            .filter(|name| name.starts_with(&scope))
            .cloned()
            .collect())
    }

    async fn get_credential(&self, name: &str) -> Result<Vec<CredentialVersion>> {
        let state = self.lock();
        state.check(OperationKind::Get)?;

        state
            .credentials
            .get(name)
            .map(StoredCredential::current_view)
            .ok_or_else(|| RotationError::not_found(name))
    }

    async fn set_value_credential(&self, name: &str, value: &str) -> Result<()> {
        let mut state = self.lock();
        state.check(OperationKind::SetValue)?;

        let seq = state.next_sequence();
        let version =
            CredentialVersion::value(format!("v-{}", seq), Self::timestamp(seq as i64), value);
        state
            .credentials
            .entry(name.to_string())
            .or_insert_with(|| StoredCredential {
                certificate_id: None,
                history: Vec::new(),
            })
            .history
            .push(version);
        state.operations.push(StoreOperation::SetValue {
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn delete_credential(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.check(OperationKind::Delete)?;

        if state.credentials.remove(name).is_none() {
            return Err(RotationError::not_found(name));
        }
        state.operations.push(StoreOperation::Delete {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn certificate_id(&self, name: &str) -> Result<String> {
        let state = self.lock();
        state.check(OperationKind::CertificateId)?;

        state
            .credentials
            .get(name)
            .and_then(|c| c.certificate_id.clone())
            .ok_or_else(|| {
                RotationError::consistency(format!(
                    "expected exactly one certificate named '{}', found 0",
                    name
                ))
            })
    }

    async fn regenerate_transitional(&self, certificate_id: &str) -> Result<CredentialVersion> {
        let mut guard = self.lock();
        guard.check(OperationKind::Regenerate)?;
        let seq = guard.next_sequence();
        let state = &mut *guard;

        let (name, credential) = state.by_certificate_id(certificate_id)?;
        let name = name.clone();
        let current = credential
            .history
            .iter()
            .rev()
            .find(|v| !v.transitional)
            .and_then(CredentialVersion::as_certificate)
            .cloned()
            .ok_or_else(|| {
                RotationError::consistency(format!("certificate '{}' has no current version", name))
            })?;

        let issued = match &self.issuer {
            Some(issuer) => issuer(&name, &current),
            None => current,
        };
        let newest = credential.history.iter().map(|v| v.created_at).max();
        let created_at = newest
            .map(|t| t + Duration::minutes(1))
            .unwrap_or_else(|| Self::timestamp(seq as i64));
        let version = CredentialVersion {
            id: format!("v-{}", seq),
            created_at,
            transitional: true,
            value: CredentialValue::Certificate(issued),
        };

        for existing in credential.history.iter_mut() {
            existing.transitional = false;
        }
        credential.history.push(version.clone());
        state.operations.push(StoreOperation::Regenerate {
            name,
            new_version_id: version.id.clone(),
        });

        Ok(version)
    }

    async fn mark_transitional(&self, certificate_id: &str, version_id: &str) -> Result<()> {
        let mut guard = self.lock();
        guard.check(OperationKind::MarkTransitional)?;
        let state = &mut *guard;

        let (name, credential) = state.by_certificate_id(certificate_id)?;
        let name = name.clone();
        if !credential.history.iter().any(|v| v.id == version_id) {
            return Err(RotationError::not_found(format!("{} version {}", name, version_id)));
        }
        for version in credential.history.iter_mut() {
            version.transitional = version.id == version_id;
        }
        state.operations.push(StoreOperation::MarkTransitional {
            name,
            version_id: version_id.to_string(),
        });
        Ok(())
    }

    async fn clear_transitional(&self, certificate_id: &str) -> Result<()> {
        let mut guard = self.lock();
        guard.check(OperationKind::ClearTransitional)?;
        let state = &mut *guard;

        let (name, credential) = state.by_certificate_id(certificate_id)?;
        let name = name.clone();
        for version in credential.history.iter_mut() {
            version.transitional = false;
        }
        state.operations.push(StoreOperation::ClearTransitional { name });
        Ok(())
    }
}
