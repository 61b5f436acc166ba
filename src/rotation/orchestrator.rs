//! The rotation state machine.
//!
//! Each call to [`RotationOrchestrator::prepare_for_new_deploy`] reads the stored phase
//! and the store's current contents, mutates the store for that phase and returns the
//! manifest variable overrides for the upcoming deploy. Nothing is carried between
//! calls, so any step can be re-run after a failure.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use super::enumerator::{CertificateInventory, CredentialEnumerator, CredentialSets};
use super::phase::{PhaseTracker, RotationPhase};
use super::OverrideMap;
use crate::config::RotationConfig;
use crate::credhub::{CredentialStore, CredentialVersion};
use crate::errors::{Result, RotationError};

/// Drives a progressive CA rotation for one deployment prefix.
#[derive(Clone)]
pub struct RotationOrchestrator {
    store: Arc<dyn CredentialStore>,
    prefix: String,
    enumerator: CredentialEnumerator,
    phases: PhaseTracker,
}

impl std::fmt::Debug for RotationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationOrchestrator")
            .field("prefix", &self.prefix)
            .field("phase_key", &self.phases.key())
            .finish()
    }
}

impl RotationOrchestrator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        prefix: impl Into<String>,
        max_concurrent_reads: usize,
    ) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        Self {
            enumerator: CredentialEnumerator::new(store.clone(), max_concurrent_reads),
            phases: PhaseTracker::new(store.clone(), &prefix),
            store,
            prefix,
        }
    }

    pub fn from_config(store: Arc<dyn CredentialStore>, config: &RotationConfig) -> Self {
        Self::new(store, config.prefix.clone(), config.max_concurrent_reads)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The phase the next deploy will run.
    pub async fn current_phase(&self) -> Result<RotationPhase> {
        self.phases.get().await
    }

    /// Start a rotation by storing the first phase.
    ///
    /// Refuses to restart a rotation that is already under way unless `force` is set.
    pub async fn begin_rotation(&self, force: bool) -> Result<()> {
        let current = self.phases.get().await?;
        if current != RotationPhase::None {
            if !force {
                return Err(RotationError::consistency(format!(
                    "certificate rotation already in progress at phase '{}'",
                    current
                )));
            }
            info!(prefix = %self.prefix, phase = %current, "Restarting certificate rotation");
        }
        self.phases
            .set(RotationPhase::CreateAndDeployTransitionals)
            .await
    }

    /// Apply the current phase to the store and return the overrides for the next deploy.
    ///
    /// Cancellation while credentials are being read returns
    /// [`RotationError::Cancelled`] before anything is written.
    pub async fn prepare_for_new_deploy(&self, cancel: &CancellationToken) -> Result<OverrideMap> {
        ensure_active(cancel, "prepare for deploy")?;
        let phase = self.phases.get().await?;
        let span = crate::rotation_span!("prepare", self.prefix, phase = %phase);

        async move {
            match phase {
                RotationPhase::CreateAndDeployTransitionals => {
                    info!("Beginning certificate rotation, step 1 of 3: creating transitional CAs");
                    self.create_transitionals(cancel).await
                }
                RotationPhase::CreateAndDeployChildCerts => {
                    info!("Continuing certificate rotation, step 2 of 3: regenerating leaves");
                    self.regenerate_children(cancel).await
                }
                RotationPhase::RemoveLegacyCAs => {
                    info!("Continuing certificate rotation, step 3 of 3: removing legacy CAs");
                    self.remove_legacy_cas(cancel).await
                }
                RotationPhase::None => {
                    info!("No certificate rotation will be performed");
                    Ok(OverrideMap::new())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Advance the phase after a deploy succeeded and report whether another deploy is needed.
    ///
    /// If the write fails the stored phase is unchanged and the error is returned.
    pub async fn post_successful_deploy(&self, cancel: &CancellationToken) -> Result<bool> {
        let current = self.phases.get().await?;
        let (next, needs_another_deploy) = current.next();
        ensure_active(cancel, "advance rotation phase")?;

        self.phases.set(next).await?;
        info!(
            prefix = %self.prefix,
            from = %current,
            to = %next,
            needs_another_deploy = needs_another_deploy,
            "Advanced certificate rotation phase"
        );
        Ok(needs_another_deploy)
    }

    async fn inventory(&self, cancel: &CancellationToken) -> Result<CertificateInventory> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RotationError::cancelled("credential enumeration")),
            inventory = self.enumerator.enumerate(&self.prefix) => inventory,
        }
    }

    async fn create_transitionals(&self, cancel: &CancellationToken) -> Result<OverrideMap> {
        let cas = self.inventory(cancel).await?.cas;
        check_transitionals(&cas)?;

        let mut overrides = OverrideMap::new();
        for (name, versions) in &cas {
            ensure_active(cancel, "create transitional CAs")?;
            let key = self.override_key(name);

            if let [only] = versions.as_slice() {
                let pem = certificate_pem(name, only)?;
                let certificate_id = self.store.certificate_id(name).await?;
                let created = self.store.regenerate_transitional(&certificate_id).await?;
                info!(credential = %name, version_id = %created.id, "Created transitional CA");
                append_override(&mut overrides, key, pem);
                continue;
            }

            info!(
                credential = %name,
                versions = versions.len(),
                "More than one active CA version found, not creating a transitional"
            );
            for version in versions.iter().filter(|v| !v.transitional) {
                append_override(&mut overrides, key.clone(), certificate_pem(name, version)?);
            }
        }

        Ok(overrides)
    }

    async fn regenerate_children(&self, cancel: &CancellationToken) -> Result<OverrideMap> {
        let CertificateInventory { cas, leaves } = self.inventory(cancel).await?;
        check_transitionals(&cas)?;

        // The next deploy issues fresh leaves.
        for name in leaves.keys() {
            match self.store.delete_credential(name).await {
                Ok(()) => info!(credential = %name, "Deleted leaf certificate"),
                Err(e) if e.is_not_found() => {
                    debug!(credential = %name, "Leaf certificate already deleted")
                }
                Err(e) => return Err(e),
            }
        }

        let mut overrides = OverrideMap::new();
        for (name, versions) in &cas {
            ensure_active(cancel, "move transitional flags")?;

            let Some(transitional) = transitional_version(name, versions)? else {
                info!(credential = %name, "No transitional CA found to flip");
                continue;
            };
            let oldest = oldest_version(name, versions)?;

            if transitional.id == oldest.id {
                info!(
                    credential = %name,
                    version_id = %oldest.id,
                    "Oldest CA is already transitional"
                );
            } else {
                let certificate_id = self.store.certificate_id(name).await?;
                self.store
                    .mark_transitional(&certificate_id, &oldest.id)
                    .await?;
                info!(
                    credential = %name,
                    from = %transitional.id,
                    to = %oldest.id,
                    "Moved transitional flag to oldest CA version"
                );
            }

            let pem = certificate_pem(name, oldest)?;
            append_override(&mut overrides, self.override_key(name), pem);
        }

        Ok(overrides)
    }

    async fn remove_legacy_cas(&self, cancel: &CancellationToken) -> Result<OverrideMap> {
        let cas = self.inventory(cancel).await?.cas;
        check_transitionals(&cas)?;

        for (name, versions) in &cas {
            ensure_active(cancel, "remove legacy CAs")?;

            if transitional_version(name, versions)?.is_none() {
                info!(credential = %name, "No transitional CA found");
                continue;
            }

            let certificate_id = self.store.certificate_id(name).await?;
            self.store.clear_transitional(&certificate_id).await?;
            info!(credential = %name, "Removed transitional flag");
        }

        Ok(OverrideMap::new())
    }

    /// `<name relative to prefix>.certificate`
    fn override_key(&self, name: &str) -> String {
        let relative = name
            .strip_prefix(self.prefix.as_str())
            .unwrap_or(name)
            .trim_start_matches('/');
        format!("{}.certificate", relative)
    }
}

fn ensure_active(cancel: &CancellationToken, operation: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(RotationError::cancelled(operation));
    }
    Ok(())
}

fn check_transitionals(cas: &CredentialSets) -> Result<()> {
    for (name, versions) in cas {
        transitional_version(name, versions)?;
    }
    Ok(())
}

/// The version flagged transitional; more than one is a consistency error.
fn transitional_version<'a>(
    name: &str,
    versions: &'a [CredentialVersion],
) -> Result<Option<&'a CredentialVersion>> {
    let mut flagged = versions.iter().filter(|v| v.transitional);
    let first = flagged.next();
    if first.is_some() && flagged.next().is_some() {
        return Err(RotationError::consistency(format!(
            "more than one transitional version of '{}'",
            name
        )));
    }
    Ok(first)
}

/// Earliest `created_at`; the first in store order wins ties.
fn oldest_version<'a>(
    name: &str,
    versions: &'a [CredentialVersion],
) -> Result<&'a CredentialVersion> {
    versions
        .iter()
        .reduce(|oldest, v| {
            if v.created_at < oldest.created_at {
                v
            } else {
                oldest
            }
        })
        .ok_or_else(|| RotationError::consistency(format!("no versions of '{}'", name)))
}

fn certificate_pem<'a>(name: &str, version: &'a CredentialVersion) -> Result<&'a str> {
    version
        .as_certificate()
        .map(|c| c.certificate.as_str())
        .ok_or_else(|| {
            RotationError::consistency(format!(
                "version {} of '{}' is a '{}' credential, expected a certificate",
                version.id,
                name,
                version.value.kind()
            ))
        })
}

/// Prepend `pem` to whatever is already stored under `key`.
fn append_override(overrides: &mut OverrideMap, key: String, pem: &str) {
    let existing = overrides.remove(&key).unwrap_or_default();
    overrides.insert(key, format!("{}\n{}", pem, existing));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credhub::{
        CertificateValue, InMemoryCredentialStore, OperationKind, StoreOperation,
    };
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
    use std::time::Duration;
    use tracing_test::traced_test;

    fn pem(is_ca: bool) -> String {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["orchestrator.test".to_string()]).unwrap();
        if is_ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        }
        params.self_signed(&key).unwrap().pem()
    }

    fn version(id: &str, minute: i64, pem: &str) -> CredentialVersion {
        CredentialVersion::certificate(
            id,
            InMemoryCredentialStore::timestamp(minute),
            CertificateValue::new(pem),
        )
    }

    fn store() -> Arc<InMemoryCredentialStore> {
        Arc::new(
            InMemoryCredentialStore::new().with_issuer(|_, _| CertificateValue::new(pem(true))),
        )
    }

    fn orchestrator(store: &Arc<InMemoryCredentialStore>) -> RotationOrchestrator {
        RotationOrchestrator::new(store.clone(), "/p", 4)
    }

    fn at_phase(store: &InMemoryCredentialStore, phase: RotationPhase) {
        store.insert_value("/p/credential_rotation_action", phase.as_str());
    }

    #[tokio::test]
    async fn test_idle_phase_returns_nothing() {
        let store = store();
        store.insert_certificate("/p/cf/ca", vec![version("v1", 0, &pem(true))]);

        let overrides = orchestrator(&store)
            .prepare_for_new_deploy(&CancellationToken::new())
            .await
            .unwrap();

        assert!(overrides.is_empty());
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn test_create_transitionals_trusts_pre_rotation_ca() {
        let store = store();
        let v1 = pem(true);
        store.insert_certificate("/p/cf/ca", vec![version("v1", 0, &v1)]);
        at_phase(&store, RotationPhase::CreateAndDeployTransitionals);

        let overrides = orchestrator(&store)
            .prepare_for_new_deploy(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides["cf/ca.certificate"], format!("{}\n", v1));

        let view = store.get_credential("/p/cf/ca").await.unwrap();
        assert_eq!(view.len(), 2);
        assert!(view[1].transitional);
        assert_ne!(view[1].as_certificate().unwrap().certificate, v1);
        assert_eq!(store.operation_names(), vec!["regenerate"]);
    }

    #[tokio::test]
    async fn test_create_transitionals_is_idempotent() {
        let store = store();
        store.insert_certificate("/p/cf/ca", vec![version("v1", 0, &pem(true))]);
        store.insert_certificate("/p/cf/router_ca", vec![version("r1", 0, &pem(true))]);
        at_phase(&store, RotationPhase::CreateAndDeployTransitionals);
        let orchestrator = orchestrator(&store);
        let cancel = CancellationToken::new();

        let first = orchestrator.prepare_for_new_deploy(&cancel).await.unwrap();
        let second = orchestrator.prepare_for_new_deploy(&cancel).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.keys().collect::<Vec<_>>(),
            vec!["cf/ca.certificate", "cf/router_ca.certificate"]
        );
        assert_eq!(store.operation_names(), vec!["regenerate", "regenerate"]);
    }

    #[tokio::test]
    async fn test_overrides_aggregate_under_one_key() {
        let store = store();
        let (older, newer) = (pem(true), pem(true));
        store.insert_certificate(
            "/p/cf/ca",
            vec![version("v1", 0, &older), version("v2", 1, &newer).with_transitional(true)],
        );
        at_phase(&store, RotationPhase::CreateAndDeployTransitionals);

        let mut overrides = OverrideMap::new();
        append_override(&mut overrides, "cf/ca.certificate".to_string(), &newer);
        append_override(&mut overrides, "cf/ca.certificate".to_string(), &older);
        assert_eq!(overrides["cf/ca.certificate"], format!("{}\n{}\n", older, newer));

        let overrides = orchestrator(&store)
            .prepare_for_new_deploy(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(overrides["cf/ca.certificate"], format!("{}\n", older));
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn test_child_certs_deletes_leaves_and_flips_oldest() {
        let store = store();
        let v1 = pem(true);
        store.insert_certificate(
            "/p/cf/ca",
            vec![version("v1", 0, &v1), version("v2", 5, &pem(true)).with_transitional(true)],
        );
        store.insert_certificate("/p/cf/jobs/x.cert", vec![version("x1", 0, &pem(false))]);
        at_phase(&store, RotationPhase::CreateAndDeployChildCerts);

        let overrides = orchestrator(&store)
            .prepare_for_new_deploy(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(overrides["cf/ca.certificate"], format!("{}\n", v1));
        assert_eq!(
            store.operations(),
            vec![
                StoreOperation::Delete {
                    name: "/p/cf/jobs/x.cert".to_string()
                },
                StoreOperation::MarkTransitional {
                    name: "/p/cf/ca".to_string(),
                    version_id: "v1".to_string()
                },
            ]
        );
        assert!(store.history("/p/cf/ca").unwrap()[0].transitional);
    }

    #[tokio::test]
    async fn test_child_certs_is_idempotent() {
        let store = store();
        store.insert_certificate(
            "/p/cf/ca",
            vec![
                version("v1", 0, &pem(true)),
                version("v2", 5, &pem(true)).with_transitional(true),
            ],
        );
        store.insert_certificate("/p/cf/jobs/x.cert", vec![version("x1", 0, &pem(false))]);
        at_phase(&store, RotationPhase::CreateAndDeployChildCerts);
        let orchestrator = orchestrator(&store);
        let cancel = CancellationToken::new();

        let first = orchestrator.prepare_for_new_deploy(&cancel).await.unwrap();
        let second = orchestrator.prepare_for_new_deploy(&cancel).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.operations().len(), 2);
    }

    #[tokio::test]
    async fn test_only_leaves_are_deleted() {
        let store = store();
        store.insert_certificate("/p/cf/ca", vec![version("v1", 0, &pem(true))]);
        store.insert_certificate("/p/cf/a.cert", vec![version("a1", 0, &pem(false))]);
        store.insert_certificate("/p/cf/b.cert", vec![version("b1", 0, &pem(false))]);
        store.insert_value("/p/cf/admin_password", "hunter2");
        at_phase(&store, RotationPhase::CreateAndDeployChildCerts);

        orchestrator(&store)
            .prepare_for_new_deploy(&CancellationToken::new())
            .await
            .unwrap();

        let deleted: Vec<String> = store
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                StoreOperation::Delete { name } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(deleted, vec!["/p/cf/a.cert", "/p/cf/b.cert"]);
        assert!(store.history("/p/cf/ca").is_some());
        assert!(store.history("/p/cf/admin_password").is_some());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_child_certs_skips_ca_without_transitional() {
        let store = store();
        let v1 = pem(true);
        store.insert_certificate("/p/cf/ca", vec![version("v1", 0, &v1)]);
        at_phase(&store, RotationPhase::CreateAndDeployChildCerts);

        let overrides = orchestrator(&store)
            .prepare_for_new_deploy(&CancellationToken::new())
            .await
            .unwrap();

        assert!(overrides.is_empty());
        assert!(store.operations().is_empty());
        assert!(logs_contain("No transitional CA found to flip"));
    }

    #[tokio::test]
    async fn test_multiple_transitionals_is_consistency_error() {
        let store = store();
        store.insert_certificate(
            "/p/cf/ca",
            vec![
                version("v1", 0, &pem(true)).with_transitional(true),
                version("v2", 1, &pem(true)).with_transitional(true),
                version("v3", 2, &pem(true)),
            ],
        );
        store.insert_certificate("/p/cf/x.cert", vec![version("x1", 0, &pem(false))]);
        at_phase(&store, RotationPhase::CreateAndDeployChildCerts);

        let result = orchestrator(&store).prepare_for_new_deploy(&CancellationToken::new()).await;

        assert!(matches!(result, Err(RotationError::Consistency { .. })));
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn test_remove_legacy_cas_clears_flags() {
        let store = store();
        store.insert_certificate(
            "/p/cf/ca",
            vec![
                version("v1", 0, &pem(true)).with_transitional(true),
                version("v2", 5, &pem(true)),
            ],
        );
        store.insert_certificate("/p/cf/other_ca", vec![version("o1", 0, &pem(true))]);
        at_phase(&store, RotationPhase::RemoveLegacyCAs);
        let orchestrator = orchestrator(&store);
        let cancel = CancellationToken::new();

        let overrides = orchestrator.prepare_for_new_deploy(&cancel).await.unwrap();
        assert!(overrides.is_empty());
        assert_eq!(
            store.operations(),
            vec![StoreOperation::ClearTransitional {
                name: "/p/cf/ca".to_string()
            }]
        );

        let view = store.get_credential("/p/cf/ca").await.unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, "v2");

        let overrides = orchestrator.prepare_for_new_deploy(&cancel).await.unwrap();
        assert!(overrides.is_empty());
        assert_eq!(store.operations().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_legacy_cas_then_complete() {
        let store = store();
        at_phase(&store, RotationPhase::RemoveLegacyCAs);
        let orchestrator = orchestrator(&store);

        let again = orchestrator
            .post_successful_deploy(&CancellationToken::new())
            .await
            .unwrap();

        assert!(!again);
        assert_eq!(orchestrator.current_phase().await.unwrap(), RotationPhase::None);
    }

    #[tokio::test]
    async fn test_cancelled_prepare_makes_no_mutation() {
        let store = store();
        store.insert_certificate("/p/cf/ca", vec![version("v1", 0, &pem(true))]);
        store.insert_certificate("/p/cf/x.cert", vec![version("x1", 0, &pem(false))]);
        at_phase(&store, RotationPhase::CreateAndDeployTransitionals);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orchestrator(&store).prepare_for_new_deploy(&cancel).await;

        assert!(matches!(result, Err(RotationError::Cancelled { .. })));
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_enumeration_makes_no_mutation() {
        let inner = store();
        inner.insert_certificate("/p/cf/ca", vec![version("v1", 0, &pem(true))]);
        inner.insert_certificate("/p/cf/x.cert", vec![version("x1", 0, &pem(false))]);
        at_phase(&inner, RotationPhase::CreateAndDeployTransitionals);
        let cancel = CancellationToken::new();
        let store = CancellingStore::new(&inner, &cancel, CancelOn::Read("/p/cf/ca"));

        let result = RotationOrchestrator::new(store, "/p", 4)
            .prepare_for_new_deploy(&cancel)
            .await;

        match result {
            Err(RotationError::Cancelled { operation }) => {
                assert_eq!(operation, "credential enumeration")
            }
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert!(inner.operations().is_empty());
        assert_eq!(inner.history("/p/cf/ca").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_leaf_deletion_keeps_transitional_flags() {
        let inner = store();
        inner.insert_certificate(
            "/p/cf/ca",
            vec![
                version("v1", 0, &pem(true)),
                version("v2", 5, &pem(true)).with_transitional(true),
            ],
        );
        inner.insert_certificate("/p/cf/jobs/x.cert", vec![version("x1", 0, &pem(false))]);
        at_phase(&inner, RotationPhase::CreateAndDeployChildCerts);
        let cancel = CancellationToken::new();
        let store = CancellingStore::new(&inner, &cancel, CancelOn::Delete);

        let result = RotationOrchestrator::new(store, "/p", 4)
            .prepare_for_new_deploy(&cancel)
            .await;

        match result {
            Err(RotationError::Cancelled { operation }) => {
                assert_eq!(operation, "move transitional flags")
            }
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert_eq!(inner.operation_names(), vec!["delete"]);
        assert!(inner.history("/p/cf/jobs/x.cert").is_none());

        let ca = inner.history("/p/cf/ca").unwrap();
        assert!(!ca[0].transitional);
        assert!(ca[1].transitional);
    }

    #[tokio::test]
    async fn test_failed_phase_write_leaves_phase_unchanged() {
        let store = store();
        at_phase(&store, RotationPhase::CreateAndDeployTransitionals);
        store.fail_operation(OperationKind::SetValue);
        let orchestrator = orchestrator(&store);

        let result = orchestrator.post_successful_deploy(&CancellationToken::new()).await;

        assert!(matches!(result, Err(RotationError::Transport { .. })));
        assert_eq!(
            orchestrator.current_phase().await.unwrap(),
            RotationPhase::CreateAndDeployTransitionals
        );
    }

    #[tokio::test]
    async fn test_begin_rotation() {
        let store = store();
        let orchestrator = orchestrator(&store);

        orchestrator.begin_rotation(false).await.unwrap();
        assert_eq!(
            orchestrator.current_phase().await.unwrap(),
            RotationPhase::CreateAndDeployTransitionals
        );

        orchestrator
            .post_successful_deploy(&CancellationToken::new())
            .await
            .unwrap();
        let err = orchestrator.begin_rotation(false).await.unwrap_err();
        assert!(matches!(err, RotationError::Consistency { .. }));

        orchestrator.begin_rotation(true).await.unwrap();
        assert_eq!(
            orchestrator.current_phase().await.unwrap(),
            RotationPhase::CreateAndDeployTransitionals
        );
    }

    #[test]
    fn test_oldest_version_prefers_first_on_ties() {
        let versions = vec![version("a", 3, "x"), version("b", 1, "y"), version("c", 1, "z")];
        assert_eq!(oldest_version("/p/ca", &versions).unwrap().id, "b");
        assert!(oldest_version("/p/ca", &[]).is_err());
    }

    #[test]
    fn test_override_key_is_relative_to_prefix() {
        let store = store();
        let orchestrator = RotationOrchestrator::new(store, "/bosh/cf/", 1);
        assert_eq!(orchestrator.override_key("/bosh/cf/diego/ca"), "diego/ca.certificate");
    }

    enum CancelOn {
        /// Cancel while this credential is read, then stall the read.
        Read(&'static str),
        /// Cancel right after the first successful delete.
        Delete,
    }

    /// Forwards to an in-memory store and cancels the token at a chosen call.
    struct CancellingStore {
        inner: Arc<InMemoryCredentialStore>,
        cancel: CancellationToken,
        cancel_on: CancelOn,
    }

    impl CancellingStore {
        fn new(
            inner: &Arc<InMemoryCredentialStore>,
            cancel: &CancellationToken,
            cancel_on: CancelOn,
        ) -> Arc<Self> {
            Arc::new(Self {
                inner: inner.clone(),
                cancel: cancel.clone(),
                cancel_on,
            })
        }
    }

    #[async_trait::async_trait]
    impl CredentialStore for CancellingStore {
        async fn list_credentials(&self, path: &str) -> Result<Vec<String>> {
            self.inner.list_credentials(path).await
        }

        async fn get_credential(&self, name: &str) -> Result<Vec<CredentialVersion>> {
            if matches!(self.cancel_on, CancelOn::Read(target) if target == name) {
                self.cancel.cancel();
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.inner.get_credential(name).await
        }

        async fn set_value_credential(&self, name: &str, value: &str) -> Result<()> {
            self.inner.set_value_credential(name, value).await
        }

        async fn delete_credential(&self, name: &str) -> Result<()> {
            self.inner.delete_credential(name).await?;
            if matches!(self.cancel_on, CancelOn::Delete) {
                self.cancel.cancel();
            }
            Ok(())
        }

        async fn certificate_id(&self, name: &str) -> Result<String> {
            self.inner.certificate_id(name).await
        }

        async fn regenerate_transitional(&self, certificate_id: &str) -> Result<CredentialVersion> {
            self.inner.regenerate_transitional(certificate_id).await
        }

        async fn mark_transitional(&self, certificate_id: &str, version_id: &str) -> Result<()> {
            self.inner
                .mark_transitional(certificate_id, version_id)
                .await
        }

        async fn clear_transitional(&self, certificate_id: &str) -> Result<()> {
            self.inner.clear_transitional(certificate_id).await
        }
    }

    trait OperationNames {
        fn operation_names(&self) -> Vec<&'static str>;
    }

    impl OperationNames for InMemoryCredentialStore {
        fn operation_names(&self) -> Vec<&'static str> {
            self.operations()
                .iter()
                .map(|op| match op {
                    StoreOperation::SetValue { .. } => "set",
                    StoreOperation::Delete { .. } => "delete",
                    StoreOperation::Regenerate { .. } => "regenerate",
                    StoreOperation::MarkTransitional { .. } => "mark",
                    StoreOperation::ClearTransitional { .. } => "clear",
                })
                .collect()
        }
    }
}
