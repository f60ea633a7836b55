use crate::{
    client::key,
    events::{reason, Event},
    retry, Backoff, Client, Error, Kind, Result,
};
use logging_forwarder_controller_core::{labels, paths};
use logging_forwarder_controller_k8s_api::{
    api::core::v1::ObjectReference, ConfigMap, ObjectMeta, ResourceExt, Secret, Service,
};
use logging_forwarder_controller_k8s_resources::owned_by;
use std::collections::BTreeSet;
use tokio::time::{self, Duration};

/// Writes the resources of a single forwarder, recording events on it.
#[derive(Clone, Debug)]
pub struct Reconciler<C> {
    client: C,
    forwarder: ObjectReference,
    backoff: Backoff,
}

// === impl Reconciler ===

impl<C: Client> Reconciler<C> {
    pub fn new(client: C, forwarder: ObjectReference) -> Self {
        Self {
            client,
            forwarder,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(self, backoff: Backoff) -> Self {
        Self { backoff, ..self }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Converges one object onto `desired`, creating it when it does not exist.
    ///
    /// Conflicting writes are retried from a fresh read.
    pub async fn apply<K: Kind>(&self, desired: &K) -> Result<K> {
        retry::on_conflict(self.backoff, || self.apply_once(desired)).await
    }

    async fn apply_once<K: Kind>(&self, desired: &K) -> Result<K> {
        let (namespace, name) = key(desired);
        let kind = K::kind(&());

        let observed = match self.client.get::<K>(&namespace, &name).await {
            Ok(observed) => observed,
            Err(error) => {
                self.failed(reason::GET_OBJECT, &format!("get {kind} {name:?}"), &error)
                    .await;
                return Err(error);
            }
        };

        let Some(observed) = observed else {
            let created = match self.client.create(desired).await {
                Ok(created) => created,
                Err(error) => {
                    self.failed(reason::CREATE_OBJECT, &format!("create {kind} {name:?}"), &error)
                        .await;
                    return Err(error);
                }
            };
            tracing::info!(%kind, %namespace, %name, "Created");
            self.publish(Event::normal(
                reason::CREATE_OBJECT,
                format!("Created {kind} {name:?}"),
            ))
            .await;
            return Ok(created);
        };

        let comparison = K::compare(&observed, desired);
        if owned_by(observed.meta(), desired.meta()) && comparison.equal {
            return Ok(observed);
        }
        tracing::debug!(%kind, %namespace, %name, reason = %comparison, "Resource differs from desired state");

        let merged = K::merge(observed, desired);
        let updated = match self.client.replace(&merged).await {
            Ok(updated) => updated,
            Err(error) => {
                self.failed(reason::UPDATE_OBJECT, &format!("update {kind} {name:?}"), &error)
                    .await;
                return Err(error);
            }
        };
        tracing::info!(%kind, %namespace, %name, reason = %comparison, "Updated");
        self.publish(Event::normal(
            reason::UPDATE_OBJECT,
            format!("Updated {kind} {name:?}: {comparison}"),
        ))
        .await;
        Ok(updated)
    }

    /// Converges the service account token secret.
    ///
    /// The token controller only populates a secret when it is created, so a secret whose
    /// service account annotations have drifted is deleted and recreated.
    pub async fn apply_token_secret(&self, desired: &Secret) -> Result<Secret> {
        let (namespace, name) = key(desired);
        if let Some(observed) = self.client.get::<Secret>(&namespace, &name).await? {
            let drifted = desired
                .annotations()
                .iter()
                .any(|(k, v)| observed.annotations().get(k) != Some(v));
            if drifted || observed.type_ != desired.type_ {
                tracing::info!(%namespace, %name, "Recreating service account token secret");
                self.remove::<Secret>(&namespace, &name).await?;
            }
        }
        self.apply(desired).await
    }

    /// Deletes an object owned by the forwarder, returning whether anything was deleted.
    ///
    /// Objects that exist but belong to something else are left alone.
    pub async fn remove<K: Kind>(&self, namespace: &str, name: &str) -> Result<bool> {
        let kind = K::kind(&());
        let Some(observed) = self.client.get::<K>(namespace, name).await? else {
            return Ok(false);
        };
        if !self.owns(observed.meta()) {
            tracing::debug!(%kind, %namespace, %name, "Not owned by the forwarder; not deleting");
            return Ok(false);
        }
        if let Err(error) = self.client.delete::<K>(namespace, name).await {
            self.failed(reason::REMOVE_OBJECT, &format!("delete {kind} {name:?}"), &error)
                .await;
            return Err(error);
        }
        tracing::info!(%kind, %namespace, %name, "Deleted");
        self.publish(Event::normal(
            reason::REMOVE_OBJECT,
            format!("Deleted {kind} {name:?}"),
        ))
        .await;
        Ok(true)
    }

    /// Deletes input services owned by the forwarder that are no longer desired.
    ///
    /// Returns the names of the deleted services.
    pub async fn sweep_input_services(
        &self,
        namespace: &str,
        desired: &[Service],
    ) -> Result<Vec<String>> {
        let keep = desired
            .iter()
            .filter_map(|s| s.metadata.name.as_deref())
            .collect::<BTreeSet<_>>();
        let observed = self
            .client
            .list::<Service>(namespace, labels::INPUT_SERVICE_TYPE)
            .await?;

        let mut removed = Vec::new();
        for svc in observed {
            let name = svc.name_any();
            if keep.contains(name.as_str()) || !self.owns(&svc.metadata) {
                continue;
            }
            if self.remove::<Service>(namespace, &name).await? {
                removed.push(name);
            }
        }
        Ok(removed)
    }

    /// Converges the trusted CA bundle config map and waits for the platform to inject it.
    ///
    /// Returns `None` when the bundle was not injected within `timeout`; the next pass polls
    /// again.
    pub async fn apply_trust_bundle(
        &self,
        desired: &ConfigMap,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let (namespace, name) = key(desired);
        let observed = self.apply(desired).await?;
        if let Some(bundle) = injected(&observed) {
            return Ok(Some(bundle));
        }
        match self.await_trust_bundle(&namespace, &name, interval, timeout).await {
            Ok(bundle) => Ok(Some(bundle)),
            Err(error @ Error::TrustBundleTimeout(_)) => {
                tracing::warn!(%error, "Continuing without the trusted CA bundle");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn await_trust_bundle(
        &self,
        namespace: &str,
        name: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<String> {
        let poll = async {
            loop {
                time::sleep(interval).await;
                let cm = self.client.get::<ConfigMap>(namespace, name).await?;
                if let Some(bundle) = cm.as_ref().and_then(injected) {
                    return Ok(bundle);
                }
                tracing::trace!(%namespace, %name, "Trusted CA bundle not yet injected");
            }
        };
        time::timeout(timeout, poll)
            .await
            .unwrap_or_else(|_| Err(Error::TrustBundleTimeout(name.to_string())))
    }

    fn owns(&self, meta: &ObjectMeta) -> bool {
        self.forwarder.uid.as_ref().is_some_and(|uid| {
            meta.owner_references
                .iter()
                .flatten()
                .any(|o| &o.uid == uid)
        })
    }

    async fn publish(&self, event: Event) {
        self.client.publish(&self.forwarder, event).await
    }

    /// Records a failed write. Conflicts are retried and are not reported.
    async fn failed(&self, reason: &'static str, action: &str, error: &Error) {
        if error.is_conflict() {
            return;
        }
        self.publish(Event::warning(reason, format!("Failed to {action}: {error}")))
            .await;
    }
}

fn injected(cm: &ConfigMap) -> Option<String> {
    cm.data
        .as_ref()?
        .get(paths::TRUSTED_CA_KEY)
        .filter(|b| !b.trim().is_empty())
        .cloned()
}
