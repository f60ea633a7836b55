use crate::{events::Event, Error, Result};
use async_trait::async_trait;
use kube::runtime::events::{Recorder, Reporter};
use logging_forwarder_controller_k8s_api::{
    self as k8s,
    api::core::v1::ObjectReference,
    monitoring::{PrometheusRule, ServiceMonitor},
    security::SecurityContextConstraints,
    ClusterLogForwarder, ClusterLogForwarderStatus, ClusterRoleBinding, ConfigMap, DaemonSet,
    DeleteParams, Deployment, ListParams, NetworkPolicy, PatchParams, PostParams, Role,
    RoleBinding, Secret, Service, ServiceAccount, SubjectAccessReview,
};
use logging_forwarder_controller_k8s_resources::Managed;

/// A resource kind the reconciler reads and writes.
pub trait Kind: Managed + Send + Sync + 'static {
    const NAMESPACED: bool;

    fn api(client: &k8s::Client, namespace: &str) -> k8s::Api<Self>;
}

/// The API server operations a reconcile pass performs.
///
/// Cluster-scoped kinds ignore the `namespace` arguments.
#[async_trait]
pub trait Client: Clone + Send + Sync + 'static {
    async fn get<K: Kind>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn create<K: Kind>(&self, object: &K) -> Result<K>;

    /// Replaces an object, failing with [`Error::Conflict`] when its resource version is stale.
    async fn replace<K: Kind>(&self, object: &K) -> Result<K>;

    /// Deletes an object. Deleting an object that does not exist succeeds.
    async fn delete<K: Kind>(&self, namespace: &str, name: &str) -> Result<()>;

    async fn list<K: Kind>(&self, namespace: &str, label_selector: &str) -> Result<Vec<K>>;

    /// Creates an access review and returns whether it was allowed.
    async fn review_access(&self, review: &SubjectAccessReview) -> Result<bool>;

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ClusterLogForwarderStatus,
    ) -> Result<()>;

    /// Records an event on `regarding`. Failures are logged and never returned.
    async fn publish(&self, regarding: &ObjectReference, event: Event);
}

/// A [`Client`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeClient {
    client: k8s::Client,
    recorder: Recorder,
}

macro_rules! namespaced {
    ($($kind:ty),+ $(,)?) => {
        $(
            impl Kind for $kind {
                const NAMESPACED: bool = true;

                fn api(client: &k8s::Client, namespace: &str) -> k8s::Api<Self> {
                    k8s::Api::namespaced(client.clone(), namespace)
                }
            }
        )+
    };
}

macro_rules! cluster_scoped {
    ($($kind:ty),+ $(,)?) => {
        $(
            impl Kind for $kind {
                const NAMESPACED: bool = false;

                fn api(client: &k8s::Client, _: &str) -> k8s::Api<Self> {
                    k8s::Api::all(client.clone())
                }
            }
        )+
    };
}

namespaced!(
    ConfigMap,
    DaemonSet,
    Deployment,
    NetworkPolicy,
    PrometheusRule,
    Role,
    RoleBinding,
    Secret,
    Service,
    ServiceAccount,
    ServiceMonitor,
);

cluster_scoped!(ClusterRoleBinding, SecurityContextConstraints);

// === impl KubeClient ===

impl KubeClient {
    pub fn new(client: k8s::Client, controller: impl ToString) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance: std::env::var("HOSTNAME").ok(),
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
        }
    }
}

#[async_trait]
impl Client for KubeClient {
    async fn get<K: Kind>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let object = K::api(&self.client, namespace).get_opt(name).await?;
        Ok(object)
    }

    async fn create<K: Kind>(&self, object: &K) -> Result<K> {
        let (namespace, name) = key(object);
        K::api(&self.client, &namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| on_conflict::<K>(e, &name))
    }

    async fn replace<K: Kind>(&self, object: &K) -> Result<K> {
        let (namespace, name) = key(object);
        K::api(&self.client, &namespace)
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| on_conflict::<K>(e, &name))
    }

    async fn delete<K: Kind>(&self, namespace: &str, name: &str) -> Result<()> {
        match K::api(&self.client, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(k8s::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn list<K: Kind>(&self, namespace: &str, label_selector: &str) -> Result<Vec<K>> {
        let list = K::api(&self.client, namespace)
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items)
    }

    async fn review_access(&self, review: &SubjectAccessReview) -> Result<bool> {
        let review = k8s::Api::<SubjectAccessReview>::all(self.client.clone())
            .create(&PostParams::default(), review)
            .await?;
        Ok(review.status.map(|s| s.allowed).unwrap_or(false))
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ClusterLogForwarderStatus,
    ) -> Result<()> {
        let patch = logging_forwarder_controller_k8s_status::patch(name, status);
        k8s::Api::<ClusterLogForwarder>::namespaced(self.client.clone(), namespace)
            .patch_status(name, &PatchParams::default(), &patch)
            .await
            .map_err(|e| on_conflict::<ClusterLogForwarder>(e, name))?;
        Ok(())
    }

    async fn publish(&self, regarding: &ObjectReference, event: Event) {
        let event = event.into_kube();
        if let Err(error) = self.recorder.publish(&event, regarding).await {
            tracing::warn!(reason = %event.reason, %error, "Failed to publish event");
        }
    }
}

pub(crate) fn key<K: k8s::Resource>(object: &K) -> (String, String) {
    let meta = object.meta();
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

fn on_conflict<K: k8s::Resource<DynamicType = ()>>(error: k8s::Error, name: &str) -> Error {
    match error {
        k8s::Error::Api(e) if e.code == 409 => Error::Conflict {
            kind: K::kind(&()).to_string(),
            name: name.to_string(),
        },
        error => error.into(),
    }
}
