use crate::{
    controller::{ForwarderController, Settings, STATUS_CONFLICT_REQUEUE},
    core::{
        labels::COMPONENT_LABEL,
        tls::{DEFAULT_CIPHERS, DEFAULT_MIN_VERSION},
        ProxyConfig, TlsProfile, COMPONENT,
    },
    k8s::{
        self, ClusterLogForwarder, ConfigMap, DaemonSet, Deployment, K8sDuration, Resource,
        ResourceExt, Secret, Service,
    },
    lease,
    metrics::{PassResult, ReconcileMetrics},
    reconcile::{Error, KubeClient, Reconciler},
    resources::{alert_rules, Cluster},
};
use anyhow::{bail, Context as _, Result};
use clap::Parser;
use futures::prelude::*;
use kube::runtime::{
    controller::{Action, Controller},
    watcher,
};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::{
    sync::watch,
    time::{self, Duration},
};
use tracing::{info_span, Instrument};

const CONTROLLER_NAME: &str = "logging-forwarder-controller";

/// Requeue delay after a pass failed with an API error.
const ERROR_REQUEUE: Duration = Duration::from_secs(15);

#[derive(Debug, Parser)]
#[clap(
    name = "logging-forwarder-controller",
    about = "Deploys log collectors for ClusterLogForwarder resources"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "logging_forwarder=info,warn",
        env = "LOGGING_FORWARDER_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    #[clap(long, default_value = "openshift-logging", env = "OPERATOR_NAMESPACE")]
    operator_namespace: String,

    /// The operator's own deployment, which owns the write lease and alert rules.
    #[clap(long, default_value = "cluster-logging-operator")]
    operator_deployment_name: String,

    #[clap(long, default_value = "logging-forwarder-controller-write")]
    lease_name: String,

    #[clap(long, env = "RELATED_IMAGE_VECTOR")]
    vector_image: String,

    #[clap(long, env = "RELATED_IMAGE_FLUENTD", default_value = "")]
    fluentd_image: String,

    #[clap(long, env = "OPENSHIFT_CLUSTER_ID", default_value = "")]
    cluster_id: String,

    /// The version stamped onto every collector resource.
    #[clap(long, default_value = env!("CARGO_PKG_VERSION"))]
    version: String,

    /// How often a forwarder is reconciled when nothing it watches changes.
    #[clap(long, default_value = "5m")]
    requeue_interval: K8sDuration,

    #[clap(long, default_value = "5s")]
    trust_bundle_poll_interval: K8sDuration,

    /// How long a pass waits for the trusted CA bundle before continuing without it.
    #[clap(long, default_value = "30s")]
    trust_bundle_timeout: K8sDuration,

    #[clap(long, default_value = DEFAULT_MIN_VERSION)]
    tls_min_version: String,

    /// Comma-separated cipher suites. Defaults to the intermediate profile.
    #[clap(long, value_delimiter = ',')]
    tls_ciphers: Vec<String>,

    #[clap(long, env = "HTTP_PROXY")]
    http_proxy: Option<String>,

    #[clap(long, env = "HTTPS_PROXY")]
    https_proxy: Option<String>,

    #[clap(long, env = "NO_PROXY")]
    no_proxy: Option<String>,
}

/// State shared by every reconcile invocation.
struct Shared {
    controller: ForwarderController<KubeClient>,
    metrics: ReconcileMetrics,
    claims: watch::Receiver<Arc<kubert::lease::Claim>>,
    hostname: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let settings = self.settings();
        let Self {
            admin,
            client,
            log_level,
            log_format,
            operator_namespace,
            operator_deployment_name,
            lease_name,
            ..
        } = self;

        let mut prom = <Registry>::default();
        let metrics = ReconcileMetrics::register(prom.sub_registry_with_prefix("forwarder"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let hostname =
            std::env::var("HOSTNAME").context("Failed to fetch `HOSTNAME` environment variable")?;

        let operator = k8s::Api::<Deployment>::namespaced(runtime.client(), &operator_namespace)
            .get(&operator_deployment_name)
            .await
            .with_context(|| format!("Failed to fetch deployment {operator_deployment_name:?}"))?;
        let claims = lease::init(&runtime, &operator, &lease_name, &hostname).await?;

        let client = KubeClient::new(runtime.client(), CONTROLLER_NAME);

        // The rules are identical for every replica, so concurrent writers converge.
        Reconciler::new(client.clone(), operator.object_ref(&()))
            .apply(&alert_rules(&operator_namespace)?)
            .await?;

        tracing::info!(
            requeue = ?settings.requeue,
            collector_version = %settings.cluster.version,
            "Starting forwarder controller"
        );
        let shared = Arc::new(Shared {
            controller: ForwarderController::new(client, settings, metrics.clone()),
            metrics,
            claims,
            hostname,
        });

        let kube = runtime.client();
        let owned = watcher::Config::default().labels(&format!("{COMPONENT_LABEL}={COMPONENT}"));
        let forwarders = Controller::new(
            k8s::Api::<ClusterLogForwarder>::all(kube.clone()),
            watcher::Config::default(),
        )
        .owns(k8s::Api::<DaemonSet>::all(kube.clone()), owned.clone())
        .owns(k8s::Api::<Deployment>::all(kube.clone()), owned.clone())
        .owns(k8s::Api::<Service>::all(kube.clone()), owned.clone())
        .owns(k8s::Api::<ConfigMap>::all(kube.clone()), owned.clone())
        .owns(k8s::Api::<Secret>::all(kube), owned)
        .shutdown_on_signal()
        .run(reconcile, error_policy, shared)
        .for_each(|res| async move {
            match res {
                Ok((forwarder, action)) => {
                    tracing::debug!(%forwarder, ?action, "Reconciled");
                }
                Err(error) => tracing::warn!(%error, "Reconcile failed"),
            }
        });
        tokio::spawn(forwarders.instrument(info_span!("forwarders")));

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }

    fn settings(&self) -> Settings {
        let ciphers = if self.tls_ciphers.is_empty() {
            DEFAULT_CIPHERS.iter().map(ToString::to_string).collect()
        } else {
            self.tls_ciphers.clone()
        };
        Settings {
            cluster: Cluster {
                id: self.cluster_id.clone(),
                version: self.version.clone(),
                vector_image: self.vector_image.clone(),
                fluentd_image: self.fluentd_image.clone(),
                proxy: ProxyConfig {
                    http_proxy: self.http_proxy.clone(),
                    https_proxy: self.https_proxy.clone(),
                    no_proxy: self.no_proxy.clone(),
                },
            },
            tls: TlsProfile {
                min_version: self.tls_min_version.clone(),
                ciphers,
            },
            requeue: self.requeue_interval.into(),
            trust_bundle_poll: self.trust_bundle_poll_interval.into(),
            trust_bundle_timeout: self.trust_bundle_timeout.into(),
        }
    }
}

async fn reconcile(clf: Arc<ClusterLogForwarder>, shared: Arc<Shared>) -> Result<Action, Error> {
    let span = info_span!(
        "reconcile",
        namespace = %clf.namespace().unwrap_or_default(),
        name = %clf.name_any(),
    );

    // Only the lease holder writes; other replicas check back once the lease could have moved.
    let is_leader = shared.claims.borrow().is_current_for(&shared.hostname);
    if !is_leader {
        span.in_scope(|| tracing::trace!("Not the lease holder"));
        shared
            .metrics
            .observe(time::Instant::now(), PassResult::Standby);
        return Ok(Action::requeue(lease::STANDBY_REQUEUE));
    }

    shared.controller.reconcile(&clf).instrument(span).await
}

fn error_policy(_: Arc<ClusterLogForwarder>, error: &Error, _: Arc<Shared>) -> Action {
    if error.is_conflict() {
        return Action::requeue(STATUS_CONFLICT_REQUEUE);
    }
    Action::requeue(ERROR_REQUEUE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Args {
        let argv = ["logging-forwarder-controller", "--vector-image=vector:latest"]
            .iter()
            .chain(args);
        Args::try_parse_from(argv).expect("args must parse")
    }

    #[test]
    fn durations_and_tls_profile() {
        let args = parse(&[
            "--requeue-interval=10m",
            "--trust-bundle-timeout=1m",
            "--tls-min-version=VersionTLS13",
            "--tls-ciphers=TLS_AES_128_GCM_SHA256,TLS_AES_256_GCM_SHA384",
        ]);
        let settings = args.settings();
        assert_eq!(settings.requeue, Duration::from_secs(600));
        assert_eq!(settings.trust_bundle_poll, Duration::from_secs(5));
        assert_eq!(settings.trust_bundle_timeout, Duration::from_secs(60));
        assert_eq!(
            settings.tls,
            TlsProfile {
                min_version: "VersionTLS13".to_string(),
                ciphers: vec![
                    "TLS_AES_128_GCM_SHA256".to_string(),
                    "TLS_AES_256_GCM_SHA384".to_string(),
                ],
            }
        );
    }

    #[test]
    fn default_tls_profile() {
        let settings = parse(&[]).settings();
        assert_eq!(settings.tls, TlsProfile::default());
        assert_eq!(settings.cluster.vector_image, "vector:latest");
        assert_eq!(settings.cluster.version, env!("CARGO_PKG_VERSION"));
    }
}
