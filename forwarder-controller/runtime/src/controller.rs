use crate::metrics::{PassResult, ReconcileMetrics};
use chrono::Utc;
use kube::runtime::controller::Action;
use logging_forwarder_controller_core::{
    config_hash,
    conditions::AttributeGroup,
    migrate::migrate,
    validate::{validate, Validation},
    ConditionMap, Options, RefNames, ResourceNames, TlsProfile,
};
use logging_forwarder_controller_generator::{self as generator, Forwarder};
use logging_forwarder_controller_k8s_api::{
    observability::ManagementState, ClusterLogForwarder, ConfigMap, DaemonSet, Deployment,
    Resource, ResourceExt, Secret,
};
use logging_forwarder_controller_k8s_reconcile::{
    authorize, resolve, Backoff, Client, Error, Reconciler, Result,
};
use logging_forwarder_controller_k8s_resources::{
    Cluster, ConfigArtifact, Context, Desired, Workload,
};
use logging_forwarder_controller_k8s_status::{
    self as status, daemonset_readiness, deployment_readiness, Outcome, Readiness,
};
use std::sync::Arc;
use tokio::time::{self, Duration};

/// Requeue delay after the stored status changed underneath a pass.
pub const STATUS_CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Operator-wide settings applied to every forwarder.
#[derive(Clone, Debug)]
pub struct Settings {
    pub cluster: Cluster,
    pub tls: TlsProfile,
    /// How long to wait before re-checking a forwarder whose last pass succeeded.
    pub requeue: Duration,
    pub trust_bundle_poll: Duration,
    pub trust_bundle_timeout: Duration,
}

/// Drives one forwarder at a time from its spec to a running collector.
#[derive(Clone, Debug)]
pub struct ForwarderController<C> {
    client: C,
    settings: Arc<Settings>,
    metrics: ReconcileMetrics,
    backoff: Backoff,
}

/// What a pass wrote, before its status is recorded.
struct Pass {
    conditions: ConditionMap,
    outcome: Outcome,
}

// === impl Settings ===

impl Default for Settings {
    fn default() -> Self {
        Self {
            cluster: Cluster::default(),
            tls: TlsProfile::default(),
            requeue: Duration::from_secs(5 * 60),
            trust_bundle_poll: Duration::from_secs(5),
            trust_bundle_timeout: Duration::from_secs(30),
        }
    }
}

// === impl ForwarderController ===

impl<C: Client> ForwarderController<C> {
    pub fn new(client: C, settings: Settings, metrics: ReconcileMetrics) -> Self {
        Self {
            client,
            settings: Arc::new(settings),
            metrics,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(self, backoff: Backoff) -> Self {
        Self { backoff, ..self }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs a single reconcile pass for `clf`.
    ///
    /// Status is written only when it differs from what is stored, so a pass over a converged
    /// forwarder issues no writes.
    pub async fn reconcile(&self, clf: &ClusterLogForwarder) -> Result<Action> {
        let start = time::Instant::now();

        if clf.spec.management_state == ManagementState::Unmanaged {
            tracing::debug!("Forwarder is unmanaged");
            self.metrics.observe(start, PassResult::Unmanaged);
            return Ok(Action::requeue(self.settings.requeue));
        }

        let mut conditions = ConditionMap::default();
        let res = match self.converge(clf, &mut conditions).await {
            Ok(outcome) => {
                let result = match &outcome {
                    Outcome::Deployed(Readiness::Ready) => PassResult::Ready,
                    Outcome::Undeployed(_) => PassResult::Undeployed,
                    _ => PassResult::NotReady,
                };
                let pass = Pass {
                    conditions,
                    outcome,
                };
                self.finish(clf, pass).await.map(|action| (action, result))
            }
            Err(error) => {
                if !error.is_conflict() {
                    let outcome = match &error {
                        Error::Generate(e) => Outcome::GeneratorFailed(e.to_string()),
                        e => Outcome::ReconcileFailed(e.to_string()),
                    };
                    let pass = Pass {
                        conditions,
                        outcome,
                    };
                    if let Err(error) = self.finish(clf, pass).await {
                        tracing::debug!(%error, "Failed to record the failed pass");
                    }
                }
                Err(error)
            }
        };

        match res {
            Ok((action, result)) => {
                self.metrics.observe(start, result);
                Ok(action)
            }
            Err(error) => {
                self.metrics.observe(start, PassResult::Error);
                Err(error)
            }
        }
    }

    /// Validates the forwarder and writes its resources in dependency order.
    ///
    /// Conditions computed along the way are left in `conditions` even when the pass fails.
    async fn converge(
        &self,
        clf: &ClusterLogForwarder,
        conditions: &mut ConditionMap,
    ) -> Result<Outcome> {
        let namespace = clf.namespace().unwrap_or_default();
        let name = clf.name_any();
        let reconciler = Reconciler::new(self.client.clone(), clf.object_ref(&()))
            .with_backoff(self.backoff);

        let (spec, migrations) = migrate(clf.spec.clone());
        let names = ResourceNames::of(clf);
        let refs = resolve(&self.client, &namespace, &RefNames::of(&spec)).await?;
        let authz = authorize(&self.client, &namespace, &spec).await;

        let Validation {
            spec,
            conditions: computed,
            error,
        } = validate(&spec, &refs, &authz);
        *conditions = computed;
        for condition in migrations {
            conditions.set(AttributeGroup::Conditions, condition);
        }

        if let Some(error) = error.as_ref().filter(|e| e.must_undeploy()) {
            tracing::info!(%error, "Forwarder cannot be deployed; removing its collector");
            reconciler
                .remove::<DaemonSet>(&namespace, &names.common)
                .await?;
            reconciler
                .remove::<Deployment>(&namespace, &names.common)
                .await?;
            return Ok(Outcome::Undeployed(error.to_string()));
        }
        if let Some(error) = &error {
            tracing::info!(%error, "Deploying the valid parts of the forwarder");
        }

        let options = Options::from_annotations(clf.annotations());
        let forwarder = Forwarder {
            namespace: &namespace,
            name: &name,
            names: &names,
            spec: &spec,
        };
        let config = generator::generate(&forwarder, &refs, &self.settings.tls, &options)?;
        let aws_credentials = generator::aws::credentials(&spec, &refs, &names)?;
        let hash = config_hash(&config.text);
        tracing::debug!(collector = %config.collector, %hash, "Generated configuration");

        let mut ctx = Context {
            forwarder: clf,
            spec: &spec,
            names: &names,
            cluster: &self.settings.cluster,
            options: &options,
            config: &config,
            config_hash: &hash,
            trust_bundle: None,
            aws_credentials: aws_credentials.as_deref(),
            service_account_uid: None,
        };

        let desired = Desired::build(&ctx);
        reconciler
            .apply(&desired.security_context_constraints)
            .await?;
        let sa = reconciler.apply(&desired.service_account).await?;
        let sa_uid = sa.metadata.uid;
        ctx.service_account_uid = sa_uid.as_deref();

        let desired = Desired::build(&ctx);
        reconciler
            .apply_token_secret(&desired.service_account_token)
            .await?;
        reconciler.apply(&desired.metadata_reader_binding).await?;
        reconciler.apply(&desired.scc_role).await?;
        reconciler.apply(&desired.scc_role_binding).await?;
        let bundle = reconciler
            .apply_trust_bundle(
                &desired.trust_bundle,
                self.settings.trust_bundle_poll,
                self.settings.trust_bundle_timeout,
            )
            .await?;
        ctx.trust_bundle = bundle.as_deref();

        let desired = Desired::build(&ctx);
        match &desired.config {
            ConfigArtifact::Secret(secret) => {
                reconciler.apply(secret).await?;
                reconciler
                    .remove::<ConfigMap>(&namespace, &names.config_artifact)
                    .await?;
            }
            ConfigArtifact::ConfigMap(cm) => {
                reconciler.apply(cm).await?;
                reconciler
                    .remove::<Secret>(&namespace, &names.config_artifact)
                    .await?;
            }
        }
        match &desired.aws_credentials {
            Some(cm) => {
                reconciler.apply(cm).await?;
            }
            None => {
                reconciler
                    .remove::<ConfigMap>(&namespace, &names.aws_credentials_map)
                    .await?;
            }
        }

        let readiness = match &desired.workload {
            Workload::DaemonSet(ds) => {
                let ds = reconciler.apply(ds).await?;
                reconciler
                    .remove::<Deployment>(&namespace, &names.common)
                    .await?;
                daemonset_readiness(&ds)
            }
            Workload::Deployment(deploy) => {
                let deploy = reconciler.apply(deploy).await?;
                reconciler
                    .remove::<DaemonSet>(&namespace, &names.common)
                    .await?;
                deployment_readiness(&deploy)
            }
        };

        reconciler.apply(&desired.metrics_service).await?;
        reconciler.apply(&desired.service_monitor).await?;
        for svc in &desired.input_services {
            reconciler.apply(svc).await?;
        }
        let removed = reconciler
            .sweep_input_services(&namespace, &desired.input_services)
            .await?;
        if !removed.is_empty() {
            tracing::info!(services = ?removed, "Removed input services no longer declared");
        }
        reconciler.apply(&desired.network_policy).await?;

        Ok(Outcome::Deployed(readiness))
    }

    /// Records the pass on the forwarder's status and decides when to look at it again.
    async fn finish(&self, clf: &ClusterLogForwarder, pass: Pass) -> Result<Action> {
        let Pass {
            conditions,
            outcome,
        } = pass;
        let stored = clf.status.as_ref();
        let status = status::build(
            stored,
            conditions,
            &outcome,
            clf.metadata.generation,
            Utc::now(),
        );
        if !status::changed(stored, &status) {
            self.metrics.status_unchanged();
            return Ok(Action::requeue(self.settings.requeue));
        }

        let namespace = clf.namespace().unwrap_or_default();
        match self
            .client
            .patch_status(&namespace, &clf.name_any(), &status)
            .await
        {
            Ok(()) => {
                tracing::debug!(ready = ?outcome, "Updated status");
                Ok(Action::requeue(self.settings.requeue))
            }
            Err(error) if error.is_conflict() => {
                tracing::debug!(%error, "Status changed during the pass");
                Ok(Action::requeue(STATUS_CONFLICT_REQUEUE))
            }
            Err(error) => Err(error),
        }
    }
}
