//! The cluster resources that run a forwarder's collector, and how to tell when an observed
//! resource has drifted from them.
//!
//! Building is pure: [`Desired::build`] derives every resource from a [`Context`] without
//! touching the cluster. The [`Managed`] trait compares and merges each kind.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod alerts;
mod compare;
mod config;
mod meta;
mod network_policy;
mod rbac;
mod service;
mod service_account;
mod workload;

#[cfg(test)]
mod tests;

pub use self::{
    alerts::{alert_rules, ALERT_RULES_NAME},
    compare::{owned_by, Comparison, Managed},
    config::{aws_credentials, config_artifact, trust_bundle, ConfigArtifact},
    meta::owner_reference,
    network_policy::network_policy,
    rbac::{
        metadata_reader_binding, scc_role, scc_role_binding, security_context_constraints,
        METADATA_READER_CLUSTER_ROLE, SCC_NAME,
    },
    service::{input_services, metrics_service, service_monitor},
    service_account::{service_account, service_account_token, DEPENDENTS_FINALIZER},
    workload::{workload, Workload},
};
use logging_forwarder_controller_core::{
    labels::Identity, Options, ProxyConfig, ResourceNames,
};
use logging_forwarder_controller_generator::Config;
use logging_forwarder_controller_k8s_api::{
    monitoring::ServiceMonitor, observability::CollectorType, security::SecurityContextConstraints,
    ClusterLogForwarder, ClusterLogForwarderSpec, ClusterRoleBinding, ConfigMap, NetworkPolicy,
    ResourceExt, Role, RoleBinding, Secret, Service, ServiceAccount,
};

/// Settings shared by every forwarder in the cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cluster {
    pub id: String,
    /// The operator's version, stamped onto every resource.
    pub version: String,
    pub vector_image: String,
    pub fluentd_image: String,
    pub proxy: ProxyConfig,
}

/// Everything a forwarder's resources are derived from.
#[derive(Copy, Clone, Debug)]
pub struct Context<'a> {
    /// The forwarder as stored, which owns the resources.
    pub forwarder: &'a ClusterLogForwarder,
    /// The validated spec, holding only deployable items.
    pub spec: &'a ClusterLogForwarderSpec,
    pub names: &'a ResourceNames,
    pub cluster: &'a Cluster,
    pub options: &'a Options,
    pub config: &'a Config,
    pub config_hash: &'a str,
    /// The injected trusted CA bundle, once the platform has filled it in.
    pub trust_bundle: Option<&'a str>,
    /// The rendered AWS credentials profiles, when an output assumes an IAM role.
    pub aws_credentials: Option<&'a str>,
    pub service_account_uid: Option<&'a str>,
}

/// The full set of resources a forwarder needs, in the order they are applied.
#[derive(Clone, Debug)]
pub struct Desired {
    pub security_context_constraints: SecurityContextConstraints,
    pub service_account: ServiceAccount,
    pub service_account_token: Secret,
    pub metadata_reader_binding: ClusterRoleBinding,
    pub scc_role: Role,
    pub scc_role_binding: RoleBinding,
    pub trust_bundle: ConfigMap,
    pub config: ConfigArtifact,
    pub aws_credentials: Option<ConfigMap>,
    pub workload: Workload,
    pub metrics_service: Service,
    pub service_monitor: ServiceMonitor,
    pub input_services: Vec<Service>,
    pub network_policy: NetworkPolicy,
}

// === impl Context ===

impl Context<'_> {
    pub fn namespace(&self) -> String {
        self.forwarder.namespace().unwrap_or_default()
    }

    pub fn name(&self) -> String {
        self.forwarder.name_any()
    }

    pub fn collector(&self) -> CollectorType {
        self.config.collector
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.collector(), self.name(), &self.cluster.version)
    }

    pub fn image(&self) -> &str {
        match self.collector() {
            CollectorType::Vector => &self.cluster.vector_image,
            CollectorType::Fluentd => &self.cluster.fluentd_image,
        }
    }
}

// === impl Desired ===

impl Desired {
    pub fn build(ctx: &Context<'_>) -> Self {
        Self {
            security_context_constraints: security_context_constraints(&ctx.cluster.version),
            service_account: service_account(ctx),
            service_account_token: service_account_token(ctx),
            metadata_reader_binding: metadata_reader_binding(ctx),
            scc_role: scc_role(ctx),
            scc_role_binding: scc_role_binding(ctx),
            trust_bundle: trust_bundle(ctx),
            config: config_artifact(ctx),
            aws_credentials: aws_credentials(ctx),
            workload: workload(ctx),
            metrics_service: metrics_service(ctx),
            service_monitor: service_monitor(ctx),
            input_services: input_services(ctx),
            network_policy: network_policy(ctx),
        }
    }
}
