//! The security policy the collector pods run under, and the bindings that let its service
//! account use the policy and read pod metadata.

use crate::{meta, Context};
use logging_forwarder_controller_core::{
    labels::{MANAGED_BY_LABEL, PART_OF_LABEL, VERSION},
    MANAGED_BY, PART_OF,
};
use logging_forwarder_controller_k8s_api::{
    api::rbac::v1::{PolicyRule, RoleRef, Subject},
    security::{SecurityContextConstraints, StrategyOptions},
    ClusterRoleBinding, ObjectMeta, Role, RoleBinding,
};

pub const SCC_NAME: &str = "logging-scc";

/// Grants `get` on pods and namespaces cluster-wide, for metadata enrichment.
pub const METADATA_READER_CLUSTER_ROLE: &str = "cluster-logging-metadata-reader";

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

const DROPPED_CAPABILITIES: [&str; 9] = [
    "CHOWN",
    "DAC_OVERRIDE",
    "FSETID",
    "FOWNER",
    "SETGID",
    "SETUID",
    "SETPCAP",
    "NET_BIND_SERVICE",
    "KILL",
];

const VOLUMES: [&str; 4] = ["configMap", "secret", "emptyDir", "projected"];

/// The cluster-wide policy shared by every forwarder's collector.
///
/// Only the version label depends on the caller, so concurrent writers converge.
pub fn security_context_constraints(version: &str) -> SecurityContextConstraints {
    let strings = |items: &[&str]| -> Option<Vec<String>> {
        Some(items.iter().map(|s| s.to_string()).collect())
    };
    let mut scc = SecurityContextConstraints::new(SCC_NAME);
    scc.metadata.labels = Some(
        [
            (PART_OF_LABEL, PART_OF),
            (MANAGED_BY_LABEL, MANAGED_BY),
            (VERSION, version),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
    );
    SecurityContextConstraints {
        priority: None,
        allow_privileged_container: false,
        allow_host_dir_volume_plugin: true,
        allow_host_ipc: false,
        allow_host_network: false,
        allow_host_pid: false,
        allow_host_ports: false,
        allow_privilege_escalation: Some(false),
        default_allow_privilege_escalation: Some(false),
        read_only_root_filesystem: true,
        required_drop_capabilities: strings(&DROPPED_CAPABILITIES),
        allowed_capabilities: None,
        volumes: strings(&VOLUMES),
        forbidden_sysctls: strings(&["*"]),
        seccomp_profiles: strings(&["runtime/default"]),
        run_as_user: StrategyOptions {
            type_: "RunAsAny".to_string(),
        },
        se_linux_context: StrategyOptions {
            type_: "RunAsAny".to_string(),
        },
        users: None,
        groups: None,
        ..scc
    }
}

/// Allows the collector's service account to read pod and namespace metadata.
///
/// Cluster-scoped, so it cannot be owned by the forwarder; it is labeled instead.
pub fn metadata_reader_binding(ctx: &Context<'_>) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(ctx.names.metadata_reader_binding.clone()),
            labels: Some(ctx.identity().labels()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: METADATA_READER_CLUSTER_ROLE.to_string(),
        },
        subjects: Some(vec![service_account_subject(ctx)]),
    }
}

pub fn scc_role(ctx: &Context<'_>) -> Role {
    Role {
        metadata: meta::owned(ctx, scc_binding_name(ctx)),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["security.openshift.io".to_string()]),
            resources: Some(vec!["securitycontextconstraints".to_string()]),
            resource_names: Some(vec![SCC_NAME.to_string()]),
            verbs: vec!["use".to_string()],
            ..Default::default()
        }]),
    }
}

pub fn scc_role_binding(ctx: &Context<'_>) -> RoleBinding {
    RoleBinding {
        metadata: meta::owned(ctx, scc_binding_name(ctx)),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "Role".to_string(),
            name: scc_binding_name(ctx),
        },
        subjects: Some(vec![service_account_subject(ctx)]),
    }
}

fn scc_binding_name(ctx: &Context<'_>) -> String {
    format!("{}-scc", ctx.names.common)
}

fn service_account_subject(ctx: &Context<'_>) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: ctx.names.service_account.clone(),
        namespace: Some(ctx.namespace()),
        api_group: None,
    }
}
