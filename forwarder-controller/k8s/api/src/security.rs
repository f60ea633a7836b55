//! `security.openshift.io/v1` `SecurityContextConstraints`.
//!
//! Unlike most resources, SCC fields sit at the top level of the object rather than under a
//! `spec`, so the type is declared by hand instead of through `CustomResource`.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ClusterResourceScope;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

const GROUP: &str = "security.openshift.io";
const VERSION: &str = "v1";
const KIND: &str = "SecurityContextConstraints";

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContextConstraints {
    #[serde(default = "api_version")]
    pub api_version: String,

    #[serde(default = "kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    #[serde(default)]
    pub allow_privileged_container: bool,

    #[serde(default)]
    pub allow_host_dir_volume_plugin: bool,

    #[serde(rename = "allowHostIPC", default)]
    pub allow_host_ipc: bool,

    #[serde(default)]
    pub allow_host_network: bool,

    #[serde(rename = "allowHostPID", default)]
    pub allow_host_pid: bool,

    #[serde(default)]
    pub allow_host_ports: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_privilege_escalation: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_allow_privilege_escalation: Option<bool>,

    #[serde(default)]
    pub read_only_root_filesystem: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_drop_capabilities: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_capabilities: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden_sysctls: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seccomp_profiles: Option<Vec<String>>,

    #[serde(default)]
    pub run_as_user: StrategyOptions,

    #[serde(rename = "seLinuxContext", default)]
    pub se_linux_context: StrategyOptions,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
}

/// A `runAsUser` / `seLinuxContext` strategy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StrategyOptions {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_: String,
}

fn api_version() -> String {
    format!("{GROUP}/{VERSION}")
}

fn kind() -> String {
    KIND.to_string()
}

// === impl SecurityContextConstraints ===

impl SecurityContextConstraints {
    pub fn new(name: impl ToString) -> Self {
        Self {
            api_version: api_version(),
            kind: kind(),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

impl kube::Resource for SecurityContextConstraints {
    type DynamicType = ();
    type Scope = ClusterResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        KIND.into()
    }

    fn group(_: &()) -> Cow<'_, str> {
        GROUP.into()
    }

    fn version(_: &()) -> Cow<'_, str> {
        VERSION.into()
    }

    fn plural(_: &()) -> Cow<'_, str> {
        "securitycontextconstraints".into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn resource_coordinates() {
        assert_eq!(
            SecurityContextConstraints::api_version(&()),
            "security.openshift.io/v1"
        );
        assert_eq!(
            SecurityContextConstraints::plural(&()),
            "securitycontextconstraints"
        );
    }

    #[test]
    fn serializes_type_meta() {
        let scc = SecurityContextConstraints::new("logging-scc");
        let json = serde_json::to_value(&scc).unwrap();
        assert_eq!(json["apiVersion"], "security.openshift.io/v1");
        assert_eq!(json["kind"], "SecurityContextConstraints");
        assert_eq!(json["metadata"]["name"], "logging-scc");
        assert_eq!(json["seLinuxContext"], serde_json::json!({}));
    }
}
