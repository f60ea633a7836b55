//! `observability.openshift.io/v1` resources.

pub mod condition;
pub mod filter;
pub mod input;
pub mod output;
mod refs;

pub use self::{
    condition::{Condition, ConditionStatus},
    filter::{FilterSpec, FilterType},
    input::{InputSpec, InputType, ReceiverType},
    output::{OutputSpec, OutputType},
    refs::{
        BearerToken, BearerTokenFrom, BearerTokenSecretKey, ConfigMapOrSecretKey, LocalRef,
        SecretKey, TlsSecurityProfile, TlsSpec,
    },
};
use k8s_openapi::{
    api::core::v1::{Affinity, ResourceRequirements, Toleration},
    apimachinery::pkg::util::intstr::IntOrString,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const GROUP: &str = "observability.openshift.io";
pub const VERSION: &str = "v1";
pub const API_VERSION: &str = "observability.openshift.io/v1";

/// Describes where the collector gathers logs from, how they are transformed, and where they are
/// forwarded to.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "observability.openshift.io",
    version = "v1",
    kind = "ClusterLogForwarder",
    status = "ClusterLogForwarderStatus",
    shortname = "obsclf",
    derive = "Default",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLogForwarderSpec {
    #[serde(default)]
    pub management_state: ManagementState,

    pub service_account: ServiceAccountRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<CollectorSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterSpec>,

    #[serde(default)]
    pub pipelines: Vec<PipelineSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_policy: Option<NetworkPolicySpec>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ManagementState {
    #[default]
    Managed,
    Unmanaged,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ServiceAccountRef {
    pub name: String,
}

/// Which collector implementation runs the generated configuration.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum CollectorType {
    #[default]
    Vector,
    Fluentd,
}

/// Scheduling and resource tuning for the collector pods.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollectorSpec {
    #[serde(default, rename = "type")]
    pub type_: CollectorType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,

    /// Extra annotations for the collector pod template.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Restricts the traffic the collector pods may send and receive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    #[serde(default)]
    pub rule_set: NetworkPolicyRuleSet,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum NetworkPolicyRuleSet {
    #[default]
    AllowAllIngressEgress,
    /// Only the metrics endpoint accepts connections; egress is unrestricted.
    AllowIngressMetrics,
    /// Ingress on the metrics and receiver ports; egress only to outputs, DNS, and the API server.
    RestrictIngressEgress,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    pub name: String,

    #[serde(default)]
    pub input_refs: Vec<String>,

    #[serde(default)]
    pub output_refs: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter_refs: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLogForwarderStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pipelines: Vec<Condition>,
}

// === impl CollectorType ===

impl CollectorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Fluentd => "fluentd",
        }
    }
}

impl std::fmt::Display for CollectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl ClusterLogForwarderSpec ===

impl ClusterLogForwarderSpec {
    pub fn collector_type(&self) -> CollectorType {
        self.collector
            .as_ref()
            .map(|c| c.type_)
            .unwrap_or_default()
    }

    pub fn network_policy_rule_set(&self) -> NetworkPolicyRuleSet {
        self.network_policy
            .as_ref()
            .map(|n| n.rule_set)
            .unwrap_or_default()
    }

    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn filter(&self, name: &str) -> Option<&FilterSpec> {
        self.filters.iter().find(|f| f.name == name)
    }

    /// Receiver inputs in declaration order.
    pub fn receivers(&self) -> impl Iterator<Item = (&InputSpec, &input::ReceiverSpec)> {
        self.inputs
            .iter()
            .filter_map(|i| i.receiver.as_ref().map(|r| (i, r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FORWARDER: &str = r#"
apiVersion: observability.openshift.io/v1
kind: ClusterLogForwarder
metadata:
  name: collector
  namespace: openshift-logging
spec:
  serviceAccount:
    name: logcollector
  inputs:
    - name: http-in
      type: receiver
      receiver:
        type: http
        port: 8080
        http:
          format: kubeAPIAudit
  outputs:
    - name: es
      type: elasticsearch
      elasticsearch:
        url: https://es.example.com:9200
        index: "{.log_type||\"none\"}"
        version: 8
      tls:
        ca:
          key: ca-bundle.crt
          secret:
            name: es-secret
  pipelines:
    - name: audit-to-es
      inputRefs: [http-in]
      outputRefs: [es]
"#;

    #[test]
    fn parses_forwarder() {
        let clf: ClusterLogForwarder = serde_yaml::from_str(FORWARDER).expect("must parse");
        assert_eq!(clf.spec.management_state, ManagementState::Managed);
        assert_eq!(clf.spec.collector_type(), CollectorType::Vector);
        assert_eq!(clf.spec.service_account.name, "logcollector");

        let (input, receiver) = clf.spec.receivers().next().expect("receiver");
        assert_eq!(input.name, "http-in");
        assert_eq!(receiver.type_, ReceiverType::Http);
        assert_eq!(receiver.port, 8080);

        let es = clf.spec.output("es").expect("output");
        assert_eq!(es.type_, OutputType::Elasticsearch);
        assert_eq!(es.url(), Some("https://es.example.com:9200"));
        let ca = es.tls.as_ref().and_then(|t| t.tls.ca.as_ref()).expect("ca");
        assert_eq!(ca.secret_name(), Some("es-secret"));

        assert_eq!(
            clf.spec.pipelines,
            vec![PipelineSpec {
                name: "audit-to-es".to_string(),
                input_refs: vec!["http-in".to_string()],
                output_refs: vec!["es".to_string()],
                filter_refs: vec![],
            }]
        );
    }

    #[test]
    fn unmanaged_round_trips() {
        let spec = ClusterLogForwarderSpec {
            management_state: ManagementState::Unmanaged,
            ..Default::default()
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["managementState"], "Unmanaged");
        assert_eq!(
            serde_json::from_value::<ClusterLogForwarderSpec>(json).unwrap(),
            spec
        );
    }
}
