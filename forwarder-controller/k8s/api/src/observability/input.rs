use super::TlsSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct InputSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub type_: InputType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<Application>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure: Option<Infrastructure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<Audit>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<ReceiverSpec>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum InputType {
    #[default]
    Application,
    Infrastructure,
    Audit,
    Receiver,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<ContainerInputTuning>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<NamespaceContainer>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<NamespaceContainer>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInputTuning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_container: Option<LimitSpec>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LimitSpec {
    pub max_records_per_second: i64,
}

/// Namespace and container name globs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct NamespaceContainer {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Infrastructure {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<InfrastructureSource>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum InfrastructureSource {
    Node,
    Container,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Audit {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<AuditSource>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema)]
pub enum AuditSource {
    #[serde(rename = "auditd")]
    Auditd,
    #[serde(rename = "kubeAPI")]
    KubeApi,
    #[serde(rename = "openshiftAPI")]
    OpenshiftApi,
    #[serde(rename = "ovn")]
    Ovn,
}

/// An input that opens a listening socket on the collector.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ReceiverSpec {
    #[serde(rename = "type")]
    pub type_: ReceiverType,

    pub port: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpReceiver>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ReceiverType {
    Http,
    Syslog,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct HttpReceiver {
    pub format: HttpReceiverFormat,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum HttpReceiverFormat {
    #[serde(rename = "kubeAPIAudit")]
    KubeApiAudit,
}

// === impl InputType ===

impl InputType {
    pub const RESERVED: [InputType; 3] = [Self::Application, Self::Infrastructure, Self::Audit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Infrastructure => "infrastructure",
            Self::Audit => "audit",
            Self::Receiver => "receiver",
        }
    }

    /// Returns the log type an input reference names when it is one of the reserved names.
    pub fn reserved(name: &str) -> Option<Self> {
        Self::RESERVED.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl InfrastructureSource ===

impl InfrastructureSource {
    pub const ALL: [Self; 2] = [Self::Node, Self::Container];
}

// === impl AuditSource ===

impl AuditSource {
    pub const ALL: [Self; 4] = [Self::Auditd, Self::KubeApi, Self::OpenshiftApi, Self::Ovn];
}

// === impl ReceiverType ===

impl ReceiverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Syslog => "syslog",
        }
    }
}

impl fmt::Display for ReceiverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl ReceiverSpec ===

impl ReceiverSpec {
    pub fn is_kube_api_audit(&self) -> bool {
        matches!(
            self.http,
            Some(HttpReceiver {
                format: HttpReceiverFormat::KubeApiAudit
            })
        )
    }
}
