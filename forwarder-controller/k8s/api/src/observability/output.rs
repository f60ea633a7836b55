use super::{input::LimitSpec, BearerToken, SecretKey, TlsSecurityProfile, TlsSpec};
use crate::K8sDuration;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub type_: OutputType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutputTlsSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<LimitSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_monitor: Option<AzureMonitor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudwatch: Option<Cloudwatch>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticsearch: Option<Elasticsearch>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_cloud_logging: Option<GoogleCloudLogging>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<Http>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka: Option<Kafka>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loki: Option<Loki>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loki_stack: Option<LokiStack>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp: Option<Otlp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splunk: Option<Splunk>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syslog: Option<Syslog>,
}

/// The closed set of sink kinds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum OutputType {
    AzureMonitor,
    Cloudwatch,
    #[default]
    Elasticsearch,
    GoogleCloudLogging,
    Http,
    Kafka,
    Loki,
    LokiStack,
    Otlp,
    S3,
    Splunk,
    Syslog,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputTlsSpec {
    #[serde(flatten)]
    pub tls: TlsSpec,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure_skip_verify: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_profile: Option<TlsSecurityProfile>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputTuning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_write: Option<Quantity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_retry_duration: Option<K8sDuration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_duration: Option<K8sDuration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryMode {
    AtLeastOnce,
    AtMostOnce,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct HttpAuthentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<BearerToken>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<SecretKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretKey>,
}

/// Authentication for AWS-hosted sinks: either a static key pair or an assumed IAM role.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwsAuthentication {
    #[serde(rename = "type")]
    pub type_: AwsAuthType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_access_key: Option<AwsAccessKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam_role: Option<IamRole>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum AwsAuthType {
    AwsAccessKey,
    IamRole,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwsAccessKey {
    pub key_id: SecretKey,
    pub key_secret: SecretKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IamRole {
    pub role_arn: SecretKey,
    pub token: BearerToken,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureMonitor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AzureMonitorAuthentication>,

    pub customer_id: String,

    pub log_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub azure_resource_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuning>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureMonitorAuthentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_key: Option<SecretKey>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cloudwatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AwsAuthentication>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuning>,

    pub region: String,

    pub group_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Elasticsearch {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<HttpAuthentication>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuning>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub index: String,

    #[serde(default)]
    pub version: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCloudLogging {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<GoogleCloudLoggingAuthentication>,

    pub id: GoogleCloudLoggingId,

    pub log_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuning>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct GoogleCloudLoggingAuthentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<SecretKey>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct GoogleCloudLoggingId {
    #[serde(rename = "type")]
    pub type_: GoogleCloudLoggingIdType,
    pub value: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum GoogleCloudLoggingIdType {
    BillingAccount,
    Folder,
    #[default]
    Project,
    Organization,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Http {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<HttpAuthentication>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuning>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Kafka {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<KafkaAuthentication>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuning>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub brokers: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct KafkaAuthentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sasl: Option<SaslAuthentication>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SaslAuthentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<SecretKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretKey>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mechanism: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Loki {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<HttpAuthentication>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuning>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_keys: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LokiStack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<HttpAuthentication>,

    pub target: LokiStackTarget,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuning>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_keys: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct LokiStackTarget {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Otlp {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<HttpAuthentication>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuning>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    pub region: String,

    pub bucket: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_prefix: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AwsAuthentication>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuning>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Splunk {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<SplunkAuthentication>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<OutputTuning>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub index: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SplunkAuthentication {
    pub token: SecretKey,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Syslog {
    pub url: String,

    #[serde(default)]
    pub rfc: SyslogRfc,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub severity: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub facility: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub payload_key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub proc_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub msg_id: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum SyslogRfc {
    #[serde(rename = "RFC3164")]
    Rfc3164,
    #[default]
    #[serde(rename = "RFC5424")]
    Rfc5424,
}

// === impl OutputSpec ===

impl OutputSpec {
    /// The endpoint URL configured for the output's type, if the type carries one.
    pub fn url(&self) -> Option<&str> {
        let url = match self.type_ {
            OutputType::AzureMonitor
            | OutputType::GoogleCloudLogging
            | OutputType::LokiStack => None,
            OutputType::Cloudwatch => self.cloudwatch.as_ref()?.url.as_deref(),
            OutputType::Elasticsearch => self.elasticsearch.as_ref().map(|o| o.url.as_str()),
            OutputType::Http => self.http.as_ref().map(|o| o.url.as_str()),
            OutputType::Kafka => self.kafka.as_ref()?.url.as_deref(),
            OutputType::Loki => self.loki.as_ref().map(|o| o.url.as_str()),
            OutputType::Otlp => self.otlp.as_ref().map(|o| o.url.as_str()),
            OutputType::S3 => self.s3.as_ref()?.url.as_deref(),
            OutputType::Splunk => self.splunk.as_ref().map(|o| o.url.as_str()),
            OutputType::Syslog => self.syslog.as_ref().map(|o| o.url.as_str()),
        };
        url.filter(|u| !u.is_empty())
    }

    pub fn tuning(&self) -> Option<&OutputTuning> {
        match self.type_ {
            OutputType::AzureMonitor => self.azure_monitor.as_ref()?.tuning.as_ref(),
            OutputType::Cloudwatch => self.cloudwatch.as_ref()?.tuning.as_ref(),
            OutputType::Elasticsearch => self.elasticsearch.as_ref()?.tuning.as_ref(),
            OutputType::GoogleCloudLogging => self.google_cloud_logging.as_ref()?.tuning.as_ref(),
            OutputType::Http => self.http.as_ref()?.tuning.as_ref(),
            OutputType::Kafka => self.kafka.as_ref()?.tuning.as_ref(),
            OutputType::Loki => self.loki.as_ref()?.tuning.as_ref(),
            OutputType::LokiStack => self.loki_stack.as_ref()?.tuning.as_ref(),
            OutputType::Otlp => self.otlp.as_ref()?.tuning.as_ref(),
            OutputType::S3 => self.s3.as_ref()?.tuning.as_ref(),
            OutputType::Splunk => self.splunk.as_ref()?.tuning.as_ref(),
            OutputType::Syslog => None,
        }
    }

    /// Bearer/basic authentication for HTTP-style sinks.
    pub fn http_authentication(&self) -> Option<&HttpAuthentication> {
        match self.type_ {
            OutputType::Elasticsearch => self.elasticsearch.as_ref()?.authentication.as_ref(),
            OutputType::Http => self.http.as_ref()?.authentication.as_ref(),
            OutputType::Loki => self.loki.as_ref()?.authentication.as_ref(),
            OutputType::LokiStack => self.loki_stack.as_ref()?.authentication.as_ref(),
            OutputType::Otlp => self.otlp.as_ref()?.authentication.as_ref(),
            _ => None,
        }
    }

    pub fn aws_authentication(&self) -> Option<&AwsAuthentication> {
        match self.type_ {
            OutputType::Cloudwatch => self.cloudwatch.as_ref()?.authentication.as_ref(),
            OutputType::S3 => self.s3.as_ref()?.authentication.as_ref(),
            _ => None,
        }
    }

    /// True when the type-specific block matching `type` is present.
    pub fn has_type_block(&self) -> bool {
        match self.type_ {
            OutputType::AzureMonitor => self.azure_monitor.is_some(),
            OutputType::Cloudwatch => self.cloudwatch.is_some(),
            OutputType::Elasticsearch => self.elasticsearch.is_some(),
            OutputType::GoogleCloudLogging => self.google_cloud_logging.is_some(),
            OutputType::Http => self.http.is_some(),
            OutputType::Kafka => self.kafka.is_some(),
            OutputType::Loki => self.loki.is_some(),
            OutputType::LokiStack => self.loki_stack.is_some(),
            OutputType::Otlp => self.otlp.is_some(),
            OutputType::S3 => self.s3.is_some(),
            OutputType::Splunk => self.splunk.is_some(),
            OutputType::Syslog => self.syslog.is_some(),
        }
    }

    pub fn tls_spec(&self) -> Option<&TlsSpec> {
        self.tls.as_ref().map(|t| &t.tls)
    }

    pub fn insecure_skip_verify(&self) -> bool {
        self.tls.as_ref().map(|t| t.insecure_skip_verify).unwrap_or(false)
    }
}

// === impl OutputType ===

impl OutputType {
    pub const ALL: [Self; 12] = [
        Self::AzureMonitor,
        Self::Cloudwatch,
        Self::Elasticsearch,
        Self::GoogleCloudLogging,
        Self::Http,
        Self::Kafka,
        Self::Loki,
        Self::LokiStack,
        Self::Otlp,
        Self::S3,
        Self::Splunk,
        Self::Syslog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AzureMonitor => "azureMonitor",
            Self::Cloudwatch => "cloudwatch",
            Self::Elasticsearch => "elasticsearch",
            Self::GoogleCloudLogging => "googleCloudLogging",
            Self::Http => "http",
            Self::Kafka => "kafka",
            Self::Loki => "loki",
            Self::LokiStack => "lokiStack",
            Self::Otlp => "otlp",
            Self::S3 => "s3",
            Self::Splunk => "splunk",
            Self::Syslog => "syslog",
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
