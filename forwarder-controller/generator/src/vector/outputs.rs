use super::{Remap, Throttle, Tls};
use crate::{
    aws, component_id,
    secrets::Secrets,
    sinks::{self, host_port, kafka_endpoint, parse_url, quantity_bytes},
    vrl, Element, Error,
};
use logging_forwarder_controller_core::{paths, Options, TlsProfile};
use logging_forwarder_controller_k8s_api::{
    observability::{
        output::{
            AwsAuthType, AwsAuthentication, DeliveryMode, GoogleCloudLoggingIdType,
            HttpAuthentication, SyslogRfc,
        },
        OutputSpec, OutputType,
    },
    ClusterLogForwarderSpec,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Flattens label keys so that dotted and slashed label names do not explode into nested fields
/// downstream.
const DEDOT: &str = r#".openshift.sequence = to_unix_timestamp(now(), unit: "nanoseconds")
if exists(.kubernetes.namespace_labels) {
  for_each(object!(.kubernetes.namespace_labels)) -> |key, value| {
    newkey = replace(key, r'[\./]', "_")
    .kubernetes.namespace_labels = set!(.kubernetes.namespace_labels, [newkey], value)
    if newkey != key {
      .kubernetes.namespace_labels = remove!(.kubernetes.namespace_labels, [key], true)
    }
  }
}
if exists(.kubernetes.labels) {
  for_each(object!(.kubernetes.labels)) -> |key, value| {
    newkey = replace(key, r'[\./]', "_")
    .kubernetes.labels = set!(.kubernetes.labels, [newkey], value)
    if newkey != key {
      .kubernetes.labels = remove!(.kubernetes.labels, [key], true)
    }
  }
}"#;

const ES_WRITE_INDEX: &str = r#"._internal.es_index = "app-write"
if .log_type == "infrastructure" { ._internal.es_index = "infra-write" }
if .log_type == "audit" { ._internal.es_index = "audit-write" }"#;

const CLOUDWATCH_STREAM: &str = r#"if .log_type == "application" {
  ._internal.cw_stream_name = (string(.kubernetes.namespace_name) ?? "") + "_" + (string(.kubernetes.pod_name) ?? "") + "_" + (string(.kubernetes.container_name) ?? "")
} else {
  ._internal.cw_stream_name = (string(.hostname) ?? "unknown") + "." + (string(.log_source) ?? "unknown")
}"#;

const S3_KEY_PREFIX: &str = r#"{.kubernetes.namespace_name||.log_type||"unknown"}/"#;

/// Fields every sink renders.
#[derive(Serialize)]
struct Common {
    id: String,
    inputs: Vec<String>,
    compression: Option<String>,
    parts: Vec<Element>,
}

#[derive(Serialize)]
struct Elasticsearch {
    #[serde(flatten)]
    common: Common,
    endpoints: Vec<String>,
    index: String,
    api_version: &'static str,
}

#[derive(Serialize)]
struct Http {
    #[serde(flatten)]
    common: Common,
    uri: String,
    method: String,
}

#[derive(Serialize)]
struct KafkaSink {
    #[serde(flatten)]
    common: Common,
    bootstrap_servers: String,
    topic: String,
}

#[derive(Serialize)]
struct Loki {
    #[serde(flatten)]
    common: Common,
    endpoint: String,
    tenant_id: Option<String>,
    labels: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct Syslog {
    #[serde(flatten)]
    common: Common,
    address: String,
    mode: &'static str,
    rfc: &'static str,
    facility: Option<String>,
    severity: Option<String>,
    app_name: Option<String>,
    msg_id: Option<String>,
    proc_id: Option<String>,
    payload_key: Option<String>,
}

#[derive(Serialize)]
struct Cloudwatch {
    #[serde(flatten)]
    common: Common,
    region: String,
    group_name: String,
    stream_name: String,
    endpoint: Option<String>,
    auth: Option<Element>,
}

#[derive(Serialize)]
struct S3 {
    #[serde(flatten)]
    common: Common,
    region: String,
    bucket: String,
    key_prefix: String,
    endpoint: Option<String>,
    auth: Option<Element>,
}

#[derive(Serialize)]
struct Splunk {
    #[serde(flatten)]
    common: Common,
    endpoint: String,
    token: String,
    index: Option<String>,
}

#[derive(Serialize)]
struct AzureMonitor {
    #[serde(flatten)]
    common: Common,
    customer_id: String,
    shared_key: String,
    log_type: String,
    azure_resource_id: String,
    host: String,
}

#[derive(Serialize)]
struct GoogleCloudLogging {
    #[serde(flatten)]
    common: Common,
    id_key: &'static str,
    id_value: String,
    log_id: String,
    credentials_path: Option<String>,
}

#[derive(Serialize)]
struct Otlp {
    #[serde(flatten)]
    common: Common,
    uri: String,
}

#[derive(Serialize)]
struct HttpAuth {
    table: String,
    strategy: &'static str,
    user: Option<String>,
    password: Option<String>,
    token: Option<String>,
}

#[derive(Serialize)]
struct AwsAuth {
    credentials_file: Option<String>,
    profile: Option<String>,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
}

#[derive(Serialize)]
struct Sasl {
    table: String,
    mechanism: String,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
struct Buffer {
    table: String,
    disk: bool,
}

#[derive(Serialize)]
struct Table {
    table: String,
}

#[derive(Serialize)]
struct Batch {
    table: String,
    max_bytes: u64,
}

#[derive(Serialize)]
struct Request {
    table: String,
    retry_initial_backoff_secs: Option<u64>,
    retry_max_duration_secs: Option<u64>,
    timeout_secs: Option<i32>,
    headers: BTreeMap<String, String>,
}

/// How a sink talks to its endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Transport {
    /// Batched HTTP requests, with request and batch tuning.
    Http,
    /// A raw socket or broker connection that must switch TLS on explicitly.
    Stream,
}

/// Builds one output's sink.
struct Sink<'a> {
    id: String,
    output: &'a OutputSpec,
    secrets: &'a Secrets<'a>,
    profile: TlsProfile,
    /// Per-record assignments evaluated just ahead of the sink.
    remap: Vec<String>,
}

pub(super) fn elements(
    spec: &ClusterLogForwarderSpec,
    routes: &BTreeMap<String, BTreeSet<String>>,
    secrets: &Secrets<'_>,
    profile: &TlsProfile,
    options: &Options,
) -> Result<Vec<Element>, Error> {
    let mut elements = Vec::new();
    for output in &spec.outputs {
        let Some(sources) = routes.get(&output.name) else {
            tracing::debug!(output = %output.name, "Skipping output without pipelines");
            continue;
        };
        let id = format!("output_{}", component_id(&output.name));
        let mut inputs = sources.iter().cloned().collect::<Vec<_>>();

        if let Some(limit) = output.rate_limit {
            let throttle = format!("{id}_throttle");
            elements.push(Element::new(
                "throttle",
                Throttle {
                    id: throttle.clone(),
                    inputs,
                    threshold: limit.max_records_per_second,
                    key_field: None,
                },
            ));
            inputs = vec![throttle];
        }

        if options.debug_output {
            elements.push(Element::new(
                "console",
                Common {
                    id,
                    inputs,
                    compression: None,
                    parts: Vec::new(),
                },
            ));
            continue;
        }

        let mut sink = Sink {
            id: id.clone(),
            output,
            secrets,
            profile: profile.with_override(output.tls.as_ref().and_then(|t| t.security_profile.as_ref())),
            remap: Vec::new(),
        };
        let element = sink.build()?;

        let remap = format!("{id}_remap");
        let source = std::iter::once(DEDOT.to_string())
            .chain(sink.remap)
            .collect::<Vec<_>>()
            .join("\n");
        elements.push(Remap::element(remap, inputs, source));
        elements.push(element);
    }
    Ok(elements)
}

// === impl Sink ===

impl<'a> Sink<'a> {
    fn build(&mut self) -> Result<Element, Error> {
        let output = self.output;
        match output.type_ {
            OutputType::Elasticsearch => self.elasticsearch(),
            OutputType::Http => self.http(),
            OutputType::Kafka => self.kafka(),
            OutputType::Loki => self.loki(),
            OutputType::Syslog => self.syslog(),
            OutputType::Cloudwatch => self.cloudwatch(),
            OutputType::S3 => self.s3(),
            OutputType::Splunk => self.splunk(),
            OutputType::AzureMonitor => self.azure_monitor(),
            OutputType::GoogleCloudLogging => self.google_cloud_logging(),
            OutputType::Otlp => self.otlp(),
            OutputType::LokiStack => Err(Error::Generator(format!(
                "output {:?}: lokiStack outputs must be migrated to loki outputs",
                output.name
            ))),
        }
    }

    fn elasticsearch(&mut self) -> Result<Element, Error> {
        let es = self.block(self.output.elasticsearch.as_ref())?;
        let index = if es.index.is_empty() {
            self.remap.push(ES_WRITE_INDEX.to_string());
            "{{ _internal.es_index }}".to_string()
        } else {
            self.field("es_index", &es.index)?
        };

        let table = self.table();
        let mut headers = BTreeMap::new();
        let mut parts = self.tls(&table, Transport::Http)?;
        match es.authentication.as_ref() {
            Some(HttpAuthentication {
                token: Some(token),
                username: None,
                ..
            }) => {
                let token = self.secrets.bearer_token(token)?;
                headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            }
            auth => parts.extend(self.http_auth(&table, auth)?),
        }
        parts.extend(self.tuning(&table, Transport::Http, headers, None)?);

        let api_version = match es.version {
            6 => "v6",
            7 => "v7",
            v if v >= 8 => "v8",
            _ => "auto",
        };
        Ok(Element::new(
            "elasticsearch",
            Elasticsearch {
                common: self.common(parts),
                endpoints: vec![es.url.clone()],
                index,
                api_version,
            },
        ))
    }

    fn http(&mut self) -> Result<Element, Error> {
        let http = self.block(self.output.http.as_ref())?;
        let table = self.table();
        let mut parts = self.tls(&table, Transport::Http)?;
        parts.extend(self.http_auth(&table, http.authentication.as_ref())?);
        parts.extend(self.tuning(&table, Transport::Http, http.headers.clone(), http.timeout)?);
        Ok(Element::new(
            "http",
            Http {
                common: self.common(parts),
                uri: http.url.clone(),
                method: http
                    .method
                    .as_deref()
                    .filter(|m| !m.is_empty())
                    .unwrap_or("post")
                    .to_ascii_lowercase(),
            },
        ))
    }

    fn kafka(&mut self) -> Result<Element, Error> {
        let kafka = self.block(self.output.kafka.as_ref())?;
        let (servers, topic) = kafka_endpoint(kafka)?;
        let topic = self.field("kafka_topic", &topic)?;

        let table = self.table();
        let mut parts = self.tls(&table, Transport::Stream)?;
        if let Some(sasl) = kafka.authentication.as_ref().and_then(|a| a.sasl.as_ref()) {
            parts.push(Element::new(
                "sasl",
                Sasl {
                    table: table.clone(),
                    mechanism: if sasl.mechanism.is_empty() {
                        "PLAIN".to_string()
                    } else {
                        sasl.mechanism.clone()
                    },
                    username: sasl
                        .username
                        .as_ref()
                        .map(|k| self.secrets.secret(k))
                        .transpose()?,
                    password: sasl
                        .password
                        .as_ref()
                        .map(|k| self.secrets.secret(k))
                        .transpose()?,
                },
            ));
        }
        parts.extend(self.tuning(&table, Transport::Stream, BTreeMap::new(), None)?);

        Ok(Element::new(
            "kafka",
            KafkaSink {
                common: self.common(parts),
                bootstrap_servers: servers.join(","),
                topic,
            },
        ))
    }

    fn loki(&mut self) -> Result<Element, Error> {
        let loki = self.block(self.output.loki.as_ref())?;
        let tenant_id = match loki.tenant_key.as_deref().filter(|t| !t.is_empty()) {
            Some(tenant) => Some(self.field("loki_tenant", tenant)?),
            None => None,
        };

        let table = self.table();
        let mut parts = self.tls(&table, Transport::Http)?;
        parts.extend(self.http_auth(&table, loki.authentication.as_ref())?);
        parts.extend(self.tuning(&table, Transport::Http, BTreeMap::new(), None)?);

        Ok(Element::new(
            "loki",
            Loki {
                common: self.common(parts),
                endpoint: loki.url.trim_end_matches('/').to_string(),
                tenant_id,
                labels: sinks::loki_labels(&loki.label_keys)
                    .into_iter()
                    .map(|(name, key)| (name, format!("{{{{ {key} }}}}")))
                    .chain(std::iter::once((
                        "kubernetes_host".to_string(),
                        "${VECTOR_SELF_NODE_NAME}".to_string(),
                    )))
                    .collect(),
            },
        ))
    }

    fn syslog(&mut self) -> Result<Element, Error> {
        let syslog = self.block(self.output.syslog.as_ref())?;
        let url = parse_url(&syslog.url)?;
        let mode = match url.scheme() {
            "udp" => "udp",
            _ => "tcp",
        };
        let address = host_port(&url, OutputType::Syslog)?;

        let table = self.table();
        let mut parts = self.tls(&table, Transport::Stream)?;
        parts.extend(self.tuning(&table, Transport::Stream, BTreeMap::new(), None)?);

        Ok(Element::new(
            "syslog",
            Syslog {
                address,
                mode,
                rfc: match syslog.rfc {
                    SyslogRfc::Rfc3164 => "rfc3164",
                    SyslogRfc::Rfc5424 => "rfc5424",
                },
                facility: self.optional_field("syslog_facility", &syslog.facility)?,
                severity: self.optional_field("syslog_severity", &syslog.severity)?,
                app_name: self.optional_field("syslog_app_name", &syslog.app_name)?,
                msg_id: self.optional_field("syslog_msg_id", &syslog.msg_id)?,
                proc_id: self.optional_field("syslog_proc_id", &syslog.proc_id)?,
                payload_key: (!syslog.payload_key.is_empty()).then(|| syslog.payload_key.clone()),
                common: self.common(parts),
            },
        ))
    }

    fn cloudwatch(&mut self) -> Result<Element, Error> {
        let cw = self.block(self.output.cloudwatch.as_ref())?;
        let group_name = self.field("cw_group_name", &cw.group_name)?;
        self.remap.push(CLOUDWATCH_STREAM.to_string());

        let table = self.table();
        let mut parts = self.tls(&table, Transport::Http)?;
        parts.extend(self.tuning(&table, Transport::Http, BTreeMap::new(), None)?);

        Ok(Element::new(
            "cloudwatch",
            Cloudwatch {
                region: cw.region.clone(),
                group_name,
                stream_name: "{{ _internal.cw_stream_name }}".to_string(),
                endpoint: cw.url.clone().filter(|u| !u.is_empty()),
                auth: self.aws_auth(cw.authentication.as_ref())?,
                common: self.common(parts),
            },
        ))
    }

    fn s3(&mut self) -> Result<Element, Error> {
        let s3 = self.block(self.output.s3.as_ref())?;
        let key_prefix = if s3.key_prefix.is_empty() {
            S3_KEY_PREFIX
        } else {
            s3.key_prefix.as_str()
        };
        let key_prefix = self.field("s3_key_prefix", key_prefix)?;

        let table = self.table();
        let mut parts = self.tls(&table, Transport::Http)?;
        parts.extend(self.tuning(&table, Transport::Http, BTreeMap::new(), None)?);

        Ok(Element::new(
            "s3",
            S3 {
                region: s3.region.clone(),
                bucket: s3.bucket.clone(),
                key_prefix,
                endpoint: s3.url.clone().filter(|u| !u.is_empty()),
                auth: self.aws_auth(s3.authentication.as_ref())?,
                common: self.common(parts),
            },
        ))
    }

    fn splunk(&mut self) -> Result<Element, Error> {
        let splunk = self.block(self.output.splunk.as_ref())?;
        let auth = splunk.authentication.as_ref().ok_or_else(|| {
            Error::Generator(format!("output {:?} has no token", self.output.name))
        })?;
        let token = self.secrets.secret(&auth.token)?;
        let index = self.optional_field("splunk_index", &splunk.index)?;

        let table = self.table();
        let mut parts = self.tls(&table, Transport::Http)?;
        parts.extend(self.tuning(&table, Transport::Http, BTreeMap::new(), None)?);

        Ok(Element::new(
            "splunk",
            Splunk {
                common: self.common(parts),
                endpoint: splunk.url.clone(),
                token,
                index,
            },
        ))
    }

    fn azure_monitor(&mut self) -> Result<Element, Error> {
        let azure = self.block(self.output.azure_monitor.as_ref())?;
        let shared_key = azure
            .authentication
            .as_ref()
            .and_then(|a| a.shared_key.as_ref())
            .ok_or_else(|| {
                Error::Generator(format!("output {:?} has no sharedKey", self.output.name))
            })?;
        let shared_key = self.secrets.secret(shared_key)?;

        let table = self.table();
        let mut parts = self.tls(&table, Transport::Http)?;
        parts.extend(self.tuning(&table, Transport::Http, BTreeMap::new(), None)?);

        Ok(Element::new(
            "azure_monitor",
            AzureMonitor {
                common: self.common(parts),
                customer_id: azure.customer_id.clone(),
                shared_key,
                log_type: azure.log_type.clone(),
                azure_resource_id: azure.azure_resource_id.clone(),
                host: azure.host.clone(),
            },
        ))
    }

    fn google_cloud_logging(&mut self) -> Result<Element, Error> {
        let gcl = self.block(self.output.google_cloud_logging.as_ref())?;
        let log_id = self.field("gcl_log_id", &gcl.log_id)?;
        let credentials_path = gcl
            .authentication
            .as_ref()
            .and_then(|a| a.credentials.as_ref())
            .map(|k| self.secrets.secret_path(k))
            .transpose()?;

        let table = self.table();
        let mut parts = self.tls(&table, Transport::Http)?;
        parts.extend(self.tuning(&table, Transport::Http, BTreeMap::new(), None)?);

        Ok(Element::new(
            "google_cloud_logging",
            GoogleCloudLogging {
                common: self.common(parts),
                id_key: match gcl.id.type_ {
                    GoogleCloudLoggingIdType::BillingAccount => "billing_account_id",
                    GoogleCloudLoggingIdType::Folder => "folder_id",
                    GoogleCloudLoggingIdType::Project => "project_id",
                    GoogleCloudLoggingIdType::Organization => "organization_id",
                },
                id_value: gcl.id.value.clone(),
                log_id,
                credentials_path,
            },
        ))
    }

    fn otlp(&mut self) -> Result<Element, Error> {
        let otlp = self.block(self.output.otlp.as_ref())?;
        let table = format!("{}.protocol", self.table());
        let mut parts = self.tls(&table, Transport::Http)?;
        parts.extend(self.http_auth(&table, otlp.authentication.as_ref())?);
        parts.extend(self.tuning(&table, Transport::Http, BTreeMap::new(), None)?);
        Ok(Element::new(
            "otlp",
            Otlp {
                common: self.common(parts),
                uri: otlp.url.clone(),
            },
        ))
    }

    fn block<T>(&self, block: Option<&'a T>) -> Result<&'a T, Error> {
        block.ok_or_else(|| {
            Error::Generator(format!(
                "output {:?} has no {} configuration",
                self.output.name, self.output.type_
            ))
        })
    }

    fn table(&self) -> String {
        format!("sinks.{}", self.id)
    }

    fn common(&self, parts: Vec<Element>) -> Common {
        Common {
            id: self.id.clone(),
            inputs: vec![format!("{}_remap", self.id)],
            compression: self.output.tuning().and_then(|t| t.compression.clone()),
            parts,
        }
    }

    /// A sink setting that may be templated on record fields. Templates are evaluated into
    /// `._internal.<name>` ahead of the sink and referenced from there.
    fn field(&mut self, name: &str, value: &str) -> Result<String, Error> {
        if !vrl::is_template(value) {
            return Ok(value.to_string());
        }
        self.remap
            .push(format!("._internal.{name} = {}", vrl::template(value)?));
        Ok(format!("{{{{ _internal.{name} }}}}"))
    }

    fn optional_field(&mut self, name: &str, value: &str) -> Result<Option<String>, Error> {
        if value.is_empty() {
            return Ok(None);
        }
        self.field(name, value).map(Some)
    }

    fn tls(&self, table: &str, transport: Transport) -> Result<Vec<Element>, Error> {
        if !sinks::needs_tls(self.output) {
            return Ok(Vec::new());
        }
        let tls = Tls::new(table, &self.profile)
            .insecure(self.output.insecure_skip_verify())
            .with_spec(self.output.tls_spec(), self.secrets)?;
        let tls = match transport {
            Transport::Stream => tls.enabled(),
            Transport::Http => tls,
        };
        Ok(vec![tls.element()])
    }

    fn http_auth(
        &self,
        table: &str,
        auth: Option<&HttpAuthentication>,
    ) -> Result<Option<Element>, Error> {
        let Some(auth) = auth else {
            return Ok(None);
        };
        let auth = match (&auth.username, &auth.password, &auth.token) {
            (Some(user), Some(password), _) => HttpAuth {
                table: table.to_string(),
                strategy: "basic",
                user: Some(self.secrets.secret(user)?),
                password: Some(self.secrets.secret(password)?),
                token: None,
            },
            (_, _, Some(token)) => HttpAuth {
                table: table.to_string(),
                strategy: "bearer",
                user: None,
                password: None,
                token: Some(self.secrets.bearer_token(token)?),
            },
            _ => return Ok(None),
        };
        Ok(Some(Element::new("http_auth", auth)))
    }

    fn aws_auth(&self, auth: Option<&AwsAuthentication>) -> Result<Option<Element>, Error> {
        let Some(auth) = auth else {
            return Ok(None);
        };
        let auth = match auth.type_ {
            AwsAuthType::AwsAccessKey => {
                let keys = auth.aws_access_key.as_ref().ok_or_else(|| {
                    Error::Generator(format!("output {:?} has no awsAccessKey", self.output.name))
                })?;
                AwsAuth {
                    credentials_file: None,
                    profile: None,
                    access_key_id: Some(self.secrets.secret(&keys.key_id)?),
                    secret_access_key: Some(self.secrets.secret(&keys.key_secret)?),
                }
            }
            AwsAuthType::IamRole => AwsAuth {
                credentials_file: Some(paths::aws_credentials_file()),
                profile: Some(aws::profile(&self.output.name)),
                access_key_id: None,
                secret_access_key: None,
            },
        };
        Ok(Some(Element::new("aws_auth", auth)))
    }

    /// Buffering, batching, and retry settings derived from the output's tuning.
    fn tuning(
        &self,
        table: &str,
        transport: Transport,
        headers: BTreeMap<String, String>,
        timeout_secs: Option<i32>,
    ) -> Result<Vec<Element>, Error> {
        let mut parts = Vec::new();
        let tuning = self.output.tuning();

        if let Some(delivery) = tuning.and_then(|t| t.delivery) {
            parts.push(Element::new(
                "buffer",
                Buffer {
                    table: table.to_string(),
                    disk: delivery == DeliveryMode::AtLeastOnce,
                },
            ));
            if delivery == DeliveryMode::AtLeastOnce {
                parts.push(Element::new(
                    "acknowledgements",
                    Table {
                        table: table.to_string(),
                    },
                ));
            }
        }

        if transport == Transport::Stream {
            return Ok(parts);
        }

        if let Some(max) = tuning.and_then(|t| t.max_write.as_ref()) {
            parts.push(Element::new(
                "batch",
                Batch {
                    table: table.to_string(),
                    max_bytes: quantity_bytes(&max.0)?,
                },
            ));
        }

        let request = Request {
            table: table.to_string(),
            retry_initial_backoff_secs: tuning
                .and_then(|t| t.min_retry_duration.as_ref())
                .map(|d| d.as_secs()),
            retry_max_duration_secs: tuning
                .and_then(|t| t.max_retry_duration.as_ref())
                .map(|d| d.as_secs()),
            timeout_secs,
            headers,
        };
        if request.retry_initial_backoff_secs.is_some()
            || request.retry_max_duration_secs.is_some()
            || request.timeout_secs.is_some()
            || !request.headers.is_empty()
        {
            parts.push(Element::new("request", request));
        }
        Ok(parts)
    }
}
