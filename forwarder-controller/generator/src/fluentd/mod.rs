//! Fluentd configuration for the legacy collector.
//!
//! Records are tagged by the source that read them and routed through labels:
//!
//! ```text
//! sources -> @CONCAT -> @INGRESS -> @_<LOG TYPE> -> @INPUT_<i> -> @PIPELINE_<p> -> @OUTPUT_<o>
//! ```
//!
//! Fluentd supports a subset of what Vector does. Receiver inputs, filters, rate limits,
//! templated output fields, and the azureMonitor, googleCloudLogging, otlp, and s3 outputs fail
//! generation.

mod templates;

use crate::{
    component_id,
    secrets::Secrets,
    sinks::{self, host, kafka_endpoint, parse_url, port, quantity_bytes},
    vrl, Element, Engine, Error, Forwarder,
};
use logging_forwarder_controller_core::{
    inputs::{self, INFRA_NAMESPACE_GLOBS},
    paths, Options, ResolvedRefs, TlsProfile,
};
use logging_forwarder_controller_k8s_api::{
    observability::{
        input::{AuditSource, InfrastructureSource},
        output::{AwsAuthType, AwsAuthentication, DeliveryMode, HttpAuthentication, SyslogRfc},
        InputSpec, InputType, OutputSpec, OutputType, SecretKey, TlsSpec,
    },
    ClusterLogForwarderSpec,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// The script the collector container runs.
pub const RUN_SCRIPT: &str = include_str!("../../assets/run.sh");

/// Checks that the journal position file is valid JSON before the collector starts.
pub const CLEAN_INVALID_JSON: &str = include_str!("../../assets/cleanInValidJson.rb");

const CONTAINER_TAG: &str = "kubernetes.*";
const POD_TAG_PREFIX: &str = "kubernetes.var.log.pods";
const JOURNAL_TAG: &str = "journal";

const CONTAINER_PARSE: &str = r#"<parse>
  @type regexp
  expression /^(?<time>[^\s]+) (?<stream>stdout|stderr) (?<logtag>[F|P]) (?<message>.*)$/
  time_key 'time'
  time_format '%Y-%m-%dT%H:%M:%S.%N%:z'
  keep_time_key true
</parse>"#;

const JSON_PARSE: &str = r#"<parse>
  @type json
  time_key requestReceivedTimestamp
  keep_time_key true
  time_format %Y-%m-%dT%H:%M:%S.%N%z
</parse>"#;

const AUDITD_PARSE: &str = r#"<parse>
  @type viaq_host_audit
</parse>"#;

const NONE_PARSE: &str = r#"<parse>
  @type none
</parse>"#;

const ES_WRITE_INDEX: &str = "${record['log_type'] == 'infrastructure' ? 'infra-write' : record['log_type'] == 'audit' ? 'audit-write' : 'app-write'}";

const CLOUDWATCH_STREAM: &str = "${record['log_type'] == 'application' ? [record.dig('kubernetes', 'namespace_name'), record.dig('kubernetes', 'pod_name'), record.dig('kubernetes', 'container_name')].join('_') : [record['hostname'], tag].join('.')}";

#[derive(Serialize)]
struct System {
    log_level: String,
}

#[derive(Serialize)]
struct Metrics {
    crt_file: String,
    key_file: String,
    min_version: &'static str,
}

#[derive(Serialize)]
struct Tail {
    id: String,
    path: String,
    excludes: Vec<String>,
    pos_file: String,
    tag: &'static str,
    label: &'static str,
    parse: &'static str,
}

#[derive(Serialize)]
struct Journal {
    pos_file: String,
}

/// Routes records by tag to other labels.
#[derive(Serialize)]
struct Label {
    label: String,
    parts: Vec<Element>,
    matches: Vec<Route>,
}

/// Tags matching `pattern` go to every label in `labels`, or are discarded when there are none.
#[derive(Serialize)]
struct Route {
    pattern: String,
    labels: Vec<String>,
}

#[derive(Serialize)]
struct Empty {}

#[derive(Serialize)]
struct Record {
    pattern: &'static str,
    records: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct Grep {
    pattern: &'static str,
    regexps: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct Output {
    label: String,
    id: String,
    plugin: &'static str,
    parts: Vec<Element>,
    settings: Vec<(String, String)>,
    sections: Vec<Element>,
}

#[derive(Serialize)]
struct Section {
    name: &'static str,
    settings: Vec<(String, String)>,
}

pub(crate) fn generate(
    forwarder: &Forwarder<'_>,
    refs: &ResolvedRefs,
    profile: &TlsProfile,
    options: &Options,
) -> Result<String, Error> {
    let spec = forwarder.spec;
    let secrets = Secrets::new(refs, forwarder.names);
    let inputs = inputs::referenced(spec);

    let mut elements = vec![
        Element::new(
            "system",
            System {
                log_level: options.log_level.clone(),
            },
        ),
        Element::new(
            "metrics",
            Metrics {
                crt_file: format!("{}/tls.crt", paths::METRICS_CERT_DIR),
                key_file: format!("{}/tls.key", paths::METRICS_CERT_DIR),
                min_version: ssl_version(profile),
            },
        ),
    ];
    elements.extend(sources(forwarder, &inputs)?);
    elements.push(Element::new(
        "label",
        Label {
            label: "@CONCAT".to_string(),
            parts: vec![Element::new("concat", Empty {})],
            matches: vec![Route::to("kubernetes.**", vec!["@INGRESS".to_string()])],
        },
    ));
    elements.push(ingress(&inputs));
    elements.extend(log_types(&inputs));
    for input in &inputs {
        elements.push(input_label(spec, input)?);
    }
    for pipeline in &spec.pipelines {
        if !pipeline.filter_refs.is_empty() {
            return Err(unsupported(format!(
                "filters (pipeline {:?})",
                pipeline.name
            )));
        }
        let outputs = pipeline
            .output_refs
            .iter()
            .filter(|o| spec.output(o).is_some())
            .map(|o| label("OUTPUT", o))
            .collect();
        elements.push(Element::new(
            "label",
            Label {
                label: label("PIPELINE", &pipeline.name),
                parts: Vec::new(),
                matches: vec![Route::to("**", outputs)],
            },
        ));
    }
    for output in &spec.outputs {
        if !spec.pipelines.iter().any(|p| p.output_refs.contains(&output.name)) {
            continue;
        }
        let profile = profile.with_override(
            output
                .tls
                .as_ref()
                .and_then(|t| t.security_profile.as_ref()),
        );
        let builder = OutputBuilder {
            output,
            secrets: &secrets,
            profile: &profile,
        };
        elements.push(builder.build(options)?);
    }

    Engine::new(templates::source).compose(&elements)
}

/// The tail and journal sources for every log type the inputs collect.
fn sources(forwarder: &Forwarder<'_>, inputs: &[InputSpec]) -> Result<Vec<Element>, Error> {
    let mut containers = false;
    let mut journal = false;
    let mut audit = Vec::new();
    for input in inputs {
        match input.type_ {
            InputType::Application => {
                if input
                    .application
                    .as_ref()
                    .and_then(|a| a.tuning.as_ref())
                    .and_then(|t| t.rate_limit_per_container)
                    .is_some()
                {
                    return Err(unsupported(format!("rate limits (input {:?})", input.name)));
                }
                containers = true;
            }
            InputType::Infrastructure => {
                let sources = inputs::infrastructure_sources(input);
                containers |= sources.contains(&InfrastructureSource::Container);
                journal |= sources.contains(&InfrastructureSource::Node);
            }
            InputType::Audit => audit.extend(inputs::audit_sources(input)),
            InputType::Receiver => {
                return Err(unsupported(format!("receiver input {:?}", input.name)))
            }
        }
    }
    audit.sort();
    audit.dedup();

    let pos = |file: &str| format!("{}/pos/{file}", paths::FLUENTD_DATA_DIR);
    let mut elements = Vec::new();
    if containers {
        elements.push(Element::new(
            "tail",
            Tail {
                id: "container-input".to_string(),
                path: "/var/log/pods/*/*/*.log".to_string(),
                excludes: vec![
                    format!(
                        "/var/log/pods/{}_{}-*/*/*.log",
                        forwarder.namespace, forwarder.names.common
                    ),
                    "/var/log/pods/*/*/*.gz".to_string(),
                    "/var/log/pods/*/*/*.tmp".to_string(),
                ],
                pos_file: pos("es-containers.log.pos"),
                tag: CONTAINER_TAG,
                label: "@CONCAT",
                parse: CONTAINER_PARSE,
            },
        ));
    }
    if journal {
        elements.push(Element::new(
            "journal",
            Journal {
                pos_file: pos("journal_pos.json"),
            },
        ));
    }
    for source in audit {
        let (id, path, pos_file, parse) = match source {
            AuditSource::Auditd => (
                "audit-input",
                "/var/log/audit/audit.log",
                "audit.log.pos",
                AUDITD_PARSE,
            ),
            AuditSource::KubeApi => (
                "k8s-audit-input",
                "/var/log/kube-apiserver/audit.log",
                "kube-apiserver.audit.log.pos",
                JSON_PARSE,
            ),
            AuditSource::OpenshiftApi => (
                "openshift-audit-input",
                "/var/log/oauth-apiserver/audit.log,/var/log/openshift-apiserver/audit.log",
                "oauth-apiserver.audit.log",
                JSON_PARSE,
            ),
            AuditSource::Ovn => (
                "ovn-audit-input",
                "/var/log/ovn/acl-audit-log.log",
                "ovn-audit.log.pos",
                NONE_PARSE,
            ),
        };
        elements.push(Element::new(
            "tail",
            Tail {
                id: id.to_string(),
                path: path.to_string(),
                excludes: Vec::new(),
                pos_file: pos(pos_file),
                tag: audit_tag(source),
                label: "@INGRESS",
                parse,
            },
        ));
    }
    Ok(elements)
}

fn audit_tag(source: AuditSource) -> &'static str {
    match source {
        AuditSource::Auditd => "linux-audit.log",
        AuditSource::KubeApi => "k8s-audit.log",
        AuditSource::OpenshiftApi => "openshift-audit.log",
        AuditSource::Ovn => "ovn-audit.log",
    }
}

/// Tags of container records from infrastructure namespaces.
fn infra_container_tags() -> String {
    INFRA_NAMESPACE_GLOBS
        .iter()
        .map(|ns| format!("{POD_TAG_PREFIX}.{ns}_**"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sends each record to the label of its log type.
fn ingress(inputs: &[InputSpec]) -> Element {
    let has = |t: InputType| inputs.iter().any(|i| i.type_ == t);
    let type_label = |t: InputType| {
        if has(t) {
            vec![log_type_label(t)]
        } else {
            Vec::new()
        }
    };

    let infra_containers = inputs.iter().any(|i| {
        i.type_ == InputType::Infrastructure
            && inputs::infrastructure_sources(i).contains(&InfrastructureSource::Container)
    });
    let mut infra_routes = Vec::new();
    if infra_containers {
        infra_routes.push(log_type_label(InputType::Infrastructure));
    }
    if inputs.iter().any(includes_infra_namespaces) {
        infra_routes.push(log_type_label(InputType::Application));
    }

    let audit_tags = [
        AuditSource::Auditd,
        AuditSource::KubeApi,
        AuditSource::OpenshiftApi,
        AuditSource::Ovn,
    ]
    .map(audit_tag)
    .join(" ");

    Element::new(
        "label",
        Label {
            label: "@INGRESS".to_string(),
            parts: vec![Element::new("kubernetes_metadata", Empty {})],
            matches: vec![
                Route::to(infra_container_tags(), infra_routes),
                Route::to("kubernetes.**", type_label(InputType::Application)),
                Route::to(JOURNAL_TAG, type_label(InputType::Infrastructure)),
                Route::to(audit_tags, type_label(InputType::Audit)),
                Route::to("**", Vec::new()),
            ],
        },
    )
}

/// One label per log type, copying its records to each input of that type.
fn log_types(inputs: &[InputSpec]) -> Vec<Element> {
    [InputType::Application, InputType::Infrastructure, InputType::Audit]
        .into_iter()
        .filter_map(|t| {
            let labels = inputs
                .iter()
                .filter(|i| i.type_ == t)
                .map(|i| label("INPUT", &i.name))
                .collect::<Vec<_>>();
            if labels.is_empty() {
                return None;
            }
            Some(Element::new(
                "label",
                Label {
                    label: log_type_label(t),
                    parts: vec![Element::new(
                        "record",
                        Record {
                            pattern: "**",
                            records: BTreeMap::from([(
                                "log_type".to_string(),
                                t.as_str().to_string(),
                            )]),
                        },
                    )],
                    matches: vec![Route::to("**", labels)],
                },
            ))
        })
        .collect()
}

/// Selects an input's records and copies them to the pipelines that reference it.
fn input_label(spec: &ClusterLogForwarderSpec, input: &InputSpec) -> Result<Element, Error> {
    let pipelines = spec
        .pipelines
        .iter()
        .filter(|p| p.input_refs.contains(&input.name))
        .map(|p| label("PIPELINE", &p.name))
        .collect::<Vec<_>>();

    let mut parts = Vec::new();
    let mut matches = Vec::new();
    match input.type_ {
        InputType::Application => {
            let app = input.application.clone().unwrap_or_default();
            if let Some(selector) = app.selector.as_ref() {
                if selector.match_expressions.iter().flatten().next().is_some() {
                    return Err(unsupported(format!(
                        "label selector expressions (input {:?})",
                        input.name
                    )));
                }
                let regexps = selector
                    .match_labels
                    .iter()
                    .flatten()
                    .map(|(k, v)| {
                        (
                            format!("$.kubernetes.labels.{k}"),
                            format!("/^{}$/", regex_escape(v)),
                        )
                    })
                    .collect::<BTreeMap<_, _>>();
                if !regexps.is_empty() {
                    parts.push(Element::new(
                        "grep",
                        Grep {
                            pattern: "**",
                            regexps,
                        },
                    ));
                }
            }
            for exclude in &app.excludes {
                matches.push(Route::to(pod_tag(&exclude.namespace, &exclude.container), Vec::new()));
            }
            if !includes_infra_namespaces(input) {
                matches.push(Route::to(infra_container_tags(), Vec::new()));
            }
            if app.includes.is_empty() {
                matches.push(Route::to("**", pipelines));
            } else {
                let tags = app
                    .includes
                    .iter()
                    .map(|i| pod_tag(&i.namespace, &i.container))
                    .collect::<Vec<_>>()
                    .join(" ");
                matches.push(Route::to(tags, pipelines));
            }
        }
        InputType::Infrastructure => {
            let sources = inputs::infrastructure_sources(input);
            if sources.contains(&InfrastructureSource::Container) {
                matches.push(Route::to("kubernetes.**", pipelines.clone()));
            }
            if sources.contains(&InfrastructureSource::Node) {
                matches.push(Route::to(JOURNAL_TAG, pipelines));
            }
        }
        InputType::Audit => {
            let tags = inputs::audit_sources(input)
                .into_iter()
                .map(audit_tag)
                .collect::<Vec<_>>()
                .join(" ");
            matches.push(Route::to(tags, pipelines));
        }
        InputType::Receiver => {
            return Err(unsupported(format!("receiver input {:?}", input.name)));
        }
    }
    matches.push(Route::to("**", Vec::new()));

    Ok(Element::new(
        "label",
        Label {
            label: label("INPUT", &input.name),
            parts,
            matches,
        },
    ))
}

fn includes_infra_namespaces(input: &InputSpec) -> bool {
    input.type_ == InputType::Application
        && input
            .application
            .iter()
            .flat_map(|a| a.includes.iter())
            .any(|i| inputs::is_infra_namespace(&i.namespace))
}

/// Tags of container records from a namespace and container, either of which may be a glob.
fn pod_tag(namespace: &str, container: &str) -> String {
    let namespace = if namespace.is_empty() { "*" } else { namespace };
    if container.is_empty() {
        format!("{POD_TAG_PREFIX}.{namespace}_**")
    } else {
        format!("{POD_TAG_PREFIX}.{namespace}_*.{container}.**")
    }
}

fn log_type_label(t: InputType) -> String {
    format!("@_{}", t.as_str().to_uppercase())
}

/// A label name, e.g. `@PIPELINE_APP_LOGS` for pipeline `app-logs`.
fn label(kind: &str, name: &str) -> String {
    format!("@{kind}_{}", component_id(name).to_uppercase())
}

fn unsupported(what: String) -> Error {
    Error::Generator(format!("{what} not supported by the fluentd collector"))
}

// === impl Route ===

impl Route {
    fn to(pattern: impl ToString, labels: Vec<String>) -> Self {
        Self {
            pattern: pattern.to_string(),
            labels,
        }
    }
}

struct OutputBuilder<'a> {
    output: &'a OutputSpec,
    secrets: &'a Secrets<'a>,
    profile: &'a TlsProfile,
}

/// Plugin settings in the order they are written.
#[derive(Default)]
struct Settings(Vec<(String, String)>);

// === impl OutputBuilder ===

impl<'a> OutputBuilder<'a> {
    fn build(&self, options: &Options) -> Result<Element, Error> {
        let output = self.output;
        if output.rate_limit.is_some() {
            return Err(unsupported(format!("rate limits (output {:?})", output.name)));
        }

        let id = format!("output_{}", component_id(&output.name));
        let mut parts = Vec::new();
        let mut settings = Settings::default();
        let mut sections = Vec::new();

        let plugin = if options.debug_output {
            "stdout"
        } else {
            match output.type_ {
                OutputType::Elasticsearch => {
                    self.elasticsearch(&mut parts, &mut settings)?;
                    "elasticsearch"
                }
                OutputType::Http => {
                    self.http(&mut settings, &mut sections)?;
                    "http"
                }
                OutputType::Kafka => {
                    self.kafka(&mut settings, &mut sections)?;
                    "kafka2"
                }
                OutputType::Loki => {
                    self.loki(&mut settings, &mut sections)?;
                    "loki"
                }
                OutputType::Splunk => {
                    self.splunk(&mut settings, &mut sections)?;
                    "splunk_hec"
                }
                OutputType::Syslog => {
                    self.syslog(&mut settings, &mut sections)?;
                    "remote_syslog"
                }
                OutputType::Cloudwatch => {
                    self.cloudwatch(&mut parts, &mut settings, &mut sections)?;
                    "cloudwatch_logs"
                }
                OutputType::AzureMonitor
                | OutputType::GoogleCloudLogging
                | OutputType::LokiStack
                | OutputType::Otlp
                | OutputType::S3 => {
                    return Err(unsupported(format!(
                        "{} output {:?}",
                        output.type_, output.name
                    )))
                }
            }
        };
        if !options.debug_output {
            sections.push(self.buffer(&id)?);
        }

        Ok(Element::new(
            "output",
            Output {
                label: label("OUTPUT", &output.name),
                id,
                plugin,
                parts,
                settings: settings.0,
                sections,
            },
        ))
    }

    fn elasticsearch(&self, parts: &mut Vec<Element>, settings: &mut Settings) -> Result<(), Error> {
        let es = self.block(self.output.elasticsearch.as_ref())?;
        let url = parse_url(&es.url)?;
        settings.set("host", host(&url)?);
        settings.set("port", port(&url, OutputType::Elasticsearch));
        settings.set("scheme", url.scheme());
        if url.scheme() == "https" {
            settings.set("ssl_version", ssl_version(self.profile));
            self.tls(settings, "client_key", "client_cert", "ca_file")?;
            if self.output.insecure_skip_verify() {
                settings.set("ssl_verify", "false");
            }
        }

        let bearer = self.http_auth(settings, es.authentication.as_ref(), "user", "password")?;
        if let Some(header) = headers(&BTreeMap::new(), bearer.as_deref()) {
            settings.set("custom_headers", header);
        }

        if es.index.is_empty() {
            parts.push(Element::new(
                "record",
                Record {
                    pattern: "**",
                    records: BTreeMap::from([(
                        "viaq_index_name".to_string(),
                        ES_WRITE_INDEX.to_string(),
                    )]),
                },
            ));
            settings.set("target_index_key", "viaq_index_name");
            settings.set("remove_keys", "viaq_index_name");
        } else {
            settings.set("index_name", self.literal("index", &es.index)?);
        }
        if es.version > 0 {
            settings.set("default_elasticsearch_version", es.version);
        }
        if es.version < 8 {
            settings.set("type_name", "_doc");
        }
        settings.set("verify_es_version_at_startup", "false");
        settings.set("write_operation", "create");
        settings.set("reload_connections", "'true'");
        settings.set("reload_after", "'200'");
        settings.set("reload_on_failure", "false");
        settings.set("sniffer_class_name", "'Fluent::Plugin::ElasticsearchSimpleSniffer'");
        settings.set("request_timeout", "2147483648");
        Ok(())
    }

    fn http(&self, settings: &mut Settings, sections: &mut Vec<Element>) -> Result<(), Error> {
        let http = self.block(self.output.http.as_ref())?;
        settings.set("endpoint", &http.url);
        settings.set(
            "http_method",
            http.method
                .as_deref()
                .filter(|m| !m.is_empty())
                .unwrap_or("post")
                .to_ascii_lowercase(),
        );
        settings.set("content_type", "application/json");
        if sinks::is_secure(&http.url) {
            settings.set("tls_version", ssl_version(self.profile));
            self.tls(settings, "tls_private_key_path", "tls_client_cert_path", "tls_ca_cert_path")?;
            if self.output.insecure_skip_verify() {
                settings.set("tls_verify_mode", "none");
            }
        }
        if let Some(timeout) = http.timeout {
            settings.set("open_timeout", timeout);
            settings.set("read_timeout", timeout);
        }

        let mut auth = Settings::default();
        let bearer = self.http_auth(&mut auth, http.authentication.as_ref(), "username", "password")?;
        if let Some(header) = headers(&http.headers, bearer.as_deref()) {
            settings.set("headers", header);
        }
        if !auth.0.is_empty() {
            auth.0.insert(0, ("method".to_string(), "basic".to_string()));
            sections.push(section("auth", auth));
        }
        sections.push(json_format());
        Ok(())
    }

    fn kafka(&self, settings: &mut Settings, sections: &mut Vec<Element>) -> Result<(), Error> {
        let kafka = self.block(self.output.kafka.as_ref())?;
        let (brokers, topic) = kafka_endpoint(kafka)?;
        settings.set("brokers", brokers.join(","));
        settings.set("default_topic", self.literal("topic", &topic)?);
        settings.set("use_event_time", "true");

        let secure = sinks::needs_tls(self.output);
        if secure {
            self.tls(settings, "ssl_client_cert_key", "ssl_client_cert", "ssl_ca_cert")?;
            if self.output.insecure_skip_verify() {
                settings.set("ssl_verify_hostname", "false");
            }
        }
        if let Some(sasl) = kafka.authentication.as_ref().and_then(|a| a.sasl.as_ref()) {
            settings.set("sasl_over_ssl", secure);
            if let Some(username) = sasl.username.as_ref() {
                settings.set("username", self.secret(username)?);
            }
            if let Some(password) = sasl.password.as_ref() {
                settings.set("password", self.secret(password)?);
            }
            match sasl.mechanism.to_ascii_uppercase().as_str() {
                "SCRAM-SHA-256" => settings.set("scram_mechanism", "sha256"),
                "SCRAM-SHA-512" => settings.set("scram_mechanism", "sha512"),
                _ => {}
            }
        }
        sections.push(json_format());
        Ok(())
    }

    fn loki(&self, settings: &mut Settings, sections: &mut Vec<Element>) -> Result<(), Error> {
        let loki = self.block(self.output.loki.as_ref())?;
        settings.set("url", loki.url.trim_end_matches('/'));
        if let Some(tenant) = loki.tenant_key.as_deref().filter(|t| !t.is_empty()) {
            settings.set("tenant", self.literal("tenantKey", tenant)?);
        }
        if sinks::is_secure(&loki.url) {
            self.tls(settings, "key", "cert", "ca_cert")?;
            if self.output.insecure_skip_verify() {
                settings.set("insecure_tls", "true");
            }
        }
        if let Some(token) = self.http_auth(settings, loki.authentication.as_ref(), "username", "password")? {
            settings.set("bearer_token_file", token);
        }
        settings.set("line_format", "json");

        let mut labels = Settings::default();
        for (name, key) in sinks::loki_labels(&loki.label_keys) {
            labels.set(name, format!("$.{key}"));
        }
        sections.push(section("label", labels));
        Ok(())
    }

    fn splunk(&self, settings: &mut Settings, sections: &mut Vec<Element>) -> Result<(), Error> {
        let splunk = self.block(self.output.splunk.as_ref())?;
        let url = parse_url(&splunk.url)?;
        settings.set("protocol", url.scheme());
        settings.set("hec_host", host(&url)?);
        settings.set("hec_port", port(&url, OutputType::Splunk));
        let auth = splunk.authentication.as_ref().ok_or_else(|| {
            Error::Generator(format!("output {:?} has no token", self.output.name))
        })?;
        settings.set("hec_token", self.secret(&auth.token)?);
        if !splunk.index.is_empty() {
            settings.set("index", self.literal("index", &splunk.index)?);
        }
        if url.scheme() == "https" {
            self.tls(settings, "client_key", "client_cert", "ca_file")?;
            if self.output.insecure_skip_verify() {
                settings.set("insecure_ssl", "true");
            }
        }
        sections.push(json_format());
        Ok(())
    }

    fn syslog(&self, settings: &mut Settings, sections: &mut Vec<Element>) -> Result<(), Error> {
        let syslog = self.block(self.output.syslog.as_ref())?;
        let url = parse_url(&syslog.url)?;
        settings.set("host", host(&url)?);
        settings.set("port", port(&url, OutputType::Syslog));
        settings.set(
            "protocol",
            match url.scheme() {
                "udp" => "udp",
                _ => "tcp",
            },
        );
        settings.set(
            "rfc",
            match syslog.rfc {
                SyslogRfc::Rfc3164 => "rfc3164",
                SyslogRfc::Rfc5424 => "rfc5424",
            },
        );
        for (key, value) in [
            ("facility", &syslog.facility),
            ("severity", &syslog.severity),
            ("program", &syslog.app_name),
            ("procid", &syslog.proc_id),
            ("msgid", &syslog.msg_id),
        ] {
            if !value.is_empty() {
                settings.set(key, self.literal(key, value)?);
            }
        }
        if url.scheme() == "tls" {
            settings.set("tls", "true");
            self.tls(settings, "client_cert_key", "client_cert", "ca_file")?;
            if self.output.insecure_skip_verify() {
                settings.set("verify_mode", "0");
            }
        }

        let mut format = Settings::default();
        if syslog.payload_key.is_empty() {
            format.set("@type", "json");
        } else {
            format.set("@type", "single_value");
            format.set("message_key", syslog.payload_key.trim_start_matches('.'));
        }
        sections.push(section("format", format));
        Ok(())
    }

    fn cloudwatch(
        &self,
        parts: &mut Vec<Element>,
        settings: &mut Settings,
        sections: &mut Vec<Element>,
    ) -> Result<(), Error> {
        let cw = self.block(self.output.cloudwatch.as_ref())?;
        parts.push(Element::new(
            "record",
            Record {
                pattern: "**",
                records: BTreeMap::from([(
                    "cw_stream_name".to_string(),
                    CLOUDWATCH_STREAM.to_string(),
                )]),
            },
        ));
        settings.set("auto_create_stream", "true");
        settings.set("region", &cw.region);
        settings.set("log_group_name", self.literal("groupName", &cw.group_name)?);
        settings.set("log_stream_name_key", "cw_stream_name");
        settings.set("remove_log_stream_name_key", "true");
        settings.set("concurrency", 2);
        if let Some(endpoint) = cw.url.as_deref().filter(|u| !u.is_empty()) {
            settings.set("endpoint", endpoint);
        }
        if self.output.insecure_skip_verify() {
            settings.set("ssl_verify_peer", "false");
        }
        if let Some(auth) = cw.authentication.as_ref() {
            self.aws_auth(auth, settings, sections)?;
        }
        Ok(())
    }

    fn aws_auth(
        &self,
        auth: &AwsAuthentication,
        settings: &mut Settings,
        sections: &mut Vec<Element>,
    ) -> Result<(), Error> {
        match auth.type_ {
            AwsAuthType::AwsAccessKey => {
                let keys = auth.aws_access_key.as_ref().ok_or_else(|| {
                    Error::Generator(format!("output {:?} has no awsAccessKey", self.output.name))
                })?;
                settings.set("aws_key_id", self.secret(&keys.key_id)?);
                settings.set("aws_sec_key", self.secret(&keys.key_secret)?);
            }
            AwsAuthType::IamRole => {
                let role = auth.iam_role.as_ref().ok_or_else(|| {
                    Error::Generator(format!("output {:?} has no iamRole", self.output.name))
                })?;
                let mut identity = Settings::default();
                identity.set("role_arn", self.secrets.value(&role.role_arn)?);
                identity.set(
                    "web_identity_token_file",
                    self.secrets.web_identity_token_file(&role.token)?,
                );
                identity.set("role_session_name", "cluster-logging");
                sections.push(section("web_identity_credentials", identity));
            }
        }
        Ok(())
    }

    /// Writes basic credentials under the given keys and returns the file holding a bearer
    /// token, if the output authenticates with one.
    fn http_auth(
        &self,
        settings: &mut Settings,
        auth: Option<&HttpAuthentication>,
        user_key: &str,
        password_key: &str,
    ) -> Result<Option<String>, Error> {
        let Some(auth) = auth else {
            return Ok(None);
        };
        if let (Some(user), Some(password)) = (&auth.username, &auth.password) {
            settings.set(user_key, self.secret(user)?);
            settings.set(password_key, self.secret(password)?);
            return Ok(None);
        }
        auth.token
            .as_ref()
            .map(|t| self.secrets.bearer_token_file(t))
            .transpose()
    }

    fn tls(&self, settings: &mut Settings, key: &str, cert: &str, ca: &str) -> Result<(), Error> {
        let Some(TlsSpec {
            ca: ca_key,
            certificate,
            key: key_key,
            key_passphrase,
        }) = self.output.tls_spec()
        else {
            return Ok(());
        };
        if let Some(k) = key_key {
            settings.set(key, quote(&self.secrets.secret_path(k)?));
        }
        if let Some(c) = certificate {
            settings.set(cert, quote(&self.secrets.path(c)?));
        }
        if let Some(c) = ca_key {
            settings.set(ca, quote(&self.secrets.path(c)?));
        }
        if key_passphrase.is_some() {
            return Err(unsupported(format!(
                "TLS key passphrases (output {:?})",
                self.output.name
            )));
        }
        Ok(())
    }

    fn buffer(&self, id: &str) -> Result<Element, Error> {
        let tuning = self.output.tuning();
        let mut buffer = Settings::default();
        buffer.set("@type", "file");
        buffer.set("path", format!("'{}/{id}'", paths::FLUENTD_DATA_DIR));
        buffer.set("flush_mode", "interval");
        buffer.set("flush_interval", "1s");
        buffer.set("flush_thread_count", 2);
        buffer.set("retry_type", "exponential_backoff");
        buffer.set(
            "retry_wait",
            tuning
                .and_then(|t| t.min_retry_duration.as_ref())
                .map_or_else(|| "1s".to_string(), |d| format!("{}s", d.as_secs())),
        );
        buffer.set(
            "retry_max_interval",
            tuning
                .and_then(|t| t.max_retry_duration.as_ref())
                .map_or_else(|| "60s".to_string(), |d| format!("{}s", d.as_secs())),
        );
        buffer.set("retry_timeout", "60m");
        buffer.set("queued_chunks_limit_size", "\"#{ENV['BUFFER_QUEUE_LIMIT'] || '32'}\"");
        buffer.set(
            "total_limit_size",
            "\"#{ENV['TOTAL_LIMIT_SIZE_PER_BUFFER'] || '8589934592'}\"",
        );
        match tuning.and_then(|t| t.max_write.as_ref()) {
            Some(max) => buffer.set("chunk_limit_size", quantity_bytes(&max.0)?),
            None => buffer.set("chunk_limit_size", "\"#{ENV['BUFFER_SIZE_LIMIT'] || '8m'}\""),
        }
        buffer.set(
            "overflow_action",
            match tuning.and_then(|t| t.delivery) {
                Some(DeliveryMode::AtMostOnce) => "drop_oldest_chunk",
                _ => "block",
            },
        );
        Ok(section("buffer", buffer))
    }

    fn block<T>(&self, block: Option<&'a T>) -> Result<&'a T, Error> {
        block.ok_or_else(|| {
            Error::Generator(format!(
                "output {:?} has no {} configuration",
                self.output.name, self.output.type_
            ))
        })
    }

    /// A setting Fluentd cannot evaluate per record.
    fn literal(&self, field: &str, value: &str) -> Result<String, Error> {
        if vrl::is_template(value) {
            return Err(unsupported(format!(
                "templated {field} (output {:?})",
                self.output.name
            )));
        }
        Ok(quote(value))
    }

    /// Reads the secret's mounted file when the configuration loads.
    fn secret(&self, key: &SecretKey) -> Result<String, Error> {
        let path = self.secrets.secret_path(key)?;
        Ok(format!("\"#{{File.read('{path}').chomp}}\""))
    }
}

// === impl Settings ===

impl Settings {
    fn set(&mut self, key: impl ToString, value: impl ToString) {
        self.0.push((key.to_string(), value.to_string()));
    }
}

fn section(name: &'static str, settings: Settings) -> Element {
    Element::new(
        "section",
        Section {
            name,
            settings: settings.0,
        },
    )
}

fn json_format() -> Element {
    let mut format = Settings::default();
    format.set("@type", "json");
    section("format", format)
}

/// A JSON object of request headers, evaluated when the configuration loads so that a bearer
/// token may be read from its file.
fn headers(headers: &BTreeMap<String, String>, token_file: Option<&str>) -> Option<String> {
    let mut entries = headers
        .iter()
        .map(|(k, v)| format!("{}:{}", json_string(k), json_string(v)))
        .collect::<Vec<_>>();
    if let Some(path) = token_file {
        entries.push(format!(
            "\"Authorization\":\"Bearer #{{File.read('{path}').chomp}}\""
        ));
    }
    if entries.is_empty() {
        return None;
    }
    Some(quote(&format!("{{{}}}", entries.join(","))))
}

fn json_string(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

/// A double-quoted Fluentd string.
fn quote(s: &str) -> String {
    json_string(s)
}

/// The version in OpenSSL's spelling, e.g. `VersionTLS12` -> `TLSv1_2`.
fn ssl_version(profile: &TlsProfile) -> &'static str {
    match profile.min_version.as_str() {
        "VersionTLS10" => "TLSv1",
        "VersionTLS11" => "TLSv1_1",
        "VersionTLS13" => "TLSv1_3",
        _ => "TLSv1_2",
    }
}

/// Escapes regex metacharacters in a label value.
fn regex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if "\\.+*?()|[]{}^$/".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
