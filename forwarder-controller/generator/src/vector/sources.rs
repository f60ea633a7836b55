use super::{Remap, Throttle, Tls};
use crate::{component_id, secrets::Secrets, vrl, Element, Error, Forwarder};
use logging_forwarder_controller_core::{
    inputs::{self, INFRA_NAMESPACE_GLOBS},
    paths, TlsProfile,
};
use logging_forwarder_controller_k8s_api::{
    observability::{
        input::{AuditSource, InfrastructureSource, ReceiverSpec},
        InputSpec, InputType, ReceiverType,
    },
    LabelSelector,
};
use serde::Serialize;
use std::{collections::BTreeMap, fmt::Write};

/// Rotated and partially written files are never read.
const ROTATED: [&str; 3] = [
    "/var/log/pods/*/*/*.gz",
    "/var/log/pods/*/*/*.log.*",
    "/var/log/pods/*/*/*.tmp",
];

const JOURNAL: &str = r#".hostname = del(.host)
if exists(.PRIORITY) {
  .level = to_syslog_level(to_int(.PRIORITY) ?? 6) ?? "unknown"
}"#;

const AUDIT_JSON: &str = r#"if is_string(.message) {
  parsed, err = parse_json(.message)
  if err == null && is_object(parsed) {
    . = merge(., object!(parsed))
  }
}"#;

const SPLIT_ITEMS: &str = r#"if exists(.items) && is_array(.items) {
  . = unnest!(.items)
}"#;

const ITEMS: &str = r#"if exists(.items) {
  . = .items
}"#;

/// Source elements and, per input name, the ids of the components that emit its records.
#[derive(Default)]
pub(super) struct Sources {
    pub(super) elements: Vec<Element>,
    pub(super) outputs: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize)]
struct KubernetesLogs {
    id: String,
    includes: Vec<String>,
    excludes: Vec<String>,
    label_selector: Option<String>,
}

#[derive(Serialize)]
struct Journald {
    id: String,
}

#[derive(Serialize)]
struct File {
    id: String,
    include: Vec<&'static str>,
}

#[derive(Serialize)]
struct Listener {
    id: String,
    address: String,
    tls: Element,
}

pub(super) fn elements(
    forwarder: &Forwarder<'_>,
    secrets: &Secrets<'_>,
    profile: &TlsProfile,
) -> Result<Sources, Error> {
    let mut sources = Sources::default();
    for input in inputs::referenced(forwarder.spec) {
        let id = format!("input_{}", component_id(&input.name));
        let elements = &mut sources.elements;
        let outputs = match input.type_ {
            InputType::Application => application(forwarder, &input, &id, elements),
            InputType::Infrastructure => infrastructure(forwarder, &input, &id, elements),
            InputType::Audit => audit(&input, &id, elements),
            InputType::Receiver => receiver(forwarder, &input, &id, secrets, profile, elements)?,
        };
        sources.outputs.insert(input.name.clone(), outputs);
    }
    Ok(sources)
}

fn application(
    forwarder: &Forwarder<'_>,
    input: &InputSpec,
    id: &str,
    elements: &mut Vec<Element>,
) -> Vec<String> {
    let app = input.application.clone().unwrap_or_default();

    let includes = if app.includes.is_empty() {
        vec![pod_glob("", "")]
    } else {
        app.includes
            .iter()
            .map(|i| pod_glob(&i.namespace, &i.container))
            .collect()
    };

    let mut excludes = own_pods(forwarder);
    if !app.includes.iter().any(|i| inputs::is_infra_namespace(&i.namespace)) {
        excludes.extend(INFRA_NAMESPACE_GLOBS.iter().map(|ns| pod_glob(ns, "")));
    }
    excludes.extend(app.excludes.iter().map(|e| pod_glob(&e.namespace, &e.container)));
    excludes.extend(ROTATED.iter().map(|p| p.to_string()));

    let source = format!("{id}_container");
    elements.push(Element::new(
        "kubernetes_logs",
        KubernetesLogs {
            id: source.clone(),
            includes,
            excludes,
            label_selector: app.selector.as_ref().and_then(label_selector),
        },
    ));
    let meta = meta(elements, &source, Some(InputType::Application), "container", "");

    match app.tuning.and_then(|t| t.rate_limit_per_container) {
        Some(limit) => {
            let throttle = format!("{id}_throttle");
            elements.push(Element::new(
                "throttle",
                Throttle {
                    id: throttle.clone(),
                    inputs: vec![meta],
                    threshold: limit.max_records_per_second,
                    key_field: Some("{{ file }}"),
                },
            ));
            vec![throttle]
        }
        None => vec![meta],
    }
}

fn infrastructure(
    forwarder: &Forwarder<'_>,
    input: &InputSpec,
    id: &str,
    elements: &mut Vec<Element>,
) -> Vec<String> {
    let mut outputs = Vec::new();
    for source in inputs::infrastructure_sources(input) {
        match source {
            InfrastructureSource::Container => {
                let mut excludes = own_pods(forwarder);
                excludes.extend(ROTATED.iter().map(|p| p.to_string()));
                let source = format!("{id}_container");
                elements.push(Element::new(
                    "kubernetes_logs",
                    KubernetesLogs {
                        id: source.clone(),
                        includes: INFRA_NAMESPACE_GLOBS
                            .iter()
                            .map(|ns| pod_glob(ns, ""))
                            .collect(),
                        excludes,
                        label_selector: None,
                    },
                ));
                outputs.push(meta(
                    elements,
                    &source,
                    Some(InputType::Infrastructure),
                    "container",
                    "",
                ));
            }
            InfrastructureSource::Node => {
                let source = format!("{id}_journal");
                elements.push(Element::new("journald", Journald { id: source.clone() }));
                outputs.push(meta(
                    elements,
                    &source,
                    Some(InputType::Infrastructure),
                    "node",
                    JOURNAL,
                ));
            }
        }
    }
    outputs
}

fn audit(input: &InputSpec, id: &str, elements: &mut Vec<Element>) -> Vec<String> {
    let mut outputs = Vec::new();
    for source in inputs::audit_sources(input) {
        let (name, include, parse) = match source {
            AuditSource::Auditd => ("auditd", vec!["/var/log/audit/audit.log"], false),
            AuditSource::KubeApi => ("kubeAPI", vec!["/var/log/kube-apiserver/audit.log"], true),
            AuditSource::OpenshiftApi => (
                "openshiftAPI",
                vec![
                    "/var/log/oauth-apiserver/audit.log",
                    "/var/log/openshift-apiserver/audit.log",
                    "/var/log/oauth-server/audit.log",
                ],
                true,
            ),
            AuditSource::Ovn => ("ovn", vec!["/var/log/ovn/acl-audit-log.log"], false),
        };
        let source = format!("{id}_{}", component_id(name));
        elements.push(Element::new(
            "file",
            File {
                id: source.clone(),
                include,
            },
        ));
        let extra = if parse { AUDIT_JSON } else { "" };
        outputs.push(meta(elements, &source, Some(InputType::Audit), name, extra));
    }
    outputs
}

fn receiver(
    forwarder: &Forwarder<'_>,
    input: &InputSpec,
    id: &str,
    secrets: &Secrets<'_>,
    profile: &TlsProfile,
    elements: &mut Vec<Element>,
) -> Result<Vec<String>, Error> {
    let receiver = input.receiver.as_ref().ok_or_else(|| {
        Error::Generator(format!("receiver input {:?} has no receiver", input.name))
    })?;
    let listener = Listener {
        id: id.to_string(),
        address: format!("[::]:{}", receiver.port),
        tls: receiver_tls(forwarder, input, receiver, id, secrets, profile)?,
    };
    let log_type = inputs::log_type(input);

    match receiver.type_ {
        ReceiverType::Http => {
            elements.push(Element::new("http_server", listener));
            if !receiver.is_kube_api_audit() {
                return Ok(vec![meta(elements, id, log_type, "http", "")]);
            }
            let split = format!("{id}_split");
            elements.push(Remap::element(&split, vec![id.to_string()], SPLIT_ITEMS));
            let items = format!("{id}_items");
            elements.push(Remap::element(&items, vec![split], ITEMS));
            Ok(vec![meta(elements, &items, log_type, "kubeAPI", "")])
        }
        ReceiverType::Syslog => {
            elements.push(Element::new("syslog_server", listener));
            Ok(vec![meta(elements, id, log_type, "syslog", "")])
        }
    }
}

/// Receivers serve the certificate named by the input, or the service CA certificate issued for
/// the input's service.
fn receiver_tls(
    forwarder: &Forwarder<'_>,
    input: &InputSpec,
    receiver: &ReceiverSpec,
    id: &str,
    secrets: &Secrets<'_>,
    profile: &TlsProfile,
) -> Result<Element, Error> {
    let tls = Tls::new(format!("sources.{id}"), profile).enabled();
    let tls = match receiver.tls.as_ref().filter(|t| t.certificate.is_some() && t.key.is_some()) {
        Some(spec) => tls.with_spec(Some(spec), secrets)?,
        None => {
            let dir = paths::receiver_cert_dir(&forwarder.names.input_service(&input.name));
            Tls {
                key_file: Some(format!("{dir}/tls.key")),
                crt_file: Some(format!("{dir}/tls.crt")),
                ..tls
            }
        }
    };
    Ok(tls.element())
}

/// Tags records with their log type and source.
fn meta(
    elements: &mut Vec<Element>,
    input: &str,
    log_type: Option<InputType>,
    log_source: &str,
    extra: &str,
) -> String {
    let id = format!("{input}_meta");
    let mut source = String::new();
    if let Some(t) = log_type {
        let _ = writeln!(source, ".log_type = {}", vrl::string(t.as_str()));
    }
    let _ = writeln!(source, ".log_source = {}", vrl::string(log_source));
    source.push_str(".openshift.cluster_id = get_env_var(\"OPENSHIFT_CLUSTER_ID\") ?? \"\"\n");
    source.push_str(extra);
    elements.push(Remap::element(&id, vec![input.to_string()], source.trim_end()));
    id
}

fn pod_glob(namespace: &str, container: &str) -> String {
    let or_any = |s: &str| if s.is_empty() { "*".to_string() } else { s.to_string() };
    format!(
        "/var/log/pods/{}_*/{}/*.log",
        or_any(namespace),
        or_any(container)
    )
}

/// The collector never reads its own logs.
fn own_pods(forwarder: &Forwarder<'_>) -> Vec<String> {
    vec![format!(
        "/var/log/pods/{}_{}-*/*/*.log",
        forwarder.namespace, forwarder.names.common
    )]
}

/// A Kubernetes label selector string, e.g. `app=web,tier in (a,b)`.
fn label_selector(selector: &LabelSelector) -> Option<String> {
    let mut terms = Vec::new();
    for (k, v) in selector.match_labels.iter().flatten() {
        terms.push(format!("{k}={v}"));
    }
    for expr in selector.match_expressions.iter().flatten() {
        let values = expr.values.clone().unwrap_or_default().join(",");
        let term = match expr.operator.as_str() {
            "In" => format!("{} in ({values})", expr.key),
            "NotIn" => format!("{} notin ({values})", expr.key),
            "Exists" => expr.key.clone(),
            "DoesNotExist" => format!("!{}", expr.key),
            op => {
                tracing::debug!(%op, key = %expr.key, "Ignoring unknown selector operator");
                continue;
            }
        };
        terms.push(term);
    }
    (!terms.is_empty()).then(|| terms.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use logging_forwarder_controller_k8s_api::LabelSelectorRequirement;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("", "", "/var/log/pods/*_*/*/*.log")]
    #[case("my-ns", "", "/var/log/pods/my-ns_*/*/*.log")]
    #[case("openshift*", "web", "/var/log/pods/openshift*_*/web/*.log")]
    fn pod_globs(#[case] ns: &str, #[case] container: &str, #[case] expected: &str) {
        assert_eq!(pod_glob(ns, container), expected);
    }

    #[test]
    fn label_selectors() {
        let selector = LabelSelector {
            match_labels: Some(btreemap! {
                "app".to_string() => "web".to_string(),
                "env".to_string() => "prod".to_string(),
            }),
            match_expressions: Some(vec![
                LabelSelectorRequirement {
                    key: "tier".to_string(),
                    operator: "In".to_string(),
                    values: Some(vec!["a".to_string(), "b".to_string()]),
                },
                LabelSelectorRequirement {
                    key: "canary".to_string(),
                    operator: "DoesNotExist".to_string(),
                    values: None,
                },
            ]),
        };
        assert_eq!(
            label_selector(&selector).as_deref(),
            Some("app=web,env=prod,tier in (a,b),!canary")
        );
        assert_eq!(label_selector(&LabelSelector::default()), None);
    }
}
