//! Classifies the inputs a forwarder's pipelines reference.

use crate::Options;
use logging_forwarder_controller_k8s_api::{
    observability::{
        input::{
            Application, Audit, AuditSource, Infrastructure, InfrastructureSource, ReceiverType,
        },
        InputSpec, InputType,
    },
    ClusterLogForwarderSpec,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Namespaces whose container logs are infrastructure logs.
static INFRA_NAMESPACES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^default$|^openshift.*$|^kube.*$").expect("infrastructure namespace regex")
});

/// Namespace prefixes excluded from application logs.
pub const INFRA_NAMESPACE_GLOBS: [&str; 3] = ["default", "openshift*", "kube*"];

pub fn is_infra_namespace(ns: &str) -> bool {
    INFRA_NAMESPACES.is_match(ns)
}

/// The input a pipeline reference names: either a declared input, or a reserved log type
/// expanded to an input collecting every source of that type.
pub fn resolve_ref(spec: &ClusterLogForwarderSpec, name: &str) -> Option<InputSpec> {
    if let Some(input) = spec.input(name) {
        return Some(input.clone());
    }
    InputType::reserved(name).map(reserved_input)
}

pub fn reserved_input(type_: InputType) -> InputSpec {
    let mut input = InputSpec {
        name: type_.as_str().to_string(),
        type_,
        ..Default::default()
    };
    match type_ {
        InputType::Application => input.application = Some(Application::default()),
        InputType::Infrastructure => {
            input.infrastructure = Some(Infrastructure {
                sources: InfrastructureSource::ALL.to_vec(),
            })
        }
        InputType::Audit => {
            input.audit = Some(Audit {
                sources: AuditSource::ALL.to_vec(),
            })
        }
        InputType::Receiver => {}
    }
    input
}

/// Inputs referenced by any pipeline, deduplicated, in first-reference order.
pub fn referenced(spec: &ClusterLogForwarderSpec) -> Vec<InputSpec> {
    let mut seen = BTreeSet::new();
    spec.pipelines
        .iter()
        .flat_map(|p| p.input_refs.iter())
        .filter(|name| seen.insert(name.as_str()))
        .filter_map(|name| resolve_ref(spec, name))
        .collect()
}

/// The log type records from `input` are tagged with, if it has one.
pub fn log_type(input: &InputSpec) -> Option<InputType> {
    match input.type_ {
        InputType::Receiver => {
            let receiver = input.receiver.as_ref()?;
            match receiver.type_ {
                ReceiverType::Syslog => Some(InputType::Infrastructure),
                ReceiverType::Http if receiver.is_kube_api_audit() => Some(InputType::Audit),
                ReceiverType::Http => None,
            }
        }
        t => Some(t),
    }
}

pub fn infrastructure_sources(input: &InputSpec) -> Vec<InfrastructureSource> {
    match input.infrastructure.as_ref().map(|i| i.sources.clone()) {
        Some(sources) if !sources.is_empty() => sources,
        _ => InfrastructureSource::ALL.to_vec(),
    }
}

pub fn audit_sources(input: &InputSpec) -> Vec<AuditSource> {
    match input.audit.as_ref().map(|a| a.sources.clone()) {
        Some(sources) if !sources.is_empty() => sources,
        _ => AuditSource::ALL.to_vec(),
    }
}

/// The log types the service account must be allowed to collect, and whether any receiver is
/// referenced.
///
/// An application input that includes infrastructure namespaces also requires the
/// infrastructure grant, as does a syslog receiver. A kube API audit receiver requires audit.
pub fn required_log_types(spec: &ClusterLogForwarderSpec) -> (BTreeSet<InputType>, bool) {
    let mut types = BTreeSet::new();
    let mut receivers = false;
    for input in referenced(spec) {
        match input.type_ {
            InputType::Application => {
                types.insert(InputType::Application);
                let includes_infra = input
                    .application
                    .iter()
                    .flat_map(|a| a.includes.iter())
                    .any(|i| is_infra_namespace(&i.namespace));
                if includes_infra {
                    types.insert(InputType::Infrastructure);
                }
            }
            InputType::Receiver => {
                receivers = true;
                if let Some(t) = log_type(&input) {
                    types.insert(t);
                }
            }
            t => {
                types.insert(t);
            }
        }
    }
    (types, receivers)
}

/// True when some referenced input reads files from the node.
pub fn needs_node_access(spec: &ClusterLogForwarderSpec) -> bool {
    referenced(spec)
        .iter()
        .any(|i| i.type_ != InputType::Receiver)
}

/// Node-local sources need one collector per node; receiver-only forwarders run as a deployment.
pub fn deploy_as_daemonset(spec: &ClusterLogForwarderSpec, options: &Options) -> bool {
    if options.as_deployment {
        return false;
    }
    referenced(spec).is_empty() || needs_node_access(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use logging_forwarder_controller_k8s_api::observability::{
        input::{HttpReceiver, HttpReceiverFormat, NamespaceContainer, ReceiverSpec},
        PipelineSpec,
    };
    use pretty_assertions::assert_eq;

    fn receiver(name: &str, type_: ReceiverType, audit: bool) -> InputSpec {
        InputSpec {
            name: name.to_string(),
            type_: InputType::Receiver,
            receiver: Some(ReceiverSpec {
                type_,
                port: 8443,
                tls: None,
                http: audit.then_some(HttpReceiver {
                    format: HttpReceiverFormat::KubeApiAudit,
                }),
            }),
            ..Default::default()
        }
    }

    fn spec(inputs: Vec<InputSpec>, refs: &[&str]) -> ClusterLogForwarderSpec {
        ClusterLogForwarderSpec {
            inputs,
            pipelines: vec![PipelineSpec {
                name: "p".to_string(),
                input_refs: refs.iter().map(|s| s.to_string()).collect(),
                output_refs: vec!["out".to_string()],
                filter_refs: vec![],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn reserved_names_require_their_type() {
        let (types, receivers) =
            required_log_types(&spec(vec![], &["application", "infrastructure", "audit"]));
        assert_eq!(
            types.into_iter().collect::<Vec<_>>(),
            vec![InputType::Application, InputType::Infrastructure, InputType::Audit]
        );
        assert!(!receivers);
    }

    #[test]
    fn infra_namespace_includes_require_infrastructure() {
        let app = InputSpec {
            name: "my-app".to_string(),
            type_: InputType::Application,
            application: Some(Application {
                includes: vec![NamespaceContainer {
                    namespace: "openshift-monitoring".to_string(),
                    container: String::new(),
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        let (types, _) = required_log_types(&spec(vec![app], &["my-app"]));
        assert!(types.contains(&InputType::Infrastructure));
    }

    #[test]
    fn receivers() {
        let s = spec(
            vec![
                receiver("syslog", ReceiverType::Syslog, false),
                receiver("audit", ReceiverType::Http, true),
                receiver("plain", ReceiverType::Http, false),
            ],
            &["syslog", "audit", "plain"],
        );
        let (types, receivers) = required_log_types(&s);
        assert!(receivers);
        assert_eq!(
            types.into_iter().collect::<Vec<_>>(),
            vec![InputType::Infrastructure, InputType::Audit]
        );
        assert!(!deploy_as_daemonset(&s, &Options::default()));
    }

    #[test]
    fn deployment_only_for_receivers() {
        let s = spec(
            vec![receiver("http-in", ReceiverType::Http, false)],
            &["http-in", "application"],
        );
        assert!(deploy_as_daemonset(&s, &Options::default()));
        let forced = Options {
            as_deployment: true,
            ..Default::default()
        };
        assert!(!deploy_as_daemonset(&s, &forced));
    }

    #[test]
    fn sources_default_to_all() {
        let infra = reserved_input(InputType::Infrastructure);
        assert_eq!(infrastructure_sources(&infra), InfrastructureSource::ALL.to_vec());
        let audit = InputSpec {
            type_: InputType::Audit,
            audit: Some(Audit {
                sources: vec![AuditSource::Ovn],
            }),
            ..Default::default()
        };
        assert_eq!(audit_sources(&audit), vec![AuditSource::Ovn]);
    }
}
