//! Rewrites legacy forms of a forwarder spec into the shape the generator consumes.

use crate::{
    conditions::{self, reason},
    inputs,
};
use logging_forwarder_controller_k8s_api::{
    observability::{
        output::{Loki, LokiStack},
        Condition, InputType, OutputSpec, OutputType, PipelineSpec,
    },
    ClusterLogForwarderSpec,
};
use std::collections::{BTreeMap, BTreeSet};

/// Applies every migration to `spec`, returning the conditions describing what was rewritten.
pub fn migrate(spec: ClusterLogForwarderSpec) -> (ClusterLogForwarderSpec, Vec<Condition>) {
    migrate_lokistack(spec)
}

/// Splits each `lokiStack` output into one `loki` output per tenant.
///
/// A pipeline that references a LokiStack is split into one pipeline per input, and the
/// LokiStack reference in each is replaced by the `<output>-<input>` Loki output for that input's
/// tenant. Outputs are returned sorted by name.
pub fn migrate_lokistack(
    mut spec: ClusterLogForwarderSpec,
) -> (ClusterLogForwarderSpec, Vec<Condition>) {
    let stacks = spec
        .outputs
        .iter()
        .filter(|o| o.type_ == OutputType::LokiStack)
        .map(|o| (o.name.clone(), o.clone()))
        .collect::<BTreeMap<_, _>>();
    if stacks.is_empty() {
        return (spec, vec![]);
    }

    let mut outputs = spec
        .outputs
        .iter()
        .filter(|o| o.type_ != OutputType::LokiStack)
        .cloned()
        .collect::<Vec<_>>();
    let mut created = BTreeSet::new();
    let mut pipelines = Vec::with_capacity(spec.pipelines.len());

    for pipeline in &spec.pipelines {
        let targets = pipeline
            .output_refs
            .iter()
            .filter(|o| stacks.contains_key(o.as_str()))
            .cloned()
            .collect::<BTreeSet<_>>();
        if targets.is_empty() {
            pipelines.push(pipeline.clone());
            continue;
        }

        for (i, input) in pipeline.input_refs.iter().enumerate() {
            let name = if i > 0 && !pipeline.name.is_empty() {
                format!("{}-{i}", pipeline.name)
            } else {
                pipeline.name.clone()
            };
            let output_refs = pipeline
                .output_refs
                .iter()
                .map(|o| {
                    if targets.contains(o) {
                        format!("{o}-{input}")
                    } else {
                        o.clone()
                    }
                })
                .collect();
            pipelines.push(PipelineSpec {
                name,
                input_refs: vec![input.clone()],
                output_refs,
                filter_refs: pipeline.filter_refs.clone(),
            });

            let tenant = tenant(&spec, input);
            for target in &targets {
                let output_name = format!("{target}-{input}");
                if created.insert(output_name.clone()) {
                    outputs.push(loki_output(output_name, &stacks[target], tenant));
                }
            }
        }
    }

    outputs.sort_by(|a, b| a.name.cmp(&b.name));
    spec.outputs = outputs;
    spec.pipelines = pipelines;

    let migrated = stacks.keys().map(|n| format!("{n:?}")).collect::<Vec<_>>();
    let condition = Condition::new(
        conditions::MIGRATE,
        true,
        reason::MIGRATE_OUTPUT,
        format!("lokistack: {} migrated to loki output/s", migrated.join(", ")),
    );
    (spec, vec![condition])
}

/// The LokiStack tenant an input's logs belong to.
fn tenant(spec: &ClusterLogForwarderSpec, input: &str) -> Option<InputType> {
    let input = inputs::resolve_ref(spec, input)?;
    inputs::log_type(&input).filter(|t| InputType::RESERVED.contains(t))
}

fn loki_output(name: String, stack: &OutputSpec, tenant: Option<InputType>) -> OutputSpec {
    let ls = stack.loki_stack.clone().unwrap_or_default();
    OutputSpec {
        name,
        type_: OutputType::Loki,
        tls: stack.tls.clone(),
        rate_limit: stack.rate_limit,
        loki: Some(Loki {
            url: tenant.map(|t| gateway_url(&ls, t)).unwrap_or_default(),
            authentication: ls.authentication,
            tuning: ls.tuning,
            label_keys: ls.label_keys,
            tenant_key: None,
        }),
        ..Default::default()
    }
}

/// The LokiStack gateway endpoint for a tenant.
pub fn gateway_url(stack: &LokiStack, tenant: InputType) -> String {
    format!(
        "https://{}-gateway-http.{}.svc:8080/api/logs/v1/{tenant}",
        stack.target.name, stack.target.namespace
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use logging_forwarder_controller_k8s_api::observability::{
        output::{Elasticsearch, HttpAuthentication, LokiStackTarget},
        BearerToken, BearerTokenFrom,
    };
    use pretty_assertions::assert_eq;

    fn lokistack() -> OutputSpec {
        OutputSpec {
            name: "default-lokistack".to_string(),
            type_: OutputType::LokiStack,
            loki_stack: Some(LokiStack {
                authentication: Some(HttpAuthentication {
                    token: Some(BearerToken {
                        from: BearerTokenFrom::ServiceAccount,
                        secret: None,
                    }),
                    ..Default::default()
                }),
                target: LokiStackTarget {
                    namespace: "openshift-logging".to_string(),
                    name: "logging-loki".to_string(),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn es() -> OutputSpec {
        OutputSpec {
            name: "es".to_string(),
            type_: OutputType::Elasticsearch,
            elasticsearch: Some(Elasticsearch {
                url: "https://es:9200".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn splits_per_tenant() {
        let spec = ClusterLogForwarderSpec {
            outputs: vec![lokistack(), es()],
            pipelines: vec![PipelineSpec {
                name: "all".to_string(),
                input_refs: vec!["application".to_string(), "audit".to_string()],
                output_refs: vec!["default-lokistack".to_string(), "es".to_string()],
                filter_refs: vec!["f".to_string()],
            }],
            ..Default::default()
        };

        let (spec, migrated) = migrate(spec);
        assert_eq!(migrated.len(), 1);
        assert_eq!(migrated[0].type_, conditions::MIGRATE);

        assert_eq!(
            spec.outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            vec!["default-lokistack-application", "default-lokistack-audit", "es"]
        );
        let app = &spec.outputs[0];
        assert_eq!(app.type_, OutputType::Loki);
        let loki = app.loki.as_ref().unwrap();
        assert_eq!(
            loki.url,
            "https://logging-loki-gateway-http.openshift-logging.svc:8080/api/logs/v1/application"
        );
        assert!(loki.authentication.is_some());

        assert_eq!(
            spec.pipelines,
            vec![
                PipelineSpec {
                    name: "all".to_string(),
                    input_refs: vec!["application".to_string()],
                    output_refs: vec![
                        "default-lokistack-application".to_string(),
                        "es".to_string()
                    ],
                    filter_refs: vec!["f".to_string()],
                },
                PipelineSpec {
                    name: "all-1".to_string(),
                    input_refs: vec!["audit".to_string()],
                    output_refs: vec!["default-lokistack-audit".to_string(), "es".to_string()],
                    filter_refs: vec!["f".to_string()],
                },
            ]
        );
    }

    #[test]
    fn untouched_without_lokistack() {
        let spec = ClusterLogForwarderSpec {
            outputs: vec![es()],
            pipelines: vec![PipelineSpec {
                name: "p".to_string(),
                input_refs: vec!["application".to_string()],
                output_refs: vec!["es".to_string()],
                filter_refs: vec![],
            }],
            ..Default::default()
        };
        let (migrated, conditions) = migrate(spec.clone());
        assert_eq!(migrated, spec);
        assert!(conditions.is_empty());
    }
}
