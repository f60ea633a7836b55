use crate::{meta, Context};
use logging_forwarder_controller_core::{
    annotations::SERVING_CERT_SECRET_NAME, labels::INPUT_SERVICE_TYPE, METRICS_PORT,
    METRICS_PORT_NAME,
};
use logging_forwarder_controller_k8s_api::{
    api::core::v1::{ServicePort, ServiceSpec},
    monitoring::{Endpoint, EndpointTlsConfig, NamespaceSelector, ServiceMonitor, ServiceMonitorSpec},
    IntOrString, LabelSelector, LabelSelectorRequirement, Service,
};

const PROMETHEUS_TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const PROMETHEUS_CA_FILE: &str =
    "/etc/prometheus/configmaps/serving-certs-ca-bundle/service-ca.crt";

/// Exposes the collector's metrics endpoint, served with a certificate issued into the metrics
/// secret.
pub fn metrics_service(ctx: &Context<'_>) -> Service {
    Service {
        metadata: meta::with_annotations(
            meta::owned(ctx, &ctx.names.common),
            [(SERVING_CERT_SECRET_NAME, ctx.names.metrics_secret.as_str())],
        ),
        spec: Some(ServiceSpec {
            selector: Some(ctx.identity().selector()),
            ports: Some(vec![ServicePort {
                name: Some(METRICS_PORT_NAME.to_string()),
                port: METRICS_PORT,
                target_port: Some(IntOrString::Int(METRICS_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Scrapes the metrics service, skipping the services that front receiver inputs.
pub fn service_monitor(ctx: &Context<'_>) -> ServiceMonitor {
    let namespace = ctx.namespace();
    let mut monitor = ServiceMonitor::new(
        &ctx.names.common,
        ServiceMonitorSpec {
            job_label: "monitor-collector".to_string(),
            endpoints: vec![Endpoint {
                port: METRICS_PORT_NAME.to_string(),
                path: "/metrics".to_string(),
                scheme: "https".to_string(),
                bearer_token_file: PROMETHEUS_TOKEN_FILE.to_string(),
                tls_config: Some(EndpointTlsConfig {
                    ca_file: PROMETHEUS_CA_FILE.to_string(),
                    server_name: format!("{}.{namespace}.svc", ctx.names.common),
                }),
            }],
            selector: LabelSelector {
                match_labels: Some(ctx.identity().selector()),
                match_expressions: Some(vec![LabelSelectorRequirement {
                    key: INPUT_SERVICE_TYPE.to_string(),
                    operator: "DoesNotExist".to_string(),
                    values: None,
                }]),
            },
            namespace_selector: Some(NamespaceSelector {
                match_names: vec![namespace],
            }),
        },
    );
    monitor.metadata = meta::owned(ctx, &ctx.names.common);
    monitor
}

/// One service per receiver input, each with its own serving certificate.
pub fn input_services(ctx: &Context<'_>) -> Vec<Service> {
    ctx.spec
        .receivers()
        .map(|(input, receiver)| {
            let name = ctx.names.input_service(&input.name);
            let mut metadata = meta::with_annotations(
                meta::owned(ctx, &name),
                [(SERVING_CERT_SECRET_NAME, name.as_str())],
            );
            metadata
                .labels
                .get_or_insert_with(Default::default)
                .insert(
                    INPUT_SERVICE_TYPE.to_string(),
                    receiver.type_.as_str().to_string(),
                );
            Service {
                metadata,
                spec: Some(ServiceSpec {
                    selector: Some(ctx.identity().selector()),
                    ports: Some(vec![ServicePort {
                        name: Some(receiver.type_.as_str().to_string()),
                        port: receiver.port,
                        target_port: Some(IntOrString::Int(receiver.port)),
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            }
        })
        .collect()
}
