use crate::{meta, Context};
use logging_forwarder_controller_core::{
    ports::{self, PortProtocol},
    API_SERVER_PORT, METRICS_PORT_NAME,
};
use logging_forwarder_controller_k8s_api::{
    api::networking::v1::{
        NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPort, NetworkPolicySpec,
    },
    observability::NetworkPolicyRuleSet,
    IntOrString, LabelSelector, NetworkPolicy,
};
use std::collections::BTreeSet;

const DNS_PORT: i32 = 53;

/// Limits the collector pods' traffic according to the forwarder's rule set.
pub fn network_policy(ctx: &Context<'_>) -> NetworkPolicy {
    let (ingress, egress) = match ctx.spec.network_policy_rule_set() {
        NetworkPolicyRuleSet::AllowAllIngressEgress => (
            vec![NetworkPolicyIngressRule::default()],
            vec![NetworkPolicyEgressRule::default()],
        ),
        NetworkPolicyRuleSet::AllowIngressMetrics => (
            vec![ingress_rule(std::iter::empty())],
            vec![NetworkPolicyEgressRule::default()],
        ),
        NetworkPolicyRuleSet::RestrictIngressEgress => {
            let listeners = ctx
                .config
                .listener_ports
                .iter()
                .map(|p| PortProtocol::tcp(*p));
            (
                vec![ingress_rule(listeners)],
                vec![egress_rule(egress_ports(ctx))],
            )
        }
    };

    NetworkPolicy {
        metadata: meta::owned(ctx, &ctx.names.common),
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector {
                match_labels: Some(ctx.identity().selector()),
                ..Default::default()
            },
            policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
            ingress: Some(ingress),
            egress: Some(egress),
        }),
    }
}

/// Every port the collector must reach: its outputs, the cluster proxies, DNS, and the API
/// server.
fn egress_ports(ctx: &Context<'_>) -> BTreeSet<PortProtocol> {
    let mut ports = ports::output_ports(&ctx.spec.outputs);
    ports.extend(ports::proxy_ports(&ctx.cluster.proxy));
    ports.insert(PortProtocol::udp(DNS_PORT));
    ports.insert(PortProtocol::tcp(API_SERVER_PORT));
    ports
}

/// Admits traffic to the named metrics port plus `listeners`.
fn ingress_rule(listeners: impl IntoIterator<Item = PortProtocol>) -> NetworkPolicyIngressRule {
    let metrics = NetworkPolicyPort {
        port: Some(IntOrString::String(METRICS_PORT_NAME.to_string())),
        protocol: Some("TCP".to_string()),
        end_port: None,
    };
    NetworkPolicyIngressRule {
        ports: Some(
            std::iter::once(metrics)
                .chain(policy_ports(listeners))
                .collect(),
        ),
        from: None,
    }
}

fn egress_rule(ports: impl IntoIterator<Item = PortProtocol>) -> NetworkPolicyEgressRule {
    NetworkPolicyEgressRule {
        ports: Some(policy_ports(ports)),
        to: None,
    }
}

fn policy_ports(ports: impl IntoIterator<Item = PortProtocol>) -> Vec<NetworkPolicyPort> {
    ports
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|PortProtocol { port, protocol }| NetworkPolicyPort {
            port: Some(IntOrString::Int(port)),
            protocol: Some(protocol.as_str().to_string()),
            end_port: None,
        })
        .collect()
}
