//! Ports the collector listens on and connects to.

use crate::ProxyConfig;
use logging_forwarder_controller_k8s_api::observability::{InputSpec, OutputSpec, OutputType};
use std::{collections::BTreeSet, fmt};
use url::Url;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortProtocol {
    pub port: i32,
    pub protocol: Protocol,
}

/// Every port the outputs connect to, parsed from their URLs or defaulted by output type.
///
/// Kafka outputs without a URL contribute one port per broker.
pub fn output_ports<'o>(outputs: impl IntoIterator<Item = &'o OutputSpec>) -> BTreeSet<PortProtocol> {
    let mut ports = BTreeSet::new();
    for output in outputs {
        if let Some(url) = output.url() {
            ports.insert(url_port(output.type_, url));
            continue;
        }
        let brokers = output
            .kafka
            .as_ref()
            .filter(|_| output.type_ == OutputType::Kafka)
            .map(|k| k.brokers.as_slice())
            .unwrap_or_default();
        if brokers.is_empty() {
            ports.insert(PortProtocol::tcp(default_port(output.type_, None)));
        } else {
            ports.extend(brokers.iter().map(|b| url_port(OutputType::Kafka, b)));
        }
    }
    ports.retain(|pp| pp.port > 0);
    ports
}

/// Ports opened by receiver inputs.
pub fn input_ports<'i>(inputs: impl IntoIterator<Item = &'i InputSpec>) -> BTreeSet<i32> {
    inputs
        .into_iter()
        .filter_map(|i| i.receiver.as_ref())
        .map(|r| r.port)
        .filter(|p| *p > 0)
        .collect()
}

/// Ports of the cluster-wide HTTP(S) proxies.
pub fn proxy_ports(proxy: &ProxyConfig) -> BTreeSet<PortProtocol> {
    let mut ports = BTreeSet::new();
    for raw in proxy.proxy_urls() {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(error) => {
                tracing::warn!(%error, url = %raw, "Failed to parse proxy URL");
                continue;
            }
        };
        let port = explicit_port(&url, raw).or(match url.scheme() {
            "http" => Some(80),
            "https" => Some(443),
            _ => None,
        });
        if let Some(port) = port {
            ports.insert(PortProtocol::tcp(port));
        }
    }
    ports
}

/// The port an output connects to when its URL names none.
///
/// `https` URLs always default to 443.
pub fn default_port(output: OutputType, scheme: Option<&str>) -> i32 {
    if scheme == Some("https") {
        return 443;
    }
    match output {
        OutputType::Elasticsearch => 9200,
        OutputType::Splunk => 8088,
        OutputType::Loki => 3100,
        OutputType::Syslog => 514,
        OutputType::Otlp => 4318,
        OutputType::LokiStack => 8080,
        OutputType::Cloudwatch
        | OutputType::AzureMonitor
        | OutputType::GoogleCloudLogging
        | OutputType::S3 => 443,
        OutputType::Kafka if scheme == Some("tls") => 9093,
        OutputType::Kafka => 9092,
        OutputType::Http => 80,
    }
}

fn url_port(output: OutputType, raw: &str) -> PortProtocol {
    let Ok(url) = Url::parse(raw) else {
        return PortProtocol::tcp(default_port(output, None));
    };
    let protocol = match url.scheme() {
        "udp" => Protocol::Udp,
        _ => Protocol::Tcp,
    };
    match explicit_port(&url, raw) {
        Some(port) => PortProtocol { port, protocol },
        None => PortProtocol {
            port: default_port(output, Some(url.scheme())),
            protocol,
        },
    }
}

/// The port written in `raw`, including a scheme-default port that `Url` elides.
fn explicit_port(url: &Url, raw: &str) -> Option<i32> {
    if let Some(port) = url.port() {
        return Some(i32::from(port));
    }
    let known = url.port_or_known_default()?;
    let host = url.host_str()?;
    raw.contains(&format!("{host}:{known}"))
        .then_some(i32::from(known))
}

// === impl PortProtocol ===

impl PortProtocol {
    pub const fn tcp(port: i32) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }

    pub const fn udp(port: i32) -> Self {
        Self {
            port,
            protocol: Protocol::Udp,
        }
    }
}

// === impl Protocol ===

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logging_forwarder_controller_k8s_api::observability::{
        input::{ReceiverSpec, ReceiverType},
        output::{Elasticsearch, Http, Kafka, LokiStack, Syslog},
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn es(url: &str) -> OutputSpec {
        OutputSpec {
            name: "es".to_string(),
            type_: OutputType::Elasticsearch,
            elasticsearch: Some(Elasticsearch {
                url: url.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn syslog(url: &str) -> OutputSpec {
        OutputSpec {
            name: "syslog".to_string(),
            type_: OutputType::Syslog,
            syslog: Some(Syslog {
                url: url.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn http(url: &str) -> OutputSpec {
        OutputSpec {
            name: "http".to_string(),
            type_: OutputType::Http,
            http: Some(Http {
                url: url.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(es("https://es.example.com:9200"), PortProtocol::tcp(9200))]
    #[case(es("http://es.example.com"), PortProtocol::tcp(9200))]
    #[case(es("https://es.example.com"), PortProtocol::tcp(443))]
    #[case(syslog("udp://syslog.example.com:5514"), PortProtocol::udp(5514))]
    #[case(syslog("tcp://syslog.example.com"), PortProtocol::tcp(514))]
    #[case(syslog("udp://syslog.example.com"), PortProtocol::udp(514))]
    #[case(http("http://collector.example.com:80"), PortProtocol::tcp(80))]
    #[case(http("http://collector.example.com"), PortProtocol::tcp(80))]
    #[case(http("https://collector.example.com:443/logs"), PortProtocol::tcp(443))]
    fn parses_or_defaults(#[case] output: OutputSpec, #[case] expected: PortProtocol) {
        assert_eq!(
            output_ports([&output]).into_iter().collect::<Vec<_>>(),
            vec![expected]
        );
    }

    #[test]
    fn kafka_brokers_expand() {
        let kafka = OutputSpec {
            name: "kafka".to_string(),
            type_: OutputType::Kafka,
            kafka: Some(Kafka {
                brokers: vec![
                    "tls://broker-1:9093".to_string(),
                    "tcp://broker-2".to_string(),
                    "tls://broker-3".to_string(),
                ],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            output_ports([&kafka]).into_iter().collect::<Vec<_>>(),
            vec![PortProtocol::tcp(9092), PortProtocol::tcp(9093)]
        );
    }

    #[test]
    fn lokistack_defaults() {
        let out = OutputSpec {
            name: "default-lokistack".to_string(),
            type_: OutputType::LokiStack,
            loki_stack: Some(LokiStack::default()),
            ..Default::default()
        };
        assert_eq!(
            output_ports([&out]).into_iter().collect::<Vec<_>>(),
            vec![PortProtocol::tcp(8080)]
        );
    }

    #[test]
    fn deduplicates() {
        let outputs = [
            es("https://a:9200"),
            es("https://b:9200"),
            syslog("udp://c:514"),
            syslog("tcp://d:514"),
        ];
        assert_eq!(
            output_ports(&outputs).into_iter().collect::<Vec<_>>(),
            vec![
                PortProtocol::tcp(514),
                PortProtocol::udp(514),
                PortProtocol::tcp(9200)
            ]
        );
    }

    #[test]
    fn every_type_has_a_default() {
        for t in OutputType::ALL {
            assert!(default_port(t, None) > 0, "{t}");
        }
        assert_eq!(default_port(OutputType::Kafka, Some("tls")), 9093);
        assert_eq!(default_port(OutputType::Loki, Some("https")), 443);
    }

    #[test]
    fn receiver_ports() {
        let inputs = [
            InputSpec {
                name: "a".to_string(),
                receiver: Some(ReceiverSpec {
                    type_: ReceiverType::Http,
                    port: 8080,
                    tls: None,
                    http: None,
                }),
                ..Default::default()
            },
            InputSpec {
                name: "b".to_string(),
                ..Default::default()
            },
        ];
        assert_eq!(input_ports(&inputs).into_iter().collect::<Vec<_>>(), vec![8080]);
    }

    #[test]
    fn proxies() {
        let proxy = ProxyConfig {
            http_proxy: Some("http://proxy".to_string()),
            https_proxy: Some("https://proxy:8443".to_string()),
            no_proxy: None,
        };
        assert_eq!(
            proxy_ports(&proxy).into_iter().collect::<Vec<_>>(),
            vec![PortProtocol::tcp(80), PortProtocol::tcp(8443)]
        );
    }
}
