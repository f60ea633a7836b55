//! Endpoint and tuning helpers shared by the collector variants.

use crate::{component_id, Error};
use logging_forwarder_controller_core::ports;
use logging_forwarder_controller_k8s_api::observability::{output::Kafka, OutputSpec, OutputType};
use url::Url;

/// Stream labels applied when a Loki output names none.
const LOKI_LABEL_KEYS: [&str; 4] = [
    "log_type",
    "kubernetes.container_name",
    "kubernetes.namespace_name",
    "kubernetes.pod_name",
];

const KAFKA_TOPIC: &str = "topic";

/// Outputs connect with TLS when their URL's scheme calls for it. Cloud outputs without a URL
/// always use TLS.
pub(crate) fn needs_tls(output: &OutputSpec) -> bool {
    if let Some(url) = output.url() {
        return is_secure(url);
    }
    match output.type_ {
        OutputType::Kafka => output
            .kafka
            .iter()
            .flat_map(|k| k.brokers.iter())
            .any(|b| is_secure(b)),
        OutputType::AzureMonitor
        | OutputType::Cloudwatch
        | OutputType::GoogleCloudLogging
        | OutputType::S3 => true,
        _ => false,
    }
}

pub(crate) fn is_secure(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "https" | "tls" | "ssl"))
        .unwrap_or(false)
}

pub(crate) fn parse_url(raw: &str) -> Result<Url, Error> {
    Url::parse(raw).map_err(|error| Error::Generator(format!("invalid URL {raw:?}: {error}")))
}

pub(crate) fn host(url: &Url) -> Result<&str, Error> {
    url.host_str()
        .ok_or_else(|| Error::Generator(format!("URL {url} has no host")))
}

/// The URL's port, or the output type's default port for the URL's scheme.
pub(crate) fn port(url: &Url, output: OutputType) -> i32 {
    url.port()
        .map(i32::from)
        .unwrap_or_else(|| ports::default_port(output, Some(url.scheme())))
}

pub(crate) fn host_port(url: &Url, output: OutputType) -> Result<String, Error> {
    Ok(format!("{}:{}", host(url)?, port(url, output)))
}

/// Broker addresses and topic. A topic not set explicitly is taken from the URL's path.
pub(crate) fn kafka_endpoint(kafka: &Kafka) -> Result<(Vec<String>, String), Error> {
    let mut servers = Vec::new();
    let mut topic = kafka.topic.clone();
    if let Some(raw) = kafka.url.as_deref().filter(|u| !u.is_empty()) {
        let url = parse_url(raw)?;
        servers.push(host_port(&url, OutputType::Kafka)?);
        if topic.is_empty() {
            // The path may be a template, which URL parsing would percent-encode.
            let rest = raw.split_once("://").map_or(raw, |(_, rest)| rest);
            if let Some((_, path)) = rest.split_once('/') {
                topic = path.trim_matches('/').to_string();
            }
        }
    }
    for broker in &kafka.brokers {
        let server = host_port(&parse_url(broker)?, OutputType::Kafka)?;
        if !servers.contains(&server) {
            servers.push(server);
        }
    }
    if topic.is_empty() {
        topic = KAFKA_TOPIC.to_string();
    }
    Ok((servers, topic))
}

/// Loki stream label names paired with the record paths they take their values from, e.g.
/// `k8s_pod_name` for `kubernetes.pod_name`.
pub(crate) fn loki_labels(keys: &[String]) -> Vec<(String, String)> {
    let keys = if keys.is_empty() {
        LOKI_LABEL_KEYS.iter().map(|k| k.to_string()).collect()
    } else {
        keys.to_vec()
    };
    let mut labels = keys
        .iter()
        .map(|key| {
            let key = key.trim_start_matches('.');
            let name = match key.strip_prefix("kubernetes.") {
                Some(rest) => format!("k8s_{rest}"),
                None => key.to_string(),
            };
            (component_id(&name), key.to_string())
        })
        .collect::<Vec<_>>();
    labels.sort();
    labels.dedup_by(|a, b| a.0 == b.0);
    labels
}

/// Bytes in a resource quantity such as `10M`, `1.5Mi`, or `512`.
pub(crate) fn quantity_bytes(quantity: &str) -> Result<u64, Error> {
    let invalid = || Error::Generator(format!("invalid quantity {quantity:?}"));
    let q = quantity.trim();
    let split = q
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(q.len());
    let (number, suffix) = q.split_at(split);
    let number = number.parse::<f64>().map_err(|_| invalid())?;
    let multiplier = match suffix {
        "" => 1.0,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "Ki" => 1024.0,
        "Mi" => 1024.0 * 1024.0,
        "Gi" => 1024.0 * 1024.0 * 1024.0,
        "Ti" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return Err(invalid()),
    };
    Ok((number * multiplier).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("512", 512)]
    #[case("10M", 10_000_000)]
    #[case("1Ki", 1024)]
    #[case("1.5Mi", 1_572_864)]
    fn quantities(#[case] q: &str, #[case] bytes: u64) {
        assert_eq!(quantity_bytes(q).unwrap(), bytes);
    }

    #[test]
    fn invalid_quantity() {
        assert!(quantity_bytes("10Q").is_err());
        assert!(quantity_bytes("M").is_err());
    }

    #[test]
    fn kafka_brokers() {
        let kafka = Kafka {
            url: Some("tls://broker-0:9093/app-topic".to_string()),
            brokers: vec![
                "tls://broker-0:9093".to_string(),
                "tls://broker-1:9093".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(
            kafka_endpoint(&kafka).unwrap(),
            (
                vec!["broker-0:9093".to_string(), "broker-1:9093".to_string()],
                "app-topic".to_string()
            )
        );

        let kafka = Kafka {
            brokers: vec!["tcp://broker".to_string()],
            ..Default::default()
        };
        assert_eq!(
            kafka_endpoint(&kafka).unwrap(),
            (vec!["broker:9092".to_string()], "topic".to_string())
        );
    }

    #[test]
    fn default_loki_labels() {
        assert_eq!(
            loki_labels(&[]),
            vec![
                ("k8s_container_name".to_string(), "kubernetes.container_name".to_string()),
                ("k8s_namespace_name".to_string(), "kubernetes.namespace_name".to_string()),
                ("k8s_pod_name".to_string(), "kubernetes.pod_name".to_string()),
                ("log_type".to_string(), "log_type".to_string()),
            ]
        );
    }

    #[test]
    fn secure_schemes() {
        assert!(is_secure("https://es:9200"));
        assert!(is_secure("tls://broker:9093"));
        assert!(!is_secure("http://loki:3100"));
        assert!(!is_secure("not a url"));
    }
}
