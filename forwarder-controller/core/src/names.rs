use crate::fnv1a64;
use logging_forwarder_controller_k8s_api::{ClusterLogForwarder, ResourceExt};

const MAX_LABEL_LEN: usize = 63;
const MAX_SUBDOMAIN_LEN: usize = 253;

/// Names of every resource derived from a single forwarder.
///
/// All fields are a pure function of the forwarder's namespace, name, and service account name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceNames {
    /// Workload, metrics service, and service monitor name.
    pub common: String,
    pub config_artifact: String,
    pub metrics_secret: String,
    pub trust_bundle: String,
    pub service_account: String,
    pub sa_token_secret: String,
    /// Cluster-scoped, so it embeds the namespace.
    pub metadata_reader_binding: String,
    pub secrets_bundle: String,
    pub aws_credentials_map: String,
}

// === impl ResourceNames ===

impl ResourceNames {
    pub fn new(namespace: &str, name: &str, service_account: &str) -> Self {
        let common = dns1123_label(name);
        Self {
            config_artifact: dns1123_label(&format!("{name}-config")),
            metrics_secret: dns1123_label(&format!("{name}-metrics")),
            trust_bundle: dns1123_label(&format!("{name}-trustbundle")),
            service_account: service_account.to_string(),
            sa_token_secret: dns1123_label(&format!("{service_account}-token")),
            metadata_reader_binding: dns1123_subdomain(&format!(
                "cluster-logging-{namespace}-{name}-metadata-reader"
            )),
            secrets_bundle: dns1123_label(&format!("{name}-secrets")),
            aws_credentials_map: dns1123_label(&format!("{name}-aws-creds")),
            common,
        }
    }

    pub fn of(clf: &ClusterLogForwarder) -> Self {
        Self::new(
            clf.namespace().as_deref().unwrap_or_default(),
            &clf.name_any(),
            &clf.spec.service_account.name,
        )
    }

    /// The service fronting a receiver input.
    pub fn input_service(&self, input: &str) -> String {
        dns1123_label(&format!("{}-{input}", self.common))
    }

    /// Names of objects created in the forwarder's namespace.
    pub fn namespaced(&self) -> [&str; 7] {
        [
            &self.common,
            &self.config_artifact,
            &self.metrics_secret,
            &self.trust_bundle,
            &self.sa_token_secret,
            &self.secrets_bundle,
            &self.aws_credentials_map,
        ]
    }
}

/// Coerces `s` into a valid RFC 1123 label.
///
/// Characters outside `[a-z0-9-]` become `-`, leading and trailing dashes are dropped, and names
/// longer than 63 bytes are truncated with a hash suffix so that distinct long inputs stay
/// distinct.
pub fn dns1123_label(s: &str) -> String {
    sanitize(s, MAX_LABEL_LEN)
}

fn dns1123_subdomain(s: &str) -> String {
    sanitize(s, MAX_SUBDOMAIN_LEN)
}

fn sanitize(s: &str, max: usize) -> String {
    let cleaned = s
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '-'
            }
        })
        .collect::<String>();
    let cleaned = cleaned.trim_matches('-');
    if cleaned.len() <= max {
        return cleaned.to_string();
    }

    let suffix = format!("{:08x}", fnv1a64([s.as_bytes()]) as u32);
    let head = cleaned[..max - suffix.len() - 1].trim_end_matches('-');
    format!("{head}-{suffix}")
}
