//! Forwarder annotations that tune the generated collector.

use logging_forwarder_controller_k8s_api::IntOrString;
use std::collections::BTreeMap;

/// Replaces every sink with a stdout sink when `true`.
pub const DEBUG_OUTPUT: &str = "logging.openshift.io/debug-output";

/// The collector's own log level.
pub const LOG_LEVEL: &str = "observability.openshift.io/log-level";

/// Overrides the workload's rolling-update `maxUnavailable`.
pub const MAX_UNAVAILABLE: &str = "observability.openshift.io/max-unavailable-rollout";

/// Deploys the collector as a deployment rather than a daemon set.
pub const ENABLE_COLLECTOR_AS_DEPLOYMENT: &str =
    "observability.openshift.io/enable-collector-as-deployment";

/// Tells the service CA operator which secret to fill with a serving certificate.
pub const SERVING_CERT_SECRET_NAME: &str = "service.beta.openshift.io/serving-cert-secret-name";

/// The service account a token secret belongs to.
pub const SERVICE_ACCOUNT_NAME: &str = "kubernetes.io/service-account.name";
pub const SERVICE_ACCOUNT_UID: &str = "kubernetes.io/service-account.uid";

/// The MD5 of the generated configuration, stamped onto the collector's pod template.
pub const CONFIG_HASH: &str = "observability.openshift.io/config-hash";

pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Options derived from a forwarder's annotations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    pub debug_output: bool,
    pub log_level: String,
    pub max_unavailable: Option<IntOrString>,
    pub as_deployment: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debug_output: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            max_unavailable: None,
            as_deployment: false,
        }
    }
}

// === impl Options ===

impl Options {
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        let debug_output = annotations
            .get(DEBUG_OUTPUT)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let log_level = annotations
            .get(LOG_LEVEL)
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let max_unavailable = annotations
            .get(MAX_UNAVAILABLE)
            .and_then(|v| parse_int_or_percent(v));

        Self {
            debug_output,
            log_level,
            max_unavailable,
            as_deployment: annotations.contains_key(ENABLE_COLLECTOR_AS_DEPLOYMENT),
        }
    }
}

/// Accepts a positive integer or a percentage in `1%..=100%`.
fn parse_int_or_percent(v: &str) -> Option<IntOrString> {
    let v = v.trim();
    if let Some(pct) = v.strip_suffix('%') {
        let n = pct.parse::<u8>().ok()?;
        if (1..=100).contains(&n) {
            return Some(IntOrString::String(format!("{n}%")));
        }
        tracing::debug!(value = %v, "Ignoring out-of-range max-unavailable percentage");
        return None;
    }
    match v.parse::<i32>() {
        Ok(n) if n > 0 => Some(IntOrString::Int(n)),
        _ => {
            tracing::debug!(value = %v, "Ignoring invalid max-unavailable value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn defaults() {
        assert_eq!(Options::from_annotations(&BTreeMap::new()), Options::default());
        assert_eq!(Options::default().log_level, "warn");
    }

    #[test]
    fn reads_annotations() {
        let opts = Options::from_annotations(&btreemap! {
            DEBUG_OUTPUT.to_string() => "True".to_string(),
            LOG_LEVEL.to_string() => "debug".to_string(),
            MAX_UNAVAILABLE.to_string() => "25%".to_string(),
            ENABLE_COLLECTOR_AS_DEPLOYMENT.to_string() => "".to_string(),
        });
        assert_eq!(
            opts,
            Options {
                debug_output: true,
                log_level: "debug".to_string(),
                max_unavailable: Some(IntOrString::String("25%".to_string())),
                as_deployment: true,
            }
        );
    }

    #[rstest]
    #[case("3", Some(IntOrString::Int(3)))]
    #[case("100%", Some(IntOrString::String("100%".to_string())))]
    #[case("0", None)]
    #[case("101%", None)]
    #[case("half", None)]
    fn max_unavailable(#[case] value: &str, #[case] expected: Option<IntOrString>) {
        assert_eq!(parse_int_or_percent(value), expected);
    }
}
