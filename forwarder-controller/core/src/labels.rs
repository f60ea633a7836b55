//! The standard identity labels stamped onto every collector resource.

use crate::{COMPONENT, MANAGED_BY, PART_OF};
use logging_forwarder_controller_k8s_api::observability::CollectorType;
use std::collections::BTreeMap;

pub const NAME: &str = "app.kubernetes.io/name";
pub const INSTANCE: &str = "app.kubernetes.io/instance";
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const VERSION: &str = "app.kubernetes.io/version";

/// Marks a service as fronting a receiver input; the value is the receiver type.
pub const INPUT_SERVICE_TYPE: &str = "logging-input-service-type";

/// Asks the platform to inject the cluster's trusted CA bundle into a ConfigMap.
pub const INJECT_TRUSTED_CA_BUNDLE: &str = "config.openshift.io/inject-trusted-cabundle";

/// Identifies the collector for one forwarder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub collector: CollectorType,
    pub instance: String,
    pub version: String,
}

// === impl Identity ===

impl Identity {
    pub fn new(collector: CollectorType, instance: impl ToString, version: impl ToString) -> Self {
        Self {
            collector,
            instance: instance.to_string(),
            version: version.to_string(),
        }
    }

    /// All six identity labels.
    pub fn labels(&self) -> BTreeMap<String, String> {
        [
            (NAME, self.collector.as_str()),
            (INSTANCE, self.instance.as_str()),
            (COMPONENT_LABEL, COMPONENT),
            (PART_OF_LABEL, PART_OF),
            (MANAGED_BY_LABEL, MANAGED_BY),
            (VERSION, self.version.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// The subset of labels that selects this forwarder's collector pods.
    ///
    /// Excludes the version so that selectors survive operator upgrades.
    pub fn selector(&self) -> BTreeMap<String, String> {
        [
            (COMPONENT_LABEL, COMPONENT),
            (INSTANCE, self.instance.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Adds the identity labels to `labels`, overwriting any existing values.
    pub fn apply(&self, labels: &mut BTreeMap<String, String>) {
        labels.extend(self.labels());
    }

    /// True when `labels` carries every identity label with the expected value.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.labels()
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    #[test]
    fn identity_labels() {
        let id = Identity::new(CollectorType::Vector, "collector", "6.2.0");
        assert_eq!(
            id.labels(),
            btreemap! {
                "app.kubernetes.io/component".to_string() => "collector".to_string(),
                "app.kubernetes.io/instance".to_string() => "collector".to_string(),
                "app.kubernetes.io/managed-by".to_string() => "cluster-logging-operator".to_string(),
                "app.kubernetes.io/name".to_string() => "vector".to_string(),
                "app.kubernetes.io/part-of".to_string() => "cluster-logging".to_string(),
                "app.kubernetes.io/version".to_string() => "6.2.0".to_string(),
            }
        );
    }

    #[test]
    fn apply_then_match() {
        let id = Identity::new(CollectorType::Fluentd, "fwd", "1");
        let mut labels = btreemap! {
            "app.kubernetes.io/instance".to_string() => "other".to_string(),
            "extra".to_string() => "kept".to_string(),
        };
        assert!(!id.matches(&labels));
        id.apply(&mut labels);
        assert!(id.matches(&labels));
        assert_eq!(labels["extra"], "kept");
    }
}
