use logging_forwarder_controller_core::{
    labels::{MANAGED_BY_LABEL, PART_OF_LABEL},
    MANAGED_BY, PART_OF,
};
use logging_forwarder_controller_k8s_api::{
    monitoring::{PrometheusRule, PrometheusRuleSpec},
    ObjectMeta,
};

pub const ALERT_RULES_NAME: &str = "collector";

const RULES: &str = include_str!("../assets/collector-alerts.yaml");

/// The collector alerting and recording rules, registered once in the operator's namespace.
pub fn alert_rules(namespace: &str) -> Result<PrometheusRule, serde_yaml::Error> {
    let spec = serde_yaml::from_str::<PrometheusRuleSpec>(RULES)?;
    let mut rules = PrometheusRule::new(ALERT_RULES_NAME, spec);
    rules.metadata = ObjectMeta {
        name: Some(ALERT_RULES_NAME.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(
            [(PART_OF_LABEL, PART_OF), (MANAGED_BY_LABEL, MANAGED_BY)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        ..Default::default()
    };
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_parse() {
        let rules = alert_rules("openshift-logging").expect("embedded rules must parse");
        assert_eq!(rules.metadata.namespace.as_deref(), Some("openshift-logging"));
        let alerts = rules
            .spec
            .groups
            .iter()
            .flat_map(|g| g.rules.iter())
            .filter_map(|r| r.alert.as_deref())
            .collect::<Vec<_>>();
        assert!(alerts.contains(&"CollectorNodeDown"), "{alerts:?}");
        assert!(rules
            .spec
            .groups
            .iter()
            .flat_map(|g| g.rules.iter())
            .all(|r| !r.expr.trim().is_empty()));
    }
}
