use super::Failure;
use crate::conditions::{self, reason, AttributeGroup, ConditionMap};
use logging_forwarder_controller_k8s_api::{
    observability::{filter::PruneFilter, FilterSpec, FilterType},
    ClusterLogForwarderSpec,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Dot-delimited paths whose segments are identifiers or quoted strings, e.g.
/// `.kubernetes.namespace_name` or `.kubernetes.labels."app.kubernetes.io/name"`.
static FIELD_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(\.[a-zA-Z0-9_]+|\."[^"]+")(\.[a-zA-Z0-9_]+|\."[^"]+")*$"#)
        .expect("field path regex")
});

/// Fields every record must keep.
const REQUIRED_FIELDS: [&str; 3] = [".log_type", ".log_source", ".message"];

pub(super) fn validate(
    spec: &ClusterLogForwarderSpec,
    conditions: &mut ConditionMap,
) -> BTreeSet<String> {
    let mut valid = BTreeSet::new();
    let mut names = BTreeSet::new();
    for filter in &spec.filters {
        let mut failure = Failure::new(reason::VALIDATION_FAILURE);
        if !names.insert(filter.name.as_str()) {
            failure.push(format!("filter name {:?} is not unique", filter.name));
        }
        match filter.type_ {
            FilterType::Drop => validate_drop(filter, &mut failure),
            FilterType::Prune => validate_prune(filter.prune.as_ref(), &mut failure),
            FilterType::AddLabels => {
                if filter.add_labels.is_empty() {
                    failure.push("openshiftLabels must not be empty");
                }
            }
            FilterType::DetectMultiline | FilterType::KubeApiAudit | FilterType::Parse => {}
        }

        let condition = match failure.into_result() {
            Ok(()) => {
                valid.insert(filter.name.clone());
                conditions::valid(
                    conditions::VALID_FILTER_PREFIX,
                    &filter.name,
                    format!("filter {:?} is valid", filter.name),
                )
            }
            Err(f) => conditions::invalid(
                conditions::VALID_FILTER_PREFIX,
                &filter.name,
                f.reason,
                format!("{}: {}", filter.name, f.message()),
            ),
        };
        conditions.set(AttributeGroup::Filters, condition);
    }
    valid
}

fn validate_drop(filter: &FilterSpec, failure: &mut Failure) {
    if filter.drop.is_empty() {
        failure.push("drop filter must have at least one test");
    }
    for (i, test) in filter.drop.iter().enumerate() {
        for condition in &test.conditions {
            if let Some(error) = field_path_error(&condition.field) {
                failure.push(format!("test[{i}]: {error}"));
            }
            let pattern = match (&condition.matches, &condition.not_matches) {
                (Some(m), None) | (None, Some(m)) => m,
                _ => {
                    failure.push(format!(
                        "test[{i}]: exactly one of matches or notMatches must be defined"
                    ));
                    continue;
                }
            };
            if Regex::new(pattern).is_err() {
                failure.push(format!(
                    "test[{i}]: {pattern:?} must be a valid regular expression"
                ));
            }
        }
    }
}

fn validate_prune(prune: Option<&PruneFilter>, failure: &mut Failure) {
    let Some(prune) = prune.filter(|p| !p.r#in.is_empty() || !p.not_in.is_empty()) else {
        failure.push("prune filter must have one or both of `in`, `notIn`");
        return;
    };
    for path in prune.r#in.iter().chain(prune.not_in.iter()) {
        if let Some(error) = field_path_error(path) {
            failure.push(error);
        }
    }

    let removed = REQUIRED_FIELDS
        .iter()
        .filter(|f| prune.r#in.iter().any(|p| p == *f))
        .collect::<Vec<_>>();
    if !removed.is_empty() {
        failure.push(format!(
            "{removed:?} is/are required fields and must be removed from the `in` list"
        ));
    }

    if !prune.not_in.is_empty() {
        let missing = REQUIRED_FIELDS
            .iter()
            .filter(|f| !prune.not_in.iter().any(|p| p == *f))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            failure.push(format!(
                "{missing:?} is/are required fields and must be included in the `notIn` list"
            ));
        }
    }
}

fn field_path_error(path: &str) -> Option<String> {
    if !path.starts_with('.') {
        return Some(format!("{path:?} must start with a '.'"));
    }
    if !FIELD_PATH.is_match(path) {
        return Some(format!(
            "{path:?} must be a valid dot delimited path expression (.kubernetes.container_name or .kubernetes.\"test-foo\")"
        ));
    }
    None
}
