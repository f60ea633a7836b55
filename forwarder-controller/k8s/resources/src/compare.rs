//! Semantic comparison of observed and desired resources.
//!
//! Observed objects carry server-populated fields and defaults that desired objects never
//! set, so comparisons check that the desired state is present rather than that the objects are
//! equal. Labels and annotations use subset semantics: extra keys added by other controllers
//! are tolerated.

use logging_forwarder_controller_k8s_api::{
    api::core::v1::PodTemplateSpec,
    monitoring::{PrometheusRule, ServiceMonitor},
    security::SecurityContextConstraints,
    ClusterRoleBinding, ConfigMap, DaemonSet, Deployment, NetworkPolicy, ObjectMeta, Resource,
    Role, RoleBinding, Secret, Service, ServiceAccount,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{collections::BTreeMap, fmt};

/// The outcome of comparing an observed resource with its desired state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comparison {
    pub equal: bool,
    /// Why the resources differ, for logging.
    pub reason: Option<String>,
}

/// A resource kind that can be compared with and converged onto its desired state.
pub trait Managed:
    Resource<DynamicType = ()> + Clone + fmt::Debug + Serialize + DeserializeOwned
{
    fn compare(observed: &Self, desired: &Self) -> Comparison;

    /// Applies the desired state onto the observed object, preserving server-populated fields.
    fn merge(observed: Self, desired: &Self) -> Self;
}

/// True when `observed` carries every owner reference that `desired` declares.
pub fn owned_by(observed: &ObjectMeta, desired: &ObjectMeta) -> bool {
    let observed = observed.owner_references.as_deref().unwrap_or_default();
    desired
        .owner_references
        .iter()
        .flatten()
        .all(|d| observed.iter().any(|o| o.uid == d.uid && o.kind == d.kind))
}

// === impl Comparison ===

impl Comparison {
    pub fn equal() -> Self {
        Self {
            equal: true,
            reason: None,
        }
    }

    pub fn differs(reason: impl ToString) -> Self {
        Self {
            equal: false,
            reason: Some(reason.to_string()),
        }
    }

    /// Records the first failed check.
    fn check(self, ok: bool, reason: &str) -> Self {
        if self.equal && !ok {
            return Self::differs(reason);
        }
        self
    }

    fn meta(self, observed: &ObjectMeta, desired: &ObjectMeta) -> Self {
        self.check(
            is_subset_map(&observed.labels, &desired.labels),
            "labels differ",
        )
        .check(
            is_subset_map(&observed.annotations, &desired.annotations),
            "annotations differ",
        )
        .check(owned_by(observed, desired), "owner differs")
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => f.write_str(reason),
            None => f.write_str("equal"),
        }
    }
}

fn is_subset_map(
    observed: &Option<BTreeMap<String, String>>,
    desired: &Option<BTreeMap<String, String>>,
) -> bool {
    let observed = observed.as_ref();
    desired
        .iter()
        .flatten()
        .all(|(k, v)| observed.and_then(|o| o.get(k)) == Some(v))
}

/// Copies desired labels, annotations, and owner references onto `observed`, keeping keys that
/// other controllers added.
fn merge_meta(observed: &mut ObjectMeta, desired: &ObjectMeta) {
    for (target, source) in [
        (&mut observed.labels, &desired.labels),
        (&mut observed.annotations, &desired.annotations),
    ] {
        if let Some(source) = source {
            target
                .get_or_insert_with(Default::default)
                .extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    if let Some(owners) = &desired.owner_references {
        let existing = observed.owner_references.get_or_insert_with(Default::default);
        for owner in owners {
            existing.retain(|o| o.uid != owner.uid);
            existing.push(owner.clone());
        }
    }
}

/// True when every field set in `desired` has the same value in `observed`.
///
/// Absent, null, and empty desired values match anything, so fields the API server defaults
/// are tolerated. Arrays must have the same length so that removals are detected.
fn is_subset(observed: &serde_json::Value, desired: &serde_json::Value) -> bool {
    use serde_json::Value;
    match (observed, desired) {
        (_, Value::Null) => true,
        (Value::Object(o), Value::Object(d)) => d.iter().all(|(k, dv)| match o.get(k) {
            Some(ov) => is_subset(ov, dv),
            None => is_empty(dv),
        }),
        (Value::Array(o), Value::Array(d)) => {
            o.len() == d.len() && o.iter().zip(d).all(|(ov, dv)| is_subset(ov, dv))
        }
        (Value::Null, d) => is_empty(d),
        (o, d) => o == d,
    }
}

fn is_empty(v: &serde_json::Value) -> bool {
    match v {
        serde_json::Value::Null => true,
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn json_subset<T: Serialize>(observed: &T, desired: &T) -> bool {
    match (serde_json::to_value(observed), serde_json::to_value(desired)) {
        (Ok(o), Ok(d)) => is_subset(&o, &d),
        _ => false,
    }
}

fn sorted(items: &Option<Vec<String>>) -> Vec<&str> {
    let mut items = items.iter().flatten().map(String::as_str).collect::<Vec<_>>();
    items.sort_unstable();
    items
}

// === impl Managed ===

impl Managed for SecurityContextConstraints {
    fn compare(o: &Self, d: &Self) -> Comparison {
        Comparison::equal()
            .check(o.priority == d.priority, "priority differs")
            .check(
                o.allow_privileged_container == d.allow_privileged_container,
                "allowPrivilegedContainer differs",
            )
            .check(
                sorted(&o.required_drop_capabilities) == sorted(&d.required_drop_capabilities),
                "requiredDropCapabilities differ",
            )
            .check(
                o.allow_host_dir_volume_plugin == d.allow_host_dir_volume_plugin,
                "allowHostDirVolumePlugin differs",
            )
            .check(sorted(&o.volumes) == sorted(&d.volumes), "volumes differ")
            .check(
                o.default_allow_privilege_escalation == d.default_allow_privilege_escalation,
                "defaultAllowPrivilegeEscalation differs",
            )
            .check(
                o.allow_privilege_escalation == d.allow_privilege_escalation,
                "allowPrivilegeEscalation differs",
            )
            .check(o.run_as_user == d.run_as_user, "runAsUser differs")
            .check(o.se_linux_context == d.se_linux_context, "seLinuxContext differs")
            .check(
                o.read_only_root_filesystem == d.read_only_root_filesystem,
                "readOnlyRootFilesystem differs",
            )
            .check(
                sorted(&o.forbidden_sysctls) == sorted(&d.forbidden_sysctls),
                "forbiddenSysctls differ",
            )
            .check(
                sorted(&o.seccomp_profiles) == sorted(&d.seccomp_profiles),
                "seccompProfiles differ",
            )
    }

    fn merge(observed: Self, desired: &Self) -> Self {
        let mut metadata = observed.metadata;
        merge_meta(&mut metadata, &desired.metadata);
        Self {
            metadata,
            ..desired.clone()
        }
    }
}

impl Managed for ServiceAccount {
    fn compare(o: &Self, d: &Self) -> Comparison {
        let finalizers = o.metadata.finalizers.as_deref().unwrap_or_default();
        Comparison::equal().meta(&o.metadata, &d.metadata).check(
            d.metadata
                .finalizers
                .iter()
                .flatten()
                .all(|f| finalizers.contains(f)),
            "finalizers differ",
        )
    }

    fn merge(mut observed: Self, desired: &Self) -> Self {
        merge_meta(&mut observed.metadata, &desired.metadata);
        let finalizers = observed.metadata.finalizers.get_or_insert_with(Default::default);
        for f in desired.metadata.finalizers.iter().flatten() {
            if !finalizers.contains(f) {
                finalizers.push(f.clone());
            }
        }
        observed
    }
}

/// Data is only compared when the desired object declares it, so that objects filled in by
/// other controllers keep their contents.
impl Managed for Secret {
    fn compare(o: &Self, d: &Self) -> Comparison {
        Comparison::equal()
            .check(d.data.is_none() || o.data == d.data, "data differs")
            .check(d.type_.is_none() || o.type_ == d.type_, "type differs")
            .meta(&o.metadata, &d.metadata)
    }

    fn merge(mut observed: Self, desired: &Self) -> Self {
        merge_meta(&mut observed.metadata, &desired.metadata);
        if desired.data.is_some() {
            observed.data = desired.data.clone();
        }
        observed
    }
}

impl Managed for ConfigMap {
    fn compare(o: &Self, d: &Self) -> Comparison {
        Comparison::equal()
            .check(d.data.is_none() || o.data == d.data, "data differs")
            .meta(&o.metadata, &d.metadata)
    }

    fn merge(mut observed: Self, desired: &Self) -> Self {
        merge_meta(&mut observed.metadata, &desired.metadata);
        if desired.data.is_some() {
            observed.data = desired.data.clone();
        }
        observed
    }
}

impl Managed for Service {
    fn compare(o: &Self, d: &Self) -> Comparison {
        let (os, ds) = (o.spec.clone().unwrap_or_default(), d.spec.clone().unwrap_or_default());
        Comparison::equal()
            .check(os.selector == ds.selector, "selector differs")
            .check(json_subset(&os.ports, &ds.ports), "ports differ")
            .meta(&o.metadata, &d.metadata)
    }

    fn merge(mut observed: Self, desired: &Self) -> Self {
        merge_meta(&mut observed.metadata, &desired.metadata);
        let desired = desired.spec.clone().unwrap_or_default();
        let spec = observed.spec.get_or_insert_with(Default::default);
        spec.selector = desired.selector;
        spec.ports = desired.ports;
        observed
    }
}

impl Managed for ServiceMonitor {
    fn compare(o: &Self, d: &Self) -> Comparison {
        Comparison::equal()
            .check(o.spec == d.spec, "spec differs")
            .meta(&o.metadata, &d.metadata)
    }

    fn merge(mut observed: Self, desired: &Self) -> Self {
        merge_meta(&mut observed.metadata, &desired.metadata);
        observed.spec = desired.spec.clone();
        observed
    }
}

impl Managed for PrometheusRule {
    fn compare(o: &Self, d: &Self) -> Comparison {
        Comparison::equal()
            .check(o.spec == d.spec, "spec differs")
            .meta(&o.metadata, &d.metadata)
    }

    fn merge(mut observed: Self, desired: &Self) -> Self {
        merge_meta(&mut observed.metadata, &desired.metadata);
        observed.spec = desired.spec.clone();
        observed
    }
}

impl Managed for ClusterRoleBinding {
    fn compare(o: &Self, d: &Self) -> Comparison {
        Comparison::equal()
            .check(o.role_ref == d.role_ref, "roleRef differs")
            .check(o.subjects == d.subjects, "subjects differ")
            .meta(&o.metadata, &d.metadata)
    }

    fn merge(mut observed: Self, desired: &Self) -> Self {
        merge_meta(&mut observed.metadata, &desired.metadata);
        observed.role_ref = desired.role_ref.clone();
        observed.subjects = desired.subjects.clone();
        observed
    }
}

impl Managed for Role {
    fn compare(o: &Self, d: &Self) -> Comparison {
        Comparison::equal()
            .check(json_subset(&o.rules, &d.rules), "rules differ")
            .meta(&o.metadata, &d.metadata)
    }

    fn merge(mut observed: Self, desired: &Self) -> Self {
        merge_meta(&mut observed.metadata, &desired.metadata);
        observed.rules = desired.rules.clone();
        observed
    }
}

impl Managed for RoleBinding {
    fn compare(o: &Self, d: &Self) -> Comparison {
        Comparison::equal()
            .check(o.role_ref == d.role_ref, "roleRef differs")
            .check(o.subjects == d.subjects, "subjects differ")
            .meta(&o.metadata, &d.metadata)
    }

    fn merge(mut observed: Self, desired: &Self) -> Self {
        merge_meta(&mut observed.metadata, &desired.metadata);
        observed.role_ref = desired.role_ref.clone();
        observed.subjects = desired.subjects.clone();
        observed
    }
}

impl Managed for NetworkPolicy {
    fn compare(o: &Self, d: &Self) -> Comparison {
        Comparison::equal()
            .check(json_subset(&o.spec, &d.spec), "spec differs")
            .meta(&o.metadata, &d.metadata)
    }

    fn merge(mut observed: Self, desired: &Self) -> Self {
        merge_meta(&mut observed.metadata, &desired.metadata);
        observed.spec = desired.spec.clone();
        observed
    }
}

/// Scheduling fields where an entry removed from the desired state must also disappear from
/// the observed state.
fn same_scheduling(
    observed: Option<&PodTemplateSpec>,
    desired: Option<&PodTemplateSpec>,
) -> bool {
    let spec = |t: Option<&PodTemplateSpec>| {
        let s = t.and_then(|t| t.spec.clone()).unwrap_or_default();
        (
            s.node_selector.unwrap_or_default(),
            s.tolerations.unwrap_or_default(),
            s.affinity,
        )
    };
    spec(observed) == spec(desired)
}

impl Managed for DaemonSet {
    fn compare(o: &Self, d: &Self) -> Comparison {
        fn template(ds: &DaemonSet) -> Option<&PodTemplateSpec> {
            ds.spec.as_ref().map(|s| &s.template)
        }
        Comparison::equal()
            .check(
                same_scheduling(template(o), template(d)),
                "scheduling differs",
            )
            .check(json_subset(&o.spec, &d.spec), "spec differs")
            .meta(&o.metadata, &d.metadata)
    }

    fn merge(mut observed: Self, desired: &Self) -> Self {
        merge_meta(&mut observed.metadata, &desired.metadata);
        observed.spec = desired.spec.clone();
        observed
    }
}

impl Managed for Deployment {
    fn compare(o: &Self, d: &Self) -> Comparison {
        fn template(d: &Deployment) -> Option<&PodTemplateSpec> {
            d.spec.as_ref().map(|s| &s.template)
        }
        Comparison::equal()
            .check(
                same_scheduling(template(o), template(d)),
                "scheduling differs",
            )
            .check(json_subset(&o.spec, &d.spec), "spec differs")
            .meta(&o.metadata, &d.metadata)
    }

    fn merge(mut observed: Self, desired: &Self) -> Self {
        merge_meta(&mut observed.metadata, &desired.metadata);
        let replicas = observed.spec.as_ref().and_then(|s| s.replicas);
        observed.spec = desired.spec.clone();
        if let Some(spec) = observed.spec.as_mut() {
            spec.replicas = spec.replicas.or(replicas);
        }
        observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subset_tolerates_defaults() {
        let observed = json!({
            "a": 1,
            "b": { "c": "x", "defaulted": true },
            "list": [{ "name": "n", "extra": 2 }],
        });
        assert!(is_subset(&observed, &json!({ "b": { "c": "x" } })));
        assert!(is_subset(&observed, &json!({ "list": [{ "name": "n" }], "missing": [] })));
        assert!(!is_subset(&observed, &json!({ "list": [] })));
        assert!(!is_subset(&observed, &json!({ "b": { "c": "y" } })));
        assert!(!is_subset(&observed, &json!({ "missing": "value" })));
    }

    #[test]
    fn labels_are_a_subset() {
        let desired = ObjectMeta {
            labels: Some([("a".to_string(), "1".to_string())].into()),
            ..Default::default()
        };
        let mut observed = ObjectMeta {
            labels: Some(
                [
                    ("a".to_string(), "1".to_string()),
                    ("b".to_string(), "2".to_string()),
                ]
                .into(),
            ),
            ..Default::default()
        };
        assert!(Comparison::equal().meta(&observed, &desired).equal);

        observed.labels = Some([("a".to_string(), "2".to_string())].into());
        let cmp = Comparison::equal().meta(&observed, &desired);
        assert_eq!(cmp, Comparison::differs("labels differ"));
    }
}
