use crate::{
    conditions::{self, reason, AttributeGroup, ConditionMap},
    inputs,
};
use logging_forwarder_controller_k8s_api::{
    api::authorization::v1::{ResourceAttributes, SubjectAccessReviewSpec},
    observability::{Condition, InputType, GROUP},
    ClusterLogForwarderSpec, ObjectMeta, SubjectAccessReview,
};
use std::collections::BTreeSet;

/// What the API server reported about the service account's grants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authorization {
    ServiceAccountMissing,

    /// The service account could not be read or reviewed.
    CheckFailed(String),

    /// Access reviews for each required log type were answered.
    Reviewed {
        allowed: BTreeSet<InputType>,
        denied: BTreeSet<InputType>,
    },
}

pub fn service_account_user(namespace: &str, service_account: &str) -> String {
    format!("system:serviceaccount:{namespace}:{service_account}")
}

/// Asks whether the service account may `collect` logs of `log_type` cluster-wide.
pub fn access_review(namespace: &str, service_account: &str, log_type: InputType) -> SubjectAccessReview {
    SubjectAccessReview {
        metadata: ObjectMeta::default(),
        spec: SubjectAccessReviewSpec {
            user: Some(service_account_user(namespace, service_account)),
            resource_attributes: Some(ResourceAttributes {
                group: Some(GROUP.to_string()),
                resource: Some("logs".to_string()),
                verb: Some("collect".to_string()),
                name: Some(log_type.as_str().to_string()),
                namespace: Some(String::new()),
                ..Default::default()
            }),
            ..Default::default()
        },
        status: None,
    }
}

/// Sets the `Authorized` condition and returns the log types that may not be collected.
pub(super) fn validate(
    spec: &ClusterLogForwarderSpec,
    authz: &Authorization,
    conditions: &mut ConditionMap,
) -> BTreeSet<InputType> {
    let sa = &spec.service_account.name;
    let (condition, denied) = match authz {
        Authorization::ServiceAccountMissing => (
            Condition::new(
                conditions::AUTHORIZED,
                false,
                reason::SERVICE_ACCOUNT_DOES_NOT_EXIST,
                format!("service account {sa:?} not found"),
            ),
            BTreeSet::new(),
        ),
        Authorization::CheckFailed(error) => (
            Condition::new(
                conditions::AUTHORIZED,
                false,
                reason::SERVICE_ACCOUNT_CHECK_FAILURE,
                error,
            ),
            BTreeSet::new(),
        ),
        Authorization::Reviewed { allowed, denied } => {
            let (required, receivers) = inputs::required_log_types(spec);
            let denied = required
                .intersection(denied)
                .copied()
                .collect::<BTreeSet<_>>();
            let condition = if !denied.is_empty() {
                Condition::new(
                    conditions::AUTHORIZED,
                    false,
                    reason::CLUSTER_ROLE_MISSING,
                    format!(
                        "insufficient permissions on service account, not authorized to collect {} logs",
                        quoted(&denied)
                    ),
                )
            } else if required.is_empty() && !receivers {
                Condition::new(
                    conditions::AUTHORIZED,
                    false,
                    reason::CLUSTER_ROLE_MISSING,
                    "no inputs were found to evaluate",
                )
            } else {
                let permitted = required
                    .intersection(allowed)
                    .copied()
                    .collect::<BTreeSet<_>>();
                Condition::new(
                    conditions::AUTHORIZED,
                    true,
                    reason::CLUSTER_ROLES_EXIST,
                    format!("permitted to collect log types: {}", quoted(&permitted)),
                )
            };
            (condition, denied)
        }
    };
    conditions.set(AttributeGroup::Conditions, condition);
    denied
}

fn quoted(types: &BTreeSet<InputType>) -> String {
    let names = types
        .iter()
        .map(|t| format!("{:?}", t.as_str()))
        .collect::<Vec<_>>();
    format!("[{}]", names.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_shape() {
        let sar = access_review("openshift-logging", "logcollector", InputType::Audit);
        assert_eq!(
            sar.spec.user.as_deref(),
            Some("system:serviceaccount:openshift-logging:logcollector")
        );
        let attrs = sar.spec.resource_attributes.unwrap();
        assert_eq!(attrs.group.as_deref(), Some("observability.openshift.io"));
        assert_eq!(attrs.resource.as_deref(), Some("logs"));
        assert_eq!(attrs.verb.as_deref(), Some("collect"));
        assert_eq!(attrs.name.as_deref(), Some("audit"));
    }
}
