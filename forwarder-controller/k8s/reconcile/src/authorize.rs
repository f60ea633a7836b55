use crate::Client;
use logging_forwarder_controller_core::{
    inputs,
    validate::{access_review, Authorization},
};
use logging_forwarder_controller_k8s_api::{ClusterLogForwarderSpec, ServiceAccount};
use std::collections::BTreeSet;

/// Checks that the forwarder's service account exists and may collect each log type its inputs
/// read.
///
/// Failures are folded into the returned [`Authorization`] so that they surface as conditions
/// rather than failing the pass.
pub async fn authorize<C: Client>(
    client: &C,
    namespace: &str,
    spec: &ClusterLogForwarderSpec,
) -> Authorization {
    let sa = &spec.service_account.name;
    match client.get::<ServiceAccount>(namespace, sa).await {
        Ok(Some(_)) => {}
        Ok(None) => return Authorization::ServiceAccountMissing,
        Err(error) => return Authorization::CheckFailed(error.to_string()),
    }

    let (required, _) = inputs::required_log_types(spec);
    let mut allowed = BTreeSet::new();
    let mut denied = BTreeSet::new();
    for log_type in required {
        let review = access_review(namespace, sa, log_type);
        match client.review_access(&review).await {
            Ok(true) => {
                allowed.insert(log_type);
            }
            Ok(false) => {
                tracing::info!(service_account = %sa, %log_type, "Collection not permitted");
                denied.insert(log_type);
            }
            Err(error) => return Authorization::CheckFailed(error.to_string()),
        }
    }
    Authorization::Reviewed { allowed, denied }
}
