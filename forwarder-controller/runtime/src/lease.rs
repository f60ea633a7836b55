use crate::k8s::{self, ObjectMeta, Resource};
use anyhow::{anyhow, Result};
use k8s_openapi::api::{apps::v1::Deployment, coordination::v1 as coordv1};
use kube::api::PatchParams;
use logging_forwarder_controller_core::{
    labels::{MANAGED_BY_LABEL, PART_OF_LABEL},
    MANAGED_BY, PART_OF,
};
use std::sync::Arc;
use tokio::{sync::watch, time};

const LEASE_DURATION: time::Duration = time::Duration::from_secs(30);
const RENEW_GRACE_PERIOD: time::Duration = time::Duration::from_secs(1);
const FIELD_MANAGER: &str = "logging-forwarder-controller";

/// How long a standby replica waits before looking at a forwarder again.
pub const STANDBY_REQUEUE: time::Duration = LEASE_DURATION;

/// Claims the write lease for this replica, returning a watch of the current holder.
///
/// Every replica watches forwarders, but only the one holding the claim writes to the cluster.
pub async fn init<T>(
    runtime: &kubert::Runtime<T>,
    operator: &Deployment,
    lease_name: &str,
    hostname: &str,
) -> Result<watch::Receiver<Arc<kubert::lease::Claim>>> {
    let ns = operator
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| anyhow!("operator deployment has no namespace"))?;
    let owner = operator
        .controller_owner_ref(&())
        .ok_or_else(|| anyhow!("operator deployment has no name or uid"))?;

    let lease = coordv1::Lease {
        metadata: ObjectMeta {
            name: Some(lease_name.to_string()),
            namespace: Some(ns.to_string()),
            // Only create the Lease if it does not already exist.
            resource_version: Some("0".to_string()),
            owner_references: Some(vec![owner]),
            labels: Some(
                [(PART_OF_LABEL, PART_OF), (MANAGED_BY_LABEL, MANAGED_BY)]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        spec: None,
    };
    let api = k8s::Api::<coordv1::Lease>::namespaced(runtime.client(), ns);
    match api
        .patch(
            lease_name,
            &PatchParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            },
            &kube::api::Patch::Apply(lease),
        )
        .await
    {
        Ok(lease) => tracing::info!(?lease, "Created Lease resource"),
        Err(k8s::Error::Api(_)) => tracing::debug!("Lease already exists, no need to create it"),
        Err(error) => {
            return Err(error.into());
        }
    };

    let params = kubert::lease::ClaimParams {
        lease_duration: LEASE_DURATION,
        renew_grace_period: RENEW_GRACE_PERIOD,
    };
    let (claims, _task) = kubert::lease::LeaseManager::init(api, lease_name)
        .await?
        .spawn(hostname, params)
        .await?;
    Ok(claims)
}
