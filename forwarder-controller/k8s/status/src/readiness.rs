use logging_forwarder_controller_k8s_api::{DaemonSet, Deployment};

/// Whether the collector workload has rolled out its current template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady(String),
}

pub fn daemonset_readiness(ds: &DaemonSet) -> Readiness {
    let Some(status) = &ds.status else {
        return Readiness::NotReady("collector daemonset has no status".to_string());
    };
    if status.observed_generation < ds.metadata.generation {
        return Readiness::NotReady("collector daemonset update has not been observed".to_string());
    }
    let desired = status.desired_number_scheduled;
    let updated = status.updated_number_scheduled.unwrap_or_default();
    let available = status.number_available.unwrap_or_default();
    if updated < desired || available < desired {
        return Readiness::NotReady(format!(
            "collector daemonset rollout in progress: {updated} of {desired} updated, {available} available"
        ));
    }
    Readiness::Ready
}

pub fn deployment_readiness(deploy: &Deployment) -> Readiness {
    let Some(status) = &deploy.status else {
        return Readiness::NotReady("collector deployment has no status".to_string());
    };
    if status.observed_generation < deploy.metadata.generation {
        return Readiness::NotReady(
            "collector deployment update has not been observed".to_string(),
        );
    }
    let desired = deploy
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let updated = status.updated_replicas.unwrap_or_default();
    let available = status.available_replicas.unwrap_or_default();
    if updated < desired || available < desired {
        return Readiness::NotReady(format!(
            "collector deployment rollout in progress: {updated} of {desired} updated, {available} available"
        ));
    }
    Readiness::Ready
}

// === impl Readiness ===

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}
