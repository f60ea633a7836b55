//! Builds the status written back to a forwarder at the end of a reconcile pass.
//!
//! A pass produces a fresh [`ConditionMap`]. Before it is written, it is merged with the stored
//! status so that transition times only move when a condition actually changes, and the
//! aggregate `Ready` condition is derived from the pass outcome.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod readiness;

#[cfg(test)]
mod tests;

pub use self::readiness::{daemonset_readiness, deployment_readiness, Readiness};
use chrono::{DateTime, Utc};
use logging_forwarder_controller_core::{
    conditions::{self, reason, AttributeGroup},
    ConditionMap,
};
use logging_forwarder_controller_k8s_api::{
    self as k8s,
    observability::{Condition, API_VERSION},
    ClusterLogForwarderStatus,
};

/// How a reconcile pass ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The forwarder cannot be deployed and its collector was removed.
    Undeployed(String),

    /// Configuration could not be rendered; resources were left as they were.
    GeneratorFailed(String),

    /// Writing resources to the API server failed.
    ReconcileFailed(String),

    /// Every resource was written; the workload may still be rolling out.
    Deployed(Readiness),
}

const GROUPS: [AttributeGroup; 5] = [
    AttributeGroup::Conditions,
    AttributeGroup::Inputs,
    AttributeGroup::Outputs,
    AttributeGroup::Filters,
    AttributeGroup::Pipelines,
];

/// The aggregate `Ready` condition for a pass.
pub fn ready_condition(outcome: &Outcome) -> Condition {
    match outcome {
        Outcome::Deployed(Readiness::Ready) => {
            Condition::new(conditions::READY, true, reason::RECONCILIATION_COMPLETE, "")
        }
        Outcome::Deployed(Readiness::NotReady(message)) => Condition::new(
            conditions::READY,
            false,
            reason::WORKLOAD_NOT_READY,
            message,
        ),
        Outcome::Undeployed(message) => Condition::new(
            conditions::READY,
            false,
            reason::VALIDATION_FAILURE,
            message,
        ),
        Outcome::GeneratorFailed(message) => Condition::new(
            conditions::READY,
            false,
            reason::GENERATOR_FAILURE,
            message,
        ),
        Outcome::ReconcileFailed(message) => Condition::new(
            conditions::READY,
            false,
            reason::RECONCILIATION_FAILURE,
            message,
        ),
    }
}

/// Produces the status to store for a pass.
///
/// Conditions whose state matches the stored status keep their transition time; all others
/// transition at `now`. Every condition records the generation it was computed for.
pub fn build(
    stored: Option<&ClusterLogForwarderStatus>,
    mut computed: ConditionMap,
    outcome: &Outcome,
    generation: Option<i64>,
    now: DateTime<Utc>,
) -> ClusterLogForwarderStatus {
    computed.set(AttributeGroup::Conditions, ready_condition(outcome));
    let mut status = computed.into_status();
    for group in GROUPS {
        let previous = stored.map(|s| group_of(s, group)).unwrap_or_default();
        for condition in group_of_mut(&mut status, group) {
            condition.observed_generation = generation;
            condition.last_transition_time = previous
                .iter()
                .find(|p| p.same_state(condition))
                .and_then(|p| p.last_transition_time)
                .or(Some(now));
        }
    }
    status
}

/// True when writing `status` would change what is stored.
///
/// Transition times are ignored; they only change alongside the state they describe.
pub fn changed(
    stored: Option<&ClusterLogForwarderStatus>,
    status: &ClusterLogForwarderStatus,
) -> bool {
    let Some(stored) = stored else {
        return true;
    };
    GROUPS.into_iter().any(|group| {
        let (a, b) = (group_of(stored, group), group_of(status, group));
        a.len() != b.len()
            || a.iter().zip(b).any(|(a, b)| {
                !a.same_state(b) || a.observed_generation != b.observed_generation
            })
    })
}

/// A merge patch replacing the forwarder's status.
pub fn patch(name: &str, status: &ClusterLogForwarderStatus) -> k8s::Patch<serde_json::Value> {
    let value = serde_json::json!({
        "apiVersion": API_VERSION,
        "kind": "ClusterLogForwarder",
        "metadata": { "name": name },
        "status": status,
    });
    k8s::Patch::Merge(value)
}

fn group_of(status: &ClusterLogForwarderStatus, group: AttributeGroup) -> &[Condition] {
    match group {
        AttributeGroup::Conditions => &status.conditions,
        AttributeGroup::Inputs => &status.inputs,
        AttributeGroup::Outputs => &status.outputs,
        AttributeGroup::Filters => &status.filters,
        AttributeGroup::Pipelines => &status.pipelines,
    }
}

fn group_of_mut(
    status: &mut ClusterLogForwarderStatus,
    group: AttributeGroup,
) -> &mut Vec<Condition> {
    match group {
        AttributeGroup::Conditions => &mut status.conditions,
        AttributeGroup::Inputs => &mut status.inputs,
        AttributeGroup::Outputs => &mut status.outputs,
        AttributeGroup::Filters => &mut status.filters,
        AttributeGroup::Pipelines => &mut status.pipelines,
    }
}
