//! Condition types and reasons reported on a forwarder, grouped by the status field they land in.

use logging_forwarder_controller_k8s_api::{
    observability::{Condition, ConditionStatus},
    ClusterLogForwarderStatus,
};

pub const READY: &str = "Ready";
pub const AUTHORIZED: &str = "observability.openshift.io/Authorized";
pub const VALID: &str = "observability.openshift.io/Valid";
pub const MIGRATE: &str = "observability.openshift.io/Migrate";

pub const VALID_INPUT_PREFIX: &str = "observability.openshift.io/ValidInput";
pub const VALID_OUTPUT_PREFIX: &str = "observability.openshift.io/ValidOutput";
pub const VALID_FILTER_PREFIX: &str = "observability.openshift.io/ValidFilter";
pub const VALID_PIPELINE_PREFIX: &str = "observability.openshift.io/ValidPipeline";

pub mod reason {
    pub const VALIDATION_SUCCESS: &str = "ValidationSuccess";
    pub const VALIDATION_FAILURE: &str = "ValidationFailure";
    pub const MISSING_REFERENCE: &str = "MissingReference";
    pub const SERVICE_ACCOUNT_DOES_NOT_EXIST: &str = "ServiceAccountDoesNotExist";
    pub const SERVICE_ACCOUNT_CHECK_FAILURE: &str = "ServiceAccountCheckFailure";
    pub const CLUSTER_ROLE_MISSING: &str = "ClusterRoleMissing";
    pub const CLUSTER_ROLES_EXIST: &str = "ClusterRolesExist";
    pub const MIGRATE_OUTPUT: &str = "MigrateOutput";
    pub const RECONCILIATION_COMPLETE: &str = "ReconciliationComplete";
    pub const RECONCILIATION_FAILURE: &str = "ReconciliationFailure";
    pub const GENERATOR_FAILURE: &str = "GeneratorFailure";
    pub const WORKLOAD_NOT_READY: &str = "WorkloadNotReady";
}

/// The status field a condition belongs in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeGroup {
    Conditions,
    Inputs,
    Outputs,
    Pipelines,
    Filters,
}

/// Conditions computed during a pass, before they are merged into the stored status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConditionMap {
    conditions: Vec<Condition>,
    inputs: Vec<Condition>,
    outputs: Vec<Condition>,
    pipelines: Vec<Condition>,
    filters: Vec<Condition>,
}

/// Builds the condition type for a named input, output, filter, or pipeline.
pub fn named(prefix: &str, name: &str) -> String {
    format!("{prefix}-{name}")
}

pub fn valid(prefix: &str, name: &str, message: impl ToString) -> Condition {
    Condition::new(
        named(prefix, name),
        true,
        reason::VALIDATION_SUCCESS,
        message,
    )
}

pub fn invalid(prefix: &str, name: &str, reason: &str, message: impl ToString) -> Condition {
    Condition::new(named(prefix, name), false, reason, message)
}

// === impl ConditionMap ===

impl ConditionMap {
    /// Sets `condition` in `group`, replacing any condition of the same type.
    pub fn set(&mut self, group: AttributeGroup, condition: Condition) {
        let list = self.group_mut(group);
        match list.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(c) => *c = condition,
            None => list.push(condition),
        }
    }

    pub fn get(&self, group: AttributeGroup, type_: &str) -> Option<&Condition> {
        self.group(group).iter().find(|c| c.type_ == type_)
    }

    pub fn group(&self, group: AttributeGroup) -> &[Condition] {
        match group {
            AttributeGroup::Conditions => &self.conditions,
            AttributeGroup::Inputs => &self.inputs,
            AttributeGroup::Outputs => &self.outputs,
            AttributeGroup::Pipelines => &self.pipelines,
            AttributeGroup::Filters => &self.filters,
        }
    }

    fn group_mut(&mut self, group: AttributeGroup) -> &mut Vec<Condition> {
        match group {
            AttributeGroup::Conditions => &mut self.conditions,
            AttributeGroup::Inputs => &mut self.inputs,
            AttributeGroup::Outputs => &mut self.outputs,
            AttributeGroup::Pipelines => &mut self.pipelines,
            AttributeGroup::Filters => &mut self.filters,
        }
    }

    /// True when any condition outside the top-level group is false.
    pub fn has_failures(&self) -> bool {
        [
            &self.inputs,
            &self.outputs,
            &self.pipelines,
            &self.filters,
        ]
        .into_iter()
        .flatten()
        .any(|c| c.status == ConditionStatus::False)
    }

    /// Messages of the false conditions outside the top-level group, in group order.
    pub fn failure_messages(&self) -> Vec<String> {
        [
            &self.inputs,
            &self.outputs,
            &self.filters,
            &self.pipelines,
        ]
        .into_iter()
        .flatten()
        .filter(|c| c.status == ConditionStatus::False)
        .map(|c| c.message.clone())
        .collect()
    }

    pub fn into_status(self) -> ClusterLogForwarderStatus {
        ClusterLogForwarderStatus {
            conditions: self.conditions,
            inputs: self.inputs,
            outputs: self.outputs,
            filters: self.filters,
            pipelines: self.pipelines,
        }
    }
}
