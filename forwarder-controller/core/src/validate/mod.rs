//! Structural and semantic validation of a forwarder.
//!
//! Validation never fails outright. Each input, output, filter, and pipeline receives a condition,
//! invalid items are pruned from the returned spec, and a spec-level [`Error`] is reported when the
//! forwarder cannot be deployed at all.

mod filters;
mod inputs;
mod outputs;
mod permissions;
mod pipelines;

pub use self::permissions::{access_review, service_account_user, Authorization};

use crate::{
    conditions::{self, reason, AttributeGroup, ConditionMap},
    ResolvedRefs,
};
use logging_forwarder_controller_k8s_api::{observability::Condition, ClusterLogForwarderSpec};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("service account {0:?} does not exist")]
    ServiceAccountMissing(String),

    #[error("no valid pipelines: {0}")]
    NoValidPipelines(String),

    #[error("{0}")]
    Invalid(String),
}

/// The outcome of validating a forwarder.
#[derive(Clone, Debug, PartialEq)]
pub struct Validation {
    /// The forwarder with every invalid item removed.
    pub spec: ClusterLogForwarderSpec,
    pub conditions: ConditionMap,
    pub error: Option<Error>,
}

/// Why a single item failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Failure {
    reason: &'static str,
    messages: Vec<String>,
}

/// Names of the items that passed validation.
#[derive(Debug, Default)]
struct Valid {
    inputs: BTreeSet<String>,
    outputs: BTreeSet<String>,
    filters: BTreeSet<String>,
}

pub fn validate(
    spec: &ClusterLogForwarderSpec,
    refs: &ResolvedRefs,
    authz: &Authorization,
) -> Validation {
    let mut conditions = ConditionMap::default();

    let denied = permissions::validate(spec, authz, &mut conditions);
    let valid = Valid {
        inputs: inputs::validate(spec, refs, &mut conditions),
        outputs: outputs::validate(spec, refs, &mut conditions),
        filters: filters::validate(spec, &mut conditions),
    };
    let pipelines = pipelines::validate(spec, &valid, &denied, &mut conditions);

    let referenced_outputs = pipelines
        .iter()
        .flat_map(|p| p.output_refs.iter())
        .collect::<BTreeSet<_>>();
    let effective = ClusterLogForwarderSpec {
        inputs: spec
            .inputs
            .iter()
            .filter(|i| valid.inputs.contains(&i.name))
            .cloned()
            .collect(),
        outputs: spec
            .outputs
            .iter()
            .filter(|o| referenced_outputs.contains(&o.name))
            .cloned()
            .collect(),
        filters: spec
            .filters
            .iter()
            .filter(|f| valid.filters.contains(&f.name))
            .cloned()
            .collect(),
        pipelines,
        ..spec.clone()
    };

    let error = if matches!(authz, Authorization::ServiceAccountMissing) {
        Some(Error::ServiceAccountMissing(
            spec.service_account.name.clone(),
        ))
    } else if effective.pipelines.is_empty() {
        let messages = conditions.failure_messages();
        Some(Error::NoValidPipelines(if messages.is_empty() {
            "at least one pipeline is required".to_string()
        } else {
            messages.join("; ")
        }))
    } else if conditions.has_failures() {
        Some(Error::Invalid(conditions.failure_messages().join("; ")))
    } else {
        None
    };

    let spec_condition = match &error {
        None => Condition::new(
            conditions::VALID,
            true,
            reason::VALIDATION_SUCCESS,
            "",
        ),
        Some(e) => Condition::new(conditions::VALID, false, reason::VALIDATION_FAILURE, e),
    };
    conditions.set(AttributeGroup::Conditions, spec_condition);

    Validation {
        spec: effective,
        conditions,
        error,
    }
}

// === impl Error ===

impl Error {
    /// True when the collector must be removed rather than left running a stale configuration.
    pub fn must_undeploy(&self) -> bool {
        matches!(self, Self::ServiceAccountMissing(_) | Self::NoValidPipelines(_))
    }
}

// === impl Failure ===

impl Failure {
    fn new(reason: &'static str) -> Self {
        Self {
            reason,
            messages: Vec::new(),
        }
    }

    fn push(&mut self, message: impl ToString) {
        self.messages.push(message.to_string());
    }

    /// Records a missing object, which takes precedence over any other reason.
    fn missing(&mut self, message: impl ToString) {
        self.reason = reason::MISSING_REFERENCE;
        self.push(message);
    }

    fn into_result(self) -> Result<(), Self> {
        if self.messages.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    fn message(&self) -> String {
        self.messages.join(", ")
    }
}

/// Checks `r` against the resolved objects.
fn check_ref(r: &crate::KeyRef, refs: &ResolvedRefs, failure: &mut Failure) {
    match refs.lookup(r) {
        crate::refs::Lookup::Found => {}
        crate::refs::Lookup::MissingObject => {
            let kind = match r {
                crate::KeyRef::Secret { .. } => "secret",
                crate::KeyRef::ConfigMap { .. } => "configmap",
            };
            failure.missing(format!("{kind} {:?} not found", r.name()));
        }
        crate::refs::Lookup::MissingKey => {
            failure.push(format!("{r} is missing"));
        }
    }
}
