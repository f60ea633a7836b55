use super::{Failure, Valid};
use crate::{
    conditions::{self, reason, AttributeGroup, ConditionMap},
    inputs,
};
use logging_forwarder_controller_k8s_api::{
    observability::{InputType, PipelineSpec},
    ClusterLogForwarderSpec,
};
use std::collections::BTreeSet;

/// Validates pipelines against the items that passed validation and returns the pipelines that
/// can still be deployed.
///
/// References to invalid inputs or outputs, and inputs whose log type the service account may
/// not collect, are removed from a pipeline. A pipeline left without inputs or outputs, or one
/// that references an invalid filter, is dropped.
pub(super) fn validate(
    spec: &ClusterLogForwarderSpec,
    valid: &Valid,
    denied: &BTreeSet<InputType>,
    conditions: &mut ConditionMap,
) -> Vec<PipelineSpec> {
    let mut pipelines = Vec::new();
    let mut names = BTreeSet::new();

    for pipeline in &spec.pipelines {
        let mut failure = Failure::new(reason::VALIDATION_FAILURE);
        let mut fatal = false;

        if pipeline.name.is_empty() {
            failure.push("pipeline name must not be empty");
            fatal = true;
        }
        if !names.insert(pipeline.name.as_str()) {
            failure.push(format!("pipeline name {:?} is not unique", pipeline.name));
            fatal = true;
        }

        let input_refs = pipeline
            .input_refs
            .iter()
            .filter(|name| input_ok(spec, name, valid, denied, &mut failure))
            .cloned()
            .collect::<Vec<_>>();
        if pipeline.input_refs.is_empty() {
            failure.push("inputRefs must not be empty");
        }

        let output_refs = pipeline
            .output_refs
            .iter()
            .filter(|name| {
                if valid.outputs.contains(*name) {
                    return true;
                }
                if spec.output(name).is_some() {
                    failure.push(format!("output {name:?} is invalid"));
                } else {
                    failure.push(format!("output {name:?} is not declared"));
                }
                false
            })
            .cloned()
            .collect::<Vec<_>>();
        if pipeline.output_refs.is_empty() {
            failure.push("outputRefs must not be empty");
        }

        for name in &pipeline.filter_refs {
            if !valid.filters.contains(name) {
                fatal = true;
                if spec.filter(name).is_some() {
                    failure.push(format!("filter {name:?} is invalid"));
                } else {
                    failure.push(format!("filter {name:?} is not declared"));
                }
            }
        }

        let deployable = !fatal && !input_refs.is_empty() && !output_refs.is_empty();
        let condition = match failure.into_result() {
            Ok(()) => conditions::valid(
                conditions::VALID_PIPELINE_PREFIX,
                &pipeline.name,
                format!("pipeline {:?} is valid", pipeline.name),
            ),
            Err(f) => {
                let suffix = if deployable {
                    ""
                } else {
                    " (pipeline dropped)"
                };
                conditions::invalid(
                    conditions::VALID_PIPELINE_PREFIX,
                    &pipeline.name,
                    f.reason,
                    format!("{}: {}{suffix}", pipeline.name, f.message()),
                )
            }
        };
        conditions.set(AttributeGroup::Pipelines, condition);

        if deployable {
            pipelines.push(PipelineSpec {
                input_refs,
                output_refs,
                ..pipeline.clone()
            });
        }
    }
    pipelines
}

/// True when `name` resolves to a valid input whose log type may be collected.
fn input_ok(
    spec: &ClusterLogForwarderSpec,
    name: &str,
    valid: &Valid,
    denied: &BTreeSet<InputType>,
    failure: &mut Failure,
) -> bool {
    let input = match spec.input(name) {
        Some(input) if valid.inputs.contains(name) => input.clone(),
        Some(_) => {
            failure.push(format!("input {name:?} is invalid"));
            return false;
        }
        None => match InputType::reserved(name) {
            Some(t) => inputs::reserved_input(t),
            None => {
                failure.push(format!("input {name:?} is not declared"));
                return false;
            }
        },
    };

    match inputs::log_type(&input) {
        Some(t) if denied.contains(&t) => {
            failure.reason = reason::CLUSTER_ROLE_MISSING;
            failure.push(format!(
                "input {name:?}: not authorized to collect {t} logs"
            ));
            false
        }
        _ => true,
    }
}
