use super::Remap;
use crate::{component_id, vrl, Element, Error};
use logging_forwarder_controller_k8s_api::{
    observability::{FilterSpec, FilterType},
    ClusterLogForwarderSpec,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Filter elements and, per output name, the ids of the components feeding it.
#[derive(Default)]
pub(super) struct Pipelines {
    pub(super) elements: Vec<Element>,
    pub(super) routes: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Serialize)]
struct Filter {
    id: String,
    inputs: Vec<String>,
    condition: String,
}

#[derive(Serialize)]
struct Transform {
    id: String,
    inputs: Vec<String>,
}

pub(super) fn elements(
    spec: &ClusterLogForwarderSpec,
    sources: &BTreeMap<String, Vec<String>>,
) -> Result<Pipelines, Error> {
    let mut pipelines = Pipelines::default();
    for pipeline in &spec.pipelines {
        let mut inputs = BTreeSet::new();
        for name in &pipeline.input_refs {
            let ids = sources.get(name).ok_or_else(|| {
                Error::Generator(format!(
                    "pipeline {:?} references unknown input {name:?}",
                    pipeline.name
                ))
            })?;
            inputs.extend(ids.iter().cloned());
        }

        let mut tail = inputs.into_iter().collect::<Vec<_>>();
        for name in &pipeline.filter_refs {
            let filter = spec.filter(name).ok_or_else(|| {
                Error::Generator(format!(
                    "pipeline {:?} references unknown filter {name:?}",
                    pipeline.name
                ))
            })?;
            let id = format!(
                "pipeline_{}_{}",
                component_id(&pipeline.name),
                component_id(&filter.name)
            );
            pipelines.elements.push(filter_element(filter, &id, tail)?);
            tail = vec![id];
        }

        for output in &pipeline.output_refs {
            pipelines
                .routes
                .entry(output.clone())
                .or_default()
                .extend(tail.iter().cloned());
        }
    }
    Ok(pipelines)
}

fn filter_element(filter: &FilterSpec, id: &str, inputs: Vec<String>) -> Result<Element, Error> {
    let element = match filter.type_ {
        FilterType::Drop => Element::new(
            "filter",
            Filter {
                id: id.to_string(),
                inputs,
                condition: vrl::drop_condition(&filter.drop),
            },
        ),
        FilterType::Prune => {
            let prune = filter.prune.as_ref().ok_or_else(|| {
                Error::Generator(format!("prune filter {:?} has no prune block", filter.name))
            })?;
            Remap::element(id, inputs, vrl::prune(prune)?)
        }
        FilterType::Parse => Remap::element(id, inputs, vrl::PARSE_JSON),
        FilterType::AddLabels => Remap::element(id, inputs, vrl::add_labels(&filter.add_labels)),
        FilterType::DetectMultiline => Element::new(
            "detect_exceptions",
            Transform {
                id: id.to_string(),
                inputs,
            },
        ),
        FilterType::KubeApiAudit => Remap::dropping(
            id,
            inputs,
            vrl::kube_api_audit(&filter.kube_api_audit.clone().unwrap_or_default()),
        ),
    };
    Ok(element)
}
