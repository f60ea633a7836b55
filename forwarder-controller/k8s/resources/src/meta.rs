use crate::Context;
use logging_forwarder_controller_k8s_api::{
    ClusterLogForwarder, ObjectMeta, OwnerReference, Resource, ResourceExt,
};
use std::collections::BTreeMap;

/// A controlling reference to the forwarder, so that the garbage collector removes the object
/// along with it.
pub fn owner_reference(forwarder: &ClusterLogForwarder) -> OwnerReference {
    OwnerReference {
        api_version: ClusterLogForwarder::api_version(&()).into_owned(),
        kind: ClusterLogForwarder::kind(&()).into_owned(),
        name: forwarder.name_any(),
        uid: forwarder.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Metadata for an object in the forwarder's namespace, labeled and owned by the forwarder.
pub(crate) fn owned(ctx: &Context<'_>, name: impl ToString) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(ctx.namespace()),
        labels: Some(ctx.identity().labels()),
        owner_references: Some(vec![owner_reference(ctx.forwarder)]),
        ..Default::default()
    }
}

pub(crate) fn with_annotations(
    mut meta: ObjectMeta,
    annotations: impl IntoIterator<Item = (impl ToString, impl ToString)>,
) -> ObjectMeta {
    let annotations = annotations
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>();
    if !annotations.is_empty() {
        meta.annotations
            .get_or_insert_with(Default::default)
            .extend(annotations);
    }
    meta
}
