use crate::{meta, Context};
use logging_forwarder_controller_core::{labels::INJECT_TRUSTED_CA_BUNDLE, paths};
use logging_forwarder_controller_generator::fluentd;
use logging_forwarder_controller_k8s_api::{
    observability::CollectorType, ByteString, ConfigMap, Secret,
};
use std::collections::BTreeMap;

/// Holds the generated collector configuration.
///
/// Vector's configuration may embed credentials, so it is kept in a secret.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigArtifact {
    Secret(Secret),
    ConfigMap(ConfigMap),
}

pub fn config_artifact(ctx: &Context<'_>) -> ConfigArtifact {
    let metadata = meta::owned(ctx, &ctx.names.config_artifact);
    match ctx.collector() {
        CollectorType::Vector => ConfigArtifact::Secret(Secret {
            metadata,
            data: Some(BTreeMap::from([(
                paths::VECTOR_CONFIG_KEY.to_string(),
                ByteString(ctx.config.text.clone().into_bytes()),
            )])),
            ..Default::default()
        }),
        CollectorType::Fluentd => ConfigArtifact::ConfigMap(ConfigMap {
            metadata,
            data: Some(BTreeMap::from([
                (paths::FLUENTD_CONFIG_KEY.to_string(), ctx.config.text.clone()),
                (
                    paths::FLUENTD_RUN_SCRIPT_KEY.to_string(),
                    fluentd::RUN_SCRIPT.to_string(),
                ),
                (
                    paths::FLUENTD_CLEAN_JSON_KEY.to_string(),
                    fluentd::CLEAN_INVALID_JSON.to_string(),
                ),
            ])),
            ..Default::default()
        }),
    }
}

/// An empty config map that the platform fills with the cluster's trusted CA bundle.
///
/// It carries no data so that updates never clobber the injected bundle.
pub fn trust_bundle(ctx: &Context<'_>) -> ConfigMap {
    let mut metadata = meta::owned(ctx, &ctx.names.trust_bundle);
    metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(INJECT_TRUSTED_CA_BUNDLE.to_string(), "true".to_string());
    ConfigMap {
        metadata,
        data: None,
        ..Default::default()
    }
}

/// The shared credentials profiles read by IAM role outputs, if any output needs them.
pub fn aws_credentials(ctx: &Context<'_>) -> Option<ConfigMap> {
    let credentials = ctx.aws_credentials?;
    Some(ConfigMap {
        metadata: meta::owned(ctx, &ctx.names.aws_credentials_map),
        data: Some(BTreeMap::from([(
            paths::AWS_CREDENTIALS_KEY.to_string(),
            credentials.to_string(),
        )])),
        ..Default::default()
    })
}

// === impl ConfigArtifact ===

impl ConfigArtifact {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Secret(s) => s.metadata.name.as_deref(),
            Self::ConfigMap(c) => c.metadata.name.as_deref(),
        }
    }
}
