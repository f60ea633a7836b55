use crate::{Client, Error, Kind, Result};
use logging_forwarder_controller_core::{RefNames, ResolvedRefs};
use logging_forwarder_controller_k8s_api::{ConfigMap, Secret};
use std::collections::{BTreeMap, BTreeSet};

/// Objects fetched by name, and the names that were not found.
#[derive(Clone, Debug)]
pub struct Resolved<K> {
    pub found: BTreeMap<String, K>,
    pub missing: BTreeSet<String>,
}

/// Reads every object a forwarder references.
///
/// Missing objects do not fail resolution; they are recorded so that validation can report the
/// inputs and outputs that depend on them.
pub async fn resolve<C: Client>(
    client: &C,
    namespace: &str,
    names: &RefNames,
) -> Result<ResolvedRefs> {
    let secrets = resolve_secrets(client, namespace, &names.secrets).await?;
    let config_maps = resolve_config_maps(client, namespace, &names.config_maps).await?;

    let refs = ResolvedRefs {
        secrets: secrets
            .found
            .into_iter()
            .map(|(name, secret)| {
                let data = secret
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, v)| (k, v.0))
                    .chain(
                        secret
                            .string_data
                            .unwrap_or_default()
                            .into_iter()
                            .map(|(k, v)| (k, v.into_bytes())),
                    )
                    .collect();
                (name, data)
            })
            .collect(),
        config_maps: config_maps
            .found
            .into_iter()
            .map(|(name, cm)| (name, cm.data.unwrap_or_default()))
            .collect(),
        missing: RefNames {
            secrets: secrets.missing,
            config_maps: config_maps.missing,
        },
    };
    tracing::debug!(fingerprint = refs.hash(), missing = ?refs.missing, "Resolved references");
    Ok(refs)
}

pub async fn resolve_secrets<C: Client>(
    client: &C,
    namespace: &str,
    names: &BTreeSet<String>,
) -> Result<Resolved<Secret>> {
    resolve_all(client, namespace, names, "secret").await
}

pub async fn resolve_config_maps<C: Client>(
    client: &C,
    namespace: &str,
    names: &BTreeSet<String>,
) -> Result<Resolved<ConfigMap>> {
    resolve_all(client, namespace, names, "configmap").await
}

async fn resolve_all<C: Client, K: Kind>(
    client: &C,
    namespace: &str,
    names: &BTreeSet<String>,
    kind: &'static str,
) -> Result<Resolved<K>> {
    let mut resolved = Resolved {
        found: BTreeMap::new(),
        missing: BTreeSet::new(),
    };
    for name in names {
        match fetch::<C, K>(client, namespace, name, kind).await {
            Ok(object) => {
                resolved.found.insert(name.clone(), object);
            }
            Err(error @ Error::MissingReference { .. }) => {
                tracing::info!(%error, "Referenced object is missing");
                resolved.missing.insert(name.clone());
            }
            Err(error) => return Err(error),
        }
    }
    Ok(resolved)
}

async fn fetch<C: Client, K: Kind>(
    client: &C,
    namespace: &str,
    name: &str,
    kind: &'static str,
) -> Result<K> {
    client
        .get::<K>(namespace, name)
        .await?
        .ok_or_else(|| Error::MissingReference {
            kind,
            name: name.to_string(),
        })
}
