//! Secret and ConfigMap references made by a forwarder, and their resolved contents.

use crate::fnv1a64;
use logging_forwarder_controller_k8s_api::{
    observability::{
        output::AwsAuthType, BearerToken, BearerTokenFrom, ConfigMapOrSecretKey, InputSpec,
        OutputSpec, SecretKey, TlsSpec,
    },
    ClusterLogForwarderSpec,
};
use std::collections::{BTreeMap, BTreeSet};

/// A single key within a referenced object.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyRef {
    Secret { name: String, key: String },
    ConfigMap { name: String, key: String },
}

/// The distinct objects a forwarder references.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefNames {
    pub secrets: BTreeSet<String>,
    pub config_maps: BTreeSet<String>,
}

/// Referenced objects as read at the start of a reconcile pass.
///
/// Names that could not be found are remembered so that the outputs and inputs referencing them
/// can be reported rather than failing the whole pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedRefs {
    pub secrets: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    pub config_maps: BTreeMap<String, BTreeMap<String, String>>,
    /// Referenced objects that do not exist.
    pub missing: RefNames,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Found,
    MissingObject,
    MissingKey,
}

/// Every key an output reads, in a stable order.
pub fn output_refs(output: &OutputSpec) -> Vec<KeyRef> {
    let mut refs = Vec::new();
    if let Some(tls) = output.tls_spec() {
        tls_refs(tls, &mut refs);
    }
    if let Some(auth) = output.http_authentication() {
        if let Some(token) = &auth.token {
            bearer_token_refs(token, &mut refs);
        }
        refs.extend(auth.username.iter().map(secret_key));
        refs.extend(auth.password.iter().map(secret_key));
    }
    if let Some(aws) = output.aws_authentication() {
        match aws.type_ {
            AwsAuthType::AwsAccessKey => {
                if let Some(keys) = &aws.aws_access_key {
                    refs.push(secret_key(&keys.key_id));
                    refs.push(secret_key(&keys.key_secret));
                }
            }
            AwsAuthType::IamRole => {
                if let Some(role) = &aws.iam_role {
                    refs.push(secret_key(&role.role_arn));
                    bearer_token_refs(&role.token, &mut refs);
                }
            }
        }
    }
    if let Some(key) = output
        .azure_monitor
        .as_ref()
        .and_then(|a| a.authentication.as_ref())
        .and_then(|a| a.shared_key.as_ref())
    {
        refs.push(secret_key(key));
    }
    if let Some(key) = output
        .google_cloud_logging
        .as_ref()
        .and_then(|g| g.authentication.as_ref())
        .and_then(|a| a.credentials.as_ref())
    {
        refs.push(secret_key(key));
    }
    if let Some(sasl) = output
        .kafka
        .as_ref()
        .and_then(|k| k.authentication.as_ref())
        .and_then(|a| a.sasl.as_ref())
    {
        refs.extend(sasl.username.iter().map(secret_key));
        refs.extend(sasl.password.iter().map(secret_key));
    }
    if let Some(auth) = output.splunk.as_ref().and_then(|s| s.authentication.as_ref()) {
        refs.push(secret_key(&auth.token));
    }
    refs
}

/// Every key a receiver input reads.
pub fn input_refs(input: &InputSpec) -> Vec<KeyRef> {
    let mut refs = Vec::new();
    if let Some(tls) = input.receiver.as_ref().and_then(|r| r.tls.as_ref()) {
        tls_refs(tls, &mut refs);
    }
    refs
}

fn tls_refs(tls: &TlsSpec, refs: &mut Vec<KeyRef>) {
    refs.extend(tls.ca.iter().filter_map(config_map_or_secret_key));
    refs.extend(tls.certificate.iter().filter_map(config_map_or_secret_key));
    refs.extend(tls.key.iter().map(secret_key));
    refs.extend(tls.key_passphrase.iter().map(secret_key));
}

fn bearer_token_refs(token: &BearerToken, refs: &mut Vec<KeyRef>) {
    if token.from == BearerTokenFrom::Secret {
        if let Some(secret) = &token.secret {
            refs.push(KeyRef::secret(&secret.name, &secret.key));
        }
    }
}

fn secret_key(k: &SecretKey) -> KeyRef {
    KeyRef::secret(k.secret_name(), &k.key)
}

fn config_map_or_secret_key(k: &ConfigMapOrSecretKey) -> Option<KeyRef> {
    if let Some(name) = k.secret_name() {
        return Some(KeyRef::secret(name, &k.key));
    }
    k.config_map_name().map(|name| KeyRef::config_map(name, &k.key))
}

// === impl KeyRef ===

impl KeyRef {
    pub fn secret(name: impl ToString, key: impl ToString) -> Self {
        Self::Secret {
            name: name.to_string(),
            key: key.to_string(),
        }
    }

    pub fn config_map(name: impl ToString, key: impl ToString) -> Self {
        Self::ConfigMap {
            name: name.to_string(),
            key: key.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Secret { name, .. } | Self::ConfigMap { name, .. } => name,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Secret { key, .. } | Self::ConfigMap { key, .. } => key,
        }
    }

    /// Where the key is mounted in the collector pod.
    pub fn path(&self) -> String {
        match self {
            Self::Secret { name, key } => crate::paths::secret_file(name, key),
            Self::ConfigMap { name, key } => crate::paths::config_map_file(name, key),
        }
    }
}

impl std::fmt::Display for KeyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Secret { name, key } => write!(f, "secret {name:?} key {key:?}"),
            Self::ConfigMap { name, key } => write!(f, "configmap {name:?} key {key:?}"),
        }
    }
}

// === impl RefNames ===

impl RefNames {
    pub fn of(spec: &ClusterLogForwarderSpec) -> Self {
        let mut names = Self::default();
        let refs = spec
            .outputs
            .iter()
            .flat_map(output_refs)
            .chain(spec.inputs.iter().flat_map(input_refs));
        for r in refs {
            match r {
                KeyRef::Secret { name, .. } => names.secrets.insert(name),
                KeyRef::ConfigMap { name, .. } => names.config_maps.insert(name),
            };
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty() && self.config_maps.is_empty()
    }
}

// === impl ResolvedRefs ===

impl ResolvedRefs {
    pub fn lookup(&self, r: &KeyRef) -> Lookup {
        let found = match r {
            KeyRef::Secret { name, key } => self.secrets.get(name).map(|d| d.contains_key(key)),
            KeyRef::ConfigMap { name, key } => {
                self.config_maps.get(name).map(|d| d.contains_key(key))
            }
        };
        match found {
            None => Lookup::MissingObject,
            Some(false) => Lookup::MissingKey,
            Some(true) => Lookup::Found,
        }
    }

    pub fn contains(&self, r: &KeyRef) -> bool {
        self.lookup(r) == Lookup::Found
    }

    pub fn secret_value(&self, name: &str, key: &str) -> Option<&[u8]> {
        self.secrets.get(name)?.get(key).map(Vec::as_slice)
    }

    /// The UTF-8 value of a secret key, trimmed of surrounding whitespace.
    pub fn secret_str(&self, name: &str, key: &str) -> Option<&str> {
        let v = self.secret_value(name, key)?;
        std::str::from_utf8(v).ok().map(str::trim)
    }

    /// A fingerprint of all resolved content.
    ///
    /// Objects are visited in name order and keys in key order, so the hash is independent of
    /// the order in which objects were fetched. It signals change only and carries no security
    /// properties.
    pub fn hash(&self) -> u64 {
        let secrets = self.secrets.iter().flat_map(|(name, data)| {
            std::iter::once(b"secret".as_slice())
                .chain(std::iter::once(name.as_bytes()))
                .chain(
                    data.iter()
                        .flat_map(|(k, v)| [k.as_bytes(), v.as_slice()]),
                )
        });
        let config_maps = self.config_maps.iter().flat_map(|(name, data)| {
            std::iter::once(b"configmap".as_slice())
                .chain(std::iter::once(name.as_bytes()))
                .chain(
                    data.iter()
                        .flat_map(|(k, v)| [k.as_bytes(), v.as_bytes()]),
                )
        });
        fnv1a64(secrets.chain(config_maps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logging_forwarder_controller_k8s_api::observability::{
        output::{
            AwsAccessKey, AwsAuthentication, Cloudwatch, Elasticsearch, HttpAuthentication,
            OutputTlsSpec,
        },
        BearerTokenSecretKey, LocalRef, OutputType,
    };
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    fn es_with_tls() -> OutputSpec {
        OutputSpec {
            name: "es".to_string(),
            type_: OutputType::Elasticsearch,
            tls: Some(OutputTlsSpec {
                tls: TlsSpec {
                    ca: Some(ConfigMapOrSecretKey {
                        key: "service-ca.crt".to_string(),
                        config_map: Some(LocalRef {
                            name: "openshift-service-ca.crt".to_string(),
                        }),
                        secret: None,
                    }),
                    certificate: Some(ConfigMapOrSecretKey {
                        key: "tls.crt".to_string(),
                        config_map: None,
                        secret: Some(LocalRef {
                            name: "es-secret".to_string(),
                        }),
                    }),
                    key: Some(SecretKey::new("es-secret", "tls.key")),
                    key_passphrase: None,
                },
                ..Default::default()
            }),
            elasticsearch: Some(Elasticsearch {
                url: "https://es:9200".to_string(),
                authentication: Some(HttpAuthentication {
                    token: Some(BearerToken {
                        from: BearerTokenFrom::Secret,
                        secret: Some(BearerTokenSecretKey {
                            name: "es-token".to_string(),
                            key: "token".to_string(),
                        }),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn collects_output_refs() {
        assert_eq!(
            output_refs(&es_with_tls()),
            vec![
                KeyRef::config_map("openshift-service-ca.crt", "service-ca.crt"),
                KeyRef::secret("es-secret", "tls.crt"),
                KeyRef::secret("es-secret", "tls.key"),
                KeyRef::secret("es-token", "token"),
            ]
        );
    }

    #[test]
    fn collects_aws_refs() {
        let out = OutputSpec {
            name: "cw".to_string(),
            type_: OutputType::Cloudwatch,
            cloudwatch: Some(Cloudwatch {
                authentication: Some(AwsAuthentication {
                    type_: AwsAuthType::AwsAccessKey,
                    aws_access_key: Some(AwsAccessKey {
                        key_id: SecretKey::new("aws", "id"),
                        key_secret: SecretKey::new("aws", "secret"),
                    }),
                    iam_role: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            output_refs(&out),
            vec![KeyRef::secret("aws", "id"), KeyRef::secret("aws", "secret")]
        );
    }

    #[test]
    fn duplicate_names_collapse() {
        let spec = ClusterLogForwarderSpec {
            outputs: vec![es_with_tls(), es_with_tls()],
            ..Default::default()
        };
        let names = RefNames::of(&spec);
        assert_eq!(
            names.secrets.into_iter().collect::<Vec<_>>(),
            vec!["es-secret", "es-token"]
        );
        assert_eq!(
            names.config_maps.into_iter().collect::<Vec<_>>(),
            vec!["openshift-service-ca.crt"]
        );
    }

    #[test]
    fn lookup() {
        let refs = ResolvedRefs {
            secrets: btreemap! {
                "s1".to_string() => btreemap! { "token".to_string() => b" abc\n".to_vec() },
            },
            ..Default::default()
        };
        assert_eq!(refs.lookup(&KeyRef::secret("s1", "token")), Lookup::Found);
        assert_eq!(refs.lookup(&KeyRef::secret("s1", "other")), Lookup::MissingKey);
        assert_eq!(refs.lookup(&KeyRef::secret("s2", "token")), Lookup::MissingObject);
        assert_eq!(refs.secret_str("s1", "token"), Some("abc"));
    }

    #[test]
    fn hash_is_canonical() {
        let a = ResolvedRefs {
            secrets: btreemap! {
                "a".to_string() => btreemap! { "k".to_string() => b"v".to_vec() },
                "b".to_string() => btreemap! { "k".to_string() => b"v".to_vec() },
            },
            ..Default::default()
        };
        let mut b = ResolvedRefs::default();
        b.secrets.insert(
            "b".to_string(),
            btreemap! { "k".to_string() => b"v".to_vec() },
        );
        b.secrets.insert(
            "a".to_string(),
            btreemap! { "k".to_string() => b"v".to_vec() },
        );
        assert_eq!(a.hash(), b.hash());

        b.secrets
            .get_mut("a")
            .unwrap()
            .insert("k".to_string(), b"w".to_vec());
        assert_ne!(a.hash(), b.hash());
    }
}
