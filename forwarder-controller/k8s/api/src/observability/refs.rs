use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Names an object in the forwarder's namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub struct LocalRef {
    pub name: String,
}

/// A key within either a `ConfigMap` or a `Secret`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapOrSecretKey {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<LocalRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<LocalRef>,
}

/// A key within a `Secret`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SecretKey {
    pub key: String,
    pub secret: LocalRef,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct BearerToken {
    pub from: BearerTokenFrom,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<BearerTokenSecretKey>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum BearerTokenFrom {
    Secret,
    ServiceAccount,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct BearerTokenSecretKey {
    pub name: String,

    #[serde(default)]
    pub key: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<ConfigMapOrSecretKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<ConfigMapOrSecretKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<SecretKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_passphrase: Option<SecretKey>,
}

/// Overrides the cluster-wide TLS profile for a single output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsSecurityProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_tls_version: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ciphers: Vec<String>,
}

// === impl ConfigMapOrSecretKey ===

impl ConfigMapOrSecretKey {
    pub fn secret_name(&self) -> Option<&str> {
        self.secret.as_ref().map(|r| r.name.as_str())
    }

    pub fn config_map_name(&self) -> Option<&str> {
        self.config_map.as_ref().map(|r| r.name.as_str())
    }
}

// === impl SecretKey ===

impl SecretKey {
    pub fn new(secret: impl ToString, key: impl ToString) -> Self {
        Self {
            key: key.to_string(),
            secret: LocalRef {
                name: secret.to_string(),
            },
        }
    }

    #[inline]
    pub fn secret_name(&self) -> &str {
        &self.secret.name
    }
}

// === impl TlsSpec ===

impl TlsSpec {
    pub fn is_empty(&self) -> bool {
        self.ca.is_none()
            && self.certificate.is_none()
            && self.key.is_none()
            && self.key_passphrase.is_none()
    }
}
