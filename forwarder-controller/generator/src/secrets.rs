//! How the collector reaches referenced secret and config map keys.
//!
//! TLS material is read from files mounted into the collector pod. Credentials are either read
//! from files or, for Vector, substituted at startup by a file-backed secret backend rooted at
//! the secrets mount.

use crate::Error;
use logging_forwarder_controller_core::{paths, KeyRef, ResolvedRefs, ResourceNames};
use logging_forwarder_controller_k8s_api::observability::{
    BearerToken, BearerTokenFrom, ConfigMapOrSecretKey, SecretKey,
};

/// The name of Vector's secret backend.
pub(crate) const BACKEND: &str = "kubernetes_secret";

/// The key holding the token in a service account token secret.
const TOKEN_KEY: &str = "token";

#[derive(Copy, Clone, Debug)]
pub(crate) struct Secrets<'a> {
    refs: &'a ResolvedRefs,
    names: &'a ResourceNames,
}

impl<'a> Secrets<'a> {
    pub(crate) fn new(refs: &'a ResolvedRefs, names: &'a ResourceNames) -> Self {
        Self { refs, names }
    }

    fn resolve(&self, r: KeyRef) -> Result<KeyRef, Error> {
        if self.refs.contains(&r) {
            return Ok(r);
        }
        Err(Error::UnresolvedReference(r))
    }

    /// The mounted file for a key that may live in either a secret or a config map.
    pub(crate) fn path(&self, key: &ConfigMapOrSecretKey) -> Result<String, Error> {
        let r = match (key.secret_name(), key.config_map_name()) {
            (Some(name), _) => KeyRef::secret(name, &key.key),
            (None, Some(name)) => KeyRef::config_map(name, &key.key),
            (None, None) => {
                return Err(Error::Generator(format!(
                    "key {:?} names neither a secret nor a config map",
                    key.key
                )))
            }
        };
        Ok(self.resolve(r)?.path())
    }

    pub(crate) fn secret_path(&self, key: &SecretKey) -> Result<String, Error> {
        let r = self.resolve(KeyRef::secret(key.secret_name(), &key.key))?;
        Ok(r.path())
    }

    /// A placeholder the secret backend replaces with the key's value.
    pub(crate) fn secret(&self, key: &SecretKey) -> Result<String, Error> {
        let r = self.resolve(KeyRef::secret(key.secret_name(), &key.key))?;
        Ok(backend_ref(r.name(), r.key()))
    }

    pub(crate) fn bearer_token(&self, token: &BearerToken) -> Result<String, Error> {
        match token.from {
            BearerTokenFrom::Secret => self.secret(&token_secret(token)?),
            BearerTokenFrom::ServiceAccount => {
                Ok(backend_ref(&self.names.sa_token_secret, TOKEN_KEY))
            }
        }
    }

    /// A file holding the bearer token.
    pub(crate) fn bearer_token_file(&self, token: &BearerToken) -> Result<String, Error> {
        match token.from {
            BearerTokenFrom::Secret => self.secret_path(&token_secret(token)?),
            BearerTokenFrom::ServiceAccount => Ok(paths::secret_file(
                &self.names.sa_token_secret,
                TOKEN_KEY,
            )),
        }
    }

    /// A file holding a token suitable for web identity federation.
    ///
    /// Service account tokens come from the projected, audience-bound token volume rather than
    /// the long-lived token secret.
    pub(crate) fn web_identity_token_file(&self, token: &BearerToken) -> Result<String, Error> {
        match token.from {
            BearerTokenFrom::Secret => self.secret_path(&token_secret(token)?),
            BearerTokenFrom::ServiceAccount => {
                Ok(paths::service_account_token_file(paths::SA_TOKEN_VOLUME))
            }
        }
    }

    /// The UTF-8 value of a secret key.
    pub(crate) fn value(&self, key: &SecretKey) -> Result<&'a str, Error> {
        let r = self.resolve(KeyRef::secret(key.secret_name(), &key.key))?;
        self.refs
            .secret_str(r.name(), r.key())
            .ok_or(Error::UnresolvedReference(r))
    }
}

fn backend_ref(name: &str, key: &str) -> String {
    format!("SECRET[{BACKEND}.{name}/{key}]")
}

fn token_secret(token: &BearerToken) -> Result<SecretKey, Error> {
    let secret = token
        .secret
        .as_ref()
        .ok_or_else(|| Error::Generator("bearer token from secret names no secret".to_string()))?;
    Ok(SecretKey::new(&secret.name, &secret.key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use logging_forwarder_controller_k8s_api::observability::{BearerTokenSecretKey, LocalRef};
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    fn refs() -> ResolvedRefs {
        ResolvedRefs {
            secrets: btreemap! {
                "es-secret".to_string() => btreemap! {
                    "tls.crt".to_string() => b"cert".to_vec(),
                    "password".to_string() => b" hunter2\n".to_vec(),
                },
            },
            config_maps: btreemap! {
                "ca".to_string() => btreemap! { "ca.crt".to_string() => "ca".to_string() },
            },
            ..Default::default()
        }
    }

    #[test]
    fn resolves_paths_and_values() {
        let refs = refs();
        let names = ResourceNames::new("ns", "fwd", "sa");
        let secrets = Secrets::new(&refs, &names);

        assert_eq!(
            secrets
                .path(&ConfigMapOrSecretKey {
                    key: "ca.crt".to_string(),
                    config_map: Some(LocalRef { name: "ca".to_string() }),
                    secret: None,
                })
                .unwrap(),
            "/var/run/ocp-collector/config/ca/ca.crt"
        );
        assert_eq!(
            secrets.secret(&SecretKey::new("es-secret", "password")).unwrap(),
            "SECRET[kubernetes_secret.es-secret/password]"
        );
        assert_eq!(
            secrets.value(&SecretKey::new("es-secret", "password")).unwrap(),
            "hunter2"
        );
        assert_eq!(
            secrets
                .bearer_token(&BearerToken {
                    from: BearerTokenFrom::ServiceAccount,
                    secret: None,
                })
                .unwrap(),
            "SECRET[kubernetes_secret.sa-token/token]"
        );
    }

    #[test]
    fn unresolved() {
        let refs = refs();
        let names = ResourceNames::new("ns", "fwd", "sa");
        let secrets = Secrets::new(&refs, &names);
        let err = secrets
            .bearer_token(&BearerToken {
                from: BearerTokenFrom::Secret,
                secret: Some(BearerTokenSecretKey {
                    name: "es-secret".to_string(),
                    key: "token".to_string(),
                }),
            })
            .unwrap_err();
        assert!(
            matches!(err, Error::UnresolvedReference(ref r) if *r == KeyRef::secret("es-secret", "token")),
            "{err}"
        );
    }
}
