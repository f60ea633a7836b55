use logging_forwarder_controller_k8s_api::observability::TlsSecurityProfile;

pub const DEFAULT_MIN_VERSION: &str = "VersionTLS12";

/// The "intermediate" cipher list, in IANA/OpenSSL naming.
pub const DEFAULT_CIPHERS: [&str; 9] = [
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "ECDHE-ECDSA-AES128-GCM-SHA256",
    "ECDHE-RSA-AES128-GCM-SHA256",
    "ECDHE-ECDSA-AES256-GCM-SHA384",
    "ECDHE-RSA-AES256-GCM-SHA384",
    "ECDHE-ECDSA-CHACHA20-POLY1305",
    "ECDHE-RSA-CHACHA20-POLY1305",
];

/// The cluster-wide TLS profile applied to every TLS-capable sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsProfile {
    /// An API server style version name, e.g. `VersionTLS12`.
    pub min_version: String,
    pub ciphers: Vec<String>,
}

impl Default for TlsProfile {
    fn default() -> Self {
        Self {
            min_version: DEFAULT_MIN_VERSION.to_string(),
            ciphers: DEFAULT_CIPHERS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

// === impl TlsProfile ===

impl TlsProfile {
    /// Applies an output's profile override on top of the cluster profile.
    pub fn with_override(&self, profile: Option<&TlsSecurityProfile>) -> Self {
        let Some(profile) = profile else {
            return self.clone();
        };
        Self {
            min_version: profile
                .min_tls_version
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| self.min_version.clone()),
            ciphers: if profile.ciphers.is_empty() {
                self.ciphers.clone()
            } else {
                profile.ciphers.clone()
            },
        }
    }

    /// The version in Vector's `min_tls_version` spelling, e.g. `VersionTLS12` -> `VTLS12`.
    pub fn vector_min_version(&self) -> String {
        match self.min_version.strip_prefix("Version") {
            Some(rest) => format!("V{rest}"),
            None => self.min_version.clone(),
        }
    }

    pub fn cipher_suites(&self) -> String {
        self.ciphers.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn overrides() {
        let cluster = TlsProfile::default();
        assert_eq!(cluster.vector_min_version(), "VTLS12");

        let out = cluster.with_override(Some(&TlsSecurityProfile {
            min_tls_version: Some("VersionTLS13".to_string()),
            ciphers: vec![],
        }));
        assert_eq!(out.vector_min_version(), "VTLS13");
        assert_eq!(out.ciphers, cluster.ciphers);
        assert_eq!(cluster.with_override(None), cluster);
    }
}
