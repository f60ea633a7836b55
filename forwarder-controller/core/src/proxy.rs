/// Cluster-wide proxy settings inherited by the collector.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

// === impl ProxyConfig ===

impl ProxyConfig {
    pub fn is_empty(&self) -> bool {
        self.http_proxy.is_none() && self.https_proxy.is_none() && self.no_proxy.is_none()
    }

    /// Environment variables for the collector container.
    ///
    /// Both spellings are set since collectors disagree on which one they read.
    pub fn env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        for (name, value) in [
            ("http_proxy", &self.http_proxy),
            ("https_proxy", &self.https_proxy),
            ("no_proxy", &self.no_proxy),
        ] {
            if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
                env.push((name.to_ascii_uppercase(), value.clone()));
                env.push((name.to_string(), value.clone()));
            }
        }
        env
    }

    /// Proxy URLs that the collector may connect to.
    pub fn proxy_urls(&self) -> impl Iterator<Item = &str> {
        [self.http_proxy.as_deref(), self.https_proxy.as_deref()]
            .into_iter()
            .flatten()
            .filter(|v| !v.is_empty())
    }
}
