//! Vector configuration.
//!
//! Records flow from per-input sources through a meta transform that tags them with their log
//! type and source, through each pipeline's filter chain, and into one sink per output:
//!
//! ```text
//! input_<i>_* -> input_<i>_*_meta -> pipeline_<p>_<f>... -> output_<o>_remap -> output_<o>
//! ```

mod outputs;
mod pipelines;
mod sources;
mod templates;
#[cfg(test)]
mod tests;

use crate::{secrets::Secrets, Element, Engine, Error, Forwarder};
use logging_forwarder_controller_core::{paths, Options, ResolvedRefs, TlsProfile, METRICS_PORT};
use logging_forwarder_controller_k8s_api::observability::{CollectorType, TlsSpec};
use serde::Serialize;

#[derive(Serialize)]
struct Global {
    data_dir: String,
    secrets_dir: &'static str,
}

#[derive(Serialize)]
struct Remap {
    id: String,
    inputs: Vec<String>,
    source: String,
    drop_on_abort: bool,
}

#[derive(Serialize)]
struct Throttle {
    id: String,
    inputs: Vec<String>,
    threshold: i64,
    key_field: Option<&'static str>,
}

/// A `[<table>.tls]` block.
#[derive(Serialize)]
struct Tls {
    table: String,
    enabled: bool,
    min_tls_version: String,
    ciphersuites: String,
    insecure: bool,
    key_file: Option<String>,
    crt_file: Option<String>,
    ca_file: Option<String>,
    key_pass: Option<String>,
}

#[derive(Serialize)]
struct Metrics {
    address: String,
    key_file: String,
    crt_file: String,
    min_tls_version: String,
    ciphersuites: String,
}

pub(crate) fn generate(
    forwarder: &Forwarder<'_>,
    refs: &ResolvedRefs,
    profile: &TlsProfile,
    options: &Options,
) -> Result<String, Error> {
    let secrets = Secrets::new(refs, forwarder.names);

    let mut elements = vec![Element::new(
        "global",
        Global {
            data_dir: paths::data_dir(CollectorType::Vector, forwarder.namespace, forwarder.name),
            secrets_dir: paths::SECRETS_DIR,
        },
    )];

    let sources = sources::elements(forwarder, &secrets, profile)?;
    elements.extend(sources.elements);

    let pipelines = pipelines::elements(forwarder.spec, &sources.outputs)?;
    elements.extend(pipelines.elements);

    elements.extend(outputs::elements(
        forwarder.spec,
        &pipelines.routes,
        &secrets,
        profile,
        options,
    )?);

    elements.push(Element::new(
        "metrics",
        Metrics {
            address: format!("0.0.0.0:{METRICS_PORT}"),
            key_file: format!("{}/tls.key", paths::METRICS_CERT_DIR),
            crt_file: format!("{}/tls.crt", paths::METRICS_CERT_DIR),
            min_tls_version: profile.vector_min_version(),
            ciphersuites: profile.cipher_suites(),
        },
    ));

    Engine::new(templates::source).compose(&elements)
}

// === impl Remap ===

impl Remap {
    fn element(id: impl ToString, inputs: Vec<String>, source: impl ToString) -> Element {
        Element::new(
            "remap",
            Self {
                id: id.to_string(),
                inputs,
                source: source.to_string(),
                drop_on_abort: false,
            },
        )
    }

    /// A remap whose `abort` drops the record.
    fn dropping(id: impl ToString, inputs: Vec<String>, source: impl ToString) -> Element {
        Element::new(
            "remap",
            Self {
                id: id.to_string(),
                inputs,
                source: source.to_string(),
                drop_on_abort: true,
            },
        )
    }
}

// === impl Tls ===

impl Tls {
    fn new(table: impl ToString, profile: &TlsProfile) -> Self {
        Self {
            table: table.to_string(),
            enabled: false,
            min_tls_version: profile.vector_min_version(),
            ciphersuites: profile.cipher_suites(),
            insecure: false,
            key_file: None,
            crt_file: None,
            ca_file: None,
            key_pass: None,
        }
    }

    /// Sockets and brokers need TLS switched on explicitly.
    fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    fn with_spec(mut self, spec: Option<&TlsSpec>, secrets: &Secrets<'_>) -> Result<Self, Error> {
        let Some(spec) = spec else {
            return Ok(self);
        };
        self.ca_file = spec.ca.as_ref().map(|k| secrets.path(k)).transpose()?;
        self.crt_file = spec
            .certificate
            .as_ref()
            .map(|k| secrets.path(k))
            .transpose()?;
        self.key_file = spec
            .key
            .as_ref()
            .map(|k| secrets.secret_path(k))
            .transpose()?;
        self.key_pass = spec
            .key_passphrase
            .as_ref()
            .map(|k| secrets.secret(k))
            .transpose()?;
        Ok(self)
    }

    fn element(self) -> Element {
        Element::new("tls", self)
    }
}
