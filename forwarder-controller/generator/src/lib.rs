//! Renders collector configuration from a validated forwarder.
//!
//! Generation is a pure function of its inputs: the same forwarder, resolved references, TLS
//! profile, and options always produce byte-identical configuration.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod aws;
mod engine;
pub mod fluentd;
mod secrets;
mod sinks;
mod vector;
mod vrl;

pub use self::engine::{Element, Engine};
use logging_forwarder_controller_core::{KeyRef, Options, ResolvedRefs, ResourceNames, TlsProfile};
use logging_forwarder_controller_k8s_api::{
    observability::CollectorType, ClusterLogForwarderSpec,
};
use std::collections::BTreeSet;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to render template {template:?}: {source}")]
    Template {
        template: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("unresolved reference to {0}")]
    UnresolvedReference(KeyRef),

    #[error("{0}")]
    Generator(String),
}

/// The forwarder a configuration is generated for.
#[derive(Copy, Clone, Debug)]
pub struct Forwarder<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub names: &'a ResourceNames,
    /// The validated spec, holding only deployable items.
    pub spec: &'a ClusterLogForwarderSpec,
}

/// Generated collector configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub collector: CollectorType,
    pub text: String,
    /// Ports the collector listens on for receiver inputs.
    pub listener_ports: BTreeSet<i32>,
}

pub fn generate(
    forwarder: &Forwarder<'_>,
    refs: &ResolvedRefs,
    profile: &TlsProfile,
    options: &Options,
) -> Result<Config, Error> {
    let collector = forwarder.spec.collector_type();
    let text = match collector {
        CollectorType::Vector => vector::generate(forwarder, refs, profile, options)?,
        CollectorType::Fluentd => fluentd::generate(forwarder, refs, profile, options)?,
    };
    let listener_ports = logging_forwarder_controller_core::ports::input_ports(
        logging_forwarder_controller_core::inputs::referenced(forwarder.spec).iter(),
    );
    tracing::debug!(%collector, bytes = text.len(), "Generated collector configuration");
    Ok(Config {
        collector,
        text,
        listener_ports,
    })
}

/// A configuration component id: lowercase with every character outside `[a-z0-9_]` replaced by
/// `_`.
pub fn component_id(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
