//! Converges cluster resources onto their desired state.
//!
//! All API access goes through the [`Client`] trait. [`KubeClient`] talks to a real API server;
//! with the `test-util` feature, [`FakeClient`] keeps objects in memory and records every write.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod authorize;
mod client;
pub mod events;
#[cfg(any(test, feature = "test-util"))]
mod fake;
mod reconciler;
mod resolve;
mod retry;

#[cfg(test)]
mod tests;

#[cfg(any(test, feature = "test-util"))]
pub use self::fake::{FakeClient, Verb, Write};
pub use self::{
    authorize::authorize,
    client::{Client, Kind, KubeClient},
    events::Event,
    reconciler::Reconciler,
    resolve::{resolve, resolve_config_maps, resolve_secrets, Resolved},
    retry::{on_conflict, Backoff},
};
use logging_forwarder_controller_k8s_api as k8s;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} {name:?} not found")]
    MissingReference { kind: &'static str, name: String },

    #[error("conflicting write to {kind} {name:?}")]
    Conflict { kind: String, name: String },

    #[error("kubernetes API request failed: {0}")]
    Api(#[from] k8s::Error),

    #[error("trusted CA bundle {0:?} was not populated in time")]
    TrustBundleTimeout(String),

    #[error("failed to generate collector configuration: {0}")]
    Generate(#[from] logging_forwarder_controller_generator::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// === impl Error ===

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
