#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod annotations;
pub mod conditions;
mod hash;
pub mod inputs;
pub mod labels;
pub mod migrate;
mod names;
pub mod paths;
pub mod ports;
mod proxy;
pub mod refs;
pub mod tls;
pub mod validate;

pub use self::{
    annotations::Options,
    conditions::ConditionMap,
    hash::{config_hash, fnv1a64},
    names::{dns1123_label, ResourceNames},
    proxy::ProxyConfig,
    refs::{KeyRef, RefNames, ResolvedRefs},
    tls::TlsProfile,
};

/// The `app.kubernetes.io/component` of every collector resource.
pub const COMPONENT: &str = "collector";

pub const PART_OF: &str = "cluster-logging";

pub const MANAGED_BY: &str = "cluster-logging-operator";

/// The port on which the collector serves its internal metrics.
pub const METRICS_PORT: i32 = 24231;

pub const METRICS_PORT_NAME: &str = "metrics";

/// The kube-apiserver port the collector reaches for metadata enrichment.
pub const API_SERVER_PORT: i32 = 6443;

/// Receiver ports must not fall into the privileged range.
pub const MIN_RECEIVER_PORT: i32 = 1024;
