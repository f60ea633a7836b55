#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use logging_forwarder_controller_core as core;
pub use logging_forwarder_controller_generator as generator;
pub use logging_forwarder_controller_k8s_api as k8s;
pub use logging_forwarder_controller_k8s_reconcile as reconcile;
pub use logging_forwarder_controller_k8s_resources as resources;
pub use logging_forwarder_controller_k8s_status as status;

mod args;
mod controller;
mod lease;
mod metrics;


pub use self::{
    args::Args,
    controller::{ForwarderController, Settings, STATUS_CONFLICT_REQUEUE},
    metrics::ReconcileMetrics,
};
