use super::{check_ref, Failure};
use crate::{
    conditions::{self, reason, AttributeGroup, ConditionMap},
    refs, ResolvedRefs, MIN_RECEIVER_PORT,
};
use logging_forwarder_controller_k8s_api::{
    observability::{InputSpec, InputType, TlsSpec},
    ClusterLogForwarderSpec,
};
use std::collections::{BTreeMap, BTreeSet};

/// Validates every declared input and returns the names of those that passed.
pub(super) fn validate(
    spec: &ClusterLogForwarderSpec,
    refs: &ResolvedRefs,
    conditions: &mut ConditionMap,
) -> BTreeSet<String> {
    let mut valid = BTreeSet::new();
    let mut names = BTreeSet::new();
    let mut ports = BTreeMap::<i32, &str>::new();

    for input in &spec.inputs {
        let mut failure = Failure::new(reason::VALIDATION_FAILURE);
        if !names.insert(input.name.as_str()) {
            failure.push(format!("input name {:?} is not unique", input.name));
        }
        if let Some(port) = input.receiver.as_ref().map(|r| r.port) {
            if let Some(other) = ports.insert(port, input.name.as_str()) {
                failure.push(format!("port {port} is already used by input {other:?}"));
            }
        }
        validate_input(input, refs, &mut failure);

        let condition = match failure.into_result() {
            Ok(()) => {
                valid.insert(input.name.clone());
                conditions::valid(
                    conditions::VALID_INPUT_PREFIX,
                    &input.name,
                    format!("input {:?} is valid", input.name),
                )
            }
            Err(f) => conditions::invalid(
                conditions::VALID_INPUT_PREFIX,
                &input.name,
                f.reason,
                format!("{}: {}", input.name, f.message()),
            ),
        };
        conditions.set(AttributeGroup::Inputs, condition);
    }
    valid
}

fn validate_input(input: &InputSpec, refs: &ResolvedRefs, failure: &mut Failure) {
    if input.name.is_empty() {
        failure.push("input name must not be empty");
    }
    if InputType::reserved(&input.name).is_some() {
        failure.push(format!("input name {:?} is reserved", input.name));
    }

    match input.type_ {
        InputType::Application => {
            let Some(app) = input.application.as_ref() else {
                return;
            };
            for nc in app.includes.iter().chain(app.excludes.iter()) {
                if nc.namespace.is_empty() && nc.container.is_empty() {
                    failure.push("includes and excludes require a namespace or container");
                }
            }
            let rate = app
                .tuning
                .as_ref()
                .and_then(|t| t.rate_limit_per_container);
            if let Some(rate) = rate {
                if rate.max_records_per_second <= 0 {
                    failure.push("rateLimitPerContainer.maxRecordsPerSecond must be positive");
                }
            }
        }
        InputType::Infrastructure | InputType::Audit => {}
        InputType::Receiver => {
            let Some(receiver) = input.receiver.as_ref() else {
                failure.push("receiver inputs require a receiver spec");
                return;
            };
            if !(MIN_RECEIVER_PORT..=65535).contains(&receiver.port) {
                failure.push(format!(
                    "port {} must be in the range [{MIN_RECEIVER_PORT}, 65535]",
                    receiver.port
                ));
            }
            if let Some(tls) = &receiver.tls {
                validate_tls_materials(tls, failure);
            }
            for r in refs::input_refs(input) {
                check_ref(&r, refs, failure);
            }
        }
    }
}

/// A TLS block carrying material must have a CA or a certificate/key pair, and certificates and
/// keys must come together.
pub(super) fn validate_tls_materials(tls: &TlsSpec, failure: &mut Failure) {
    if tls.is_empty() {
        return;
    }
    let (cert, key) = (tls.certificate.is_some(), tls.key.is_some());
    if cert && !key {
        failure.push("tls.certificate requires tls.key");
    }
    if key && !cert {
        failure.push("tls.key requires tls.certificate");
    }
    if tls.key_passphrase.is_some() && !key {
        failure.push("tls.keyPassphrase requires tls.key");
    }
    if tls.ca.is_none() && !(cert && key) {
        failure.push("tls requires at least a CA or a certificate and key");
    }
}
