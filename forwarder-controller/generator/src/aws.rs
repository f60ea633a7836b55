//! Shared credentials profiles for outputs that assume an AWS IAM role.
//!
//! Each such output gets a profile named after its sink. The profiles are written to a config map
//! mounted at a fixed path, and the sink selects its profile by name.

use crate::{component_id, secrets::Secrets, Error};
use logging_forwarder_controller_core::{ResolvedRefs, ResourceNames};
use logging_forwarder_controller_k8s_api::{
    observability::output::AwsAuthType, ClusterLogForwarderSpec,
};
use std::fmt::Write;

/// The profile an output's sink reads its credentials from.
pub fn profile(output: &str) -> String {
    format!("output_{}", component_id(output))
}

/// Renders the credentials file for every IAM role output, or `None` when there are none.
pub fn credentials(
    spec: &ClusterLogForwarderSpec,
    refs: &ResolvedRefs,
    names: &ResourceNames,
) -> Result<Option<String>, Error> {
    let secrets = Secrets::new(refs, names);
    let mut out = String::new();
    for output in &spec.outputs {
        let Some(auth) = output.aws_authentication() else {
            continue;
        };
        if auth.type_ != AwsAuthType::IamRole {
            continue;
        }
        let role = auth.iam_role.as_ref().ok_or_else(|| {
            Error::Generator(format!("output {:?} has no iamRole", output.name))
        })?;
        let role_arn = secrets.value(&role.role_arn)?;
        let token_file = secrets.web_identity_token_file(&role.token)?;
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = writeln!(out, "[{}]", profile(&output.name));
        let _ = writeln!(out, "role_arn = {role_arn}");
        let _ = writeln!(out, "web_identity_token_file = {token_file}");
    }
    Ok((!out.is_empty()).then_some(out))
}
