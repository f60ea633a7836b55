use crate::{meta, Context};
use logging_forwarder_controller_core::annotations::{SERVICE_ACCOUNT_NAME, SERVICE_ACCOUNT_UID};
use logging_forwarder_controller_k8s_api::{Secret, ServiceAccount};

/// Holds the service account until the objects that depend on it have been removed.
pub const DEPENDENTS_FINALIZER: &str = "foregroundDeletion";

const TOKEN_SECRET_TYPE: &str = "kubernetes.io/service-account-token";

pub fn service_account(ctx: &Context<'_>) -> ServiceAccount {
    let mut metadata = meta::owned(ctx, &ctx.names.service_account);
    metadata.finalizers = Some(vec![DEPENDENTS_FINALIZER.to_string()]);
    ServiceAccount {
        metadata,
        ..Default::default()
    }
}

/// A long-lived token for the collector's service account.
///
/// The token controller fills in the data once the UID annotation matches the account.
pub fn service_account_token(ctx: &Context<'_>) -> Secret {
    let mut annotations = vec![(SERVICE_ACCOUNT_NAME, ctx.names.service_account.as_str())];
    if let Some(uid) = ctx.service_account_uid {
        annotations.push((SERVICE_ACCOUNT_UID, uid));
    }
    Secret {
        metadata: meta::with_annotations(
            meta::owned(ctx, &ctx.names.sa_token_secret),
            annotations,
        ),
        type_: Some(TOKEN_SECRET_TYPE.to_string()),
        ..Default::default()
    }
}
