//! Filesystem layout inside the collector pod.
//!
//! The generated configuration refers to these paths and the workload mounts volumes at exactly
//! these locations.

use logging_forwarder_controller_k8s_api::observability::CollectorType;

pub const SECRETS_DIR: &str = "/var/run/ocp-collector/secrets";
pub const CONFIG_MAPS_DIR: &str = "/var/run/ocp-collector/config";
pub const SERVICE_ACCOUNT_TOKEN_DIR: &str = "/var/run/ocp-collector/serviceaccount";
pub const TRUSTED_CA_DIR: &str = "/etc/pki/ca-trust/extracted/pem";
pub const TRUSTED_CA_KEY: &str = "ca-bundle.crt";
pub const TRUSTED_CA_FILE: &str = "tls-ca-bundle.pem";

pub const VECTOR_CONFIG_DIR: &str = "/etc/vector";
pub const VECTOR_CONFIG_KEY: &str = "vector.toml";
pub const FLUENTD_CONFIG_DIR: &str = "/etc/fluent/configs.d/user";
pub const FLUENTD_CONFIG_KEY: &str = "fluent.conf";
pub const FLUENTD_RUN_SCRIPT_KEY: &str = "run.sh";
pub const FLUENTD_CLEAN_JSON_KEY: &str = "cleanInValidJson.rb";

pub const VECTOR_DATA_DIR: &str = "/var/lib/vector";
pub const FLUENTD_DATA_DIR: &str = "/var/lib/fluentd";

/// Where the serving certificate for the metrics endpoint is mounted.
pub const METRICS_CERT_DIR: &str = "/etc/collector/metrics";

/// Where each receiver's serving certificate is mounted, one directory per input service.
pub const RECEIVER_CERT_DIR: &str = "/etc/collector/receiver";

/// The projected service account token used for cloud role assumption.
pub const SA_TOKEN_VOLUME: &str = "sa-token";
pub const SA_TOKEN_FILE: &str = "token";

/// Where the AWS credentials profile ConfigMap is mounted.
pub const AWS_CREDENTIALS_DIR: &str = "/var/run/ocp-collector/aws";
pub const AWS_CREDENTIALS_KEY: &str = "credentials";

/// Host log roots mounted read-only into node collectors.
pub const HOST_LOG_ROOTS: [(&str, &str); 9] = [
    ("varlogcontainers", "/var/log/containers"),
    ("varlogpods", "/var/log/pods"),
    ("varlogjournal", "/var/log/journal"),
    ("varlogaudit", "/var/log/audit"),
    ("varlogovn", "/var/log/ovn"),
    ("varlogoauthapiserver", "/var/log/oauth-apiserver"),
    ("varlogoauthserver", "/var/log/oauth-server"),
    ("varlogopenshiftapiserver", "/var/log/openshift-apiserver"),
    ("varlogkubeapiserver", "/var/log/kube-apiserver"),
];

pub fn secret_dir(secret: &str) -> String {
    format!("{SECRETS_DIR}/{secret}")
}

pub fn secret_file(secret: &str, key: &str) -> String {
    format!("{SECRETS_DIR}/{secret}/{key}")
}

pub fn config_map_dir(config_map: &str) -> String {
    format!("{CONFIG_MAPS_DIR}/{config_map}")
}

pub fn config_map_file(config_map: &str, key: &str) -> String {
    format!("{CONFIG_MAPS_DIR}/{config_map}/{key}")
}

pub fn receiver_cert_dir(service: &str) -> String {
    format!("{RECEIVER_CERT_DIR}/{service}")
}

pub fn service_account_token_dir(name: &str) -> String {
    format!("{SERVICE_ACCOUNT_TOKEN_DIR}/{name}")
}

pub fn service_account_token_file(name: &str) -> String {
    format!("{SERVICE_ACCOUNT_TOKEN_DIR}/{name}/{SA_TOKEN_FILE}")
}

pub fn aws_credentials_file() -> String {
    format!("{AWS_CREDENTIALS_DIR}/{AWS_CREDENTIALS_KEY}")
}

pub fn config_dir(collector: CollectorType) -> &'static str {
    match collector {
        CollectorType::Vector => VECTOR_CONFIG_DIR,
        CollectorType::Fluentd => FLUENTD_CONFIG_DIR,
    }
}

/// The collector's state directory. Vector keeps one per forwarder so that several forwarders
/// can share a node.
pub fn data_dir(collector: CollectorType, namespace: &str, name: &str) -> String {
    match collector {
        CollectorType::Vector => format!("{VECTOR_DATA_DIR}/{namespace}/{name}"),
        CollectorType::Fluentd => FLUENTD_DATA_DIR.to_string(),
    }
}
