use super::{check_ref, inputs::validate_tls_materials, Failure};
use crate::{
    conditions::{self, reason, AttributeGroup, ConditionMap},
    refs, ResolvedRefs,
};
use logging_forwarder_controller_k8s_api::{
    observability::{
        output::{AwsAuthType, AwsAuthentication, HttpAuthentication, OutputTuning},
        BearerToken, BearerTokenFrom, OutputSpec, OutputType,
    },
    ClusterLogForwarderSpec,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use url::Url;

static ROLE_ARN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^arn:aws(-[a-z]+)*:iam::\d{12}:role/[\w+=,.@/-]+$").expect("role ARN regex")
});

const COMPRESSION: [&str; 6] = ["none", "gzip", "zlib", "zstd", "snappy", "lz4"];

/// Validates every declared output and returns the names of those that passed.
pub(super) fn validate(
    spec: &ClusterLogForwarderSpec,
    refs: &ResolvedRefs,
    conditions: &mut ConditionMap,
) -> BTreeSet<String> {
    let mut valid = BTreeSet::new();
    let mut names = BTreeSet::new();
    for output in &spec.outputs {
        let mut failure = Failure::new(reason::VALIDATION_FAILURE);
        if !names.insert(output.name.as_str()) {
            failure.push(format!("output name {:?} is not unique", output.name));
        }
        validate_output(output, refs, &mut failure);

        let condition = match failure.into_result() {
            Ok(()) => {
                valid.insert(output.name.clone());
                conditions::valid(
                    conditions::VALID_OUTPUT_PREFIX,
                    &output.name,
                    format!("output {:?} is valid", output.name),
                )
            }
            Err(f) => conditions::invalid(
                conditions::VALID_OUTPUT_PREFIX,
                &output.name,
                f.reason,
                format!("{}: {}", output.name, f.message()),
            ),
        };
        conditions.set(AttributeGroup::Outputs, condition);
    }
    valid
}

fn validate_output(output: &OutputSpec, refs: &ResolvedRefs, failure: &mut Failure) {
    if output.name.is_empty() {
        failure.push("output name must not be empty");
    }
    if !output.has_type_block() {
        failure.push(format!(
            "output type {} requires a {:?} block",
            output.type_,
            output.type_.as_str()
        ));
        return;
    }

    validate_urls(output, failure);

    if let Some(tls) = output.tls_spec() {
        validate_tls_materials(tls, failure);
    }
    for r in refs::output_refs(output) {
        check_ref(&r, refs, failure);
    }
    if let Some(auth) = output.http_authentication() {
        validate_http_auth(auth, failure);
    }
    if let Some(aws) = output.aws_authentication() {
        validate_aws_auth(aws, refs, failure);
    }
    if let Some(tuning) = output.tuning() {
        validate_tuning(output.type_, tuning, failure);
    }
    if let Some(limit) = output.rate_limit {
        if limit.max_records_per_second <= 0 {
            failure.push("rateLimit.maxRecordsPerSecond must be positive");
        }
    }

    validate_type(output, failure);
}

/// Endpoints must parse and use a scheme the sink speaks. TLS material on a plain scheme is
/// accepted and left out of the generated sink.
fn validate_urls(output: &OutputSpec, failure: &mut Failure) {
    let mut urls = output.url().into_iter().collect::<Vec<_>>();
    if let Some(kafka) = output.kafka.as_ref().filter(|_| urls.is_empty()) {
        urls.extend(kafka.brokers.iter().map(String::as_str));
    }

    let required = matches!(
        output.type_,
        OutputType::Elasticsearch
            | OutputType::Http
            | OutputType::Kafka
            | OutputType::Loki
            | OutputType::Otlp
            | OutputType::Splunk
            | OutputType::Syslog
    );
    if urls.is_empty() {
        if required {
            failure.push(match output.type_ {
                OutputType::Kafka => "url or brokers must be specified",
                _ => "url must be specified",
            });
        }
        return;
    }

    for raw in urls {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(error) => {
                failure.push(format!("invalid URL {raw:?}: {error}"));
                continue;
            }
        };
        if !schemes(output.type_).contains(&url.scheme()) {
            failure.push(format!(
                "URL {raw:?} must use one of the schemes {:?}",
                schemes(output.type_)
            ));
        }
    }
}

fn schemes(t: OutputType) -> &'static [&'static str] {
    match t {
        OutputType::Syslog => &["tcp", "tls", "udp", "udps"],
        OutputType::Kafka => &["tcp", "tls"],
        OutputType::Cloudwatch
        | OutputType::Elasticsearch
        | OutputType::Http
        | OutputType::Loki
        | OutputType::Otlp
        | OutputType::S3
        | OutputType::Splunk => &["http", "https"],
        OutputType::AzureMonitor | OutputType::GoogleCloudLogging | OutputType::LokiStack => &[],
    }
}

fn validate_http_auth(auth: &HttpAuthentication, failure: &mut Failure) {
    if auth.username.is_some() != auth.password.is_some() {
        failure.push("authentication requires both username and password");
    }
    if let Some(token) = &auth.token {
        validate_bearer_token(token, failure);
    }
}

fn validate_bearer_token(token: &BearerToken, failure: &mut Failure) {
    if token.from == BearerTokenFrom::Secret {
        let named = token
            .secret
            .as_ref()
            .map(|s| !s.name.is_empty() && !s.key.is_empty())
            .unwrap_or(false);
        if !named {
            failure.push("token from secret requires a secret name and key");
        }
    }
}

fn validate_aws_auth(aws: &AwsAuthentication, refs: &ResolvedRefs, failure: &mut Failure) {
    match aws.type_ {
        AwsAuthType::AwsAccessKey => {
            if aws.aws_access_key.is_none() {
                failure.push("awsAccessKey authentication requires an awsAccessKey block");
            }
        }
        AwsAuthType::IamRole => {
            let Some(role) = aws.iam_role.as_ref() else {
                failure.push("iamRole authentication requires an iamRole block");
                return;
            };
            validate_bearer_token(&role.token, failure);
            if let Some(arn) = refs.secret_str(role.role_arn.secret_name(), &role.role_arn.key) {
                if !ROLE_ARN.is_match(arn) {
                    failure.push(format!("{arn:?} is not a valid IAM role ARN"));
                }
            }
        }
    }
}

fn validate_tuning(t: OutputType, tuning: &OutputTuning, failure: &mut Failure) {
    if let (Some(min), Some(max)) = (tuning.min_retry_duration, tuning.max_retry_duration) {
        if min.as_duration() > max.as_duration() {
            failure.push("minRetryDuration must not exceed maxRetryDuration");
        }
    }
    if let Some(c) = tuning.compression.as_deref().filter(|c| !c.is_empty()) {
        let supported = COMPRESSION.contains(&c) && !(t == OutputType::Kafka && c == "zlib");
        if !supported {
            failure.push(format!("compression {c:?} is not supported by {t} outputs"));
        }
    }
}

/// Fields each output type cannot do without.
fn validate_type(output: &OutputSpec, failure: &mut Failure) {
    match output.type_ {
        OutputType::AzureMonitor => {
            let Some(azure) = &output.azure_monitor else { return };
            if azure.customer_id.is_empty() {
                failure.push("customerId must be specified");
            }
            let has_key = azure
                .authentication
                .as_ref()
                .and_then(|a| a.shared_key.as_ref())
                .is_some();
            if !has_key {
                failure.push("authentication.sharedKey must be specified");
            }
        }
        OutputType::Cloudwatch => {
            let Some(cw) = &output.cloudwatch else { return };
            if cw.region.is_empty() {
                failure.push("region must be specified");
            }
            if cw.group_name.is_empty() {
                failure.push("groupName must be specified");
            }
            if cw.authentication.is_none() {
                failure.push("authentication must be specified");
            }
        }
        OutputType::GoogleCloudLogging => {
            let Some(gcl) = &output.google_cloud_logging else { return };
            if gcl.id.value.is_empty() {
                failure.push("id.value must be specified");
            }
            if gcl.log_id.is_empty() {
                failure.push("logId must be specified");
            }
            let has_credentials = gcl
                .authentication
                .as_ref()
                .and_then(|a| a.credentials.as_ref())
                .is_some();
            if !has_credentials {
                failure.push("authentication.credentials must be specified");
            }
        }
        OutputType::Kafka => {
            let Some(kafka) = &output.kafka else { return };
            let sasl = kafka.authentication.as_ref().and_then(|a| a.sasl.as_ref());
            if let Some(sasl) = sasl {
                if sasl.username.is_some() != sasl.password.is_some() {
                    failure.push("sasl requires both username and password");
                }
            }
        }
        OutputType::S3 => {
            let Some(s3) = &output.s3 else { return };
            if s3.bucket.is_empty() {
                failure.push("bucket must be specified");
            }
            if s3.region.is_empty() {
                failure.push("region must be specified");
            }
            if s3.authentication.is_none() {
                failure.push("authentication must be specified");
            }
        }
        OutputType::Splunk => {
            if output.splunk.as_ref().and_then(|s| s.authentication.as_ref()).is_none() {
                failure.push("authentication.token must be specified");
            }
        }
        OutputType::LokiStack => {
            let Some(ls) = &output.loki_stack else { return };
            if ls.target.name.is_empty() {
                failure.push("target.name must be specified");
            }
        }
        OutputType::Elasticsearch
        | OutputType::Http
        | OutputType::Loki
        | OutputType::Otlp
        | OutputType::Syslog => {}
    }
}
