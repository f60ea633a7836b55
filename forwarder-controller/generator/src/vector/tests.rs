use crate::{generate, Error, Forwarder};
use logging_forwarder_controller_core::{
    paths, KeyRef, Options, ResolvedRefs, ResourceNames, TlsProfile,
};
use logging_forwarder_controller_k8s_api::ClusterLogForwarderSpec;
use maplit::btreemap;
use pretty_assertions::assert_eq;
use serde_json::json;

fn spec(value: serde_json::Value) -> ClusterLogForwarderSpec {
    serde_json::from_value(value).expect("spec must parse")
}

fn refs() -> ResolvedRefs {
    ResolvedRefs {
        secrets: btreemap! {
            "es-secret".to_string() => btreemap! {
                "token".to_string() => b"abc".to_vec(),
                "username".to_string() => b"elastic".to_vec(),
                "password".to_string() => b"changeme".to_vec(),
                "ca-bundle.crt".to_string() => b"---".to_vec(),
            },
            "kafka-secret".to_string() => btreemap! {
                "username".to_string() => b"user".to_vec(),
                "password".to_string() => b"pass".to_vec(),
            },
        },
        ..Default::default()
    }
}

fn render(spec: &ClusterLogForwarderSpec, refs: &ResolvedRefs, options: &Options) -> Result<String, Error> {
    let names = ResourceNames::new("openshift-logging", "collector", "logcollector");
    let forwarder = Forwarder {
        namespace: "openshift-logging",
        name: "collector",
        names: &names,
        spec,
    };
    generate(&forwarder, refs, &TlsProfile::default(), options).map(|c| c.text)
}

fn es_forwarder() -> ClusterLogForwarderSpec {
    spec(json!({
        "serviceAccount": { "name": "logcollector" },
        "outputs": [{
            "name": "es-out",
            "type": "elasticsearch",
            "elasticsearch": {
                "url": "https://es.example.com:9200",
                "version": 8,
                "authentication": {
                    "token": { "from": "secret", "secret": { "name": "es-secret", "key": "token" } }
                }
            },
            "tls": { "ca": { "key": "ca-bundle.crt", "secret": { "name": "es-secret" } } }
        }],
        "pipelines": [{
            "name": "app",
            "inputRefs": ["application"],
            "outputRefs": ["es-out"]
        }]
    }))
}

#[test]
fn generation_is_deterministic() {
    let spec = es_forwarder();
    let first = render(&spec, &refs(), &Options::default()).unwrap();
    let second = render(&spec, &refs(), &Options::default()).unwrap();
    assert_eq!(first, second);

    let mut changed = spec.clone();
    changed.outputs[0].elasticsearch.as_mut().unwrap().url = "https://es2.example.com:9200".to_string();
    assert_ne!(first, render(&changed, &refs(), &Options::default()).unwrap());
}

#[test]
fn elasticsearch_sink() {
    let config = render(&es_forwarder(), &refs(), &Options::default()).unwrap();

    assert!(config.contains("[sources.input_application_container]"), "{config}");
    assert!(config.contains("[transforms.output_es_out_remap]"), "{config}");
    assert!(config.contains("inputs = [\"input_application_container_meta\"]"), "{config}");
    assert!(config.contains("[sinks.output_es_out]"), "{config}");
    assert!(config.contains("type = \"elasticsearch\""), "{config}");
    assert!(config.contains("inputs = [\"output_es_out_remap\"]"), "{config}");
    assert!(config.contains("endpoints = [\"https://es.example.com:9200\"]"), "{config}");
    assert!(config.contains("api_version = \"v8\""), "{config}");
    assert!(config.contains("bulk.index = \"{{ _internal.es_index }}\""), "{config}");
    assert!(config.contains("._internal.es_index = \"app-write\""), "{config}");
    assert!(config.contains("[sinks.output_es_out.tls]"), "{config}");
    assert!(
        config.contains(&format!(
            "ca_file = \"{}\"",
            paths::secret_file("es-secret", "ca-bundle.crt")
        )),
        "{config}"
    );
    assert!(config.contains("[sinks.output_es_out.request.headers]"), "{config}");
    assert!(
        config.contains("\"Authorization\" = \"Bearer SECRET[kubernetes_secret.es-secret/token]\""),
        "{config}"
    );
    assert!(config.contains("[sinks.prometheus_output]"), "{config}");
}

#[test]
fn plain_url_omits_tls() {
    let mut spec = es_forwarder();
    spec.outputs[0].elasticsearch.as_mut().unwrap().url = "http://es.example.com:9200".to_string();
    let config = render(&spec, &refs(), &Options::default()).unwrap();

    assert!(config.contains("endpoints = [\"http://es.example.com:9200\"]"), "{config}");
    assert!(!config.contains("[sinks.output_es_out.tls]"), "{config}");
    assert!(!config.contains("ca_file"), "{config}");
}

#[test]
fn debug_output_replaces_sinks() {
    let options = Options {
        debug_output: true,
        ..Default::default()
    };
    let config = render(&es_forwarder(), &refs(), &options).unwrap();
    assert!(config.contains("type = \"console\""), "{config}");
    assert!(!config.contains("type = \"elasticsearch\""), "{config}");
}

#[test]
fn kafka_sink() {
    let spec = spec(json!({
        "serviceAccount": { "name": "logcollector" },
        "outputs": [{
            "name": "kafka",
            "type": "kafka",
            "kafka": {
                "url": "tls://broker:9093/app-{.kubernetes.namespace_name||\"none\"}",
                "authentication": {
                    "sasl": {
                        "username": { "key": "username", "secret": { "name": "kafka-secret" } },
                        "password": { "key": "password", "secret": { "name": "kafka-secret" } },
                        "mechanism": "SCRAM-SHA-512"
                    }
                },
                "tuning": { "delivery": "AtLeastOnce", "compression": "zstd" }
            }
        }],
        "pipelines": [{
            "name": "infra",
            "inputRefs": ["infrastructure"],
            "outputRefs": ["kafka"]
        }]
    }));
    let config = render(&spec, &refs(), &Options::default()).unwrap();

    assert!(config.contains("bootstrap_servers = \"broker:9093\""), "{config}");
    assert!(config.contains("topic = \"{{ _internal.kafka_topic }}\""), "{config}");
    assert!(
        config.contains("._internal.kafka_topic = \"app-\" + (string(.kubernetes.namespace_name) ?? \"none\")"),
        "{config}"
    );
    assert!(config.contains("compression = \"zstd\""), "{config}");
    assert!(config.contains("[sinks.output_kafka.tls]\nenabled = true"), "{config}");
    assert!(config.contains("[sinks.output_kafka.sasl]"), "{config}");
    assert!(config.contains("mechanism = \"SCRAM-SHA-512\""), "{config}");
    assert!(
        config.contains("username = \"SECRET[kubernetes_secret.kafka-secret/username]\""),
        "{config}"
    );
    assert!(config.contains("type = \"disk\""), "{config}");
    assert!(config.contains("[sinks.output_kafka.acknowledgements]"), "{config}");
    assert!(!config.contains("[sinks.output_kafka.batch]"), "{config}");
}

#[test]
fn syslog_sink() {
    let spec = spec(json!({
        "serviceAccount": { "name": "logcollector" },
        "outputs": [{
            "name": "rsyslog",
            "type": "syslog",
            "syslog": {
                "url": "udp://syslog.example.com",
                "rfc": "RFC3164",
                "appName": "{.kubernetes.container_name||\"app\"}",
                "facility": "user"
            }
        }],
        "pipelines": [{
            "name": "audit",
            "inputRefs": ["audit"],
            "outputRefs": ["rsyslog"]
        }]
    }));
    let config = render(&spec, &refs(), &Options::default()).unwrap();

    assert!(config.contains("address = \"syslog.example.com:514\""), "{config}");
    assert!(config.contains("mode = \"udp\""), "{config}");
    assert!(config.contains("rfc = \"rfc3164\""), "{config}");
    assert!(config.contains("facility = \"user\""), "{config}");
    assert!(config.contains("app_name = \"{{ _internal.syslog_app_name }}\""), "{config}");
    assert!(!config.contains("[sinks.output_rsyslog.tls]"), "{config}");
}

#[test]
fn cloudwatch_with_role() {
    let spec = spec(json!({
        "serviceAccount": { "name": "logcollector" },
        "outputs": [{
            "name": "cw",
            "type": "cloudwatch",
            "cloudwatch": {
                "region": "us-east-2",
                "groupName": "{.log_type||\"none\"}",
                "authentication": {
                    "type": "iamRole",
                    "iamRole": {
                        "roleArn": { "key": "role_arn", "secret": { "name": "cw-secret" } },
                        "token": { "from": "serviceAccount" }
                    }
                }
            }
        }],
        "pipelines": [{
            "name": "app",
            "inputRefs": ["application"],
            "outputRefs": ["cw"]
        }]
    }));
    let config = render(&spec, &ResolvedRefs::default(), &Options::default()).unwrap();

    assert!(config.contains("type = \"aws_cloudwatch_logs\""), "{config}");
    assert!(config.contains("region = \"us-east-2\""), "{config}");
    assert!(config.contains("group_name = \"{{ _internal.cw_group_name }}\""), "{config}");
    assert!(config.contains("stream_name = \"{{ _internal.cw_stream_name }}\""), "{config}");
    assert!(
        config.contains(&format!(
            "auth.credentials_file = \"{}\"",
            paths::aws_credentials_file()
        )),
        "{config}"
    );
    assert!(config.contains("auth.profile = \"output_cw\""), "{config}");
    assert!(config.contains("[sinks.output_cw.tls]"), "{config}");
}

#[test]
fn receivers_listen_with_serving_certificates() {
    let spec = spec(json!({
        "serviceAccount": { "name": "logcollector" },
        "inputs": [{
            "name": "http-audit",
            "type": "receiver",
            "receiver": { "type": "http", "port": 8443, "http": { "format": "kubeAPIAudit" } }
        }],
        "outputs": [{
            "name": "loki",
            "type": "loki",
            "loki": { "url": "http://loki:3100/" }
        }],
        "pipelines": [{
            "name": "receive",
            "inputRefs": ["http-audit"],
            "outputRefs": ["loki"]
        }]
    }));
    let config = render(&spec, &refs(), &Options::default()).unwrap();
    let names = ResourceNames::new("openshift-logging", "collector", "logcollector");
    let dir = paths::receiver_cert_dir(&names.input_service("http-audit"));

    assert!(config.contains("[sources.input_http_audit]"), "{config}");
    assert!(config.contains("type = \"http_server\""), "{config}");
    assert!(config.contains("address = \"[::]:8443\""), "{config}");
    assert!(config.contains(&format!("crt_file = \"{dir}/tls.crt\"")), "{config}");
    assert!(config.contains("[transforms.input_http_audit_items_meta]"), "{config}");
    assert!(config.contains("endpoint = \"http://loki:3100\""), "{config}");
    assert!(config.contains("k8s_namespace_name = \"{{ kubernetes.namespace_name }}\""), "{config}");
}

#[test]
fn filters_chain_in_order() {
    let spec = spec(json!({
        "serviceAccount": { "name": "logcollector" },
        "filters": [
            {
                "name": "drop-debug",
                "type": "drop",
                "drop": [{ "test": [{ "field": ".level", "matches": "debug" }] }]
            },
            { "name": "parse", "type": "parse" }
        ],
        "outputs": [{
            "name": "http",
            "type": "http",
            "http": {
                "url": "http://collector.example.com:8080/logs",
                "method": "PUT",
                "timeout": 10,
                "headers": { "X-Tenant": "a" }
            }
        }],
        "pipelines": [{
            "name": "app",
            "inputRefs": ["application"],
            "filterRefs": ["drop-debug", "parse"],
            "outputRefs": ["http"]
        }]
    }));
    let config = render(&spec, &refs(), &Options::default()).unwrap();

    let drop = config.find("[transforms.pipeline_app_drop_debug]").expect("drop filter");
    let parse = config.find("[transforms.pipeline_app_parse]").expect("parse filter");
    assert!(drop < parse, "{config}");
    assert!(config.contains("inputs = [\"pipeline_app_drop_debug\"]"), "{config}");
    assert!(config.contains("inputs = [\"pipeline_app_parse\"]"), "{config}");
    assert!(config.contains("method = \"put\""), "{config}");
    assert!(config.contains("timeout_secs = 10"), "{config}");
    assert!(config.contains("\"X-Tenant\" = \"a\""), "{config}");
}

#[test]
fn unresolved_secrets_fail() {
    let spec = spec(json!({
        "serviceAccount": { "name": "logcollector" },
        "outputs": [{
            "name": "es",
            "type": "elasticsearch",
            "elasticsearch": {
                "url": "http://es:9200",
                "authentication": {
                    "username": { "key": "username", "secret": { "name": "missing" } },
                    "password": { "key": "password", "secret": { "name": "missing" } }
                }
            }
        }],
        "pipelines": [{
            "name": "app",
            "inputRefs": ["application"],
            "outputRefs": ["es"]
        }]
    }));
    match render(&spec, &refs(), &Options::default()) {
        Err(Error::UnresolvedReference(r)) => {
            assert_eq!(r, KeyRef::secret("missing", "username"));
        }
        res => panic!("unexpected result: {res:?}"),
    }
}

#[test]
fn unrouted_outputs_are_skipped() {
    let mut spec = es_forwarder();
    spec.pipelines.clear();
    let config = render(&spec, &refs(), &Options::default()).unwrap();
    assert!(!config.contains("[sinks.output_es_out]"), "{config}");
}
