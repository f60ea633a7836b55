use super::*;
use logging_forwarder_controller_core::{
    annotations::{CONFIG_HASH, SERVING_CERT_SECRET_NAME},
    dns1123_label,
    labels::{INJECT_TRUSTED_CA_BUNDLE, INPUT_SERVICE_TYPE},
    paths,
};
use logging_forwarder_controller_k8s_api::{
    api::networking::v1::NetworkPolicyPort, observability::NetworkPolicyRuleSet, Deployment,
    IntOrString, ObjectMeta,
};
use maplit::btreemap;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeSet;

const UID: &str = "8c1f0a7e-0000-4000-8000-000000000001";

fn forwarder(spec: serde_json::Value) -> ClusterLogForwarder {
    let spec: ClusterLogForwarderSpec = serde_json::from_value(spec).expect("spec must parse");
    ClusterLogForwarder {
        metadata: ObjectMeta {
            name: Some("collector".to_string()),
            namespace: Some("openshift-logging".to_string()),
            uid: Some(UID.to_string()),
            ..Default::default()
        },
        spec,
        status: None,
    }
}

fn cluster() -> Cluster {
    Cluster {
        id: "cluster-1234".to_string(),
        version: "6.2.0".to_string(),
        vector_image: "registry.example.com/vector:6.2".to_string(),
        fluentd_image: "registry.example.com/fluentd:5.9".to_string(),
        proxy: ProxyConfig {
            https_proxy: Some("https://proxy.example.com:3129".to_string()),
            ..Default::default()
        },
    }
}

fn config(collector: CollectorType, listener_ports: impl IntoIterator<Item = i32>) -> Config {
    Config {
        collector,
        text: "[sources.internal_metrics]\n".to_string(),
        listener_ports: listener_ports.into_iter().collect(),
    }
}

struct Fixture {
    clf: ClusterLogForwarder,
    names: ResourceNames,
    cluster: Cluster,
    options: Options,
    config: Config,
}

impl Fixture {
    fn new(spec: serde_json::Value) -> Self {
        let clf = forwarder(spec);
        let names = ResourceNames::of(&clf);
        let options = Options::from_annotations(clf.annotations());
        let ports = logging_forwarder_controller_core::ports::input_ports(&clf.spec.inputs);
        let config = config(clf.spec.collector_type(), ports);
        Self {
            clf,
            names,
            cluster: cluster(),
            options,
            config,
        }
    }

    fn ctx(&self) -> Context<'_> {
        Context {
            forwarder: &self.clf,
            spec: &self.clf.spec,
            names: &self.names,
            cluster: &self.cluster,
            options: &self.options,
            config: &self.config,
            config_hash: "h1",
            trust_bundle: Some("-----BEGIN CERTIFICATE-----"),
            aws_credentials: None,
            service_account_uid: Some("sa-uid"),
        }
    }
}

fn lokistack() -> serde_json::Value {
    json!({
        "serviceAccount": { "name": "logcollector" },
        "outputs": [{
            "name": "default-lokistack",
            "type": "lokiStack",
            "lokiStack": {
                "target": { "name": "logging-loki", "namespace": "openshift-logging" },
                "authentication": { "token": { "from": "serviceAccount" } }
            },
            "tls": {
                "ca": { "key": "service-ca.crt", "configMap": { "name": "openshift-service-ca.crt" } }
            }
        }],
        "pipelines": [{
            "name": "all",
            "inputRefs": ["application", "infrastructure", "audit"],
            "outputRefs": ["default-lokistack"]
        }]
    })
}

fn receiver() -> serde_json::Value {
    json!({
        "serviceAccount": { "name": "logcollector" },
        "inputs": [{
            "name": "http-in",
            "type": "receiver",
            "receiver": { "type": "http", "port": 8080, "http": { "format": "kubeAPIAudit" } }
        }],
        "outputs": [{
            "name": "es",
            "type": "elasticsearch",
            "elasticsearch": { "url": "https://es.example.com:9200", "version": 8 }
        }],
        "pipelines": [{ "name": "p", "inputRefs": ["http-in"], "outputRefs": ["es"] }],
        "networkPolicy": { "ruleSet": "RestrictIngressEgress" }
    })
}

fn metas(desired: &Desired) -> Vec<(&'static str, &ObjectMeta)> {
    let mut metas = vec![
        ("service account", &desired.service_account.metadata),
        ("token", &desired.service_account_token.metadata),
        ("scc role", &desired.scc_role.metadata),
        ("scc role binding", &desired.scc_role_binding.metadata),
        ("trust bundle", &desired.trust_bundle.metadata),
        ("metrics service", &desired.metrics_service.metadata),
        ("service monitor", &desired.service_monitor.metadata),
        ("network policy", &desired.network_policy.metadata),
    ];
    metas.push(match &desired.config {
        ConfigArtifact::Secret(s) => ("config", &s.metadata),
        ConfigArtifact::ConfigMap(c) => ("config", &c.metadata),
    });
    metas.push(match &desired.workload {
        Workload::DaemonSet(ds) => ("workload", &ds.metadata),
        Workload::Deployment(d) => ("workload", &d.metadata),
    });
    metas.extend(desired.input_services.iter().map(|s| ("input service", &s.metadata)));
    metas
}

#[test]
fn lokistack_forwarder_runs_as_daemonset() {
    let fixture = Fixture::new(lokistack());
    let desired = Desired::build(&fixture.ctx());

    let Workload::DaemonSet(ds) = &desired.workload else {
        panic!("expected a daemon set: {:?}", desired.workload);
    };
    assert_eq!(ds.metadata.name.as_deref(), Some("collector"));
    let strategy = ds.spec.as_ref().and_then(|s| s.update_strategy.as_ref()).unwrap();
    assert_eq!(
        strategy.rolling_update.as_ref().unwrap().max_unavailable,
        Some(IntOrString::String("100%".to_string()))
    );

    let port = &desired.metrics_service.spec.as_ref().unwrap().ports.as_ref().unwrap()[0];
    assert_eq!(port.name.as_deref(), Some("metrics"));
    assert_eq!(port.port, 24231);
    assert_eq!(
        desired.metrics_service.metadata.annotations.as_ref().unwrap()[SERVING_CERT_SECRET_NAME],
        "collector-metrics"
    );

    assert_eq!(desired.trust_bundle.metadata.name.as_deref(), Some("collector-trustbundle"));
    assert_eq!(
        desired.trust_bundle.metadata.labels.as_ref().unwrap()[INJECT_TRUSTED_CA_BUNDLE],
        "true"
    );
    assert!(desired.trust_bundle.data.is_none());

    assert_eq!(
        desired.metadata_reader_binding.metadata.name.as_deref(),
        Some("cluster-logging-openshift-logging-collector-metadata-reader")
    );
    assert!(desired.input_services.is_empty());
    assert!(desired.aws_credentials.is_none());
}

#[test]
fn every_resource_is_labeled_and_owned() {
    let fixture = Fixture::new(receiver());
    let desired = Desired::build(&fixture.ctx());
    let identity = fixture.ctx().identity();

    for (kind, meta) in metas(&desired) {
        let labels = meta.labels.clone().unwrap_or_default();
        assert!(identity.matches(&labels), "{kind} labels: {labels:?}");
        assert_eq!(labels["app.kubernetes.io/version"], "6.2.0");

        let owners = meta.owner_references.clone().unwrap_or_default();
        assert_eq!(owners.len(), 1, "{kind}");
        assert_eq!(owners[0].uid, UID, "{kind}");
        assert_eq!(owners[0].kind, "ClusterLogForwarder", "{kind}");
        assert_eq!(owners[0].controller, Some(true), "{kind}");
        assert_eq!(meta.namespace.as_deref(), Some("openshift-logging"), "{kind}");
    }

    let binding = &desired.metadata_reader_binding.metadata;
    assert!(binding.owner_references.is_none());
    assert!(identity.matches(binding.labels.as_ref().unwrap()));
}

#[test]
fn receiver_only_forwarder_runs_as_deployment() {
    let fixture = Fixture::new(receiver());
    let desired = Desired::build(&fixture.ctx());

    let Workload::Deployment(deploy) = &desired.workload else {
        panic!("expected a deployment: {:?}", desired.workload);
    };
    assert!(deploy.spec.as_ref().unwrap().replicas.is_none());
    let volumes = deploy
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|s| s.volumes.clone())
        .unwrap_or_default();
    assert!(!volumes.iter().any(|v| v.name == "varlogpods"));
    let datadir = volumes.iter().find(|v| v.name == "datadir").unwrap();
    assert!(datadir.empty_dir.is_some());

    let [svc] = desired.input_services.as_slice() else {
        panic!("expected one input service");
    };
    assert_eq!(svc.metadata.name.as_deref(), Some("collector-http-in"));
    assert_eq!(svc.metadata.labels.as_ref().unwrap()[INPUT_SERVICE_TYPE], "http");
    assert_eq!(
        svc.metadata.annotations.as_ref().unwrap()[SERVING_CERT_SECRET_NAME],
        "collector-http-in"
    );
    let port = &svc.spec.as_ref().unwrap().ports.as_ref().unwrap()[0];
    assert_eq!((port.port, port.protocol.as_deref()), (8080, Some("TCP")));
}

#[test]
fn restricted_network_policy() {
    let fixture = Fixture::new(receiver());
    let policy = network_policy(&fixture.ctx());
    let spec = policy.spec.unwrap();

    let port = |p: IntOrString, proto: &str| NetworkPolicyPort {
        port: Some(p),
        protocol: Some(proto.to_string()),
        end_port: None,
    };
    assert_eq!(
        spec.ingress.unwrap()[0].ports.clone().unwrap(),
        vec![
            port(IntOrString::String("metrics".to_string()), "TCP"),
            port(IntOrString::Int(8080), "TCP"),
        ]
    );
    assert_eq!(
        spec.egress.unwrap()[0].ports.clone().unwrap(),
        vec![
            port(IntOrString::Int(53), "UDP"),
            port(IntOrString::Int(3129), "TCP"),
            port(IntOrString::Int(6443), "TCP"),
            port(IntOrString::Int(9200), "TCP"),
        ]
    );
}

#[test]
fn default_network_policy_allows_everything() {
    let fixture = Fixture::new(lokistack());
    assert_eq!(
        fixture.clf.spec.network_policy_rule_set(),
        NetworkPolicyRuleSet::AllowAllIngressEgress
    );
    let spec = network_policy(&fixture.ctx()).spec.unwrap();
    assert_eq!(spec.ingress.unwrap(), vec![Default::default()]);
    assert_eq!(spec.egress.unwrap(), vec![Default::default()]);
}

#[test]
fn pod_template_environment() {
    let fixture = Fixture::new(lokistack());
    let workload = workload(&fixture.ctx());

    assert_eq!(workload.env("COLLECTOR_CONF_HASH"), Some("h1"));
    assert_eq!(
        workload.env("TRUSTED_CA_HASH"),
        Some(logging_forwarder_controller_core::config_hash("-----BEGIN CERTIFICATE-----").as_str())
    );
    assert_eq!(workload.env("OPENSHIFT_CLUSTER_ID"), Some("cluster-1234"));
    assert_eq!(workload.env("VECTOR_LOG"), Some("warn"));
    assert_eq!(workload.env("HTTPS_PROXY"), Some("https://proxy.example.com:3129"));
    assert_eq!(workload.env("https_proxy"), Some("https://proxy.example.com:3129"));
    assert_eq!(workload.annotations()[CONFIG_HASH], "h1");

    let spec = workload.pod_template().and_then(|t| t.spec.clone()).unwrap();
    assert_eq!(spec.priority_class_name.as_deref(), Some("system-node-critical"));
    assert_eq!(spec.termination_grace_period_seconds, Some(10));
    assert_eq!(spec.node_selector.unwrap()["kubernetes.io/os"], "linux");
    assert_eq!(spec.tolerations.unwrap().len(), 2);

    let container = &spec.containers[0];
    let security = container.security_context.clone().unwrap();
    assert_eq!(security.read_only_root_filesystem, Some(true));
    assert_eq!(
        security.capabilities.unwrap().drop,
        Some(vec!["ALL".to_string()])
    );
    assert_eq!(security.se_linux_options.unwrap().type_.as_deref(), Some("spc_t"));

    let mounts = container
        .volume_mounts
        .clone()
        .unwrap()
        .into_iter()
        .map(|m| m.mount_path)
        .collect::<BTreeSet<_>>();
    for path in [
        "/var/log/pods",
        "/var/log/kube-apiserver",
        "/etc/vector",
        "/var/lib/vector/openshift-logging/collector",
        "/var/run/ocp-collector/secrets/logcollector-token",
        "/var/run/ocp-collector/config/openshift-service-ca.crt",
        paths::TRUSTED_CA_DIR,
    ] {
        assert!(mounts.contains(path), "missing mount {path}: {mounts:?}");
    }
}

#[test]
fn config_hash_changes_roll_the_pods() {
    let fixture = Fixture::new(lokistack());
    let before = workload(&fixture.ctx());
    let after = workload(&Context {
        config_hash: "h2",
        ..fixture.ctx()
    });
    assert_ne!(before.env("COLLECTOR_CONF_HASH"), after.env("COLLECTOR_CONF_HASH"));

    let (Workload::DaemonSet(before), Workload::DaemonSet(after)) = (before, after) else {
        panic!("expected daemon sets");
    };
    assert!(!Managed::compare(&before, &after).equal);
}

#[test]
fn fluentd_artifacts() {
    let mut spec = lokistack();
    spec["collector"] = json!({ "type": "fluentd" });
    let fixture = Fixture::new(spec);

    let ConfigArtifact::ConfigMap(cm) = config_artifact(&fixture.ctx()) else {
        panic!("fluentd configuration lives in a config map");
    };
    let keys = cm.data.unwrap().into_keys().collect::<Vec<_>>();
    assert_eq!(keys, vec!["cleanInValidJson.rb", "fluent.conf", "run.sh"]);

    let workload = workload(&fixture.ctx());
    let container = &workload.pod_template().unwrap().spec.as_ref().unwrap().containers[0];
    assert_eq!(
        container.command,
        Some(vec![
            "/bin/sh".to_string(),
            "/etc/fluent/configs.d/user/run.sh".to_string()
        ])
    );
    assert_eq!(workload.env("LOG_LEVEL"), Some("warn"));
}

#[test]
fn vector_config_is_a_secret() {
    let fixture = Fixture::new(lokistack());
    let ConfigArtifact::Secret(secret) = config_artifact(&fixture.ctx()) else {
        panic!("vector configuration lives in a secret");
    };
    assert_eq!(secret.metadata.name.as_deref(), Some("collector-config"));
    assert!(secret.data.unwrap().contains_key("vector.toml"));
}

#[test]
fn iam_role_outputs_project_a_token() {
    let fixture = Fixture::new(json!({
        "serviceAccount": { "name": "logcollector" },
        "outputs": [{
            "name": "cw",
            "type": "cloudwatch",
            "cloudwatch": {
                "region": "us-east-1",
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
        "pipelines": [{ "name": "p", "inputRefs": ["application"], "outputRefs": ["cw"] }]
    }));
    let ctx = Context {
        aws_credentials: Some("[output_cw]\nrole_arn = arn\n"),
        ..fixture.ctx()
    };
    let desired = Desired::build(&ctx);

    let creds = desired.aws_credentials.expect("credentials config map");
    assert_eq!(creds.metadata.name.as_deref(), Some("collector-aws-creds"));
    assert_eq!(
        creds.data.unwrap()["credentials"],
        "[output_cw]\nrole_arn = arn\n"
    );

    let volumes = desired
        .workload
        .pod_template()
        .and_then(|t| t.spec.clone())
        .and_then(|s| s.volumes)
        .unwrap();
    let token = volumes.iter().find(|v| v.name == "sa-token").expect("projected token");
    let projection = token.projected.clone().unwrap().sources.unwrap()[0]
        .service_account_token
        .clone()
        .unwrap();
    assert_eq!(projection.audience.as_deref(), Some("openshift"));
    assert_eq!(projection.expiration_seconds, Some(3600));
}

#[test]
fn dotted_config_map_names_yield_valid_volume_names() {
    let fixture = Fixture::new(lokistack());
    let desired = Desired::build(&fixture.ctx());
    let pod = desired
        .workload
        .pod_template()
        .and_then(|t| t.spec.clone())
        .unwrap();

    let volumes = pod.volumes.unwrap();
    for volume in &volumes {
        assert_eq!(volume.name, dns1123_label(&volume.name));
    }
    let ca = volumes
        .iter()
        .find(|v| v.name == "config-openshift-service-ca-crt")
        .expect("service CA volume");
    assert_eq!(
        ca.config_map.as_ref().map(|c| c.name.as_str()),
        Some("openshift-service-ca.crt")
    );

    let mount = pod.containers[0]
        .volume_mounts
        .iter()
        .flatten()
        .find(|m| m.name == ca.name)
        .expect("service CA mount");
    assert_eq!(
        mount.mount_path,
        paths::config_map_dir("openshift-service-ca.crt")
    );
}

#[test]
fn service_account_and_token() {
    let fixture = Fixture::new(lokistack());
    let sa = service_account(&fixture.ctx());
    assert_eq!(sa.metadata.name.as_deref(), Some("logcollector"));
    assert_eq!(sa.metadata.finalizers, Some(vec![DEPENDENTS_FINALIZER.to_string()]));

    let token = service_account_token(&fixture.ctx());
    assert_eq!(token.metadata.name.as_deref(), Some("logcollector-token"));
    assert_eq!(token.type_.as_deref(), Some("kubernetes.io/service-account-token"));
    assert_eq!(
        token.metadata.annotations.unwrap(),
        btreemap! {
            "kubernetes.io/service-account.name".to_string() => "logcollector".to_string(),
            "kubernetes.io/service-account.uid".to_string() => "sa-uid".to_string(),
        }
    );
}

#[test]
fn security_context_constraints_are_constant() {
    let scc = security_context_constraints("6.2.0");
    assert_eq!(scc.metadata.name.as_deref(), Some(SCC_NAME));
    assert!(scc.read_only_root_filesystem);
    assert!(scc.allow_host_dir_volume_plugin);
    assert!(!scc.allow_privileged_container);
    assert_eq!(scc.allow_privilege_escalation, Some(false));
    assert_eq!(scc.default_allow_privilege_escalation, Some(false));
    assert_eq!(scc.forbidden_sysctls, Some(vec!["*".to_string()]));
    assert_eq!(scc.run_as_user.type_, "RunAsAny");
    assert_eq!(scc.required_drop_capabilities.as_ref().unwrap().len(), 9);

    let mut reordered = scc.clone();
    reordered.volumes.as_mut().unwrap().reverse();
    assert!(Managed::compare(&reordered, &scc).equal);

    reordered.allow_privilege_escalation = None;
    assert_eq!(
        Managed::compare(&reordered, &scc),
        Comparison::differs("allowPrivilegeEscalation differs")
    );
}

#[test]
fn converged_objects_compare_equal() {
    let fixture = Fixture::new(receiver());
    let desired = Desired::build(&fixture.ctx());

    // Simulate server defaulting on the observed copies.
    let Workload::Deployment(wanted) = &desired.workload else {
        panic!("expected a deployment");
    };
    let mut deploy_json = serde_json::to_value(wanted).unwrap();
    deploy_json["metadata"]["resourceVersion"] = json!("42");
    deploy_json["metadata"]["labels"]["extra"] = json!("kept");
    deploy_json["spec"]["replicas"] = json!(1);
    deploy_json["spec"]["template"]["spec"]["containers"][0]["terminationMessagePath"] =
        json!("/dev/termination-log");
    let observed: Deployment = serde_json::from_value(deploy_json).unwrap();
    assert_eq!(Managed::compare(&observed, wanted), Comparison::equal());

    let mut svc = desired.input_services[0].clone();
    svc.spec.as_mut().unwrap().cluster_ip = Some("172.30.0.10".to_string());
    assert!(Managed::compare(&svc, &desired.input_services[0]).equal);

    let mut injected = desired.trust_bundle.clone();
    injected.data = Some(btreemap! { "ca-bundle.crt".to_string() => "pem".to_string() });
    assert!(Managed::compare(&injected, &desired.trust_bundle).equal);
    let merged = Managed::merge(injected, &desired.trust_bundle);
    assert!(merged.data.is_some(), "merging must not clobber injected data");
}

#[test]
fn removed_tolerations_are_detected() {
    let mut spec = lokistack();
    spec["collector"] = json!({
        "tolerations": [{ "key": "dedicated", "operator": "Exists", "effect": "NoSchedule" }]
    });
    let with = Fixture::new(spec);
    let without = Fixture::new(lokistack());

    let (Workload::DaemonSet(observed), Workload::DaemonSet(desired)) =
        (workload(&with.ctx()), workload(&without.ctx()))
    else {
        panic!("expected daemon sets");
    };
    assert_eq!(
        Managed::compare(&observed, &desired),
        Comparison::differs("scheduling differs")
    );

    let merged = Managed::merge(observed, &desired);
    assert!(Managed::compare(&merged, &desired).equal);
}
