use super::*;
use crate::events::reason;
use logging_forwarder_controller_core::{
    conditions::reason as condition_reason, labels, paths, validate::Authorization, RefNames,
};
use logging_forwarder_controller_k8s_api::{
    api::core::v1::{ObjectReference, ServicePort, ServiceSpec},
    observability::InputType,
    ClusterLogForwarderSpec, ConfigMap, ObjectMeta, OwnerReference, Secret, Service,
    ServiceAccount,
};
use maplit::{btreemap, btreeset};
use pretty_assertions::assert_eq;
use tokio::time::Duration;

const NS: &str = "openshift-logging";
const UID: &str = "clf-uid";

fn forwarder() -> ObjectReference {
    ObjectReference {
        api_version: Some("observability.openshift.io/v1".to_string()),
        kind: Some("ClusterLogForwarder".to_string()),
        namespace: Some(NS.to_string()),
        name: Some("collector".to_string()),
        uid: Some(UID.to_string()),
        ..Default::default()
    }
}

fn owner(uid: &str) -> OwnerReference {
    OwnerReference {
        api_version: "observability.openshift.io/v1".to_string(),
        kind: "ClusterLogForwarder".to_string(),
        name: "collector".to_string(),
        uid: uid.to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn meta(name: &str, owner_uid: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NS.to_string()),
        labels: Some(btreemap! { labels::INSTANCE.to_string() => "collector".to_string() }),
        owner_references: Some(vec![owner(owner_uid)]),
        ..Default::default()
    }
}

fn config_map(name: &str, value: &str) -> ConfigMap {
    ConfigMap {
        metadata: meta(name, UID),
        data: Some(btreemap! { "key".to_string() => value.to_string() }),
        ..Default::default()
    }
}

fn input_service(name: &str, owner_uid: &str) -> Service {
    let mut metadata = meta(name, owner_uid);
    metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(labels::INPUT_SERVICE_TYPE.to_string(), "http".to_string());
    Service {
        metadata,
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                port: 8080,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn reconciler(client: &FakeClient) -> Reconciler<FakeClient> {
    Reconciler::new(client.clone(), forwarder())
}

#[tokio::test]
async fn apply_creates_then_converges() {
    let client = FakeClient::new();
    let r = reconciler(&client);
    let desired = config_map("collector-config", "a");

    r.apply(&desired).await.expect("create");
    assert_eq!(
        client.take_writes(),
        vec![Write {
            verb: Verb::Create,
            kind: "ConfigMap".to_string(),
            namespace: NS.to_string(),
            name: "collector-config".to_string(),
        }]
    );

    r.apply(&desired).await.expect("no-op");
    assert_eq!(client.take_writes(), vec![]);
    assert_eq!(
        client
            .events()
            .iter()
            .map(|e| e.reason)
            .collect::<Vec<_>>(),
        vec![reason::CREATE_OBJECT]
    );
}

#[tokio::test]
async fn apply_updates_drift_and_keeps_foreign_labels() {
    let client = FakeClient::new();
    let mut observed = config_map("collector-config", "old");
    observed
        .metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert("example.com/extra".to_string(), "kept".to_string());
    client.insert(observed);

    let r = reconciler(&client);
    let updated = r
        .apply(&config_map("collector-config", "new"))
        .await
        .expect("update");
    assert_eq!(updated.data.unwrap()["key"], "new");
    assert_eq!(
        updated.metadata.labels.unwrap()["example.com/extra"],
        "kept"
    );
    let writes = client.take_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].verb, Verb::Replace);
}

#[tokio::test]
async fn apply_adopts_objects_missing_the_owner() {
    let client = FakeClient::new();
    let mut observed = config_map("collector-config", "a");
    observed.metadata.owner_references = None;
    client.insert(observed);

    let updated = reconciler(&client)
        .apply(&config_map("collector-config", "a"))
        .await
        .expect("adopt");
    assert_eq!(updated.metadata.owner_references.unwrap()[0].uid, UID);
}

#[tokio::test(start_paused = true)]
async fn conflicts_are_retried_from_a_fresh_read() {
    let client = FakeClient::new();
    client.insert(config_map("collector-config", "old"));
    client.conflict_next_replaces(2);

    reconciler(&client)
        .apply(&config_map("collector-config", "new"))
        .await
        .expect("update after conflicts");
    let cm = client
        .object::<ConfigMap>(NS, "collector-config")
        .expect("exists");
    assert_eq!(cm.data.unwrap()["key"], "new");
    assert!(client.events().iter().all(|e| !e.warning));
}

#[tokio::test(start_paused = true)]
async fn persistent_conflicts_fail() {
    let client = FakeClient::new();
    client.insert(config_map("collector-config", "old"));
    client.conflict_next_replaces(100);

    let error = reconciler(&client)
        .apply(&config_map("collector-config", "new"))
        .await
        .expect_err("conflicts exhaust the backoff");
    assert!(error.is_conflict());
}

#[tokio::test]
async fn remove_only_deletes_owned_objects() {
    let client = FakeClient::new();
    client.insert(config_map("mine", "a"));
    let mut theirs = config_map("theirs", "a");
    theirs.metadata.owner_references = Some(vec![owner("other-uid")]);
    client.insert(theirs);

    let r = reconciler(&client);
    assert!(r.remove::<ConfigMap>(NS, "mine").await.unwrap());
    assert!(!r.remove::<ConfigMap>(NS, "theirs").await.unwrap());
    assert!(!r.remove::<ConfigMap>(NS, "absent").await.unwrap());
    assert!(client.object::<ConfigMap>(NS, "theirs").is_some());
    assert_eq!(client.writes().len(), 1);
}

#[tokio::test]
async fn sweep_deletes_only_undesired_owned_services() {
    let client = FakeClient::new();
    for name in ["collector-a", "collector-b", "collector-c"] {
        client.insert(input_service(name, UID));
    }
    client.insert(input_service("other-b", "other-uid"));

    let desired = vec![
        input_service("collector-a", UID),
        input_service("collector-c", UID),
    ];
    let removed = reconciler(&client)
        .sweep_input_services(NS, &desired)
        .await
        .expect("sweep");
    assert_eq!(removed, vec!["collector-b".to_string()]);
    assert!(client.object::<Service>(NS, "collector-b").is_none());
    assert!(client.object::<Service>(NS, "collector-a").is_some());
    assert!(client.object::<Service>(NS, "other-b").is_some());
    assert!(client
        .events()
        .iter()
        .any(|e| e.reason == reason::REMOVE_OBJECT));
}

fn trust_bundle() -> ConfigMap {
    let mut metadata = meta("collector-trustbundle", UID);
    metadata.labels.get_or_insert_with(Default::default).insert(
        labels::INJECT_TRUSTED_CA_BUNDLE.to_string(),
        "true".to_string(),
    );
    ConfigMap {
        metadata,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn trust_bundle_is_returned_once_injected() {
    let client = FakeClient::new();
    client.inject_trust_bundle("-----BEGIN CERTIFICATE-----");
    let bundle = reconciler(&client)
        .apply_trust_bundle(
            &trust_bundle(),
            Duration::from_secs(5),
            Duration::from_secs(30),
        )
        .await
        .expect("apply");
    assert_eq!(bundle.as_deref(), Some("-----BEGIN CERTIFICATE-----"));
}

#[tokio::test(start_paused = true)]
async fn trust_bundle_timeout_continues_without_a_bundle() {
    let client = FakeClient::new();
    let bundle = reconciler(&client)
        .apply_trust_bundle(
            &trust_bundle(),
            Duration::from_secs(5),
            Duration::from_secs(30),
        )
        .await
        .expect("timeouts are not errors");
    assert_eq!(bundle, None);
    let cm = client
        .object::<ConfigMap>(NS, "collector-trustbundle")
        .expect("created");
    assert!(cm.data.unwrap_or_default().get(paths::TRUSTED_CA_KEY).is_none());
}

#[tokio::test]
async fn token_secret_is_recreated_when_its_account_changes() {
    let token = |uid: &str| Secret {
        metadata: ObjectMeta {
            annotations: Some(btreemap! {
                "kubernetes.io/service-account.name".to_string() => "logcollector".to_string(),
                "kubernetes.io/service-account.uid".to_string() => uid.to_string(),
            }),
            ..meta("logcollector-token", UID)
        },
        type_: Some("kubernetes.io/service-account-token".to_string()),
        ..Default::default()
    };
    let client = FakeClient::new();
    client.insert(token("old-sa"));

    reconciler(&client)
        .apply_token_secret(&token("new-sa"))
        .await
        .expect("recreate");
    let verbs = client
        .take_writes()
        .into_iter()
        .map(|w| w.verb)
        .collect::<Vec<_>>();
    assert_eq!(verbs, vec![Verb::Delete, Verb::Create]);

    reconciler(&client)
        .apply_token_secret(&token("new-sa"))
        .await
        .expect("converged");
    assert_eq!(client.take_writes(), vec![]);
}

#[tokio::test]
async fn resolve_records_missing_objects() {
    let client = FakeClient::new();
    client.insert(Secret {
        metadata: meta("es-secret", "user"),
        data: Some(btreemap! {
            "password".to_string() => k8s::ByteString(b"hunter2".to_vec()),
        }),
        ..Default::default()
    });
    client.insert(config_map("ca", "pem"));

    let names = RefNames {
        secrets: btreeset! { "es-secret".to_string(), "s1".to_string() },
        config_maps: btreeset! { "ca".to_string() },
    };
    let refs = resolve(&client, NS, &names).await.expect("resolve");
    assert_eq!(refs.secret_str("es-secret", "password"), Some("hunter2"));
    assert_eq!(refs.config_maps["ca"]["key"], "pem");
    assert_eq!(refs.missing.secrets, btreeset! { "s1".to_string() });
    assert!(refs.missing.config_maps.is_empty());

    let secrets = resolve_secrets(&client, NS, &names.secrets).await.unwrap();
    assert_eq!(secrets.found.len(), 1);
    assert_eq!(secrets.missing.len(), 1);
}

fn spec(json: serde_json::Value) -> ClusterLogForwarderSpec {
    serde_json::from_value(json).expect("valid spec")
}

fn audit_forwarder() -> ClusterLogForwarderSpec {
    spec(serde_json::json!({
        "serviceAccount": { "name": "logcollector" },
        "outputs": [{ "name": "es", "type": "elasticsearch",
            "elasticsearch": { "url": "https://es:9200", "index": "logs" } }],
        "pipelines": [{ "name": "all", "inputRefs": ["application", "audit"], "outputRefs": ["es"] }],
    }))
}

#[tokio::test]
async fn authorize_reports_missing_service_account() {
    let client = FakeClient::new();
    let authz = authorize(&client, NS, &audit_forwarder()).await;
    assert_eq!(authz, Authorization::ServiceAccountMissing);
}

#[tokio::test]
async fn authorize_reviews_each_required_log_type() {
    let client = FakeClient::new();
    client.insert(ServiceAccount {
        metadata: meta("logcollector", "user"),
        ..Default::default()
    });
    client.deny(InputType::Audit);

    let authz = authorize(&client, NS, &audit_forwarder()).await;
    assert_eq!(
        authz,
        Authorization::Reviewed {
            allowed: btreeset! { InputType::Application },
            denied: btreeset! { InputType::Audit },
        }
    );

    let validation = logging_forwarder_controller_core::validate::validate(
        &audit_forwarder(),
        &Default::default(),
        &authz,
    );
    let authorized = validation
        .conditions
        .get(
            logging_forwarder_controller_core::conditions::AttributeGroup::Conditions,
            logging_forwarder_controller_core::conditions::AUTHORIZED,
        )
        .expect("authorized condition");
    assert_eq!(authorized.reason, condition_reason::CLUSTER_ROLE_MISSING);
}
