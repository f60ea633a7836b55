use super::*;
use chrono::TimeZone;
use logging_forwarder_controller_core::conditions::{invalid, valid, VALID_OUTPUT_PREFIX};
use logging_forwarder_controller_k8s_api::{
    api::apps::v1::{DaemonSetStatus, DeploymentSpec, DeploymentStatus},
    DaemonSet, Deployment, ObjectMeta,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

fn outputs(ok: bool) -> ConditionMap {
    let mut map = ConditionMap::default();
    let condition = if ok {
        valid(VALID_OUTPUT_PREFIX, "es", "")
    } else {
        invalid(VALID_OUTPUT_PREFIX, "es", reason::MISSING_REFERENCE, "secret \"s1\" not found")
    };
    map.set(AttributeGroup::Outputs, condition);
    map
}

#[test]
fn ready_when_deployed_and_rolled_out() {
    let status = build(None, outputs(true), &Outcome::Deployed(Readiness::Ready), Some(3), at(10));
    let ready = status
        .conditions
        .iter()
        .find(|c| c.type_ == conditions::READY)
        .expect("ready condition");
    assert!(ready.is_true());
    assert_eq!(ready.reason, reason::RECONCILIATION_COMPLETE);
    assert_eq!(ready.observed_generation, Some(3));
    assert_eq!(ready.last_transition_time, Some(at(10)));
    assert_eq!(status.outputs[0].observed_generation, Some(3));
}

#[test]
fn transition_time_kept_while_state_is_unchanged() {
    let first = build(None, outputs(true), &Outcome::Deployed(Readiness::Ready), Some(1), at(10));
    let second = build(
        Some(&first),
        outputs(true),
        &Outcome::Deployed(Readiness::Ready),
        Some(1),
        at(20),
    );
    assert_eq!(first, second);
    assert!(!changed(Some(&first), &second));

    let third = build(
        Some(&second),
        outputs(false),
        &Outcome::Deployed(Readiness::Ready),
        Some(1),
        at(30),
    );
    assert!(changed(Some(&second), &third));
    assert_eq!(third.outputs[0].last_transition_time, Some(at(30)));
    assert_eq!(third.conditions[0].last_transition_time, Some(at(10)));
}

#[test]
fn new_generation_is_a_change() {
    let first = build(None, outputs(true), &Outcome::Deployed(Readiness::Ready), Some(1), at(10));
    let second = build(
        Some(&first),
        outputs(true),
        &Outcome::Deployed(Readiness::Ready),
        Some(2),
        at(20),
    );
    assert!(changed(Some(&first), &second));
    assert_eq!(second.conditions[0].last_transition_time, Some(at(10)));
}

#[rstest]
#[case(Outcome::Undeployed("no valid pipelines".into()), reason::VALIDATION_FAILURE)]
#[case(Outcome::GeneratorFailed("bad template".into()), reason::GENERATOR_FAILURE)]
#[case(Outcome::ReconcileFailed("forbidden".into()), reason::RECONCILIATION_FAILURE)]
#[case(Outcome::Deployed(Readiness::NotReady("rolling".into())), reason::WORKLOAD_NOT_READY)]
fn failures_are_not_ready(#[case] outcome: Outcome, #[case] expected: &str) {
    let ready = ready_condition(&outcome);
    assert!(!ready.is_true());
    assert_eq!(ready.reason, expected);
}

#[test]
fn status_patch_shape() {
    let status = build(None, outputs(true), &Outcome::Deployed(Readiness::Ready), None, at(0));
    let k8s::Patch::Merge(value) = patch("collector", &status) else {
        panic!("expected a merge patch");
    };
    assert_eq!(value["kind"], "ClusterLogForwarder");
    assert_eq!(value["apiVersion"], "observability.openshift.io/v1");
    assert_eq!(value["status"]["conditions"][0]["type"], "Ready");
    assert_eq!(value["status"]["outputs"][0]["status"], "True");
}

#[test]
fn daemonset_rollout() {
    let mut ds = DaemonSet {
        metadata: ObjectMeta {
            generation: Some(2),
            ..Default::default()
        },
        spec: None,
        status: Some(DaemonSetStatus {
            desired_number_scheduled: 3,
            updated_number_scheduled: Some(3),
            number_available: Some(2),
            observed_generation: Some(2),
            ..Default::default()
        }),
    };
    assert!(!daemonset_readiness(&ds).is_ready());

    if let Some(status) = ds.status.as_mut() {
        status.number_available = Some(3);
    }
    assert_eq!(daemonset_readiness(&ds), Readiness::Ready);

    ds.metadata.generation = Some(3);
    assert!(!daemonset_readiness(&ds).is_ready());
}

#[test]
fn deployment_rollout() {
    let deploy = Deployment {
        metadata: ObjectMeta {
            generation: Some(1),
            ..Default::default()
        },
        spec: Some(DeploymentSpec::default()),
        status: Some(DeploymentStatus {
            observed_generation: Some(1),
            updated_replicas: Some(1),
            available_replicas: Some(1),
            ..Default::default()
        }),
    };
    assert_eq!(deployment_readiness(&deploy), Readiness::Ready);
    assert!(!deployment_readiness(&Deployment::default()).is_ready());
}
