//! An in-memory API server for tests.

use crate::{client::key, events::Event, Client, Error, Kind, Result};
use async_trait::async_trait;
use kube::core::ErrorResponse;
use logging_forwarder_controller_core::{labels, paths};
use logging_forwarder_controller_k8s_api::{
    self as k8s, api::core::v1::ObjectReference, observability::InputType,
    ClusterLogForwarderStatus, SubjectAccessReview,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

/// Holds objects in memory and records every write made through it.
///
/// Objects are stored as JSON the way the API server would return them: each write assigns a
/// resource version, `metadata.generation` advances when `spec` changes, and workloads report a
/// completed rollout unless [`FakeClient::hold_rollout`] was called.
#[derive(Clone, Debug, Default)]
pub struct FakeClient {
    state: Arc<Mutex<State>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verb {
    Create,
    Replace,
    Delete,
    PatchStatus,
}

/// A write issued against the fake API server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Write {
    pub verb: Verb,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

type Key = (String, String, String);

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    resource_version: u64,
    writes: Vec<Write>,
    events: Vec<Event>,
    conflicts: usize,
    status_conflicts: usize,
    denied: BTreeSet<String>,
    trust_bundle: Option<String>,
    statuses: BTreeMap<(String, String), ClusterLogForwarderStatus>,
    hold_rollout: bool,
}

// === impl FakeClient ===

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `object` as if another party created it. Not recorded as a write.
    pub fn insert<K: Kind>(&self, object: K) {
        let mut state = self.state.lock();
        let key = object_key::<K>(&object);
        if let Ok(mut value) = serde_json::to_value(&object) {
            let previous = state.objects.get(&key).cloned();
            state.admit(&key.0, &mut value, previous.as_ref());
            state.objects.insert(key, value);
        }
    }

    pub fn object<K: Kind>(&self, namespace: &str, name: &str) -> Option<K> {
        let state = self.state.lock();
        let value = state.objects.get(&kind_key::<K>(namespace, name))?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn objects<K: Kind>(&self) -> Vec<K> {
        let kind = K::kind(&()).to_string();
        self.state
            .lock()
            .objects
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .filter_map(|(_, v)| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().writes.clone()
    }

    /// Returns and forgets the writes recorded so far.
    pub fn take_writes(&self) -> Vec<Write> {
        std::mem::take(&mut self.state.lock().writes)
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    /// Fails the next `n` replaces with a conflict.
    pub fn conflict_next_replaces(&self, n: usize) {
        self.state.lock().conflicts = n;
    }

    /// Fails the next `n` status patches with a conflict.
    pub fn conflict_next_status_patches(&self, n: usize) {
        self.state.lock().status_conflicts = n;
    }

    /// Denies access reviews for `log_type`.
    pub fn deny(&self, log_type: InputType) {
        self.state.lock().denied.insert(log_type.as_str().to_string());
    }

    /// Fills trusted CA bundle config maps with `pem` as they are written.
    pub fn inject_trust_bundle(&self, pem: impl ToString) {
        self.state.lock().trust_bundle = Some(pem.to_string());
    }

    /// Leaves workloads without a completed rollout.
    pub fn hold_rollout(&self) {
        self.state.lock().hold_rollout = true;
    }

    pub fn status(&self, namespace: &str, name: &str) -> Option<ClusterLogForwarderStatus> {
        self.state
            .lock()
            .statuses
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl Client for FakeClient {
    async fn get<K: Kind>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let state = self.state.lock();
        match state.objects.get(&kind_key::<K>(namespace, name)) {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }

    async fn create<K: Kind>(&self, object: &K) -> Result<K> {
        let mut state = self.state.lock();
        let key = object_key::<K>(object);
        if state.objects.contains_key(&key) {
            return Err(conflict(&key));
        }
        let mut value = encode(object)?;
        state.admit(&key.0, &mut value, None);
        state.record(Verb::Create, &key);
        let created = decode(&value)?;
        state.objects.insert(key, value);
        Ok(created)
    }

    async fn replace<K: Kind>(&self, object: &K) -> Result<K> {
        let mut state = self.state.lock();
        let key = object_key::<K>(object);
        let Some(previous) = state.objects.get(&key).cloned() else {
            return Err(not_found(&key));
        };
        if state.conflicts > 0 {
            state.conflicts -= 1;
            return Err(conflict(&key));
        }
        if let Some(rv) = &object.meta().resource_version {
            if Some(rv.as_str()) != previous["metadata"]["resourceVersion"].as_str() {
                return Err(conflict(&key));
            }
        }
        let mut value = encode(object)?;
        state.admit(&key.0, &mut value, Some(&previous));
        state.record(Verb::Replace, &key);
        let replaced = decode(&value)?;
        state.objects.insert(key, value);
        Ok(replaced)
    }

    async fn delete<K: Kind>(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        let key = kind_key::<K>(namespace, name);
        if state.objects.remove(&key).is_some() {
            state.record(Verb::Delete, &key);
        }
        Ok(())
    }

    async fn list<K: Kind>(&self, namespace: &str, label_selector: &str) -> Result<Vec<K>> {
        let state = self.state.lock();
        let kind = K::kind(&()).to_string();
        state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && (!K::NAMESPACED || ns == namespace))
            .filter(|(_, v)| selects(label_selector, &v["metadata"]["labels"]))
            .map(|(_, v)| decode(v))
            .collect()
    }

    async fn review_access(&self, review: &SubjectAccessReview) -> Result<bool> {
        let name = review
            .spec
            .resource_attributes
            .as_ref()
            .and_then(|a| a.name.clone())
            .unwrap_or_default();
        Ok(!self.state.lock().denied.contains(&name))
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ClusterLogForwarderStatus,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let key = (
            "ClusterLogForwarder".to_string(),
            namespace.to_string(),
            name.to_string(),
        );
        if state.status_conflicts > 0 {
            state.status_conflicts -= 1;
            return Err(conflict(&key));
        }
        state.record(Verb::PatchStatus, &key);
        state
            .statuses
            .insert((namespace.to_string(), name.to_string()), status.clone());
        Ok(())
    }

    async fn publish(&self, _: &ObjectReference, event: Event) {
        self.state.lock().events.push(event);
    }
}

// === impl State ===

impl State {
    fn record(&mut self, verb: Verb, (kind, namespace, name): &Key) {
        self.writes.push(Write {
            verb,
            kind: kind.clone(),
            namespace: namespace.clone(),
            name: name.clone(),
        });
    }

    /// Applies what the API server and the platform's controllers would do to a stored object.
    fn admit(&mut self, kind: &str, value: &mut Value, previous: Option<&Value>) {
        self.resource_version += 1;
        let rv = self.resource_version;

        let generation = match previous {
            None => 1,
            Some(prev) => {
                let generation = prev["metadata"]["generation"].as_i64().unwrap_or(1);
                if prev.get("spec") == value.get("spec") {
                    generation
                } else {
                    generation + 1
                }
            }
        };
        let uid = previous
            .and_then(|p| p["metadata"]["uid"].as_str())
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("uid-{rv}"));

        if !value["metadata"].is_object() {
            value["metadata"] = json!({});
        }
        value["metadata"]["resourceVersion"] = json!(rv.to_string());
        value["metadata"]["uid"] = json!(uid);
        value["metadata"]["generation"] = json!(generation);

        match kind {
            "ConfigMap" => {
                let inject = value["metadata"]["labels"][labels::INJECT_TRUSTED_CA_BUNDLE] == "true";
                if let (true, Some(pem)) = (inject, &self.trust_bundle) {
                    value["data"] = json!({ paths::TRUSTED_CA_KEY: pem });
                }
            }
            "DaemonSet" if !self.hold_rollout => {
                value["status"] = json!({
                    "currentNumberScheduled": 1,
                    "desiredNumberScheduled": 1,
                    "numberAvailable": 1,
                    "numberMisscheduled": 0,
                    "numberReady": 1,
                    "updatedNumberScheduled": 1,
                    "observedGeneration": generation,
                });
            }
            "Deployment" if !self.hold_rollout => {
                value["status"] = json!({
                    "replicas": 1,
                    "availableReplicas": 1,
                    "readyReplicas": 1,
                    "updatedReplicas": 1,
                    "observedGeneration": generation,
                });
            }
            _ => {}
        }
    }
}

fn kind_key<K: Kind>(namespace: &str, name: &str) -> Key {
    let namespace = if K::NAMESPACED { namespace } else { "" };
    (
        K::kind(&()).to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn object_key<K: Kind>(object: &K) -> Key {
    let (namespace, name) = key(object);
    kind_key::<K>(&namespace, &name)
}

fn encode<K: Kind>(object: &K) -> Result<Value> {
    serde_json::to_value(object).map_err(|e| Error::Api(k8s::Error::SerdeError(e)))
}

fn decode<K: Kind>(value: &Value) -> Result<K> {
    serde_json::from_value(value.clone()).map_err(|e| Error::Api(k8s::Error::SerdeError(e)))
}

fn conflict((kind, _, name): &Key) -> Error {
    Error::Conflict {
        kind: kind.clone(),
        name: name.clone(),
    }
}

fn not_found((kind, _, name): &Key) -> Error {
    Error::Api(k8s::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{kind} {name:?} not found"),
        reason: "NotFound".to_string(),
        code: 404,
    }))
}

/// Matches a label selector of comma-separated `key`, `!key`, and `key=value` terms.
fn selects(selector: &str, labels: &Value) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some(key) = term.strip_prefix('!') {
                labels.get(key).is_none()
            } else if let Some((key, value)) = term.split_once('=') {
                labels.get(key).and_then(Value::as_str) == Some(value)
            } else {
                labels.get(term).is_some()
            }
        })
}
