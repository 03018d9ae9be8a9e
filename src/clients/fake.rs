//! In-memory [`ClusterGateway`] for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::{ClusterGateway, Patch};
use crate::error::GatewayError;
use crate::models::k8s::{Endpoints, Event, NodeMetrics, PodMetrics};
use crate::models::kind::{ResourceKind, ResourceObject, Scope};

#[derive(Default)]
pub struct FakeGateway {
    objects: Vec<(ResourceKind, serde_json::Value)>,
    events: Vec<Event>,
    endpoints: Vec<Endpoints>,
    node_metrics: Option<Vec<NodeMetrics>>,
    pod_metrics: Option<Vec<PodMetrics>>,
    custom: Vec<serde_json::Value>,
    failing: HashSet<ResourceKind>,
    failing_event_namespaces: HashSet<String>,
    failing_endpoints: bool,
    delays: HashMap<ResourceKind, Duration>,
    unreachable: bool,
    pub calls: Mutex<Vec<String>>,
    pub patches: Mutex<Vec<(ResourceKind, String, String, Patch)>>,
    pub deletes: Mutex<Vec<(ResourceKind, String, String)>>,
}

fn unavailable(path: impl Into<String>) -> GatewayError {
    GatewayError::Status {
        path: path.into(),
        status: 503,
        body: "service unavailable".to_string(),
    }
}

fn in_scope(namespace: Option<&str>, scope: &Scope) -> bool {
    match scope {
        Scope::All => true,
        Scope::Namespace(ns) => namespace.unwrap_or("default") == ns,
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

fn meta_namespace(v: &serde_json::Value) -> Option<&str> {
    v["metadata"]["namespace"].as_str()
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            node_metrics: Some(Vec::new()),
            pod_metrics: Some(Vec::new()),
            ..Default::default()
        }
    }

    pub fn with(mut self, kind: ResourceKind, value: serde_json::Value) -> Self {
        self.objects.push((kind, value));
        self
    }

    pub fn with_event(mut self, value: serde_json::Value) -> Self {
        self.events.push(serde_json::from_value(value).unwrap());
        self
    }

    pub fn with_endpoints(mut self, value: serde_json::Value) -> Self {
        self.endpoints.push(serde_json::from_value(value).unwrap());
        self
    }

    pub fn with_node_metrics(mut self, value: serde_json::Value) -> Self {
        self.node_metrics
            .get_or_insert_with(Vec::new)
            .push(serde_json::from_value(value).unwrap());
        self
    }

    pub fn with_pod_metrics(mut self, value: serde_json::Value) -> Self {
        self.pod_metrics
            .get_or_insert_with(Vec::new)
            .push(serde_json::from_value(value).unwrap());
        self
    }

    pub fn with_custom(mut self, value: serde_json::Value) -> Self {
        self.custom.push(value);
        self
    }

    pub fn metrics_down(mut self) -> Self {
        self.node_metrics = None;
        self.pod_metrics = None;
        self
    }

    pub fn fail_kind(mut self, kind: ResourceKind) -> Self {
        self.failing.insert(kind);
        self
    }

    pub fn fail_events_in(mut self, namespace: &str) -> Self {
        self.failing_event_namespaces.insert(namespace.to_string());
        self
    }

    pub fn fail_endpoints(mut self) -> Self {
        self.failing_endpoints = true;
        self
    }

    pub fn delay(mut self, kind: ResourceKind, d: Duration) -> Self {
        self.delays.insert(kind, d);
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn find(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<&serde_json::Value, GatewayError> {
        self.objects
            .iter()
            .find_map(|(k, v)| {
                let ns_matches = !kind.namespaced() || meta_namespace(v).unwrap_or("default") == namespace;
                (*k == kind && ns_matches && v["metadata"]["name"] == name).then_some(v)
            })
            .ok_or_else(|| GatewayError::Status {
                path: kind.object_path(namespace, name),
                status: 404,
                body: "not found".to_string(),
            })
    }
}

#[async_trait]
impl ClusterGateway for FakeGateway {
    async fn list(&self, kind: ResourceKind, scope: &Scope) -> Result<Vec<ResourceObject>, GatewayError> {
        self.record(format!("list {} {}", kind.plural(), scope));
        if let Some(d) = self.delays.get(&kind) {
            tokio::time::sleep(*d).await;
        }
        if self.failing.contains(&kind) {
            return Err(unavailable(kind.collection_path(scope)));
        }
        let scope = if kind.namespaced() { scope.clone() } else { Scope::All };
        Ok(self
            .objects
            .iter()
            .filter(|(k, v)| *k == kind && in_scope(meta_namespace(v), &scope))
            .map(|(k, v)| ResourceObject::from_value(*k, v.clone()).unwrap())
            .collect())
    }

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<serde_json::Value, GatewayError> {
        self.record(format!("get {} {}/{}", kind.plural(), namespace, name));
        self.find(kind, namespace, name).cloned()
    }

    async fn patch(&self, kind: ResourceKind, namespace: &str, name: &str, patch: &Patch) -> Result<(), GatewayError> {
        self.record(format!("patch {} {}/{}", kind.plural(), namespace, name));
        self.find(kind, namespace, name)?;
        self.patches.lock().unwrap().push((
            kind,
            namespace.to_string(),
            name.to_string(),
            patch.clone(),
        ));
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), GatewayError> {
        self.record(format!("delete {} {}/{}", kind.plural(), namespace, name));
        self.find(kind, namespace, name)?;
        self.deletes
            .lock()
            .unwrap()
            .push((kind, namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn list_events(&self, scope: &Scope) -> Result<Vec<Event>, GatewayError> {
        self.record(format!("list events {}", scope));
        if let Scope::Namespace(ns) = scope {
            if self.failing_event_namespaces.contains(ns) {
                return Err(unavailable(ResourceKind::Event.collection_path(scope)));
            }
        }
        Ok(self
            .events
            .iter()
            .filter(|e| in_scope(non_empty(&e.metadata.namespace), scope))
            .cloned()
            .collect())
    }

    async fn list_endpoints(&self, scope: &Scope) -> Result<Vec<Endpoints>, GatewayError> {
        self.record(format!("list endpoints {}", scope));
        if self.failing_endpoints {
            return Err(unavailable("/api/v1/endpoints"));
        }
        Ok(self
            .endpoints
            .iter()
            .filter(|e| in_scope(non_empty(&e.metadata.namespace), scope))
            .cloned()
            .collect())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, GatewayError> {
        let mut names: Vec<String> = self
            .objects
            .iter()
            .filter_map(|(_, v)| meta_namespace(v).map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn list_node_metrics(&self) -> Result<Vec<NodeMetrics>, GatewayError> {
        self.record("list node metrics".to_string());
        self.node_metrics
            .clone()
            .ok_or_else(|| unavailable("/apis/metrics.k8s.io/v1beta1/nodes"))
    }

    async fn list_pod_metrics(&self, scope: &Scope) -> Result<Vec<PodMetrics>, GatewayError> {
        self.record(format!("list pod metrics {}", scope));
        let all = self
            .pod_metrics
            .clone()
            .ok_or_else(|| unavailable("/apis/metrics.k8s.io/v1beta1/pods"))?;
        Ok(all
            .into_iter()
            .filter(|m| in_scope(non_empty(&m.metadata.namespace), scope))
            .collect())
    }

    async fn list_custom(
        &self,
        group: &str,
        version: &str,
        plural: &str,
        scope: &Scope,
    ) -> Result<Vec<serde_json::Value>, GatewayError> {
        self.record(format!("list {}.{}/{} {}", plural, group, version, scope));
        Ok(self
            .custom
            .iter()
            .filter(|v| in_scope(meta_namespace(v), scope))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        if self.unreachable {
            Err(unavailable("/readyz"))
        } else {
            Ok(())
        }
    }
}
