use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::ClusterGateway;
use super::events::{EventIndex, build_event_index};
use crate::classify::{classify, namespace_or_default};
use crate::error::{ApiError, GatewayError};
use crate::helpers::{format_age_at, parse_quantity};
use crate::models::kind::{ResourceKind, ResourceObject, SCAN_ORDER, Scope, UnknownKind};
use crate::models::names::InvalidName;
use crate::models::views::{Issue, ResourceRow};

#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub namespace: Option<String>,
    pub resource_type: Option<String>,
    pub search: Option<String>,
    pub problems_only: bool,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    UnsupportedResourceType(#[from] UnknownKind),

    #[error(transparent)]
    InvalidNamespace(#[from] InvalidName),
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::UnsupportedResourceType(k) => k.into(),
            ScanError::InvalidNamespace(n) => n.into(),
        }
    }
}

#[derive(Debug)]
pub struct FetchFailure {
    pub kind: ResourceKind,
    pub scope: Scope,
    pub error: GatewayError,
}

/// Rows from every kind that listed successfully, plus what didn't.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub rows: Vec<ResourceRow>,
    pub failures: Vec<FetchFailure>,
}

/// Expands `"all"` (or nothing) to [`SCAN_ORDER`], otherwise parses one kind.
pub fn resolve_kinds(resource_type: Option<&str>) -> Result<Vec<ResourceKind>, ScanError> {
    match resource_type.map(str::trim) {
        None | Some("") => Ok(SCAN_ORDER.to_vec()),
        Some(t) if t.eq_ignore_ascii_case("all") => Ok(SCAN_ORDER.to_vec()),
        Some(t) => Ok(vec![t.parse()?]),
    }
}

struct RowFilter {
    needle: Option<String>,
    problems_only: bool,
}

impl RowFilter {
    fn new(search: Option<&str>, problems_only: bool) -> Self {
        Self {
            needle: search
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase),
            problems_only,
        }
    }

    fn matches_name(&self, name: &str) -> bool {
        match &self.needle {
            Some(n) => name.to_lowercase().contains(n.as_str()),
            None => true,
        }
    }
}

pub struct Scanner {
    gateway: Arc<dyn ClusterGateway>,
}

impl Scanner {
    pub fn new(gateway: Arc<dyn ClusterGateway>) -> Self {
        Self { gateway }
    }

    pub async fn scan(&self, req: &ScanRequest) -> Result<Vec<ResourceRow>, ScanError> {
        Ok(self.scan_detailed(req).await?.rows)
    }

    pub async fn scan_detailed(&self, req: &ScanRequest) -> Result<ScanOutcome, ScanError> {
        let kinds = resolve_kinds(req.resource_type.as_deref())?;
        let scope = Scope::parse(req.namespace.as_deref())?;
        let filter = RowFilter::new(req.search.as_deref(), req.problems_only);

        let gateway = self.gateway.as_ref();
        let fetches = join_all(kinds.iter().map(|&kind| {
            let scope = &scope;
            async move { (kind, gateway.list(kind, scope).await) }
        }));
        let scopes = [scope.clone()];
        let (fetched, events) = futures_util::join!(fetches, build_event_index(gateway, &scopes));

        let now = Utc::now();
        let mut outcome = ScanOutcome::default();
        for (kind, result) in fetched {
            match result {
                Ok(objects) => {
                    for obj in &objects {
                        if !filter.matches_name(&obj.meta().name) {
                            continue;
                        }
                        let issue = classify(obj, now);
                        if filter.problems_only && issue.is_ok() {
                            continue;
                        }
                        outcome.rows.push(build_row(obj, issue, &events, now));
                    }
                }
                Err(error) => outcome.failures.push(FetchFailure {
                    kind,
                    scope: scope.clone(),
                    error,
                }),
            }
        }
        for f in &outcome.failures {
            warn!(kind = %f.kind, namespace = %f.scope, "listing failed, skipping kind: {}", f.error);
        }

        sort_rows(&mut outcome.rows);
        debug!(
            rows = outcome.rows.len(),
            failed_kinds = outcome.failures.len(),
            namespace = %scope,
            "scan complete"
        );
        Ok(outcome)
    }
}

/// Kind order, then namespace, then name.
pub fn sort_rows(rows: &mut [ResourceRow]) {
    rows.sort_by(|a, b| {
        a.kind
            .sort_rank()
            .cmp(&b.kind.sort_rank())
            .then_with(|| a.namespace.cmp(&b.namespace))
            .then_with(|| a.name.cmp(&b.name))
    });
}

pub fn build_row(obj: &ResourceObject, issue: Issue, events: &EventIndex, now: DateTime<Utc>) -> ResourceRow {
    let meta = obj.meta();
    let kind = obj.kind();
    let namespace = namespace_or_default(&meta.namespace);
    let (status, node_name, details) = describe(obj);

    ResourceRow {
        kind,
        last_seen: events.last_seen(&namespace, kind.as_str(), &meta.name),
        name: meta.name.clone(),
        namespace,
        status,
        age: format_age_at(meta.creation_timestamp.as_deref(), now),
        issue: issue.text().to_string(),
        severity: issue.severity(),
        node_name,
        details,
    }
}

const NO_PHASE: &str = "—";

/// Display status, node placement and drill-down fields per kind.
fn describe(obj: &ResourceObject) -> (String, Option<String>, Option<serde_json::Value>) {
    match obj {
        ResourceObject::Pod(p) => {
            let total = p.spec.containers.len().max(p.container_statuses().len());
            let details = json!({
                "ready": format!("{}/{}", p.ready_containers(), total),
                "restarts": p.restarts(),
                "podIP": p.status.as_ref().and_then(|s| s.pod_ip.clone()),
            });
            (
                p.phase().unwrap_or("Unknown").to_string(),
                p.spec.node_name.clone().filter(|n| !n.is_empty()),
                Some(details),
            )
        }
        ResourceObject::Deployment(d) => {
            let desired = d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
            let st = d.status.clone().unwrap_or_default();
            let ready = st.ready_replicas.unwrap_or(0);
            let details = json!({
                "desired": desired,
                "ready": ready,
                "available": st.available_replicas.unwrap_or(0),
                "updated": st.updated_replicas.unwrap_or(0),
            });
            (format!("{}/{}", ready, desired), None, Some(details))
        }
        ResourceObject::StatefulSet(s) => {
            let desired = s.spec.as_ref().and_then(|sp| sp.replicas).unwrap_or(1);
            let ready = s.status.as_ref().and_then(|st| st.ready_replicas).unwrap_or(0);
            let details = json!({ "desired": desired, "ready": ready });
            (format!("{}/{}", ready, desired), None, Some(details))
        }
        ResourceObject::DaemonSet(d) => {
            let st = d.status.clone().unwrap_or_default();
            let desired = st.desired_number_scheduled.unwrap_or(0);
            let available = st.number_available.unwrap_or(0);
            let details = json!({
                "desired": desired,
                "ready": st.number_ready.unwrap_or(0),
                "available": available,
            });
            (format!("{}/{}", available, desired), None, Some(details))
        }
        ResourceObject::Job(j) => {
            let st = j.status.clone().unwrap_or_default();
            let (active, succeeded, failed) = (
                st.active.unwrap_or(0),
                st.succeeded.unwrap_or(0),
                st.failed.unwrap_or(0),
            );
            let complete = st
                .conditions
                .iter()
                .any(|c| c.condition_type == "Complete" && c.status == "True");
            let status = if complete {
                "Complete"
            } else if active > 0 {
                "Running"
            } else if failed > 0 {
                "Failed"
            } else {
                NO_PHASE
            };
            let details = json!({ "active": active, "succeeded": succeeded, "failed": failed });
            (status.to_string(), None, Some(details))
        }
        ResourceObject::CronJob(c) => {
            let spec = c.spec.clone().unwrap_or_default();
            let status = if spec.suspend.unwrap_or(false) {
                "Suspended"
            } else {
                NO_PHASE
            };
            let details = json!({
                "schedule": spec.schedule,
                "lastScheduleTime": c.status.as_ref().and_then(|s| s.last_schedule_time.clone()),
            });
            (status.to_string(), None, Some(details))
        }
        ResourceObject::Service(s) => {
            let spec = s.spec.clone().unwrap_or_default();
            let ports: Vec<String> = spec
                .ports
                .iter()
                .map(|p| format!("{}/{}", p.port, p.protocol.as_deref().unwrap_or("TCP")))
                .collect();
            let details = json!({ "clusterIP": spec.cluster_ip, "ports": ports });
            (
                spec.service_type.unwrap_or_else(|| "ClusterIP".to_string()),
                None,
                Some(details),
            )
        }
        ResourceObject::Ingress(i) => {
            let spec = i.spec.clone().unwrap_or_default();
            let hosts: Vec<String> = spec.rules.into_iter().filter_map(|r| r.host).collect();
            let details = json!({ "class": spec.ingress_class_name, "hosts": hosts });
            (NO_PHASE.to_string(), None, Some(details))
        }
        ResourceObject::ConfigMap(c) => {
            let keys = c.data.as_ref().map(|d| d.len()).unwrap_or(0);
            (NO_PHASE.to_string(), None, Some(json!({ "keys": keys })))
        }
        ResourceObject::Secret(s) => {
            let keys = s.data.as_ref().map(|d| d.len()).unwrap_or(0);
            let details = json!({ "type": s.secret_type, "keys": keys });
            (NO_PHASE.to_string(), None, Some(details))
        }
        ResourceObject::PersistentVolumeClaim(p) => {
            let st = p.status.clone().unwrap_or_default();
            let spec = p.spec.clone().unwrap_or_default();
            let details = json!({
                "storageClass": spec.storage_class_name,
                "volume": spec.volume_name,
                "capacityBytes": st.capacity.get("storage").map(|q| parse_quantity(q)),
            });
            (st.phase.unwrap_or_else(|| "Unknown".to_string()), None, Some(details))
        }
        ResourceObject::Node(n) => {
            let status = if n.is_ready() { "Ready" } else { "NotReady" };
            let details = json!({
                "roles": n.roles(),
                "kubeletVersion": n.status.node_info.kubelet_version,
            });
            (status.to_string(), None, Some(details))
        }
        ResourceObject::Event(e) => {
            let details = json!({
                "reason": e.reason,
                "message": e.message,
                "count": e.count,
                "involvedObject": format!("{}/{}", e.involved_object.kind, e.involved_object.name),
            });
            (
                e.event_type.clone().unwrap_or_else(|| "Normal".to_string()),
                None,
                Some(details),
            )
        }
    }
}
