use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::auth::{AuthUser, Role};
use crate::classify::{deployment_issue, namespace_or_default, pod_issue};
use crate::clients::metrics::DEFAULT_TOP_PODS;
use crate::clients::scanner::ScanRequest;
use crate::error::ApiError;
use crate::helpers::{format_age_at, human_bytes, parse_quantity};
use crate::models::k8s::{self, Deployment, Pod};
use crate::models::kind::{ResourceKind, ResourceObject, Scope};
use crate::models::names::{dns_label, dns_subdomain, object_ref};
use crate::models::views::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuery {
    pub namespace: Option<String>,
    pub resource_type: Option<String>,
    pub search: Option<String>,
    pub problems_only: Option<String>,
}

fn flag(v: Option<&str>) -> bool {
    matches!(
        v.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "1" | "yes")
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FormatQuery {
    pub format: Option<String>,
}

pub async fn handle_resources(
    user: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<ResourceQuery>,
) -> Result<Json<ItemsResponse<ResourceRow>>, ApiError> {
    user.require(Role::Viewer)?;
    let req = ScanRequest {
        problems_only: flag(q.problems_only.as_deref()),
        namespace: q.namespace,
        resource_type: q.resource_type,
        search: q.search,
    };
    let items = state.scanner.scan(&req).await?;
    Ok(Json(ItemsResponse { items }))
}

pub async fn handle_issues(
    user: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<NamespaceQuery>,
) -> Result<Json<ItemsResponse<ResourceRow>>, ApiError> {
    user.require(Role::Viewer)?;
    let scope = Scope::parse(q.namespace.as_deref())?;
    let items = state.analyzer.issues(&scope).await;
    Ok(Json(ItemsResponse { items }))
}

pub async fn handle_overview(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ClusterSnapshot>, ApiError> {
    user.require(Role::Viewer)?;
    Ok(Json(state.aggregator.cluster_snapshot().await))
}

pub async fn handle_nodes(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ItemsResponse<NodeView>>, ApiError> {
    user.require(Role::Viewer)?;
    let now = Utc::now();
    let items = state
        .aggregator
        .nodes_with_usage()
        .await?
        .iter()
        .map(|(node, usage)| build_node_view(node, usage, now))
        .collect();
    Ok(Json(ItemsResponse { items }))
}

pub async fn handle_pods(
    user: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<NamespaceQuery>,
) -> Result<Json<ItemsResponse<PodView>>, ApiError> {
    user.require(Role::Viewer)?;
    let scope = Scope::parse(q.namespace.as_deref())?;
    let now = Utc::now();
    let mut items: Vec<PodView> = state
        .gateway
        .list(ResourceKind::Pod, &scope)
        .await?
        .iter()
        .filter_map(|o| match o {
            ResourceObject::Pod(p) => Some(build_pod_view(p, now)),
            _ => None,
        })
        .collect();
    items.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
    Ok(Json(ItemsResponse { items }))
}

pub async fn handle_deployments(
    user: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<NamespaceQuery>,
) -> Result<Json<ItemsResponse<DeploymentView>>, ApiError> {
    user.require(Role::Viewer)?;
    let scope = Scope::parse(q.namespace.as_deref())?;
    let now = Utc::now();
    let mut items: Vec<DeploymentView> = state
        .gateway
        .list(ResourceKind::Deployment, &scope)
        .await?
        .iter()
        .filter_map(|o| match o {
            ResourceObject::Deployment(d) => Some(build_deployment_view(d, now)),
            _ => None,
        })
        .collect();
    items.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
    Ok(Json(ItemsResponse { items }))
}

pub async fn handle_top_pods(
    user: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<ItemsResponse<PodMetric>>, ApiError> {
    user.require(Role::Viewer)?;
    let items = state
        .aggregator
        .top_pods(q.limit.unwrap_or(DEFAULT_TOP_PODS))
        .await;
    Ok(Json(ItemsResponse { items }))
}

pub async fn handle_namespaces(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ItemsResponse<String>>, ApiError> {
    user.require(Role::Viewer)?;
    let mut items = state.gateway.list_namespaces().await?;
    items.sort();
    Ok(Json(ItemsResponse { items }))
}

/// Raw object for the YAML editor. Secrets are admin-only.
pub async fn handle_get_object(
    user: AuthUser,
    State(state): State<AppState>,
    Path((kind, namespace, name)): Path<(String, String, String)>,
    Query(q): Query<FormatQuery>,
) -> Result<Response, ApiError> {
    user.require(Role::Viewer)?;
    let kind: ResourceKind = kind.parse()?;
    object_ref(kind, &namespace, &name)?;
    if kind == ResourceKind::Secret {
        user.require(Role::Admin)?;
    }

    let format = q.format.as_deref().unwrap_or("json");
    if !matches!(format, "json" | "yaml") {
        return Err(ApiError::BadRequest(format!(
            "unsupported format {:?}, expected json or yaml",
            format
        )));
    }

    let obj = state.gateway.get(kind, &namespace, &name).await?;
    if format == "yaml" {
        let body = serde_yaml::to_string(&obj)
            .map_err(|e| ApiError::Internal(format!("encoding {} {}/{}: {}", kind, namespace, name, e)))?;
        Ok(([(header::CONTENT_TYPE, "application/yaml")], body).into_response())
    } else {
        Ok(Json(obj).into_response())
    }
}

pub async fn handle_custom(
    user: AuthUser,
    State(state): State<AppState>,
    Path((group, version, plural)): Path<(String, String, String)>,
    Query(q): Query<NamespaceQuery>,
) -> Result<Json<ItemsResponse<serde_json::Value>>, ApiError> {
    user.require(Role::Viewer)?;
    dns_subdomain("group", &group)?;
    dns_label("version", &version)?;
    dns_label("plural", &plural)?;
    let scope = Scope::parse(q.namespace.as_deref())?;
    let items = state
        .gateway
        .list_custom(&group, &version, &plural, &scope)
        .await?;
    Ok(Json(ItemsResponse { items }))
}

pub async fn handle_healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cluster = state.health.status();
    let status = if cluster.reachable { "ok" } else { "degraded" };
    Json(json!({ "status": status, "cluster": cluster }))
}

// --- View Builders ---

fn build_pod_view(pod: &Pod, now: DateTime<Utc>) -> PodView {
    let issue = pod_issue(pod, now);
    PodView {
        name: pod.metadata.name.clone(),
        namespace: namespace_or_default(&pod.metadata.namespace),
        node: pod.spec.node_name.clone().unwrap_or_default(),
        status: pod.phase().unwrap_or("Unknown").to_string(),
        ip: pod
            .status
            .as_ref()
            .and_then(|s| s.pod_ip.clone())
            .unwrap_or_default(),
        age: format_age_at(pod.metadata.creation_timestamp.as_deref(), now),
        containers: pod.spec.containers.len().max(pod.container_statuses().len()),
        ready: pod.ready_containers(),
        restarts: pod.restarts(),
        issue: issue.text().to_string(),
        severity: issue.severity(),
    }
}

fn build_node_view(node: &k8s::Node, usage: &NodeUsage, now: DateTime<Utc>) -> NodeView {
    let status = &node.status;
    let has_ready = status.conditions.iter().any(|c| c.condition_type == "Ready");
    let mut nv = NodeView {
        name: node.metadata.name.clone(),
        status: match (has_ready, node.is_ready()) {
            (false, _) => "Unknown",
            (true, true) => "Ready",
            (true, false) => "NotReady",
        }
        .to_string(),
        roles: node.roles(),
        kubelet_version: status.node_info.kubelet_version.clone(),
        architecture: status.node_info.architecture.clone(),
        os_image: status.node_info.os_image.clone(),
        cpu_usage: usage.cpu_cores,
        memory_usage: usage.memory_bytes.map(human_bytes),
        age: format_age_at(node.metadata.creation_timestamp.as_deref(), now),
        ..Default::default()
    };

    if let Some(cpu) = status.capacity.get("cpu") {
        nv.cpu = cpu.clone();
    }
    if let Some(mem) = status.capacity.get("memory") {
        nv.memory = human_bytes(parse_quantity(mem));
    }
    if let Some(pods) = status.allocatable.get("pods") {
        nv.pods = pods.clone();
    }

    nv
}

fn build_deployment_view(d: &Deployment, now: DateTime<Utc>) -> DeploymentView {
    let issue = deployment_issue(d);
    let st = d.status.clone().unwrap_or_default();
    DeploymentView {
        name: d.metadata.name.clone(),
        namespace: namespace_or_default(&d.metadata.namespace),
        desired: d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
        ready: st.ready_replicas.unwrap_or(0),
        updated: st.updated_replicas.unwrap_or(0),
        available: st.available_replicas.unwrap_or(0),
        age: format_age_at(d.metadata.creation_timestamp.as_deref(), now),
        issue: issue.text().to_string(),
        severity: issue.severity(),
    }
}
