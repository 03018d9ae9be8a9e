use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::AppState;
use crate::auth::{AuthUser, Role};
use crate::clients::Patch;
use crate::error::ApiError;
use crate::models::k8s::Status;
use crate::models::kind::ResourceKind;
use crate::models::names::object_ref;

const RESTARTED_AT: &str = "kubectl.kubernetes.io/restartedAt";

/// Same annotation `kubectl rollout restart` sets.
pub fn restart_patch(at: DateTime<Utc>) -> Patch {
    Patch::Merge(json!({
        "spec": {"template": {"metadata": {"annotations": {
            RESTARTED_AT: at.to_rfc3339_opts(SecondsFormat::Secs, true)
        }}}}
    }))
}

pub fn scale_patch(replicas: i32) -> Patch {
    Patch::Json(json!([{ "op": "replace", "path": "/spec/replicas", "value": replicas }]))
}

fn parse_kind(kind: &str, allowed: &[ResourceKind], action: &str) -> Result<ResourceKind, ApiError> {
    let kind: ResourceKind = kind.parse()?;
    if allowed.contains(&kind) {
        Ok(kind)
    } else {
        Err(ApiError::BadRequest(format!("cannot {} a {}", action, kind)))
    }
}

pub async fn handle_restart(
    user: AuthUser,
    State(state): State<AppState>,
    Path((kind, namespace, name)): Path<(String, String, String)>,
) -> Result<Json<Status>, ApiError> {
    user.require(Role::Editor)?;
    let kind = parse_kind(
        &kind,
        &[ResourceKind::Deployment, ResourceKind::StatefulSet, ResourceKind::DaemonSet],
        "restart",
    )?;
    object_ref(kind, &namespace, &name)?;

    state
        .gateway
        .patch(kind, &namespace, &name, &restart_patch(Utc::now()))
        .await?;
    info!(user = %user.subject, kind = %kind, namespace = %namespace, "restarted {}", name);
    Ok(Json(Status::success(format!(
        "{} {}/{} restarted",
        kind, namespace, name
    ))))
}

#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub replicas: i64,
}

pub async fn handle_scale(
    user: AuthUser,
    State(state): State<AppState>,
    Path((kind, namespace, name)): Path<(String, String, String)>,
    Json(body): Json<ScaleRequest>,
) -> Result<Json<Status>, ApiError> {
    user.require(Role::Editor)?;
    let kind = parse_kind(
        &kind,
        &[ResourceKind::Deployment, ResourceKind::StatefulSet],
        "scale",
    )?;
    object_ref(kind, &namespace, &name)?;
    let replicas = i32::try_from(body.replicas)
        .ok()
        .filter(|r| *r >= 0)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid replica count {}", body.replicas)))?;

    state
        .gateway
        .patch(kind, &namespace, &name, &scale_patch(replicas))
        .await?;
    info!(user = %user.subject, kind = %kind, namespace = %namespace, "scaled {} to {}", name, replicas);
    Ok(Json(Status::success(format!(
        "{} {}/{} scaled to {}",
        kind, namespace, name, replicas
    ))))
}

pub async fn handle_delete(
    user: AuthUser,
    State(state): State<AppState>,
    Path((kind, namespace, name)): Path<(String, String, String)>,
) -> Result<Json<Status>, ApiError> {
    user.require(Role::Admin)?;
    let kind: ResourceKind = kind.parse()?;
    object_ref(kind, &namespace, &name)?;

    state.gateway.delete(kind, &namespace, &name).await?;
    info!(user = %user.subject, kind = %kind, namespace = %namespace, "deleted {}", name);
    Ok(Json(Status::success(format!(
        "{} {}/{} deleted",
        kind, namespace, name
    ))))
}
