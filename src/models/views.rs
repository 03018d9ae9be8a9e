use chrono::{DateTime, Utc};
use serde::Serialize;

use super::kind::ResourceKind;

/// Triage ranking. Declaration order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Ok,
    Info,
    Warning,
    Critical,
}

/// Classification result. Only constructible as healthy or as a non-ok
/// severity with a description, so an empty issue always means `Ok`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Issue {
    text: String,
    severity: Severity,
}

impl Issue {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::flag(Severity::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::flag(Severity::Warning, text)
    }

    pub fn critical(text: impl Into<String>) -> Self {
        Self::flag(Severity::Critical, text)
    }

    fn flag(severity: Severity, text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Self::ok();
        }
        Self { text, severity }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn is_ok(&self) -> bool {
        self.severity == Severity::Ok
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRow {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub age: String,
    pub issue: String,
    pub severity: Severity,
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    pub node_count: usize,
    pub ready_count: usize,
    pub total_cpu_cores: f64,
    pub total_memory_bytes: f64,
    pub allocatable_cpu_cores: f64,
    pub allocatable_memory_bytes: f64,
    pub metrics_available: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUsage {
    pub name: String,
    pub ready: bool,
    pub cpu_cores: Option<f64>,
    pub memory_bytes: Option<f64>,
    pub allocatable_cpu_cores: f64,
    pub allocatable_memory_bytes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMetric {
    pub name: String,
    pub namespace: String,
    pub cpu_cores: f64,
    pub memory_bytes: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsFrame {
    pub ts: DateTime<Utc>,
    pub cluster: ClusterSnapshot,
    pub nodes: Vec<NodeUsage>,
    pub top_pods: Vec<PodMetric>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorFrame {
    pub ts: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub name: String,
    pub status: String,
    pub roles: Vec<String>,
    pub kubelet_version: String,
    pub architecture: String,
    pub os_image: String,
    pub cpu: String,
    pub memory: String,
    pub pods: String,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<String>,
    pub age: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodView {
    pub name: String,
    pub namespace: String,
    pub node: String,
    pub status: String,
    pub ip: String,
    pub age: String,
    pub containers: usize,
    pub ready: usize,
    pub restarts: i32,
    pub issue: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentView {
    pub name: String,
    pub namespace: String,
    pub desired: i32,
    pub ready: i32,
    pub updated: i32,
    pub available: i32,
    pub age: String,
    pub issue: String,
    pub severity: Severity,
}
