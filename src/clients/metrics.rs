use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use super::ClusterGateway;
use crate::error::{ApiError, GatewayError};
use crate::helpers::{parse_quantity, parse_quantity_value};
use crate::models::k8s::{Node, NodeMetrics, PodMetrics};
use crate::models::kind::{ResourceKind, ResourceObject, Scope};
use crate::models::views::{ClusterSnapshot, MetricsFrame, NodeUsage, PodMetric};

pub const DEFAULT_TOP_PODS: usize = 10;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("node inventory unavailable: {0}")]
    NodesUnavailable(#[source] GatewayError),
}

impl From<AggregateError> for ApiError {
    fn from(e: AggregateError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Cluster KPIs, per-node usage and top pods from the node list and the metrics API.
pub struct Aggregator {
    gateway: Arc<dyn ClusterGateway>,
}

impl Aggregator {
    pub fn new(gateway: Arc<dyn ClusterGateway>) -> Self {
        Self { gateway }
    }

    async fn nodes(&self) -> Result<Vec<Node>, GatewayError> {
        let objects = self.gateway.list(ResourceKind::Node, &Scope::All).await?;
        Ok(objects
            .into_iter()
            .filter_map(|o| match o {
                ResourceObject::Node(n) => Some(n),
                _ => None,
            })
            .collect())
    }

    async fn node_metrics(&self) -> Option<Vec<NodeMetrics>> {
        match self.gateway.list_node_metrics().await {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("node metrics unavailable: {}", e);
                None
            }
        }
    }

    async fn pod_metrics(&self) -> Vec<PodMetrics> {
        self.gateway
            .list_pod_metrics(&Scope::All)
            .await
            .unwrap_or_else(|e| {
                warn!("pod metrics unavailable: {}", e);
                Vec::new()
            })
    }

    /// Never fails; missing sources show up as zero counts or `metricsAvailable=false`.
    pub async fn cluster_snapshot(&self) -> ClusterSnapshot {
        let (nodes, metrics) = futures_util::join!(self.nodes(), self.node_metrics());
        let nodes = nodes.unwrap_or_else(|e| {
            warn!("listing nodes failed: {}", e);
            Vec::new()
        });
        summarize(&nodes, metrics.as_deref())
    }

    pub async fn node_usage(&self) -> Result<Vec<NodeUsage>, AggregateError> {
        Ok(self
            .nodes_with_usage()
            .await?
            .into_iter()
            .map(|(_, usage)| usage)
            .collect())
    }

    /// Nodes sorted by name, each paired with its usage row.
    pub async fn nodes_with_usage(&self) -> Result<Vec<(Node, NodeUsage)>, AggregateError> {
        let (nodes, metrics) = futures_util::join!(self.nodes(), self.node_metrics());
        let mut nodes = nodes.map_err(AggregateError::NodesUnavailable)?;
        nodes.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        let usage = usage_per_node(&nodes, metrics.as_deref());
        Ok(nodes.into_iter().zip(usage).collect())
    }

    pub async fn top_pods(&self, limit: usize) -> Vec<PodMetric> {
        rank_pods(&self.pod_metrics().await, limit)
    }

    /// One streaming frame. Only an unreachable node inventory is an error.
    pub async fn frame(&self, top_n: usize) -> Result<MetricsFrame, AggregateError> {
        let (nodes, node_metrics, pod_metrics) =
            futures_util::join!(self.nodes(), self.node_metrics(), self.pod_metrics());
        let nodes = nodes.map_err(AggregateError::NodesUnavailable)?;

        Ok(MetricsFrame {
            ts: Utc::now(),
            cluster: summarize(&nodes, node_metrics.as_deref()),
            nodes: usage_per_node(&nodes, node_metrics.as_deref()),
            top_pods: rank_pods(&pod_metrics, top_n),
        })
    }
}

fn allocatable(node: &Node, resource: &str) -> f64 {
    node.status
        .allocatable
        .get(resource)
        .map(|q| parse_quantity(q))
        .unwrap_or(0.0)
}

pub fn summarize(nodes: &[Node], metrics: Option<&[NodeMetrics]>) -> ClusterSnapshot {
    let mut snap = ClusterSnapshot {
        node_count: nodes.len(),
        ready_count: nodes.iter().filter(|n| n.is_ready()).count(),
        allocatable_cpu_cores: nodes.iter().map(|n| allocatable(n, "cpu")).sum(),
        allocatable_memory_bytes: nodes.iter().map(|n| allocatable(n, "memory")).sum(),
        ..Default::default()
    };
    if let Some(metrics) = metrics {
        snap.metrics_available = true;
        for m in metrics {
            snap.total_cpu_cores += parse_quantity_value(m.usage.cpu.as_ref());
            snap.total_memory_bytes += parse_quantity_value(m.usage.memory.as_ref());
        }
    }
    snap
}

pub fn usage_per_node(nodes: &[Node], metrics: Option<&[NodeMetrics]>) -> Vec<NodeUsage> {
    let by_name: HashMap<&str, &NodeMetrics> = metrics
        .unwrap_or_default()
        .iter()
        .map(|m| (m.metadata.name.as_str(), m))
        .collect();

    let mut out: Vec<NodeUsage> = nodes
        .iter()
        .map(|n| {
            let usage = by_name.get(n.metadata.name.as_str());
            NodeUsage {
                name: n.metadata.name.clone(),
                ready: n.is_ready(),
                cpu_cores: usage.map(|m| parse_quantity_value(m.usage.cpu.as_ref())),
                memory_bytes: usage.map(|m| parse_quantity_value(m.usage.memory.as_ref())),
                allocatable_cpu_cores: allocatable(n, "cpu"),
                allocatable_memory_bytes: allocatable(n, "memory"),
            }
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

/// Sums container usage per pod and keeps the `limit` heaviest by CPU.
pub fn rank_pods(metrics: &[PodMetrics], limit: usize) -> Vec<PodMetric> {
    let mut pods: Vec<PodMetric> = metrics
        .iter()
        .filter(|m| !m.containers.is_empty())
        .map(|m| PodMetric {
            name: m.metadata.name.clone(),
            namespace: m.metadata.namespace.clone(),
            cpu_cores: m
                .containers
                .iter()
                .map(|c| parse_quantity_value(c.usage.cpu.as_ref()))
                .sum(),
            memory_bytes: m
                .containers
                .iter()
                .map(|c| parse_quantity_value(c.usage.memory.as_ref()))
                .sum(),
        })
        .collect();

    pods.sort_by(|a, b| {
        b.cpu_cores
            .partial_cmp(&a.cpu_cores)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.memory_bytes.partial_cmp(&a.memory_bytes).unwrap_or(Ordering::Equal))
            .then_with(|| a.namespace.cmp(&b.namespace))
            .then_with(|| a.name.cmp(&b.name))
    });
    pods.truncate(limit);
    pods
}
