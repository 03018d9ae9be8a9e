use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use super::ClusterGateway;
use super::events::build_event_index;
use super::scanner::build_row;
use crate::classify::{EndpointIndex, analyze, classify, namespace_or_default};
use crate::models::kind::{ResourceKind, ResourceObject, Scope};
use crate::models::views::ResourceRow;

/// Kinds the issues view inspects.
pub const ANALYZED_KINDS: [ResourceKind; 6] = [
    ResourceKind::Pod,
    ResourceKind::Deployment,
    ResourceKind::StatefulSet,
    ResourceKind::DaemonSet,
    ResourceKind::Job,
    ResourceKind::Service,
];

/// Problems-only view with the stricter rule set from [`analyze`].
pub struct Analyzer {
    gateway: Arc<dyn ClusterGateway>,
}

impl Analyzer {
    pub fn new(gateway: Arc<dyn ClusterGateway>) -> Self {
        Self { gateway }
    }

    /// Most severe first, then the usual kind/namespace/name order.
    pub async fn issues(&self, scope: &Scope) -> Vec<ResourceRow> {
        let gateway = self.gateway.as_ref();

        let fetches = join_all(
            ANALYZED_KINDS
                .iter()
                .map(|&kind| async move { (kind, gateway.list(kind, scope).await) }),
        );
        let scopes = [scope.clone()];
        let (fetched, endpoints, events) = futures_util::join!(
            fetches,
            gateway.list_endpoints(scope),
            build_event_index(gateway, &scopes)
        );

        // Without endpoint data every service would look empty, so fall back to
        // the lenient rules for services.
        let endpoints: Option<EndpointIndex> = match endpoints {
            Ok(list) => Some(
                list.iter()
                    .map(|ep| {
                        (
                            (namespace_or_default(&ep.metadata.namespace), ep.metadata.name.clone()),
                            ep.ready_addresses(),
                        )
                    })
                    .collect(),
            ),
            Err(e) => {
                warn!(namespace = %scope, "listing endpoints failed: {}", e);
                None
            }
        };

        let now = Utc::now();
        let mut rows = Vec::new();
        for (kind, result) in fetched {
            let objects = match result {
                Ok(objects) => objects,
                Err(e) => {
                    warn!(kind = %kind, namespace = %scope, "listing failed, skipping kind: {}", e);
                    continue;
                }
            };
            for obj in &objects {
                let issue = match (&endpoints, obj) {
                    (None, ResourceObject::Service(_)) => classify(obj, now),
                    (Some(index), _) => analyze(obj, index, now),
                    (None, _) => analyze(obj, &EndpointIndex::new(), now),
                };
                if !issue.is_ok() {
                    rows.push(build_row(obj, issue, &events, now));
                }
            }
        }

        rows.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.kind.sort_rank().cmp(&b.kind.sort_rank()))
                .then_with(|| a.namespace.cmp(&b.namespace))
                .then_with(|| a.name.cmp(&b.name))
        });
        debug!(issues = rows.len(), namespace = %scope, "analysis complete");
        rows
    }
}
