use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::collections::HashMap;
use tracing::warn;

use super::ClusterGateway;
use crate::helpers::parse_timestamp;
use crate::models::k8s::Event;
use crate::models::kind::Scope;

/// `(namespace, kind, name)` of an involved object.
pub type EventKey = (String, String, String);

/// Latest event time per involved object, rebuilt for every scan.
#[derive(Debug, Default, Clone)]
pub struct EventIndex {
    latest: HashMap<EventKey, DateTime<Utc>>,
}

impl EventIndex {
    pub fn last_seen(&self, namespace: &str, kind: &str, name: &str) -> Option<DateTime<Utc>> {
        self.latest
            .get(&(namespace.to_string(), kind.to_string(), name.to_string()))
            .copied()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.latest.len()
    }

    /// Adds one event; `fallback_ns` applies when the involved object has no namespace.
    pub fn insert(&mut self, event: &Event, fallback_ns: &str) {
        let Some(ts) = event_time(event) else {
            return;
        };
        let obj = &event.involved_object;
        let ns = obj
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(fallback_ns);
        let key = (ns.to_string(), obj.kind.clone(), obj.name.clone());
        self.latest
            .entry(key)
            .and_modify(|cur| {
                if ts > *cur {
                    *cur = ts;
                }
            })
            .or_insert(ts);
    }
}

/// First present of `lastTimestamp`, `eventTime`, `firstTimestamp`.
pub fn event_time(event: &Event) -> Option<DateTime<Utc>> {
    [
        event.last_timestamp.as_deref(),
        event.event_time.as_deref(),
        event.first_timestamp.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.is_empty())
    .and_then(|s| parse_timestamp(Some(s)))
}

/// Lists events for every scope concurrently. A scope whose listing fails is
/// logged and left out; the index is built from whatever succeeded.
pub async fn build_event_index(gateway: &dyn ClusterGateway, scopes: &[Scope]) -> EventIndex {
    let results = join_all(scopes.iter().map(|scope| async move {
        (scope, gateway.list_events(scope).await)
    }))
    .await;

    let mut index = EventIndex::default();
    for (scope, result) in results {
        match result {
            Ok(events) => {
                for event in &events {
                    let fallback = match scope {
                        Scope::Namespace(ns) => ns.as_str(),
                        Scope::All if !event.metadata.namespace.is_empty() => {
                            event.metadata.namespace.as_str()
                        }
                        Scope::All => "default",
                    };
                    index.insert(event, fallback);
                }
            }
            Err(e) => warn!(namespace = %scope, "listing events failed: {}", e),
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fake::FakeGateway;
    use serde_json::json;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(Some(s)).unwrap()
    }

    #[test]
    fn timestamp_priority() {
        let e: Event = serde_json::from_value(json!({
            "firstTimestamp": "2024-01-01T00:00:00Z",
            "eventTime": "2024-01-02T00:00:00.000000Z"
        }))
        .unwrap();
        assert_eq!(event_time(&e), Some(ts("2024-01-02T00:00:00Z")));

        let e: Event = serde_json::from_value(json!({
            "lastTimestamp": "2024-01-01T00:00:00Z",
            "eventTime": "2024-03-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(event_time(&e), Some(ts("2024-01-01T00:00:00Z")));

        assert_eq!(event_time(&Event::default()), None);
    }

    #[tokio::test]
    async fn keeps_latest_per_object() {
        let gw = FakeGateway::new()
            .with_event(json!({
                "metadata": {"name": "e1", "namespace": "prod"},
                "involvedObject": {"kind": "Pod", "name": "api", "namespace": "prod"},
                "lastTimestamp": "2024-05-01T10:00:00Z"
            }))
            .with_event(json!({
                "metadata": {"name": "e2", "namespace": "prod"},
                "involvedObject": {"kind": "Pod", "name": "api", "namespace": "prod"},
                "lastTimestamp": "2024-05-01T12:00:00Z"
            }))
            .with_event(json!({
                "metadata": {"name": "e3", "namespace": "prod"},
                "involvedObject": {"kind": "Pod", "name": "api", "namespace": "prod"},
                "firstTimestamp": "2024-05-01T11:00:00Z"
            }));

        let index = build_event_index(&gw, &[Scope::All]).await;
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.last_seen("prod", "Pod", "api"),
            Some(ts("2024-05-01T12:00:00Z"))
        );
        assert_eq!(index.last_seen("prod", "Pod", "web"), None);
    }

    #[tokio::test]
    async fn missing_involved_namespace_uses_scan_namespace() {
        let gw = FakeGateway::new().with_event(json!({
            "metadata": {"name": "e1", "namespace": "shop"},
            "involvedObject": {"kind": "Deployment", "name": "cart"},
            "lastTimestamp": "2024-05-01T10:00:00Z"
        }));
        let index = build_event_index(&gw, &[Scope::Namespace("shop".into())]).await;
        assert!(index.last_seen("shop", "Deployment", "cart").is_some());
    }

    #[tokio::test]
    async fn failing_namespace_yields_partial_index() {
        let gw = FakeGateway::new()
            .with_event(json!({
                "metadata": {"name": "e1", "namespace": "a"},
                "involvedObject": {"kind": "Pod", "name": "p", "namespace": "a"},
                "lastTimestamp": "2024-05-01T10:00:00Z"
            }))
            .fail_events_in("b");

        let scopes = [Scope::Namespace("a".into()), Scope::Namespace("b".into())];
        let index = build_event_index(&gw, &scopes).await;
        assert_eq!(index.len(), 1);
        assert_eq!(gw.calls().len(), 2);
    }
}
