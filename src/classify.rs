//! Health classification per resource kind.
//!
//! Two rule sets exist. [`classify`] backs the resource table and is lenient about
//! pods that are merely starting up. [`analyze`] backs the issues view: it also
//! flags restart churn and services without ready endpoints, and treats every
//! pending pod as a warning.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::helpers::parse_timestamp;
use crate::models::k8s::{DaemonSet, Deployment, Job, Pod, ReplicaSpec, Service, StatefulSet};
use crate::models::kind::ResourceObject;
use crate::models::views::Issue;

const PENDING_GRACE_MINUTES: i64 = 10;
const RESTART_THRESHOLD: i32 = 3;

/// Ready endpoint address counts keyed by `(namespace, service name)`.
pub type EndpointIndex = HashMap<(String, String), usize>;

pub fn classify(obj: &ResourceObject, now: DateTime<Utc>) -> Issue {
    match obj {
        ResourceObject::Pod(p) => pod_issue(p, now),
        ResourceObject::Deployment(d) => deployment_issue(d),
        ResourceObject::StatefulSet(s) => statefulset_issue(s),
        ResourceObject::DaemonSet(d) => daemonset_issue(d),
        ResourceObject::Job(j) => job_issue(j),
        // CronJobs are listed for inventory only; their spawned Jobs carry the signal.
        ResourceObject::CronJob(_) => Issue::ok(),
        ResourceObject::Service(_)
        | ResourceObject::Ingress(_)
        | ResourceObject::ConfigMap(_)
        | ResourceObject::Secret(_)
        | ResourceObject::PersistentVolumeClaim(_)
        | ResourceObject::Node(_)
        | ResourceObject::Event(_) => Issue::ok(),
    }
}

pub fn analyze(obj: &ResourceObject, endpoints: &EndpointIndex, now: DateTime<Utc>) -> Issue {
    match obj {
        ResourceObject::Pod(p) => pod_issue_strict(p),
        ResourceObject::Deployment(d) => deployment_issue_detailed(d),
        ResourceObject::Service(s) => service_issue(s, endpoints),
        other => classify(other, now),
    }
}

/// Waiting/terminated reasons that are always critical, first match wins.
fn container_failure(pod: &Pod) -> Option<Issue> {
    for cs in pod.container_statuses() {
        let waiting = cs
            .state
            .as_ref()
            .and_then(|s| s.waiting.as_ref())
            .and_then(|w| w.reason.as_deref());
        if let Some(reason @ ("CrashLoopBackOff" | "ImagePullBackOff" | "ErrImagePull")) = waiting {
            return Some(Issue::critical(reason));
        }

        let oom = [cs.state.as_ref(), cs.last_state.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|s| s.terminated.as_ref())
            .any(|t| t.reason.as_deref() == Some("OOMKilled"));
        if oom {
            return Some(Issue::critical("OOMKilled"));
        }
    }
    None
}

pub fn pod_issue(pod: &Pod, now: DateTime<Utc>) -> Issue {
    if let Some(issue) = container_failure(pod) {
        return issue;
    }

    match pod.phase() {
        Some("Failed") => return Issue::critical("Failed"),
        Some("Pending") => {
            let stuck = parse_timestamp(pod.metadata.creation_timestamp.as_deref())
                .map(|created| now - created > Duration::minutes(PENDING_GRACE_MINUTES))
                .unwrap_or(false);
            return if stuck {
                Issue::warning("Pending >10m")
            } else {
                Issue::info("Pending")
            };
        }
        _ => {}
    }

    if matches!(pod.ready_condition(), Some(status) if status != "True") {
        return Issue::warning("NotReady");
    }
    if pod.phase() == Some("Unknown") {
        return Issue::warning("Unknown");
    }
    Issue::ok()
}

pub fn pod_issue_strict(pod: &Pod) -> Issue {
    if let Some(issue) = container_failure(pod) {
        return issue;
    }

    let restarts = pod.restarts();
    if restarts > RESTART_THRESHOLD {
        return Issue::critical(format!("High restarts: {}", restarts));
    }

    match pod.phase() {
        Some("Failed") => Issue::critical("Failed"),
        Some("Pending") => Issue::warning("Pending"),
        Some("Unknown") => Issue::warning("Unknown"),
        _ => Issue::ok(),
    }
}

fn desired_replicas(spec: Option<&ReplicaSpec>) -> i32 {
    spec.and_then(|s| s.replicas).unwrap_or(1)
}

fn shortfall(have: i32, want: i32, text: String) -> Issue {
    if have >= want {
        Issue::ok()
    } else if have == 0 {
        Issue::critical(text)
    } else {
        Issue::warning(text)
    }
}

pub fn deployment_issue(d: &Deployment) -> Issue {
    let desired = desired_replicas(d.spec.as_ref());
    let available = d
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    shortfall(
        available,
        desired,
        format!("Unavailable: {}/{} ready", available, desired),
    )
}

pub fn deployment_issue_detailed(d: &Deployment) -> Issue {
    let desired = desired_replicas(d.spec.as_ref());
    let status = d.status.clone().unwrap_or_default();
    let available = status.available_replicas.unwrap_or(0);
    let updated = status.updated_replicas.unwrap_or(0);
    shortfall(
        available,
        desired,
        format!(
            "Unhealthy: {}/{} available (updated {})",
            available, desired, updated
        ),
    )
}

pub fn statefulset_issue(s: &StatefulSet) -> Issue {
    let desired = desired_replicas(s.spec.as_ref());
    let ready = s.status.as_ref().and_then(|st| st.ready_replicas).unwrap_or(0);
    shortfall(ready, desired, format!("Unavailable: {}/{} ready", ready, desired))
}

pub fn daemonset_issue(d: &DaemonSet) -> Issue {
    let status = d.status.clone().unwrap_or_default();
    let desired = status.desired_number_scheduled.unwrap_or(0);
    let available = status.number_available.unwrap_or(0);
    shortfall(
        available,
        desired,
        format!("Unavailable: {}/{} ready", available, desired),
    )
}

pub fn job_issue(j: &Job) -> Issue {
    match j.status.as_ref().and_then(|s| s.failed) {
        Some(failed) if failed > 0 => Issue::critical(format!("Failed: {}", failed)),
        _ => Issue::ok(),
    }
}

pub fn service_issue(s: &Service, endpoints: &EndpointIndex) -> Issue {
    let external = s
        .spec
        .as_ref()
        .and_then(|spec| spec.service_type.as_deref())
        == Some("ExternalName");
    if external {
        return Issue::ok();
    }

    let key = (namespace_or_default(&s.metadata.namespace), s.metadata.name.clone());
    match endpoints.get(&key) {
        Some(ready) if *ready > 0 => Issue::ok(),
        _ => Issue::warning("No ready endpoints"),
    }
}

pub fn namespace_or_default(ns: &str) -> String {
    if ns.is_empty() {
        "default".to_string()
    } else {
        ns.to_string()
    }
}
