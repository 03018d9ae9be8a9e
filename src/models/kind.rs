use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use urlencoding::encode;

use super::k8s;
use super::names::{InvalidName, dns_label};

/// Kubernetes kinds the console knows how to list and classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Pod,
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
    Service,
    Ingress,
    ConfigMap,
    Secret,
    PersistentVolumeClaim,
    Node,
    Event,
}

/// Kinds included in an `all` scan, in triage order. Position doubles as the
/// primary sort key of scan output.
pub const SCAN_ORDER: [ResourceKind; 11] = [
    ResourceKind::Pod,
    ResourceKind::Deployment,
    ResourceKind::StatefulSet,
    ResourceKind::DaemonSet,
    ResourceKind::Job,
    ResourceKind::CronJob,
    ResourceKind::Service,
    ResourceKind::Ingress,
    ResourceKind::ConfigMap,
    ResourceKind::Secret,
    ResourceKind::PersistentVolumeClaim,
];

pub const UNRANKED: usize = 999;

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::Job => "Job",
            Self::CronJob => "CronJob",
            Self::Service => "Service",
            Self::Ingress => "Ingress",
            Self::ConfigMap => "ConfigMap",
            Self::Secret => "Secret",
            Self::PersistentVolumeClaim => "PersistentVolumeClaim",
            Self::Node => "Node",
            Self::Event => "Event",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Self::Pod => "pods",
            Self::Deployment => "deployments",
            Self::StatefulSet => "statefulsets",
            Self::DaemonSet => "daemonsets",
            Self::Job => "jobs",
            Self::CronJob => "cronjobs",
            Self::Service => "services",
            Self::Ingress => "ingresses",
            Self::ConfigMap => "configmaps",
            Self::Secret => "secrets",
            Self::PersistentVolumeClaim => "persistentvolumeclaims",
            Self::Node => "nodes",
            Self::Event => "events",
        }
    }

    /// API group/version prefix for this kind's REST path.
    pub fn api_prefix(self) -> &'static str {
        match self {
            Self::Deployment | Self::StatefulSet | Self::DaemonSet => "/apis/apps/v1",
            Self::Job | Self::CronJob => "/apis/batch/v1",
            Self::Ingress => "/apis/networking.k8s.io/v1",
            _ => "/api/v1",
        }
    }

    pub fn namespaced(self) -> bool {
        !matches!(self, Self::Node)
    }

    pub fn sort_rank(self) -> usize {
        SCAN_ORDER
            .iter()
            .position(|k| *k == self)
            .unwrap_or(UNRANKED)
    }

    pub fn collection_path(self, scope: &Scope) -> String {
        match scope {
            Scope::Namespace(ns) if self.namespaced() => {
                format!("{}/namespaces/{}/{}", self.api_prefix(), encode(ns), self.plural())
            }
            _ => format!("{}/{}", self.api_prefix(), self.plural()),
        }
    }

    pub fn object_path(self, namespace: &str, name: &str) -> String {
        if self.namespaced() {
            format!(
                "{}/namespaces/{}/{}/{}",
                self.api_prefix(),
                encode(namespace),
                self.plural(),
                encode(name)
            )
        } else {
            format!("{}/{}/{}", self.api_prefix(), self.plural(), encode(name))
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported resource type {0:?}")]
pub struct UnknownKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    /// Accepts kind names, plurals and the usual kubectl short names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "pod" | "pods" | "po" => Self::Pod,
            "deployment" | "deployments" | "deploy" => Self::Deployment,
            "statefulset" | "statefulsets" | "sts" => Self::StatefulSet,
            "daemonset" | "daemonsets" | "ds" => Self::DaemonSet,
            "job" | "jobs" => Self::Job,
            "cronjob" | "cronjobs" | "cj" => Self::CronJob,
            "service" | "services" | "svc" => Self::Service,
            "ingress" | "ingresses" | "ing" => Self::Ingress,
            "configmap" | "configmaps" | "cm" => Self::ConfigMap,
            "secret" | "secrets" => Self::Secret,
            "persistentvolumeclaim" | "persistentvolumeclaims" | "pvc" | "pvcs" => {
                Self::PersistentVolumeClaim
            }
            "node" | "nodes" | "no" => Self::Node,
            "event" | "events" | "ev" => Self::Event,
            _ => return Err(UnknownKind(s.to_string())),
        };
        Ok(kind)
    }
}

/// Namespace scope of a list call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    All,
    Namespace(String),
}

impl Scope {
    /// `"all"` (any case) and the empty string mean cluster-wide. Anything
    /// else must be a valid namespace name.
    pub fn parse(namespace: Option<&str>) -> Result<Self, InvalidName> {
        match namespace.map(str::trim) {
            None | Some("") => Ok(Self::All),
            Some(ns) if ns.eq_ignore_ascii_case("all") => Ok(Self::All),
            Some(ns) => Ok(Self::Namespace(dns_label("namespace", ns)?.to_string())),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Namespace(ns) => Some(ns),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Namespace(ns) => f.write_str(ns),
        }
    }
}

/// A listed object, narrowed to its kind's typed projection at the API boundary.
#[derive(Debug, Clone)]
pub enum ResourceObject {
    Pod(k8s::Pod),
    Deployment(k8s::Deployment),
    StatefulSet(k8s::StatefulSet),
    DaemonSet(k8s::DaemonSet),
    Job(k8s::Job),
    CronJob(k8s::CronJob),
    Service(k8s::Service),
    Ingress(k8s::Ingress),
    ConfigMap(k8s::ConfigMap),
    Secret(k8s::Secret),
    PersistentVolumeClaim(k8s::PersistentVolumeClaim),
    Node(k8s::Node),
    Event(k8s::Event),
}

impl ResourceObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Pod(_) => ResourceKind::Pod,
            Self::Deployment(_) => ResourceKind::Deployment,
            Self::StatefulSet(_) => ResourceKind::StatefulSet,
            Self::DaemonSet(_) => ResourceKind::DaemonSet,
            Self::Job(_) => ResourceKind::Job,
            Self::CronJob(_) => ResourceKind::CronJob,
            Self::Service(_) => ResourceKind::Service,
            Self::Ingress(_) => ResourceKind::Ingress,
            Self::ConfigMap(_) => ResourceKind::ConfigMap,
            Self::Secret(_) => ResourceKind::Secret,
            Self::PersistentVolumeClaim(_) => ResourceKind::PersistentVolumeClaim,
            Self::Node(_) => ResourceKind::Node,
            Self::Event(_) => ResourceKind::Event,
        }
    }

    pub fn meta(&self) -> &k8s::ObjectMeta {
        match self {
            Self::Pod(o) => &o.metadata,
            Self::Deployment(o) => &o.metadata,
            Self::StatefulSet(o) => &o.metadata,
            Self::DaemonSet(o) => &o.metadata,
            Self::Job(o) => &o.metadata,
            Self::CronJob(o) => &o.metadata,
            Self::Service(o) => &o.metadata,
            Self::Ingress(o) => &o.metadata,
            Self::ConfigMap(o) => &o.metadata,
            Self::Secret(o) => &o.metadata,
            Self::PersistentVolumeClaim(o) => &o.metadata,
            Self::Node(o) => &o.metadata,
            Self::Event(o) => &o.metadata,
        }
    }

    /// Decodes one list item of `kind` from its JSON form.
    pub fn from_value(kind: ResourceKind, value: serde_json::Value) -> serde_json::Result<Self> {
        use serde_json::from_value;
        Ok(match kind {
            ResourceKind::Pod => Self::Pod(from_value(value)?),
            ResourceKind::Deployment => Self::Deployment(from_value(value)?),
            ResourceKind::StatefulSet => Self::StatefulSet(from_value(value)?),
            ResourceKind::DaemonSet => Self::DaemonSet(from_value(value)?),
            ResourceKind::Job => Self::Job(from_value(value)?),
            ResourceKind::CronJob => Self::CronJob(from_value(value)?),
            ResourceKind::Service => Self::Service(from_value(value)?),
            ResourceKind::Ingress => Self::Ingress(from_value(value)?),
            ResourceKind::ConfigMap => Self::ConfigMap(from_value(value)?),
            ResourceKind::Secret => Self::Secret(from_value(value)?),
            ResourceKind::PersistentVolumeClaim => {
                Self::PersistentVolumeClaim(from_value(value)?)
            }
            ResourceKind::Node => Self::Node(from_value(value)?),
            ResourceKind::Event => Self::Event(from_value(value)?),
        })
    }
}
