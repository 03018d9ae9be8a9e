pub mod analyzer;
pub mod events;
#[cfg(test)]
pub mod fake;
pub mod health;
pub mod metrics;
pub mod scanner;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use urlencoding::encode;

use crate::config::ClusterConfig;
use crate::error::GatewayError;
use crate::models::k8s::{Endpoints, Event, List, Namespace, NodeMetrics, PodMetrics};
use crate::models::kind::{ResourceKind, ResourceObject, Scope};

const METRICS_API: &str = "/apis/metrics.k8s.io/v1beta1";

#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// `application/merge-patch+json`
    Merge(serde_json::Value),
    /// `application/json-patch+json`
    Json(serde_json::Value),
}

impl Patch {
    fn content_type(&self) -> &'static str {
        match self {
            Self::Merge(_) => "application/merge-patch+json",
            Self::Json(_) => "application/json-patch+json",
        }
    }

    fn body(&self) -> &serde_json::Value {
        match self {
            Self::Merge(v) | Self::Json(v) => v,
        }
    }
}

/// The subset of the Kubernetes API the console consumes.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    async fn list(&self, kind: ResourceKind, scope: &Scope) -> Result<Vec<ResourceObject>, GatewayError>;

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<serde_json::Value, GatewayError>;

    async fn patch(&self, kind: ResourceKind, namespace: &str, name: &str, patch: &Patch) -> Result<(), GatewayError>;

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), GatewayError>;

    async fn list_events(&self, scope: &Scope) -> Result<Vec<Event>, GatewayError>;

    async fn list_endpoints(&self, scope: &Scope) -> Result<Vec<Endpoints>, GatewayError>;

    async fn list_namespaces(&self) -> Result<Vec<String>, GatewayError>;

    async fn list_node_metrics(&self) -> Result<Vec<NodeMetrics>, GatewayError>;

    async fn list_pod_metrics(&self, scope: &Scope) -> Result<Vec<PodMetrics>, GatewayError>;

    async fn list_custom(
        &self,
        group: &str,
        version: &str,
        plural: &str,
        scope: &Scope,
    ) -> Result<Vec<serde_json::Value>, GatewayError>;

    async fn ping(&self) -> Result<(), GatewayError>;
}

enum TokenSource {
    None,
    Static(String),
    // Projected service account tokens rotate, so the file is re-read per request.
    File(PathBuf),
}

pub struct KubeClient {
    base_url: String,
    http: Client,
    token: TokenSource,
}

impl KubeClient {
    pub fn new(cfg: &ClusterConfig) -> Result<Self, GatewayError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(cfg.request_timeout_secs));

        let ca_pem = match (&cfg.certificate_authority_data, &cfg.certificate_authority_file) {
            (Some(data), _) => Some(
                base64::engine::general_purpose::STANDARD
                    .decode(data.trim())
                    .map_err(|e| GatewayError::Setup(format!("certificate_authority_data: {}", e)))?,
            ),
            (None, Some(path)) => Some(std::fs::read(path).map_err(|e| {
                GatewayError::Setup(format!("reading {}: {}", path.display(), e))
            })?),
            (None, None) => None,
        };
        if let Some(pem) = ca_pem {
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| GatewayError::Setup(format!("parsing CA bundle: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
        if cfg.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| GatewayError::Setup(format!("building HTTP client: {}", e)))?;

        let token = match (&cfg.token, &cfg.token_file) {
            (Some(t), _) => TokenSource::Static(t.clone()),
            (None, Some(path)) => TokenSource::File(path.clone()),
            (None, None) => TokenSource::None,
        };

        Ok(Self {
            base_url: cfg.api_server.trim_end_matches('/').to_string(),
            http,
            token,
        })
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, GatewayError> {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header("Accept", "application/json");

        let token = match &self.token {
            TokenSource::None => None,
            TokenSource::Static(t) => Some(t.clone()),
            TokenSource::File(p) => Some(
                tokio::fs::read_to_string(p)
                    .await
                    .map_err(|e| GatewayError::Setup(format!("reading token {}: {}", p.display(), e)))?
                    .trim()
                    .to_string(),
            ),
        };
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        Ok(req)
    }

    async fn send(&self, path: &str, req: RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let resp = req.send().await.map_err(|source| GatewayError::Transport {
            path: path.to_string(),
            source,
        })?;

        if resp.status().as_u16() >= 400 {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                path: path.to_string(),
                status,
                body,
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        debug!("GET {}", path);
        let req = self.request(Method::GET, path).await?;
        let bytes = self
            .send(path, req)
            .await?
            .bytes()
            .await
            .map_err(|source| GatewayError::Transport {
                path: path.to_string(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|source| GatewayError::Decode {
            path: path.to_string(),
            source,
        })
    }

    async fn list_items<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, GatewayError> {
        Ok(self.get_json::<List<T>>(path).await?.items)
    }
}

fn scoped_path(prefix: &str, plural: &str, scope: &Scope) -> String {
    match scope {
        Scope::All => format!("{}/{}", prefix, plural),
        Scope::Namespace(ns) => format!("{}/namespaces/{}/{}", prefix, encode(ns), plural),
    }
}

#[async_trait]
impl ClusterGateway for KubeClient {
    async fn list(&self, kind: ResourceKind, scope: &Scope) -> Result<Vec<ResourceObject>, GatewayError> {
        let path = kind.collection_path(scope);
        let items: Vec<serde_json::Value> = self.list_items(&path).await?;
        items
            .into_iter()
            .map(|item| {
                ResourceObject::from_value(kind, item).map_err(|source| GatewayError::Decode {
                    path: path.clone(),
                    source,
                })
            })
            .collect()
    }

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<serde_json::Value, GatewayError> {
        self.get_json(&kind.object_path(namespace, name)).await
    }

    async fn patch(&self, kind: ResourceKind, namespace: &str, name: &str, patch: &Patch) -> Result<(), GatewayError> {
        let path = kind.object_path(namespace, name);
        debug!("PATCH {}", path);
        let req = self
            .request(Method::PATCH, &path)
            .await?
            .header("Content-Type", patch.content_type())
            .body(patch.body().to_string());
        self.send(&path, req).await?;
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), GatewayError> {
        let path = kind.object_path(namespace, name);
        debug!("DELETE {}", path);
        let req = self.request(Method::DELETE, &path).await?;
        self.send(&path, req).await?;
        Ok(())
    }

    async fn list_events(&self, scope: &Scope) -> Result<Vec<Event>, GatewayError> {
        self.list_items(&ResourceKind::Event.collection_path(scope)).await
    }

    async fn list_endpoints(&self, scope: &Scope) -> Result<Vec<Endpoints>, GatewayError> {
        self.list_items(&scoped_path("/api/v1", "endpoints", scope)).await
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, GatewayError> {
        let items: Vec<Namespace> = self.list_items("/api/v1/namespaces").await?;
        Ok(items.into_iter().map(|ns| ns.metadata.name).collect())
    }

    async fn list_node_metrics(&self) -> Result<Vec<NodeMetrics>, GatewayError> {
        self.list_items(&format!("{}/nodes", METRICS_API)).await
    }

    async fn list_pod_metrics(&self, scope: &Scope) -> Result<Vec<PodMetrics>, GatewayError> {
        self.list_items(&scoped_path(METRICS_API, "pods", scope)).await
    }

    async fn list_custom(
        &self,
        group: &str,
        version: &str,
        plural: &str,
        scope: &Scope,
    ) -> Result<Vec<serde_json::Value>, GatewayError> {
        let prefix = format!("/apis/{}/{}", encode(group), encode(version));
        self.list_items(&scoped_path(&prefix, &encode(plural), scope)).await
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        let req = self.request(Method::GET, "/readyz").await?;
        self.send("/readyz", req).await?;
        Ok(())
    }
}
