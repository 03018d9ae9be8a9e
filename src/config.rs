use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::auth::Role;

pub const JWT_SECRET_ENV: &str = "CLUSTER_CONSOLE_JWT_SECRET";
const IN_CLUSTER_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const IN_CLUSTER_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_api_server")]
    pub api_server: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// Base64-encoded PEM bundle, as found in kubeconfig files.
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
    #[serde(default)]
    pub certificate_authority_file: Option<PathBuf>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_server: default_api_server(),
            token: None,
            token_file: None,
            certificate_authority_data: None,
            certificate_authority_file: None,
            insecure_skip_tls_verify: false,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_stream_roles")]
    pub stream_roles: Vec<Role>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            stream_roles: default_stream_roles(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,
    #[serde(default = "default_top_pods")]
    pub top_pods: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_stream_interval(),
            cycle_timeout_secs: default_cycle_timeout(),
            top_pods: default_top_pods(),
        }
    }
}

fn default_listen_port() -> u16 {
    8080
}

fn default_api_server() -> String {
    "https://kubernetes.default.svc".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_health_interval() -> u64 {
    15
}

fn default_stream_roles() -> Vec<Role> {
    vec![Role::Viewer, Role::Editor, Role::Admin]
}

fn default_stream_interval() -> u64 {
    5
}

fn default_cycle_timeout() -> u64 {
    4
}

fn default_top_pods() -> usize {
    10
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let secret = std::env::var(JWT_SECRET_ENV).ok();
        Self::from_yaml(&data, secret)
    }

    pub fn from_yaml(data: &str, env_secret: Option<String>) -> Result<Self, ConfigError> {
        let mut cfg: Config = serde_yaml::from_str(data)?;

        if let Some(secret) = env_secret.filter(|s| !s.is_empty()) {
            cfg.auth.jwt_secret = Some(secret);
        }

        // In-cluster defaults when nothing explicit is configured
        if cfg.cluster.token.is_none() && cfg.cluster.token_file.is_none() {
            let p = PathBuf::from(IN_CLUSTER_TOKEN);
            if p.exists() {
                cfg.cluster.token_file = Some(p);
            }
        }
        if cfg.cluster.certificate_authority_data.is_none()
            && cfg.cluster.certificate_authority_file.is_none()
        {
            let p = PathBuf::from(IN_CLUSTER_CA);
            if p.exists() {
                cfg.cluster.certificate_authority_file = Some(p);
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.as_deref().unwrap_or_default().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "auth.jwt_secret or {} must be set",
                JWT_SECRET_ENV
            )));
        }
        if self.stream.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "stream.interval_secs must be positive".to_string(),
            ));
        }
        if self.auth.stream_roles.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.stream_roles must allow at least one role".to_string(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.listen_port)
    }

    pub fn jwt_secret(&self) -> &str {
        self.auth.jwt_secret.as_deref().unwrap_or_default()
    }
}
