use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::ClusterGateway;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub reachable: bool,
    pub last_ping: Option<DateTime<Utc>>,
}

/// Connectivity to the API server as seen by the background probe.
pub struct ClusterHealth {
    state: Mutex<HealthStatus>,
}

impl Default for ClusterHealth {
    fn default() -> Self {
        Self {
            state: Mutex::new(HealthStatus {
                reachable: true,
                last_ping: None,
            }),
        }
    }
}

impl ClusterHealth {
    fn lock(&self) -> MutexGuard<'_, HealthStatus> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> HealthStatus {
        *self.lock()
    }

    pub fn is_reachable(&self) -> bool {
        self.lock().reachable
    }

    pub fn mark_ok(&self, at: DateTime<Utc>) {
        let mut state = self.lock();
        state.reachable = true;
        state.last_ping = Some(at);
    }

    pub fn mark_failed(&self) {
        self.lock().reachable = false;
    }

    pub async fn probe(&self, gateway: &dyn ClusterGateway) {
        match gateway.ping().await {
            Ok(()) => self.mark_ok(Utc::now()),
            Err(e) => {
                if self.is_reachable() {
                    warn!("cluster health check failed: {}", e);
                }
                self.mark_failed();
            }
        }
    }
}

pub async fn run_health_checker(
    gateway: Arc<dyn ClusterGateway>,
    health: Arc<ClusterHealth>,
    every: Duration,
    shutdown: CancellationToken,
) {
    health.probe(gateway.as_ref()).await;

    let mut interval = time::interval(every);
    interval.tick().await; // skip first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {
                health.probe(gateway.as_ref()).await;
            }
            _ = shutdown.cancelled() => {
                info!("health checker shutting down");
                return;
            }
        }
    }
}
