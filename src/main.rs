mod auth;
mod classify;
mod clients;
mod config;
mod error;
mod helpers;
mod models;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use auth::AuthKeys;
use clients::analyzer::Analyzer;
use clients::health::{ClusterHealth, run_health_checker};
use clients::metrics::Aggregator;
use clients::scanner::Scanner;
use clients::{ClusterGateway, KubeClient};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn ClusterGateway>,
    pub scanner: Arc<Scanner>,
    pub analyzer: Arc<Analyzer>,
    pub aggregator: Arc<Aggregator>,
    pub health: Arc<ClusterHealth>,
    pub auth: Arc<AuthKeys>,
    pub config: Arc<config::Config>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        config: Arc<config::Config>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            scanner: Arc::new(Scanner::new(gateway.clone())),
            analyzer: Arc::new(Analyzer::new(gateway.clone())),
            aggregator: Arc::new(Aggregator::new(gateway.clone())),
            health: Arc::new(ClusterHealth::default()),
            auth: Arc::new(AuthKeys::new(config.jwt_secret())),
            gateway,
            config,
            shutdown,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cluster_console=info")),
        )
        .init();

    let config_path = std::env::args()
        .skip(1)
        .zip(std::env::args().skip(2))
        .find_map(|(k, v)| (k == "-config" || k == "--config").then_some(v))
        .or_else(|| std::env::args().nth(1).filter(|a| !a.starts_with('-')))
        .unwrap_or_else(|| "/etc/cluster-console/config.yaml".to_string());

    let cfg = config::Config::load(&PathBuf::from(&config_path)).unwrap_or_else(|e| {
        eprintln!("error loading config: {}", e);
        std::process::exit(1);
    });

    let gateway: Arc<dyn ClusterGateway> = match KubeClient::new(&cfg.cluster) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("error creating cluster client: {}", e);
            std::process::exit(1);
        }
    };
    info!("using API server {}", cfg.cluster.api_server);

    let cfg = Arc::new(cfg);
    let shutdown = CancellationToken::new();
    let state = AppState::new(gateway.clone(), cfg.clone(), shutdown.clone());

    let health_task = tokio::spawn(run_health_checker(
        gateway,
        state.health.clone(),
        Duration::from_secs(cfg.health_check_interval_secs.max(1)),
        shutdown.clone(),
    ));

    let router = routes::build_router(state);

    let listen_addr = cfg.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await.unwrap_or_else(|e| {
        eprintln!("failed to bind {}: {}", listen_addr, e);
        std::process::exit(1);
    });

    info!("cluster-console listening on {}", listen_addr);

    let server_shutdown = shutdown.clone();
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open SSE streams end on this too, so the server can drain.
            server_shutdown.cancel();
        })
        .await;

    shutdown.cancel();
    let _ = health_task.await;

    if let Err(e) = served {
        error!("server error: {}", e);
        std::process::exit(1);
    }
    info!("shut down cleanly");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
