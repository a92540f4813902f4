//! # Initialization
//!
//! Process setup: rustls provider, tracing, metrics, probe server, Kubernetes
//! client and the subscription manager.

use crate::config::{load_config, MonitorConfig, ServerConfig};
use crate::constants;
use crate::monitor::{KubeEventsProvider, KubeResourceWatcher, SubscriptionManager};
use crate::observability;
use crate::observability::server::{start_server, ServerState};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything `main` needs once startup succeeded
#[derive(Debug)]
pub struct InitializationResult {
    pub manager: Arc<SubscriptionManager>,
    /// Readiness flag shared with the probe server
    pub server_state: Arc<ServerState>,
    pub server_handle: Option<tokio::task::JoinHandle<()>>,
    pub monitor_config: MonitorConfig,
}

/// Install the rustls crypto provider and the tracing subscriber
///
/// Logs go to stderr; stdout carries command output.
pub fn init_logging() {
    // rustls 0.23+ needs a process-wide provider before any TLS connection.
    // Err means one is already installed, which is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cluster_progress_monitor=info".into()),
        )
        .with_writer(std::io::stderr)
        .try_init()
    {
        warn!("Tracing subscriber init returned error (may already be initialized): {}", e);
    }
}

/// Build the runtime: metrics, optional probe server, client and manager
///
/// The probe server only starts when `serve_probes` is set and the configured
/// port is non-zero.
pub async fn initialize(serve_probes: bool) -> Result<InitializationResult> {
    info!("Starting {} v{}", constants::COMPONENT_NAME, env!("CARGO_PKG_VERSION"));

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let (monitor_config, server_config) = load_config();
    let server_state = Arc::new(ServerState::default());
    let server_handle = if serve_probes && server_config.enabled() {
        Some(spawn_probe_server(&server_config, &server_state).await?)
    } else {
        None
    };

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let manager = SubscriptionManager::new(
        Arc::new(KubeResourceWatcher::new(client.clone())),
        Arc::new(KubeEventsProvider::new(client)),
        monitor_config.clone(),
    )
    .context("Invalid ALLOWED_NAMESPACES pattern")?;

    info!(
        per_caller_limit = monitor_config.per_caller_limit,
        global_limit = monitor_config.global_limit,
        default_timeout_secs = monitor_config.default_timeout.as_secs(),
        "Subscription manager initialized"
    );

    Ok(InitializationResult {
        manager: Arc::new(manager),
        server_state,
        server_handle,
        monitor_config,
    })
}

async fn spawn_probe_server(
    config: &ServerConfig,
    server_state: &Arc<ServerState>,
) -> Result<tokio::task::JoinHandle<()>> {
    let port = config.metrics_port;
    let state = Arc::clone(server_state);
    let handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, state).await {
            error!("HTTP server error: {:#}", e);
        }
    });
    wait_for_server_ready(server_state, &handle).await?;
    Ok(handle)
}

/// Wait for the HTTP server to bind, or fail if it dies or takes too long
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout =
        std::time::Duration::from_secs(constants::DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval =
        std::time::Duration::from_millis(constants::DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = tokio::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state
            .is_ready
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}
