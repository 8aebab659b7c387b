//! Optional HTTP status surface: `/health` for probes, `/status` for humans

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::observability::{Metrics, MetricsSnapshot};
use crate::supervisor::{Supervisor, SupervisorState, SupervisorStatus};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Supervisor,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(supervisor: Supervisor, metrics: Arc<Metrics>) -> Self {
        Self {
            supervisor,
            metrics,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub worker: SupervisorState,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub supervisor: SupervisorStatus,
    pub metrics: MetricsSnapshot,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn run<F>(address: SocketAddr, state: AppState, shutdown: F) -> Result<(), AnyError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(address).await?;
    info!(%address, "Status server listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Health check endpoint (GET /health)
///
/// 200 while the worker is running, 503 in every other state.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let worker = state.supervisor.status().state;
    let healthy = worker == SupervisorState::Running;

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        worker,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        supervisor: state.supervisor.status(),
        metrics: state.metrics.snapshot(),
    })
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
    info!("Shutdown signal received");
}
