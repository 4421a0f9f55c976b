use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use poller_actor::PollerHealth;

#[derive(Clone)]
struct HttpState {
    health: watch::Receiver<PollerHealth>,
    metrics: PrometheusHandle,
}

pub fn install_metrics_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("install prometheus recorder")
}

/// `200 ok` while healthy, `503 degraded` once writes keep failing.
pub fn health_response(health: &PollerHealth) -> (StatusCode, &'static str) {
    if health.degraded {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "ok")
    }
}

pub fn router(health: watch::Receiver<PollerHealth>, metrics: PrometheusHandle) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(render_metrics))
        .with_state(HttpState { health, metrics })
}

pub async fn serve(
    listen: &str,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("parse http listen address {listen}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind http listener on {addr}"))?;
    info!(%addr, "http endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .inspect_err(|err| warn!(error = %err, "http server stopped"))
        .context("http server failed")
}

async fn healthz(State(state): State<HttpState>) -> (StatusCode, &'static str) {
    let health = *state.health.borrow();
    health_response(&health)
}

async fn render_metrics(State(state): State<HttpState>) -> String {
    state.metrics.render()
}
