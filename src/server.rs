use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::metrics::GaugeListener;

#[derive(Clone)]
pub struct AppState {
    gauges: Arc<GaugeListener>,
}

/// Routes: `GET /metrics` (text exposition) and `GET /api/status` (JSON).
pub fn router(gauges: Arc<GaugeListener>) -> Router {
    let state = AppState { gauges };

    let api = Router::new()
        .route("/status", get(get_status))
        .with_state(state.clone());

    Router::new()
        .route("/metrics", get(get_metrics))
        .with_state(state)
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, gauges: Arc<GaugeListener>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind metrics endpoint on {bind}"))?;
    info!(%bind, "serving metrics");
    axum::serve(listener, router(gauges)).await?;
    Ok(())
}

async fn get_metrics(State(app): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        app.gauges.render(),
    )
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(app.gauges.status()))
}
