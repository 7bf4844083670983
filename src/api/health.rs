use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};

use crate::state::AppState;
use crate::utils::errors::internal_error;

pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
}

/// Estado del servicio y profundidad del buffer de actividad
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "store": state.store.backend_name(),
        "pendingEntries": state.buffer.pending_count().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Métricas en formato Prometheus
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok((content_type, body)) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => internal_error(&format!("metrics encoding failed: {}", e)).into_response(),
    }
}
