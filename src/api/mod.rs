//! API endpoints
//!
//! Este módulo contiene los endpoints de la API.

pub mod health;
pub mod scan;

use axum::Router;
use crate::state::AppState;

/// Crear el router principal de la API
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .merge(scan::create_scan_router())
        .merge(health::create_health_router())
}
