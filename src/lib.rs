//! Servicio de ingesta de telemetría RFID/GPS de la flota
//!
//! Recibe los eventos de los lectores montados en los buses, los reconcilia
//! contra el registro de flota (buses, pasajeros, conductores) y entrega el
//! log de actividad al store tolerando caídas.

pub mod api;
pub mod config;
pub mod dto;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;

use axum::Router;
use tower_http::trace::TraceLayer;

use middleware::cors::cors_for;
use state::AppState;

/// Router completo de la aplicación con sus capas
pub fn build_router(state: AppState) -> Router {
    let cors = cors_for(state.config.is_development(), &state.config.cors_origins);

    Router::new()
        .merge(api::create_api_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
