use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::post,
    Router,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::dto::scan_dto::{ScanRequest, ScanResponse};
use crate::state::AppState;
use crate::utils::errors::{AppError, AppResult};

pub fn create_scan_router() -> Router<AppState> {
    Router::new().route("/rfid-scan", post(rfid_scan))
}

/// Endpoint de ingesta de los lectores RFID/GPS
pub async fn rfid_scan(
    State(state): State<AppState>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> AppResult<Json<ScanResponse>> {
    let Json(request) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let request_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!(
        "rfid_scan",
        request_id = %request_id,
        reader = request.reader_username().unwrap_or("-"),
    );

    let outcome = state.scans.handle(request).instrument(span).await?;

    tracing::info!(
        request_id = %request_id,
        vehicle = %outcome.vehicle_id,
        location_updated = outcome.location_updated,
        "✅ Escaneo procesado"
    );

    Ok(Json(ScanResponse {
        message: "Update processed successfully".to_string(),
        request_id,
        vehicle_id: outcome.vehicle_id,
        status: outcome.status,
        location_updated: outcome.location_updated,
        eta_pending: outcome.eta_pending,
    }))
}
