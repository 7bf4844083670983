//! Sistema de manejo de errores
//!
//! Este módulo define los errores que llegan al endpoint de ingesta
//! y su conversión a respuestas HTTP apropiadas.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::checkin_service::CheckInRejection;
use crate::store::StoreError;

/// Errores principales de la aplicación
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Missing reader credential")]
    MissingReaderCredential,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Passenger {passenger_id} is already checked in on another vehicle")]
    CheckInConflict {
        passenger_id: String,
        last_bus_id: Option<String>,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<CheckInRejection> for AppError {
    fn from(rejection: CheckInRejection) -> Self {
        match rejection {
            CheckInRejection::ConflictingCheckIn {
                passenger_id,
                assigned_vehicle_id,
            } => AppError::CheckInConflict {
                passenger_id,
                last_bus_id: assigned_vehicle_id,
            },
        }
    }
}

impl AppError {
    /// Código estable que acompaña a cada respuesta de error
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => "VALIDATION_ERROR",
            AppError::MissingReaderCredential => "MISSING_READER_CREDENTIAL",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::CheckInConflict { .. } => "CHECKIN_CONFLICT",
            AppError::Store(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::BadRequest(_)
            | AppError::MissingReaderCredential
            | AppError::CheckInConflict { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Respuesta de error para la API
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let error_response = match self {
            AppError::Validation(e) => {
                log::warn!("⚠️ Validation error: {}", e);
                ErrorResponse {
                    error: "Validation Error".to_string(),
                    message: "The provided data is invalid".to_string(),
                    code,
                    details: Some(json!(e)),
                }
            }

            AppError::MissingReaderCredential => {
                log::warn!("⚠️ Scan rejected: missing reader credential");
                ErrorResponse {
                    error: "Missing readerUsername".to_string(),
                    message: "A reader credential is required".to_string(),
                    code,
                    details: None,
                }
            }

            AppError::BadRequest(msg) => {
                log::warn!("⚠️ Bad request: {}", msg);
                ErrorResponse {
                    error: "Bad Request".to_string(),
                    message: msg,
                    code,
                    details: None,
                }
            }

            AppError::NotFound(msg) => {
                log::warn!("⚠️ Resource not found: {}", msg);
                ErrorResponse {
                    error: "Not Found".to_string(),
                    message: msg,
                    code,
                    details: None,
                }
            }

            AppError::CheckInConflict {
                passenger_id,
                last_bus_id,
            } => {
                let vehicle = last_bus_id.as_deref().unwrap_or("unknown");
                log::warn!(
                    "⚠️ Check-in rejected: passenger {} is checked in on {}",
                    passenger_id,
                    vehicle
                );
                ErrorResponse {
                    error: "Student is already checked in on another bus".to_string(),
                    message: format!("Passenger is checked in on vehicle {}", vehicle),
                    code,
                    details: Some(json!({
                        "passengerId": passenger_id,
                        "lastBusId": last_bus_id,
                    })),
                }
            }

            // Los detalles internos sólo van a los logs
            AppError::Store(e) => {
                log::error!("❌ Store error while processing request: {}", e);
                internal_response(code)
            }

            AppError::Internal(msg) => {
                log::error!("❌ Internal error: {}", msg);
                internal_response(code)
            }
        };

        (status, Json(error_response)).into_response()
    }
}

fn internal_response(code: &'static str) -> ErrorResponse {
    ErrorResponse {
        error: "Internal server error".to_string(),
        message: "An unexpected error occurred".to_string(),
        code,
        details: None,
    }
}

/// Resultado tipado para operaciones que pueden fallar
pub type AppResult<T> = Result<T, AppError>;

/// Función helper para crear errores de validación
pub fn validation_error(field: &'static str, message: &'static str) -> AppError {
    use validator::ValidationError;

    let mut error = ValidationError::new("custom");
    error.add_param("field".into(), &field);
    error.add_param("message".into(), &message);

    let mut errors = validator::ValidationErrors::new();
    errors.add(field, error);

    AppError::Validation(errors)
}

/// Función helper para crear errores internos
pub fn internal_error(message: &str) -> AppError {
    AppError::Internal(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_conflict_maps_to_bad_request_with_details() {
        let response = AppError::CheckInConflict {
            passenger_id: "T1".to_string(),
            last_bus_id: Some("V1".to_string()),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "CHECKIN_CONFLICT");
        assert_eq!(body["details"]["lastBusId"], "V1");
        assert_eq!(body["details"]["passengerId"], "T1");
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response = internal_error("snapshot path is not writable").into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert!(body.get("details").is_none());
        assert!(!body.to_string().contains("snapshot"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::MissingReaderCredential.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("Bus not found".to_string()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            validation_error("location", "out of range").status(),
            StatusCode::BAD_REQUEST
        );
    }
}
