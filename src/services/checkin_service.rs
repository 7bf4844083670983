//! Máquina de estados de check-in
//!
//! Semántica de toggle: un pasajero fuera del bus queda embarcado en el bus
//! que lo escanea; un pasajero embarcado sólo se desembarca escaneando en el
//! mismo bus. Un escaneo en otro bus se rechaza sin modificar nada.

use thiserror::Error;

use crate::models::{CheckStatus, Passenger};
use crate::store::{paths, UpdateSet};

/// Resultado de una transición aceptada
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInTransition {
    pub status: CheckStatus,
    pub vehicle_id: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckInRejection {
    #[error("passenger {passenger_id} is already checked in on another vehicle")]
    ConflictingCheckIn {
        passenger_id: String,
        assigned_vehicle_id: Option<String>,
    },
}

/// Calcular el siguiente estado del pasajero para el bus que escanea
pub fn next(
    passenger: &Passenger,
    scanning_vehicle: &str,
) -> Result<CheckInTransition, CheckInRejection> {
    match passenger.last_status {
        CheckStatus::CheckOut => Ok(CheckInTransition {
            status: CheckStatus::CheckIn,
            vehicle_id: scanning_vehicle.to_string(),
        }),
        CheckStatus::CheckIn if passenger.last_bus_id.as_deref() == Some(scanning_vehicle) => {
            Ok(CheckInTransition {
                status: CheckStatus::CheckOut,
                vehicle_id: scanning_vehicle.to_string(),
            })
        }
        CheckStatus::CheckIn => {
            if passenger.last_bus_id.is_none() {
                log::warn!(
                    "⚠️ Pasajero {} figura con check-in sin bus asignado",
                    passenger.key
                );
            }
            Err(CheckInRejection::ConflictingCheckIn {
                passenger_id: passenger_identifier(passenger),
                assigned_vehicle_id: passenger.last_bus_id.clone(),
            })
        }
    }
}

/// Agregar al update el nuevo estado y la asignación, que se escriben juntos
pub fn stage_transition(passenger: &Passenger, transition: &CheckInTransition, updates: &mut UpdateSet) {
    updates.set_value(
        paths::student_field(&passenger.key, "lastStatus"),
        serde_json::Value::String(transition.status.as_str().to_string()),
    );
    updates.set_value(
        paths::student_field(&passenger.key, "lastBusId"),
        serde_json::Value::String(transition.vehicle_id.clone()),
    );
}

fn passenger_identifier(passenger: &Passenger) -> String {
    if passenger.student_id.is_empty() {
        passenger.key.clone()
    } else {
        passenger.student_id.clone()
    }
}
