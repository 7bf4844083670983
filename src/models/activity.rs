//! Entrada del log de actividad
//!
//! Snapshot desnormalizado de un evento. Inmutable una vez creado: se encola
//! en el buffer de entrega y se envía tal cual a `busLogs/{bus}`.

use serde::{Deserialize, Serialize};

use super::location::Coordinates;
use super::passenger::CheckStatus;
use super::vehicle::Vehicle;

/// Origen de la estimación adjunta
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EtaSource {
    Predictor,
    Fallback,
}

/// Rango de confianza de la ETA, en minutos
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EtaRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    pub bus_id: String,
    pub bus_name: String,
    pub driver_name: String,
    pub driver_phone: String,
    pub tag_id: Option<String>,
    pub student_name: Option<String>,
    pub status: Option<CheckStatus>,
    pub timestamp: i64,
    pub location: Option<Coordinates>,
    #[serde(rename = "eta_minutes")]
    pub eta_minutes: Option<i64>,
    #[serde(default)]
    pub eta_range: Option<EtaRange>,
    #[serde(default)]
    pub eta_source: Option<EtaSource>,
    #[serde(default)]
    pub emergency: bool,
}

impl ActivityLogEntry {
    /// Entrada base con los datos desnormalizados del vehículo
    pub fn for_vehicle(
        vehicle: &Vehicle,
        tag_id: Option<String>,
        location: Option<Coordinates>,
        timestamp: i64,
    ) -> Self {
        Self {
            bus_id: vehicle.key.clone(),
            bus_name: vehicle.display_name(),
            driver_name: vehicle.driver_name.clone().unwrap_or_default(),
            driver_phone: vehicle.driver_phone.clone().unwrap_or_default(),
            tag_id,
            student_name: None,
            status: None,
            timestamp,
            location,
            eta_minutes: None,
            eta_range: None,
            eta_source: None,
            emergency: false,
        }
    }
}
