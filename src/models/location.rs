//! Modelos de posición
//!
//! Coordenadas y fixes GPS tal como se guardan en `busLocations/{bus}`.

use serde::{Deserialize, Serialize};

/// Par latitud/longitud en grados decimales
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Telemetría opcional que acompaña a una coordenada en el evento entrante
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixTelemetry {
    pub speed_kmh: Option<f64>,
    pub heading: Option<f64>,
    pub altitude: Option<f64>,
    pub satellites: Option<u32>,
    pub accuracy: Option<f64>,
    pub fix_quality: Option<u8>,
}

/// Fix GPS persistido (`current` e `history`)
///
/// Los campos ausentes se serializan como `null` para distinguir
/// "sin dato" de "cero".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    /// Velocidad en m/s
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub timestamp: i64,
    pub satellites: Option<u32>,
    pub accuracy: Option<f64>,
    pub fix_quality: Option<u8>,
}

impl PositionFix {
    pub fn from_reading(coordinates: Coordinates, telemetry: &FixTelemetry, timestamp: i64) -> Self {
        Self {
            latitude: coordinates.lat,
            longitude: coordinates.lng,
            altitude: telemetry.altitude,
            speed: telemetry.speed_kmh.map(kmh_to_ms),
            heading: telemetry.heading,
            timestamp,
            satellites: telemetry.satellites,
            accuracy: telemetry.accuracy,
            fix_quality: telemetry.fix_quality,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

pub fn kmh_to_ms(speed_kmh: f64) -> f64 {
    speed_kmh / 3.6
}
