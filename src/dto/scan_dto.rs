use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{CheckStatus, Coordinates, FixTelemetry};
use crate::utils::errors::{validation_error, AppResult};

// Request de un lector RFID/GPS (POST /rfid-scan)
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    #[serde(default, alias = "readerCredential")]
    #[validate(length(max = 128))]
    pub reader_username: Option<String>,

    #[serde(default, alias = "tagCredential")]
    #[validate(length(max = 128))]
    pub tag_id: Option<String>,

    // Forma anidada: { "location": { "lat": .., "lng": .. } }
    #[serde(default)]
    pub location: Option<Coordinates>,

    // Forma plana heredada de los lectores viejos
    #[serde(default, rename = "Latitude", alias = "latitude")]
    pub latitude: Option<f64>,
    #[serde(default, rename = "Longitude", alias = "longitude")]
    pub longitude: Option<f64>,

    /// Velocidad en km/h
    #[serde(default)]
    #[validate(range(min = 0.0, max = 400.0))]
    pub speed: Option<f64>,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 360.0))]
    pub heading: Option<f64>,

    #[serde(default)]
    pub altitude: Option<f64>,

    #[serde(default)]
    pub satellites: Option<u32>,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub accuracy: Option<f64>,

    #[serde(default)]
    pub fix_quality: Option<u8>,

    #[serde(default)]
    pub emergency: Option<bool>,
}

impl ScanRequest {
    pub fn reader_username(&self) -> Option<&str> {
        non_blank(self.reader_username.as_deref())
    }

    pub fn tag_id(&self) -> Option<&str> {
        non_blank(self.tag_id.as_deref())
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency == Some(true)
    }

    /// Coordenada del evento, reconciliando la forma anidada y la plana
    pub fn coordinates(&self) -> AppResult<Option<Coordinates>> {
        let flat = match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            (None, None) => None,
            _ => {
                return Err(validation_error(
                    "location",
                    "latitude and longitude must be sent together",
                ))
            }
        };

        let chosen = match (self.location, flat) {
            (Some(nested), Some(flat)) => {
                if nested != flat {
                    log::warn!(
                        "⚠️ Coordenadas anidadas ({}, {}) y planas ({}, {}) no coinciden, se usan las anidadas",
                        nested.lat,
                        nested.lng,
                        flat.lat,
                        flat.lng
                    );
                }
                Some(nested)
            }
            (nested, flat) => nested.or(flat),
        };

        match chosen {
            Some(coordinates) if !coordinates.is_valid() => Err(validation_error(
                "location",
                "latitude must be within [-90, 90] and longitude within [-180, 180]",
            )),
            other => Ok(other),
        }
    }

    pub fn telemetry(&self) -> FixTelemetry {
        FixTelemetry {
            speed_kmh: self.speed,
            heading: self.heading,
            altitude: self.altitude,
            satellites: self.satellites,
            accuracy: self.accuracy,
            fix_quality: self.fix_quality,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// Response 200 de un escaneo procesado
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub message: String,
    pub request_id: String,
    pub vehicle_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CheckStatus>,
    pub location_updated: bool,
    pub eta_pending: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: serde_json::Value) -> ScanRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_aliases_are_accepted() {
        let request = parse(json!({
            "readerCredential": " R1 ",
            "tagCredential": "T1",
            "Latitude": 30.0,
            "Longitude": 31.0
        }));
        assert_eq!(request.reader_username(), Some("R1"));
        assert_eq!(request.tag_id(), Some("T1"));
        assert_eq!(request.coordinates().unwrap(), Some(Coordinates::new(30.0, 31.0)));

        let lowercase = parse(json!({ "readerUsername": "R1", "latitude": 1.0, "longitude": 2.0 }));
        assert_eq!(lowercase.coordinates().unwrap(), Some(Coordinates::new(1.0, 2.0)));
    }

    #[test]
    fn test_nested_location_wins() {
        let request = parse(json!({
            "readerUsername": "R1",
            "location": { "lat": 10.0, "lng": 20.0 },
            "Latitude": 30.0,
            "Longitude": 31.0
        }));
        assert_eq!(request.coordinates().unwrap(), Some(Coordinates::new(10.0, 20.0)));
    }

    #[test]
    fn test_single_axis_and_out_of_range_are_rejected() {
        let single = parse(json!({ "readerUsername": "R1", "Latitude": 30.0 }));
        assert!(single.coordinates().is_err());

        let out_of_range = parse(json!({ "readerUsername": "R1", "location": { "lat": 95.0, "lng": 0.0 } }));
        assert!(out_of_range.coordinates().is_err());
    }

    #[test]
    fn test_blank_and_null_fields() {
        let request = parse(json!({
            "readerUsername": "   ",
            "tagId": null,
            "speed": null,
            "emergency": false
        }));
        assert!(request.reader_username().is_none());
        assert!(request.tag_id().is_none());
        assert!(!request.is_emergency());
        assert!(request.telemetry().speed_kmh.is_none());
        assert_eq!(request.coordinates().unwrap(), None);
    }

    #[test]
    fn test_negative_speed_fails_validation() {
        let request = parse(json!({ "readerUsername": "R1", "speed": -3.0 }));
        assert!(request.validate().is_err());
    }
}
