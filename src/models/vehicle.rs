//! Modelo de Vehicle
//!
//! Documento `buses/{key}` del registro de flota. La clave del documento no
//! forma parte del cuerpo y se asigna al resolverlo.

use serde::{Deserialize, Serialize};

use super::lenient_text;
use super::location::Coordinates;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    #[serde(skip)]
    pub key: String,
    #[serde(default)]
    pub rfid_reader_username: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub plate_number: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub driver_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub driver_phone: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Vehicle {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn position(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            _ => None,
        }
    }

    /// Nombre para mostrar en los logs de actividad
    pub fn display_name(&self) -> String {
        self.plate_number.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_phone_and_plate_are_decoded() {
        let vehicle: Vehicle = serde_json::from_value(json!({
            "rfidReaderUsername": "R1",
            "plateNumber": 1234,
            "driverPhone": 201000000001u64,
            "driverName": null
        }))
        .unwrap();
        assert_eq!(vehicle.display_name(), "1234");
        assert_eq!(vehicle.driver_phone.as_deref(), Some("201000000001"));
        assert_eq!(vehicle.driver_name, None);
    }
}
