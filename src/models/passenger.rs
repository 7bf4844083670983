//! Modelo de Passenger
//!
//! Documento `students/{key}`. Sólo la máquina de estados de check-in
//! modifica `lastStatus`/`lastBusId`.

use serde::{Deserialize, Deserializer, Serialize};

use super::lenient_text;
use super::location::Coordinates;

/// Estado de embarque del pasajero
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CheckStatus {
    #[serde(rename = "check-in")]
    CheckIn,
    #[default]
    #[serde(rename = "check-out")]
    CheckOut,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::CheckIn => "check-in",
            CheckStatus::CheckOut => "check-out",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Passenger {
    #[serde(skip)]
    pub key: String,
    #[serde(default)]
    pub student_id: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub last_status: CheckStatus,
    #[serde(default)]
    pub last_bus_id: Option<String>,
    #[serde(default)]
    pub location: Option<Coordinates>,
    #[serde(default)]
    pub home_location: Option<Coordinates>,
}

impl Passenger {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Destino para la ETA: última posición conocida, o la casa como respaldo
    pub fn destination(&self) -> Option<Coordinates> {
        self.location.or(self.home_location)
    }
}

/// Cualquier valor desconocido o nulo cuenta como `check-out`
fn lenient_status<'de, D>(deserializer: D) -> Result<CheckStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw.as_deref() {
        Some("check-in") => CheckStatus::CheckIn,
        _ => CheckStatus::CheckOut,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_defaults_to_check_out() {
        let passenger: Passenger = serde_json::from_value(json!({ "studentId": "T1" })).unwrap();
        assert_eq!(passenger.last_status, CheckStatus::CheckOut);
        assert_eq!(passenger.last_bus_id, None);
    }

    #[test]
    fn test_unknown_status_is_check_out() {
        let passenger: Passenger =
            serde_json::from_value(json!({ "studentId": "T1", "lastStatus": "boarding" })).unwrap();
        assert_eq!(passenger.last_status, CheckStatus::CheckOut);

        let passenger: Passenger =
            serde_json::from_value(json!({ "studentId": "T1", "lastStatus": null })).unwrap();
        assert_eq!(passenger.last_status, CheckStatus::CheckOut);
    }

    #[test]
    fn test_check_in_status_is_parsed() {
        let passenger: Passenger = serde_json::from_value(json!({
            "studentId": "T1",
            "lastStatus": "check-in",
            "lastBusId": "V1"
        }))
        .unwrap();
        assert_eq!(passenger.last_status, CheckStatus::CheckIn);
        assert_eq!(passenger.last_bus_id.as_deref(), Some("V1"));
    }

    #[test]
    fn test_fields_written_by_other_clients_are_tolerated() {
        let passenger: Passenger = serde_json::from_value(json!({
            "studentId": "T1",
            "name": 42,
            "eta": 12.5,
            "lastStatus": "check-out"
        }))
        .unwrap();
        assert_eq!(passenger.name.as_deref(), Some("42"));
        assert_eq!(passenger.last_status, CheckStatus::CheckOut);
    }

    #[test]
    fn test_destination_falls_back_to_home() {
        let home = Coordinates::new(1.0, 1.0);
        let mut passenger = Passenger {
            home_location: Some(home),
            ..Default::default()
        };
        assert_eq!(passenger.destination(), Some(home));

        let last = Coordinates::new(2.0, 2.0);
        passenger.location = Some(last);
        assert_eq!(passenger.destination(), Some(last));
    }
}
