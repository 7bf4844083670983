//! Alerta de emergencia activa por lector (`Emergency/{reader}`)

use serde::{Deserialize, Serialize};

use super::location::Coordinates;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAlert {
    pub reader_username: String,
    pub location: Option<Coordinates>,
    pub emergency: bool,
    pub timestamp: i64,
}
