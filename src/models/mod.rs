//! Modelos del sistema
//!
//! Este módulo contiene los modelos de datos que mapean los documentos
//! del store de flota (buses, students, drivers, busLocations, Emergency).

pub mod activity;
pub mod driver;
pub mod emergency;
pub mod location;
pub mod passenger;
pub mod vehicle;

pub use activity::{ActivityLogEntry, EtaRange, EtaSource};
pub use driver::Driver;
pub use emergency::EmergencyAlert;
pub use location::{Coordinates, FixTelemetry, PositionFix};
pub use passenger::{CheckStatus, Passenger};
pub use vehicle::Vehicle;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Texto opcional tolerante: acepta números y booleanos guardados por
/// clientes viejos (p.ej. teléfonos numéricos) y los pasa a `String`
pub(crate) fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        _ => None,
    })
}
