//! Paths del store de flota

use super::{StoreError, StoreResult};

pub const BUSES: &str = "buses";
pub const STUDENTS: &str = "students";
pub const DRIVERS: &str = "drivers";
pub const BUS_LOCATIONS: &str = "busLocations";
pub const EMERGENCY: &str = "Emergency";
pub const BUS_LOGS: &str = "busLogs";

/// Campos indexados para la resolución de credenciales
pub const READER_FIELD: &str = "rfidReaderUsername";
pub const STUDENT_TAG_FIELD: &str = "studentId";
pub const DRIVER_TAG_FIELD: &str = "driverId";

pub fn bus_field(bus_key: &str, field: &str) -> String {
    format!("{}/{}/{}", BUSES, bus_key, field)
}

pub fn student_field(student_key: &str, field: &str) -> String {
    format!("{}/{}/{}", STUDENTS, student_key, field)
}

pub fn driver_field(driver_key: &str, field: &str) -> String {
    format!("{}/{}/{}", DRIVERS, driver_key, field)
}

pub fn current_location(bus_key: &str) -> String {
    format!("{}/{}/current", BUS_LOCATIONS, bus_key)
}

pub fn location_history(bus_key: &str) -> String {
    format!("{}/{}/history", BUS_LOCATIONS, bus_key)
}

pub fn history_entry(bus_key: &str, timestamp: i64) -> String {
    format!("{}/{}", location_history(bus_key), timestamp)
}

pub fn emergency(reader_username: &str) -> String {
    format!("{}/{}", EMERGENCY, reader_username)
}

pub fn bus_logs(bus_key: &str) -> String {
    format!("{}/{}", BUS_LOGS, bus_key)
}

/// Divide un path en segmentos, rechazando los caracteres prohibidos en claves
pub fn segments(path: &str) -> StoreResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let forbidden = ['.', '#', '$', '[', ']'];
    if segments.iter().any(|s| s.contains(&forbidden[..])) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}
