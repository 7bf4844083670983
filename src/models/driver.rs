//! Modelo de Driver - documento `drivers/{key}`

use serde::{Deserialize, Serialize};

use super::lenient_text;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    #[serde(skip)]
    pub key: String,
    #[serde(default)]
    pub driver_id: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub phone: Option<String>,
    #[serde(default)]
    pub current_bus_reader_username: Option<String>,
}

impl Driver {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_phone_is_decoded() {
        let driver: Driver =
            serde_json::from_value(json!({ "driverId": "TD1", "phone": 5550202 })).unwrap();
        assert_eq!(driver.phone.as_deref(), Some("5550202"));
        assert_eq!(driver.name, None);
    }
}
