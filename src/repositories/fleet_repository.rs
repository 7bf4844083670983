use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::models::{Driver, Passenger, Vehicle};
use crate::store::{paths, DocumentStore, StoreError};
use crate::utils::errors::AppResult;

/// Dueño de una credencial de tag
#[derive(Debug, Clone, PartialEq)]
pub enum TagOwner {
    Passenger(Passenger),
    Driver(Driver),
}

/// Resolución de credenciales contra el registro de flota (sólo lectura)
#[derive(Clone)]
pub struct FleetRepository {
    store: Arc<dyn DocumentStore>,
}

impl FleetRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn resolve_vehicle(&self, reader_username: &str) -> AppResult<Option<Vehicle>> {
        let matches = self
            .store
            .find_by_field(paths::BUSES, paths::READER_FIELD, reader_username)
            .await?;

        Ok(pick_one::<Vehicle>(paths::BUSES, reader_username, matches)?
            .map(|(key, vehicle)| vehicle.with_key(key)))
    }

    /// Buscar el tag como pasajero y como conductor en paralelo
    pub async fn resolve_tag(&self, tag_id: &str) -> AppResult<Option<TagOwner>> {
        let (passenger, driver) =
            futures::try_join!(self.find_passenger(tag_id), self.find_driver(tag_id))?;

        Ok(match (passenger, driver) {
            (Some(passenger), Some(driver)) => {
                log::warn!(
                    "⚠️ Colisión de credencial: tag {} es pasajero {} y conductor {}, se usa el pasajero",
                    tag_id,
                    passenger.key,
                    driver.key
                );
                Some(TagOwner::Passenger(passenger))
            }
            (Some(passenger), None) => Some(TagOwner::Passenger(passenger)),
            (None, Some(driver)) => Some(TagOwner::Driver(driver)),
            (None, None) => None,
        })
    }

    pub async fn find_passenger(&self, tag_id: &str) -> AppResult<Option<Passenger>> {
        let matches = self
            .store
            .find_by_field(paths::STUDENTS, paths::STUDENT_TAG_FIELD, tag_id)
            .await?;

        Ok(pick_one::<Passenger>(paths::STUDENTS, tag_id, matches)?
            .map(|(key, passenger)| passenger.with_key(key)))
    }

    pub async fn find_driver(&self, tag_id: &str) -> AppResult<Option<Driver>> {
        let matches = self
            .store
            .find_by_field(paths::DRIVERS, paths::DRIVER_TAG_FIELD, tag_id)
            .await?;

        Ok(pick_one::<Driver>(paths::DRIVERS, tag_id, matches)?
            .map(|(key, driver)| driver.with_key(key)))
    }
}

/// Elegir la coincidencia con la clave lexicográficamente menor
fn pick_one<T: DeserializeOwned>(
    collection: &str,
    credential: &str,
    matches: Vec<(String, Value)>,
) -> Result<Option<(String, T)>, StoreError> {
    if matches.len() > 1 {
        let keys: Vec<&str> = matches.iter().map(|(key, _)| key.as_str()).collect();
        log::warn!(
            "⚠️ Credencial duplicada en {}: '{}' aparece en {:?}",
            collection,
            credential,
            keys
        );
    }

    let Some((key, document)) = matches.into_iter().min_by(|a, b| a.0.cmp(&b.0)) else {
        return Ok(None);
    };

    let parsed = serde_json::from_value(document).map_err(|source| StoreError::Malformed {
        path: format!("{}/{}", collection, key),
        source,
    })?;
    Ok(Some((key, parsed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckStatus;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn repository() -> FleetRepository {
        FleetRepository::new(Arc::new(InMemoryStore::with_data(json!({
            "buses": {
                "V2": { "rfidReaderUsername": "R1", "plateNumber": "BBB" },
                "V1": { "rfidReaderUsername": "R1", "plateNumber": "AAA" },
                "V3": { "rfidReaderUsername": "R3" }
            },
            "students": {
                "S1": { "studentId": "T1", "name": "Ana", "lastStatus": "check-in", "lastBusId": "V1" },
                "S2": { "studentId": "SHARED", "name": "Beto" }
            },
            "drivers": {
                "D1": { "driverId": "TD1", "name": "Mona", "phone": "555" },
                "D2": { "driverId": "SHARED", "name": "Otro" }
            }
        }))))
    }

    #[tokio::test]
    async fn test_resolve_vehicle_picks_smallest_key_on_collision() {
        let vehicle = repository().resolve_vehicle("R1").await.unwrap().unwrap();
        assert_eq!(vehicle.key, "V1");
        assert_eq!(vehicle.plate_number.as_deref(), Some("AAA"));
    }

    #[tokio::test]
    async fn test_unknown_credentials_resolve_to_none() {
        let repository = repository();
        assert!(repository.resolve_vehicle("R9").await.unwrap().is_none());
        assert!(repository.resolve_tag("T9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_tag_passenger_and_driver() {
        let repository = repository();

        match repository.resolve_tag("T1").await.unwrap() {
            Some(TagOwner::Passenger(passenger)) => {
                assert_eq!(passenger.key, "S1");
                assert_eq!(passenger.last_status, CheckStatus::CheckIn);
                assert_eq!(passenger.last_bus_id.as_deref(), Some("V1"));
            }
            other => panic!("expected passenger, got {:?}", other),
        }

        match repository.resolve_tag("TD1").await.unwrap() {
            Some(TagOwner::Driver(driver)) => assert_eq!(driver.key, "D1"),
            other => panic!("expected driver, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_passenger_with_fractional_eta_resolves() {
        let repository = FleetRepository::new(Arc::new(InMemoryStore::with_data(json!({
            "students": { "S1": { "studentId": "T1", "eta": 12.5, "lastStatus": "check-out" } },
            "drivers": { "D1": { "driverId": "TD1", "phone": 5550202 } }
        }))));

        match repository.resolve_tag("T1").await.unwrap() {
            Some(TagOwner::Passenger(passenger)) => assert_eq!(passenger.key, "S1"),
            other => panic!("expected passenger, got {:?}", other),
        }
        match repository.resolve_tag("TD1").await.unwrap() {
            Some(TagOwner::Driver(driver)) => assert_eq!(driver.phone.as_deref(), Some("5550202")),
            other => panic!("expected driver, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_passenger_wins_over_driver() {
        let owner = repository().resolve_tag("SHARED").await.unwrap();
        assert!(matches!(owner, Some(TagOwner::Passenger(p)) if p.key == "S2"));
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error() {
        let store = Arc::new(InMemoryStore::new());
        store.set_offline(true);
        let repository = FleetRepository::new(store);
        assert!(repository.resolve_vehicle("R1").await.is_err());
    }
}
