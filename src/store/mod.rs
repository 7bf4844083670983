//! Store de documentos
//!
//! Contrato del store de flota: búsqueda por campo indexado, update atómico
//! multi-path, set/remove de un path y append con clave generada.
//! Implementaciones: `InMemoryStore` (desarrollo y tests) y `FirebaseStore`
//! (Realtime Database vía REST).

pub mod firebase_store;
pub mod memory_store;
pub mod paths;

pub use firebase_store::FirebaseStore;
pub use memory_store::InMemoryStore;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("malformed document at '{path}': {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Operaciones del store de documentos
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Hijos de `collection` cuyo `field` es igual a `value`, ordenados por clave
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<(String, Value)>>;

    async fn get(&self, path: &str) -> StoreResult<Option<Value>>;

    /// Claves de primer nivel bajo `path` (sin leer los valores)
    async fn child_keys(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Aplica todos los paths o ninguno; `null` elimina
    async fn update(&self, updates: &UpdateSet) -> StoreResult<()>;

    async fn set(&self, path: &str, value: Value) -> StoreResult<()>;

    async fn remove(&self, path: &str) -> StoreResult<()>;

    /// Agrega `value` bajo `path` con una clave generada, ordenada por inserción
    async fn push(&self, path: &str, value: Value) -> StoreResult<String>;

    fn backend_name(&self) -> &'static str {
        "unknown"
    }
}

/// Conjunto de escrituras multi-path aplicado en una sola llamada
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSet {
    entries: BTreeMap<String, Value>,
}

impl UpdateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, path: impl Into<String>, value: Value) {
        self.entries.insert(path.into(), value);
    }

    pub fn set<T: Serialize>(&mut self, path: impl Into<String>, value: &T) -> StoreResult<()> {
        let path = path.into();
        let value = serde_json::to_value(value).map_err(|source| StoreError::Malformed {
            path: path.clone(),
            source,
        })?;
        self.entries.insert(path, value);
        Ok(())
    }

    pub fn remove(&mut self, path: impl Into<String>) {
        self.entries.insert(path.into(), Value::Null);
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Verifica que todos los paths sean válidos y que ninguno contenga a otro
    pub fn validate(&self) -> StoreResult<()> {
        let normalized = self
            .entries
            .keys()
            .map(|path| match paths::segments(path)? {
                segments if segments.is_empty() => Err(StoreError::InvalidPath(path.clone())),
                segments => Ok(segments.join("/")),
            })
            .collect::<StoreResult<std::collections::BTreeSet<String>>>()?;

        for path in &normalized {
            let mut ancestor = String::new();
            let segments: Vec<&str> = path.split('/').collect();
            for segment in &segments[..segments.len().saturating_sub(1)] {
                if !ancestor.is_empty() {
                    ancestor.push('/');
                }
                ancestor.push_str(segment);
                if normalized.contains(&ancestor) {
                    return Err(StoreError::InvalidPath(format!(
                        "{} overlaps {} in the same update",
                        path, ancestor
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_set_rejects_overlapping_paths() {
        let mut updates = UpdateSet::new();
        updates.set_value("buses/V1", json!({}));
        updates.set_value("buses/V1-x", json!({}));
        updates.set_value("buses/V1/latitude", json!(1.0));
        assert!(matches!(updates.validate(), Err(StoreError::InvalidPath(_))));
    }

    #[test]
    fn test_update_set_accepts_siblings_with_common_prefix() {
        let mut updates = UpdateSet::new();
        updates.set_value("buses/V1/latitude", json!(1.0));
        updates.set_value("buses/V10/latitude", json!(2.0));
        updates.remove("busLocations/V1/history/1");
        assert!(updates.validate().is_ok());
        assert_eq!(updates.len(), 3);
        assert_eq!(updates.get("busLocations/V1/history/1"), Some(&Value::Null));
    }

    #[test]
    fn test_update_set_rejects_invalid_segments() {
        let mut updates = UpdateSet::new();
        updates.set_value("buses/V.1", json!(1));
        assert!(updates.validate().is_err());
    }
}
