//! Store en memoria
//!
//! Árbol JSON con la misma semántica que la Realtime Database: escribir
//! `null` elimina el nodo y los padres que quedan vacíos. Se usa en
//! desarrollo (sin `STORE_URL`) y en los tests, donde además permite simular
//! caídas del store.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{paths, DocumentStore, StoreError, StoreResult, UpdateSet};

pub struct InMemoryStore {
    root: RwLock<Value>,
    push_seq: AtomicU64,
    offline: AtomicBool,
    failing_pushes: AtomicUsize,
    writes: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_data(Value::Object(Map::new()))
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crear un store con datos iniciales (seed de desarrollo o fixtures)
    pub fn with_data(data: Value) -> Self {
        Self {
            root: RwLock::new(data),
            push_seq: AtomicU64::new(chrono::Utc::now().timestamp_millis().max(0) as u64 * 1000),
            offline: AtomicBool::new(false),
            failing_pushes: AtomicUsize::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Simular que el store no responde
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Hacer fallar los próximos `count` push
    pub fn fail_next_pushes(&self, count: usize) {
        self.failing_pushes.store(count, Ordering::SeqCst);
    }

    /// Número de escrituras aplicadas (update, set, remove, push)
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copia completa del árbol
    pub async fn snapshot(&self) -> Value {
        self.root.read().await.clone()
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<(String, Value)>> {
        self.ensure_online()?;
        let segments = paths::segments(collection)?;
        let root = self.root.read().await;

        let matches = match read_at(&root, &segments) {
            Some(Value::Object(children)) => children
                .iter()
                .filter(|(_, child)| child.get(field).and_then(Value::as_str) == Some(value))
                .map(|(key, child)| (key.clone(), child.clone()))
                .collect(),
            _ => Vec::new(),
        };
        Ok(matches)
    }

    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        self.ensure_online()?;
        let segments = paths::segments(path)?;
        let root = self.root.read().await;
        Ok(read_at(&root, &segments).cloned())
    }

    async fn child_keys(&self, path: &str) -> StoreResult<Vec<String>> {
        self.ensure_online()?;
        let segments = paths::segments(path)?;
        let root = self.root.read().await;
        Ok(match read_at(&root, &segments) {
            Some(Value::Object(children)) => children.keys().cloned().collect(),
            _ => Vec::new(),
        })
    }

    async fn update(&self, updates: &UpdateSet) -> StoreResult<()> {
        self.ensure_online()?;
        if updates.is_empty() {
            return Ok(());
        }
        updates.validate()?;

        // Validado antes de tocar el árbol: todo o nada
        let mut root = self.root.write().await;
        for (path, value) in updates.iter() {
            let segments = paths::segments(path)?;
            write_at(&mut root, &segments, value.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        self.ensure_online()?;
        let segments = paths::segments(path)?;
        if segments.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let mut root = self.root.write().await;
        write_at(&mut root, &segments, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        self.set(path, Value::Null).await
    }

    async fn push(&self, path: &str, value: Value) -> StoreResult<String> {
        self.ensure_online()?;
        let failing = self
            .failing_pushes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError::Unavailable("simulated push failure".to_string()));
        }

        let mut segments = paths::segments(path)?;
        let key = format!("{:020}", self.push_seq.fetch_add(1, Ordering::SeqCst));
        segments.push(&key);

        let mut root = self.root.write().await;
        write_at(&mut root, &segments, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(key)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

fn read_at<'a>(node: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(node, |current, segment| current.get(*segment))
        .filter(|value| !value.is_null())
}

fn write_at(node: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }

    if let Value::Object(children) = node {
        let child = children.entry(head.to_string()).or_insert(Value::Null);
        write_at(child, rest, value);
        if is_empty_node(child) {
            children.remove(*head);
        }
    }
}

fn is_empty_node(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(children) => children.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fleet() -> InMemoryStore {
        InMemoryStore::with_data(json!({
            "buses": {
                "V2": { "rfidReaderUsername": "R2" },
                "V1": { "rfidReaderUsername": "R1", "plateNumber": "ABC" },
                "V3": { "rfidReaderUsername": "R1" }
            }
        }))
    }

    #[tokio::test]
    async fn test_find_by_field_sorted_by_key() {
        let store = fleet();
        let found = store.find_by_field("buses", "rfidReaderUsername", "R1").await.unwrap();
        let keys: Vec<_> = found.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["V1", "V3"]);
        assert_eq!(found[0].1["plateNumber"], "ABC");

        let none = store.find_by_field("buses", "rfidReaderUsername", "R9").await.unwrap();
        assert!(none.is_empty());
        let missing = store.find_by_field("students", "studentId", "T1").await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_update_writes_all_paths() {
        let store = fleet();
        let mut updates = UpdateSet::new();
        updates.set_value("buses/V1/latitude", json!(1.5));
        updates.set_value("busLocations/V1/current", json!({ "latitude": 1.5 }));
        store.update(&updates).await.unwrap();

        assert_eq!(store.get("buses/V1/latitude").await.unwrap(), Some(json!(1.5)));
        assert_eq!(
            store.get("busLocations/V1/current/latitude").await.unwrap(),
            Some(json!(1.5))
        );
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_update_applies_nothing() {
        let store = fleet();
        let mut updates = UpdateSet::new();
        updates.set_value("buses/V1/latitude", json!(1.5));
        updates.set_value("buses/V$/latitude", json!(2.0));
        assert!(store.update(&updates).await.is_err());
        assert_eq!(store.get("buses/V1/latitude").await.unwrap(), None);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_null_removes_and_prunes_empty_parents() {
        let store = InMemoryStore::new();
        store.set("busLocations/V1/history/1", json!({ "latitude": 1 })).await.unwrap();
        store.remove("busLocations/V1/history/1").await.unwrap();
        assert_eq!(store.get("busLocations/V1").await.unwrap(), None);
        assert_eq!(store.snapshot().await, json!({}));
    }

    #[tokio::test]
    async fn test_push_keys_preserve_insertion_order() {
        let store = InMemoryStore::new();
        let mut keys = Vec::new();
        for i in 0..20 {
            keys.push(store.push("busLogs/V1", json!({ "n": i })).await.unwrap());
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(store.child_keys("busLogs/V1").await.unwrap(), sorted);
    }

    #[tokio::test]
    async fn test_offline_and_failing_pushes() {
        let store = InMemoryStore::new();
        store.fail_next_pushes(1);
        assert!(store.push("busLogs/V1", json!(1)).await.is_err());
        assert!(store.push("busLogs/V1", json!(2)).await.is_ok());

        store.set_offline(true);
        assert!(matches!(
            store.get("busLogs").await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_offline(false);
        assert_eq!(store.child_keys("busLogs/V1").await.unwrap().len(), 1);
    }
}
