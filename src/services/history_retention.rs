//! Retención del historial de ubicaciones
//!
//! Una entrada se elimina si es más vieja que la ventana de retención, o si
//! queda fuera de las `history_limit` más recientes. El historial de cada bus
//! nunca supera `history_limit` entradas.
//!
//! La poda corre fuera del camino de la petición: el handler encola el bus y
//! un worker procesa la cola (coalesciendo buses repetidos), más un barrido
//! periódico de todos los buses con historial.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::metrics::Metrics;
use crate::store::{paths, DocumentStore, StoreResult, UpdateSet};

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub history_limit: usize,
    pub window: Duration,
    pub sweep_interval: Duration,
    pub queue_capacity: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            history_limit: 500,
            window: Duration::from_secs(24 * 3600),
            sweep_interval: Duration::from_secs(10 * 60),
            queue_capacity: 256,
        }
    }
}

/// Timestamps a eliminar: fuera de la ventana o fuera de los `limit` más recientes
pub fn plan_prune(timestamps: &[i64], now_ms: i64, window_ms: i64, limit: usize) -> Vec<i64> {
    let mut ordered = timestamps.to_vec();
    ordered.sort_unstable_by(|a, b| b.cmp(a));
    ordered.dedup();

    let cutoff = now_ms - window_ms;
    let mut doomed: Vec<i64> = ordered
        .into_iter()
        .enumerate()
        .filter(|(rank, ts)| *rank >= limit || *ts < cutoff)
        .map(|(_, ts)| ts)
        .collect();
    doomed.sort_unstable();
    doomed
}

pub struct HistoryRetention {
    store: Arc<dyn DocumentStore>,
    config: RetentionConfig,
    metrics: Metrics,
    sender: mpsc::Sender<String>,
    receiver: Mutex<Option<mpsc::Receiver<String>>>,
    pending: Mutex<HashSet<String>>,
}

impl HistoryRetention {
    pub fn new(store: Arc<dyn DocumentStore>, config: RetentionConfig, metrics: Metrics) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            store,
            config,
            metrics,
            sender,
            receiver: Mutex::new(Some(receiver)),
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Encolar la poda de un bus; no bloquea
    pub fn submit(&self, bus_key: &str) {
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if !pending.insert(bus_key.to_string()) {
                return;
            }
        }

        if let Err(e) = self.sender.try_send(bus_key.to_string()) {
            // El barrido periódico cubre lo que no entra en la cola
            log::debug!("Cola de retención llena, {} queda para el barrido: {}", bus_key, e);
            self.clear_pending(bus_key);
        }
    }

    /// Podar el historial de un bus con la hora actual
    pub async fn prune(&self, bus_key: &str) -> StoreResult<usize> {
        self.prune_at(bus_key, chrono::Utc::now().timestamp_millis()).await
    }

    pub async fn prune_at(&self, bus_key: &str, now_ms: i64) -> StoreResult<usize> {
        let history_path = paths::location_history(bus_key);
        let keys = self.store.child_keys(&history_path).await?;

        let mut timestamps = Vec::with_capacity(keys.len());
        for key in &keys {
            match key.parse::<i64>() {
                Ok(ts) => timestamps.push(ts),
                Err(_) => log::warn!("⚠️ Entrada de historial con clave no numérica: {}/{}", history_path, key),
            }
        }

        let doomed = plan_prune(
            &timestamps,
            now_ms,
            self.config.window.as_millis() as i64,
            self.config.history_limit,
        );
        if doomed.is_empty() {
            return Ok(0);
        }

        let mut updates = UpdateSet::new();
        for ts in &doomed {
            updates.remove(paths::history_entry(bus_key, *ts));
        }
        self.store.update(&updates).await?;
        self.metrics.history_entries_pruned_total.inc_by(doomed.len() as u64);

        log::info!("🧹 Historial de {} podado: {} entradas eliminadas", bus_key, doomed.len());
        Ok(doomed.len())
    }

    /// Podar todos los buses con historial
    pub async fn sweep(&self) -> StoreResult<usize> {
        let buses = self.store.child_keys(paths::BUS_LOCATIONS).await?;
        let mut total = 0;
        for bus_key in buses {
            match self.prune(&bus_key).await {
                Ok(removed) => total += removed,
                Err(e) => log::warn!("⚠️ No se pudo podar el historial de {}: {}", bus_key, e),
            }
        }
        Ok(total)
    }

    /// Worker de retención; termina al cancelar el token
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let receiver = self.receiver.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(mut receiver) = receiver else {
            log::warn!("⚠️ Worker de retención ya iniciado");
            return;
        };

        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // El primer tick es inmediato
        sweep.tick().await;

        log::info!(
            "🧹 Worker de retención iniciado (límite {}, ventana {:?})",
            self.config.history_limit,
            self.config.window
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = receiver.recv() => {
                    let Some(bus_key) = received else { break };
                    self.clear_pending(&bus_key);
                    if let Err(e) = self.prune(&bus_key).await {
                        log::warn!("⚠️ No se pudo podar el historial de {}: {}", bus_key, e);
                    }
                }
                _ = sweep.tick() => {
                    match self.sweep().await {
                        Ok(removed) if removed > 0 => log::info!("🧹 Barrido de historial: {} entradas eliminadas", removed),
                        Ok(_) => {}
                        Err(e) => log::warn!("⚠️ Barrido de historial fallido: {}", e),
                    }
                }
            }
        }

        log::info!("🧹 Worker de retención detenido");
    }

    fn clear_pending(&self, bus_key: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(bus_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    const HOUR: i64 = 3_600_000;

    #[test]
    fn test_plan_removes_entries_outside_window() {
        let now = 100 * HOUR;
        let old: Vec<i64> = (0..5).map(|i| i * HOUR).collect();
        let doomed = plan_prune(&old, now, 24 * HOUR, 500);
        assert_eq!(doomed, old);
    }

    #[test]
    fn test_plan_keeps_everything_inside_window_and_limit() {
        let now = 100 * HOUR;
        let recent: Vec<i64> = (0..10).map(|i| now - i * 60_000).collect();
        assert!(plan_prune(&recent, now, 24 * HOUR, 10).is_empty());

        // Con límite 3 se eliminan las 7 más viejas aunque estén en la ventana
        let doomed = plan_prune(&recent, now, 24 * HOUR, 3);
        assert_eq!(doomed.len(), 7);
        assert_eq!(doomed.last(), Some(&(now - 3 * 60_000)));
    }

    #[test]
    fn test_plan_caps_busy_history_inside_window() {
        let now = 100 * HOUR;
        let timestamps: Vec<i64> = (0..600).map(|i| now - i * 1_000).collect();

        let doomed = plan_prune(&timestamps, now, 24 * HOUR, 500);
        assert_eq!(doomed.len(), 100);
        assert_eq!(doomed.first(), Some(&(now - 599 * 1_000)));
        assert_eq!(doomed.last(), Some(&(now - 500 * 1_000)));
    }

    #[test]
    fn test_plan_mixed_history() {
        let now = 100 * HOUR;
        let mut timestamps = vec![now - HOUR, now - 2 * HOUR];
        timestamps.extend([10 * HOUR, 20 * HOUR, 30 * HOUR]);

        let doomed = plan_prune(&timestamps, now, 24 * HOUR, 3);
        assert_eq!(doomed, vec![10 * HOUR, 20 * HOUR, 30 * HOUR]);

        let doomed = plan_prune(&timestamps, now, 24 * HOUR, 1);
        assert_eq!(doomed, vec![10 * HOUR, 20 * HOUR, 30 * HOUR, now - 2 * HOUR]);
    }

    fn store_with_history(timestamps: &[i64]) -> Arc<InMemoryStore> {
        let mut history = serde_json::Map::new();
        for ts in timestamps {
            history.insert(ts.to_string(), json!({ "latitude": 1.0, "longitude": 2.0 }));
        }
        history.insert("garbage".to_string(), json!({}));
        Arc::new(InMemoryStore::with_data(json!({
            "busLocations": { "V1": { "history": history } }
        })))
    }

    fn retention(store: Arc<InMemoryStore>, limit: usize) -> HistoryRetention {
        HistoryRetention::new(
            store,
            RetentionConfig {
                history_limit: limit,
                ..Default::default()
            },
            Metrics::new().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_prune_removes_old_entries_and_ignores_bad_keys() {
        let now = 100 * HOUR;
        let store = store_with_history(&[HOUR, 2 * HOUR, 3 * HOUR, now - HOUR]);
        let retention = retention(store.clone(), 2);

        let removed = retention.prune_at("V1", now).await.unwrap();
        assert_eq!(removed, 3);

        let remaining = store.child_keys("busLocations/V1/history").await.unwrap();
        let expected_recent = (now - HOUR).to_string();
        assert!(remaining.contains(&expected_recent));
        assert!(remaining.contains(&"garbage".to_string()));
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_enforces_limit_inside_window() {
        let now = 100 * HOUR;
        let store = store_with_history(&[now - 3_000, now - 2_000, now - 1_000, now]);
        let retention = retention(store.clone(), 2);

        assert_eq!(retention.prune_at("V1", now).await.unwrap(), 2);

        let remaining = store.child_keys("busLocations/V1/history").await.unwrap();
        assert!(remaining.contains(&now.to_string()));
        assert!(remaining.contains(&(now - 1_000).to_string()));
        assert_eq!(remaining.len(), 3);
    }

    #[tokio::test]
    async fn test_prune_without_history_is_noop() {
        let store = Arc::new(InMemoryStore::new());
        let retention = retention(store.clone(), 2);
        assert_eq!(retention.prune_at("V9", 100 * HOUR).await.unwrap(), 0);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_worker_processes_submitted_buses() {
        let store = store_with_history(&[HOUR, 2 * HOUR, 3 * HOUR]);
        let retention = Arc::new(retention(store.clone(), 1));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(retention.clone().run(cancel.clone()));

        retention.submit("V1");
        retention.submit("V1");

        for _ in 0..50 {
            if store.child_keys("busLocations/V1/history").await.unwrap().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        let remaining = store.child_keys("busLocations/V1/history").await.unwrap();
        assert_eq!(remaining, vec!["garbage".to_string()]);
    }
}
