//! Buffer de entrega del log de actividad
//!
//! Cola FIFO en memoria por bus con entrega al store en segundo plano:
//! - cada entrada nueva se persiste en un snapshot local antes de confirmar
//! - el loop de flush entrega por bus en orden, una a la vez; si una entrega
//!   falla la entrada queda al frente y ese bus espera al próximo ciclo
//! - después de cada ciclo se reescribe el snapshot con lo que quedó
//! - al arrancar se carga el snapshot antes de iniciar el loop

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::metrics::Metrics;
use crate::models::ActivityLogEntry;
use crate::store::{paths, DocumentStore, StoreError};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub snapshot_path: PathBuf,
    pub flush_interval: Duration,
    pub delivery_timeout: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/pending_logs.json"),
            flush_interval: Duration::from_millis(1500),
            delivery_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("snapshot I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

type Queues = BTreeMap<String, VecDeque<ActivityLogEntry>>;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    version: u32,
    saved_at: i64,
    checksum: String,
    queues: Queues,
}

/// Resultado de un ciclo de flush
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed_vehicles: usize,
    pub pending: usize,
}

pub struct DeliveryBuffer {
    store: Arc<dyn DocumentStore>,
    config: BufferConfig,
    metrics: Metrics,
    queues: Mutex<Queues>,
    /// Serializa las escrituras del snapshot
    persist_lock: Mutex<()>,
    /// Un solo ciclo de flush a la vez
    flush_lock: Mutex<()>,
}

impl DeliveryBuffer {
    pub fn new(store: Arc<dyn DocumentStore>, config: BufferConfig, metrics: Metrics) -> Self {
        Self {
            store,
            config,
            metrics,
            queues: Mutex::new(Queues::new()),
            persist_lock: Mutex::new(()),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.config.snapshot_path
    }

    /// Cargar el snapshot local; devuelve las entradas recuperadas
    pub async fn load(&self) -> Result<usize, PersistenceError> {
        let path = &self.config.snapshot_path;
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("📦 Sin snapshot previo en {}", path.display());
                return Ok(0);
            }
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };

        let restored = match decode_snapshot(&raw) {
            Ok(queues) => queues,
            Err(reason) => {
                log::error!("❌ Snapshot inválido en {}: {}", path.display(), reason);
                self.quarantine(path).await?;
                Queues::new()
            }
        };

        let count = restored.values().map(VecDeque::len).sum();
        {
            let mut queues = self.queues.lock().await;
            for (vehicle, entries) in restored {
                queues.entry(vehicle).or_default().extend(entries);
            }
        }
        self.update_gauge().await;

        if count > 0 {
            log::info!("📦 {} entradas pendientes recuperadas del snapshot", count);
        }
        Ok(count)
    }

    /// Encolar una entrada y persistir el buffer completo
    pub async fn enqueue(&self, entry: ActivityLogEntry) -> Result<(), PersistenceError> {
        {
            let mut queues = self.queues.lock().await;
            queues.entry(entry.bus_id.clone()).or_default().push_back(entry);
        }
        self.metrics.log_entries_enqueued_total.inc();
        self.update_gauge().await;
        self.persist().await
    }

    pub async fn pending_count(&self) -> usize {
        self.queues.lock().await.values().map(VecDeque::len).sum()
    }

    /// Entradas pendientes de un bus, en orden de entrega
    pub async fn pending_for(&self, vehicle_id: &str) -> Vec<ActivityLogEntry> {
        self.queues
            .lock()
            .await
            .get(vehicle_id)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Un ciclo de entrega: buses en paralelo, cada bus en orden FIFO
    pub async fn flush_once(&self) -> FlushReport {
        let _flushing = self.flush_lock.lock().await;

        let vehicles: Vec<String> = {
            let queues = self.queues.lock().await;
            queues
                .iter()
                .filter(|(_, queue)| !queue.is_empty())
                .map(|(vehicle, _)| vehicle.clone())
                .collect()
        };

        let mut report = FlushReport::default();
        if !vehicles.is_empty() {
            let results = futures::future::join_all(
                vehicles.iter().map(|vehicle| self.drain_vehicle(vehicle)),
            )
            .await;

            for (delivered, failed) in results {
                report.delivered += delivered;
                if failed {
                    report.failed_vehicles += 1;
                }
            }

            if let Err(e) = self.persist().await {
                log::error!("❌ No se pudo persistir el buffer tras el flush: {}", e);
            }
        }

        report.pending = self.pending_count().await;
        self.update_gauge().await;
        report
    }

    /// Loop periódico de flush; al cancelar hace un último flush
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        log::info!(
            "📦 Loop de entrega iniciado (cada {:?}, snapshot {})",
            self.config.flush_interval,
            self.config.snapshot_path.display()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.flush_once().await;
                    if report.delivered > 0 || report.failed_vehicles > 0 {
                        log::debug!(
                            "📦 Flush: {} entregadas, {} buses con fallos, {} pendientes",
                            report.delivered,
                            report.failed_vehicles,
                            report.pending
                        );
                    }
                }
            }
        }

        let report = self.flush_once().await;
        if let Err(e) = self.persist().await {
            log::error!("❌ No se pudo persistir el buffer al detener: {}", e);
        }
        log::info!("📦 Loop de entrega detenido ({} entradas pendientes)", report.pending);
    }

    /// Entregar la cola de un bus hasta vaciarla o hasta el primer fallo
    async fn drain_vehicle(&self, vehicle: &str) -> (usize, bool) {
        let mut delivered = 0;
        loop {
            // Sólo el flush saca entradas, así que el frente no cambia durante la entrega
            let front = {
                let queues = self.queues.lock().await;
                queues.get(vehicle).and_then(|queue| queue.front().cloned())
            };
            let Some(entry) = front else {
                return (delivered, false);
            };

            match self.deliver(vehicle, &entry).await {
                Ok(key) => {
                    let mut queues = self.queues.lock().await;
                    if let Some(queue) = queues.get_mut(vehicle) {
                        queue.pop_front();
                        if queue.is_empty() {
                            queues.remove(vehicle);
                        }
                    }
                    delivered += 1;
                    self.metrics.log_deliveries_total.with_label_values(&["delivered"]).inc();
                    log::debug!("📦 Entrada de {} entregada como {}", vehicle, key);
                }
                Err(e) => {
                    self.metrics.log_deliveries_total.with_label_values(&["failed"]).inc();
                    log::warn!("⚠️ Entrega a {} fallida, reintento en el próximo ciclo: {}", vehicle, e);
                    return (delivered, true);
                }
            }
        }
    }

    async fn deliver(&self, vehicle: &str, entry: &ActivityLogEntry) -> Result<String, StoreError> {
        let path = paths::bus_logs(vehicle);
        let value = serde_json::to_value(entry).map_err(|source| StoreError::Malformed {
            path: path.clone(),
            source,
        })?;

        match tokio::time::timeout(self.config.delivery_timeout, self.store.push(&path, value)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.config.delivery_timeout)),
        }
    }

    /// Reescribir el snapshot: archivo temporal y rename
    async fn persist(&self) -> Result<(), PersistenceError> {
        let _guard = self.persist_lock.lock().await;

        let queues = self.queues.lock().await.clone();
        let encoded = encode_snapshot(queues)?;

        let path = &self.config.snapshot_path;
        let io_err = |source| PersistenceError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = temp_path(path);
        tokio::fs::write(&tmp, encoded).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }

    async fn quarantine(&self, path: &Path) -> Result<(), PersistenceError> {
        let mut corrupt = path.as_os_str().to_owned();
        corrupt.push(".corrupt");
        let corrupt = PathBuf::from(corrupt);

        tokio::fs::rename(path, &corrupt)
            .await
            .map_err(|source| PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        log::warn!("⚠️ Snapshot movido a {}", corrupt.display());
        Ok(())
    }

    async fn update_gauge(&self) {
        let pending = self.pending_count().await;
        self.metrics.pending_log_entries.set(pending as i64);
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn queues_checksum(queues_json: &str) -> String {
    format!("{:x}", md5::compute(queues_json.as_bytes()))
}

fn encode_snapshot(queues: Queues) -> Result<Vec<u8>, serde_json::Error> {
    let queues_json = serde_json::to_string(&queues)?;
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        saved_at: chrono::Utc::now().timestamp_millis(),
        checksum: queues_checksum(&queues_json),
        queues,
    };
    serde_json::to_vec_pretty(&snapshot)
}

fn decode_snapshot(raw: &[u8]) -> Result<Queues, String> {
    let snapshot: Snapshot = serde_json::from_slice(raw).map_err(|e| e.to_string())?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(format!("unsupported snapshot version {}", snapshot.version));
    }

    let queues_json = serde_json::to_string(&snapshot.queues).map_err(|e| e.to_string())?;
    if queues_checksum(&queues_json) != snapshot.checksum {
        return Err("checksum mismatch".to_string());
    }
    Ok(snapshot.queues)
}
