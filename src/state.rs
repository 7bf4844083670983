//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum, y el arranque/parada de las tareas en
//! segundo plano.

use std::sync::Arc;
use std::time::Duration;

use crate::config::environment::EnvironmentConfig;
use crate::metrics::Metrics;
use crate::services::{
    BackgroundTasks, DeliveryBuffer, EtaEstimator, HistoryRetention, LocationTracker, ScanService,
};
use crate::store::DocumentStore;

/// Tiempo máximo de espera de las tareas al apagar
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub config: EnvironmentConfig,
    pub store: Arc<dyn DocumentStore>,
    pub scans: Arc<ScanService>,
    pub buffer: Arc<DeliveryBuffer>,
    pub retention: Arc<HistoryRetention>,
    pub metrics: Metrics,
    pub tasks: BackgroundTasks,
}

impl AppState {
    pub fn new(config: EnvironmentConfig, store: Arc<dyn DocumentStore>) -> anyhow::Result<Self> {
        let metrics = Metrics::new()?;
        let tasks = BackgroundTasks::new();

        let tracker = Arc::new(LocationTracker::new(config.tracker.clone()));
        let retention = Arc::new(HistoryRetention::new(
            store.clone(),
            config.retention.clone(),
            metrics.clone(),
        ));
        let buffer = Arc::new(DeliveryBuffer::new(
            store.clone(),
            config.buffer.clone(),
            metrics.clone(),
        ));
        let eta = Arc::new(EtaEstimator::new(config.eta.clone(), metrics.clone()));

        let scans = Arc::new(ScanService::new(
            store.clone(),
            tracker,
            retention.clone(),
            buffer.clone(),
            eta,
            tasks.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            store,
            scans,
            buffer,
            retention,
            metrics,
            tasks,
        })
    }

    /// Cargar el snapshot del buffer y lanzar los loops periódicos
    pub async fn start_background(&self) {
        match self.buffer.load().await {
            Ok(restored) => tracing::info!(restored, "📦 Buffer de actividad listo"),
            Err(e) => tracing::error!("❌ No se pudo leer el snapshot del buffer: {}", e),
        }

        self.tasks
            .spawn("delivery-buffer", self.buffer.clone().run(self.tasks.token()));
        self.tasks
            .spawn("history-retention", self.retention.clone().run(self.tasks.token()));
    }

    /// Cancelar los loops y esperar a las tareas pendientes
    pub async fn shutdown(&self) {
        self.tasks.shutdown(SHUTDOWN_GRACE).await;
    }
}
