//! Services module
//!
//! Este módulo contiene la lógica de negocio del servicio de ingesta:
//! el procesamiento de eventos de lector y las tareas en segundo plano
//! (entrega del log de actividad, retención del historial y ETA).

pub mod background;
pub mod checkin_service;
pub mod delivery_buffer;
pub mod eta_service;
pub mod history_retention;
pub mod location_tracker;
pub mod scan_service;

pub use background::BackgroundTasks;
pub use delivery_buffer::{BufferConfig, DeliveryBuffer};
pub use eta_service::{EtaConfig, EtaEstimator};
pub use history_retention::{HistoryRetention, RetentionConfig};
pub use location_tracker::{LocationTracker, TrackerConfig};
pub use scan_service::{ScanOutcome, ScanService};
