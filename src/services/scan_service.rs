//! Procesamiento de eventos de lector
//!
//! Un evento pasa por: resolución del bus, decisión de ubicación, alerta de
//! emergencia y transición del tag (pasajero o conductor). Todas las
//! mutaciones del evento se juntan en un único `UpdateSet`; si algo se
//! rechaza no se escribe nada. Después del commit se actualiza el cache del
//! tracker, se encola la poda del historial y se registra la actividad
//! (directo al buffer, o vía el cálculo de ETA en segundo plano).

use std::sync::Arc;
use std::time::Instant;

use crate::dto::scan_dto::ScanRequest;
use crate::metrics::Metrics;
use crate::models::{
    ActivityLogEntry, CheckStatus, Coordinates, Driver, EmergencyAlert, EtaRange, Passenger,
    PositionFix, Vehicle,
};
use crate::repositories::fleet_repository::{FleetRepository, TagOwner};
use crate::store::{paths, DocumentStore, UpdateSet};
use crate::utils::clock::IngestClock;
use crate::utils::errors::{AppError, AppResult};
use crate::utils::keyed_lock::KeyedLocks;

use super::background::BackgroundTasks;
use super::checkin_service;
use super::delivery_buffer::DeliveryBuffer;
use super::eta_service::{EtaContext, EtaEstimator};
use super::history_retention::HistoryRetention;
use super::location_tracker::{self, LocationTracker};

/// Resultado de un evento procesado
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub vehicle_id: String,
    pub status: Option<CheckStatus>,
    pub location_updated: bool,
    pub eta_pending: bool,
}

/// Cálculo de ETA pendiente para después del commit
struct EtaJob {
    passenger_key: String,
    origin: Coordinates,
    destination: Coordinates,
    context: EtaContext,
}

pub struct ScanService {
    store: Arc<dyn DocumentStore>,
    fleet: FleetRepository,
    tracker: Arc<LocationTracker>,
    retention: Arc<HistoryRetention>,
    buffer: Arc<DeliveryBuffer>,
    eta: Arc<EtaEstimator>,
    tasks: BackgroundTasks,
    metrics: Metrics,
    clock: IngestClock,
    locks: KeyedLocks,
}

impl ScanService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        tracker: Arc<LocationTracker>,
        retention: Arc<HistoryRetention>,
        buffer: Arc<DeliveryBuffer>,
        eta: Arc<EtaEstimator>,
        tasks: BackgroundTasks,
        metrics: Metrics,
    ) -> Self {
        Self {
            fleet: FleetRepository::new(store.clone()),
            store,
            tracker,
            retention,
            buffer,
            eta,
            tasks,
            metrics,
            clock: IngestClock::new(),
            locks: KeyedLocks::new(),
        }
    }

    /// Procesar un evento y registrar su resultado en las métricas
    pub async fn handle(&self, request: ScanRequest) -> AppResult<ScanOutcome> {
        let started = Instant::now();
        let result = self.process(request).await;

        let outcome = match &result {
            Ok(_) => "processed",
            Err(AppError::CheckInConflict { .. }) => "conflict",
            Err(AppError::NotFound(_)) => "not_found",
            Err(AppError::Validation(_))
            | Err(AppError::BadRequest(_))
            | Err(AppError::MissingReaderCredential) => "invalid",
            Err(_) => "error",
        };
        self.metrics
            .record_scan(outcome, started.elapsed().as_secs_f64());
        result
    }

    async fn process(&self, request: ScanRequest) -> AppResult<ScanOutcome> {
        let reader = request
            .reader_username()
            .ok_or(AppError::MissingReaderCredential)?
            .to_string();
        validator::Validate::validate(&request)?;
        let coordinates = request.coordinates()?;
        let tag = request.tag_id().map(str::to_string);
        let emergency = request.is_emergency();

        // Siempre lector primero, luego tag
        let _reader_guard = self.locks.acquire(&format!("reader:{}", reader)).await;
        let _tag_guard = match &tag {
            Some(tag) => Some(self.locks.acquire(&format!("tag:{}", tag)).await),
            None => None,
        };

        let vehicle = self
            .fleet
            .resolve_vehicle(&reader)
            .await?
            .ok_or_else(|| AppError::NotFound("Bus not found".to_string()))?;

        let timestamp = self.clock.now_millis();
        let mut updates = UpdateSet::new();

        // 🛰️ Ubicación
        let mut accepted_fix = None;
        if let Some(coordinates) = coordinates {
            let fix = PositionFix::from_reading(coordinates, &request.telemetry(), timestamp);
            let observation = self.tracker.evaluate(&reader, &fix).await;
            if observation.accepted {
                location_tracker::stage_fix(&vehicle.key, &fix, &mut updates)?;
                accepted_fix = Some(fix);
            } else {
                log::debug!("🛰️ Fix de {} sin cambio significativo, no se escribe", reader);
            }
        }

        // 🚨 Emergencia
        if emergency {
            let alert = EmergencyAlert {
                reader_username: reader.clone(),
                location: coordinates,
                emergency: true,
                timestamp,
            };
            updates.set(paths::emergency(&reader), &alert)?;
        }

        // 🏷️ Tag
        let mut status = None;
        let mut eta_job = None;
        let mut entry = match &tag {
            Some(tag_id) => {
                let owner = self
                    .fleet
                    .resolve_tag(tag_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Tag not recognized".to_string()))?;

                let base = ActivityLogEntry::for_vehicle(&vehicle, Some(tag_id.clone()), coordinates, timestamp);
                match owner {
                    TagOwner::Passenger(passenger) => {
                        let transition = checkin_service::next(&passenger, &vehicle.key)?;
                        checkin_service::stage_transition(&passenger, &transition, &mut updates);
                        status = Some(transition.status);

                        eta_job = plan_eta(&passenger, coordinates, transition.status, emergency, &request);

                        Some(ActivityLogEntry {
                            student_name: Some(passenger.name.clone().unwrap_or_default()),
                            status: Some(transition.status),
                            ..base
                        })
                    }
                    TagOwner::Driver(driver) => {
                        stage_driver_assignment(&vehicle, &driver, &reader, &mut updates);
                        Some(ActivityLogEntry {
                            driver_name: driver.name.clone().unwrap_or_default(),
                            driver_phone: driver.phone.clone().unwrap_or_default(),
                            ..base
                        })
                    }
                }
            }
            None if emergency => Some(ActivityLogEntry::for_vehicle(&vehicle, None, coordinates, timestamp)),
            None => None,
        };
        if let Some(entry) = entry.as_mut() {
            entry.emergency = emergency;
        }

        // 💾 Commit único del evento
        if !updates.is_empty() {
            self.store.update(&updates).await?;
        }

        let location_updated = accepted_fix.is_some();
        if let Some(fix) = accepted_fix {
            self.tracker.commit(&reader, fix).await;
            self.retention.submit(&vehicle.key);
            self.metrics.location_fixes_total.with_label_values(&["written"]).inc();
        } else if coordinates.is_some() {
            self.metrics.location_fixes_total.with_label_values(&["skipped"]).inc();
        }

        if emergency {
            self.metrics.emergencies_total.inc();
            log::warn!("🚨 Emergencia registrada para el lector {} (bus {})", reader, vehicle.key);
        }
        if let (Some(tag_id), Some(status)) = (&tag, status) {
            log::info!("🏷️ Tag {} en bus {}: {}", tag_id, vehicle.key, status);
        }

        let eta_pending = match (entry, eta_job) {
            (Some(entry), Some(mut job)) => {
                // El trail ya incluye el fix de este evento
                job.context.history = self.tracker.trail(&reader).await;
                self.spawn_eta(entry, job);
                true
            }
            (Some(entry), None) => {
                self.enqueue(entry).await;
                false
            }
            (None, _) => false,
        };

        Ok(ScanOutcome {
            vehicle_id: vehicle.key,
            status,
            location_updated,
            eta_pending,
        })
    }

    fn spawn_eta(&self, mut entry: ActivityLogEntry, job: EtaJob) {
        let eta = self.eta.clone();
        let store = self.store.clone();
        let buffer = self.buffer.clone();

        self.tasks.spawn("eta", async move {
            let estimate = eta.estimate(&job.origin, &job.destination, &job.context).await;
            entry.eta_minutes = Some(estimate.eta_minutes);
            entry.eta_range = Some(EtaRange {
                min: estimate.range_min,
                max: estimate.range_max,
            });
            entry.eta_source = Some(estimate.source);

            let eta_path = paths::student_field(&job.passenger_key, "eta");
            if let Err(e) = store.set(&eta_path, serde_json::json!(estimate.eta_minutes)).await {
                log::warn!("⚠️ No se pudo guardar la ETA de {}: {}", job.passenger_key, e);
            }

            if let Err(e) = buffer.enqueue(entry).await {
                log::error!("❌ No se pudo persistir la entrada de actividad: {}", e);
            }
        });
    }

    async fn enqueue(&self, entry: ActivityLogEntry) {
        // La entrada queda en memoria aunque falle el snapshot
        if let Err(e) = self.buffer.enqueue(entry).await {
            log::error!("❌ No se pudo persistir la entrada de actividad: {}", e);
        }
    }
}

/// La ETA necesita la coordenada del evento y un destino del pasajero
fn plan_eta(
    passenger: &Passenger,
    origin: Option<Coordinates>,
    status: CheckStatus,
    emergency: bool,
    request: &ScanRequest,
) -> Option<EtaJob> {
    let origin = origin?;
    let destination = passenger.destination()?;

    Some(EtaJob {
        passenger_key: passenger.key.clone(),
        origin,
        destination,
        context: EtaContext {
            speed_kmh: request.speed,
            status,
            emergency,
            history: Vec::new(),
        },
    })
}

/// Asociar el conductor al bus y el bus al conductor
fn stage_driver_assignment(vehicle: &Vehicle, driver: &Driver, reader: &str, updates: &mut UpdateSet) {
    use serde_json::Value;

    updates.set_value(
        paths::bus_field(&vehicle.key, "driverId"),
        Value::String(driver.key.clone()),
    );
    updates.set_value(
        paths::bus_field(&vehicle.key, "driverName"),
        Value::String(driver.name.clone().unwrap_or_default()),
    );
    updates.set_value(
        paths::bus_field(&vehicle.key, "driverPhone"),
        Value::String(driver.phone.clone().unwrap_or_default()),
    );
    updates.set_value(
        paths::driver_field(&driver.key, "currentBusReaderUsername"),
        Value::String(reader.to_string()),
    );
}
