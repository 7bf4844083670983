//! Tracker de ubicación
//!
//! Cache en memoria de la última posición aceptada por lector. Un fix nuevo
//! sólo se escribe en el store si se aleja de la posición cacheada más de
//! `epsilon_deg` en latitud o longitud.
//!
//! La decisión (`evaluate`) y la actualización del cache (`commit`) están
//! separadas: el handler de escaneo sólo hace commit después de que el store
//! aceptó la escritura.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::models::PositionFix;
use crate::store::{paths, StoreResult, UpdateSet};
use crate::utils::geo;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Umbral de cambio en grados (~5 m)
    pub epsilon_deg: f64,
    /// Máximo de fixes recientes conservados por lector
    pub trail_len: usize,
    /// Antigüedad máxima de los fixes recientes
    pub trail_window: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            epsilon_deg: 0.00005,
            trail_len: 10,
            trail_window: Duration::from_secs(30 * 60),
        }
    }
}

/// Resultado de evaluar un fix
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub accepted: bool,
    /// Posición vigente tras la observación
    pub current: PositionFix,
}

#[derive(Debug, Default)]
struct ReaderTrack {
    last: Option<PositionFix>,
    trail: VecDeque<PositionFix>,
}

pub struct LocationTracker {
    config: TrackerConfig,
    tracks: RwLock<HashMap<String, ReaderTrack>>,
}

impl LocationTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: RwLock::new(HashMap::new()),
        }
    }

    /// Decidir si el fix merece escritura, sin tocar el cache
    pub async fn evaluate(&self, reader: &str, fix: &PositionFix) -> Observation {
        let tracks = self.tracks.read().await;
        let cached = tracks.get(reader).and_then(|track| track.last.as_ref());
        self.decide(cached, fix)
    }

    /// Registrar un fix ya escrito en el store
    pub async fn commit(&self, reader: &str, fix: PositionFix) {
        let mut tracks = self.tracks.write().await;
        let track = tracks.entry(reader.to_string()).or_default();
        self.record(track, fix);
    }

    /// Evaluar y, si se acepta, registrar en una sola operación
    #[cfg(test)]
    pub async fn observe(&self, reader: &str, fix: PositionFix) -> Observation {
        let mut tracks = self.tracks.write().await;
        let track = tracks.entry(reader.to_string()).or_default();
        let observation = self.decide(track.last.as_ref(), &fix);
        if observation.accepted {
            self.record(track, fix);
        }
        observation
    }

    #[cfg(test)]
    pub async fn last_known(&self, reader: &str) -> Option<PositionFix> {
        let tracks = self.tracks.read().await;
        tracks.get(reader).and_then(|track| track.last.clone())
    }

    /// Fixes recientes del lector, del más viejo al más nuevo
    pub async fn trail(&self, reader: &str) -> Vec<PositionFix> {
        let tracks = self.tracks.read().await;
        tracks
            .get(reader)
            .map(|track| track.trail.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub async fn tracked_readers(&self) -> usize {
        self.tracks.read().await.len()
    }

    fn decide(&self, cached: Option<&PositionFix>, fix: &PositionFix) -> Observation {
        let cached_coords = cached.map(PositionFix::coordinates);
        let accepted = geo::has_moved(cached_coords.as_ref(), &fix.coordinates(), self.config.epsilon_deg);

        let current = match (accepted, cached) {
            (false, Some(previous)) => previous.clone(),
            _ => fix.clone(),
        };
        Observation { accepted, current }
    }

    fn record(&self, track: &mut ReaderTrack, fix: PositionFix) {
        let window_ms = self.config.trail_window.as_millis() as i64;
        let cutoff = fix.timestamp - window_ms;

        track.trail.push_back(fix.clone());
        while track.trail.len() > self.config.trail_len
            || track.trail.front().map_or(false, |oldest| oldest.timestamp < cutoff)
        {
            track.trail.pop_front();
        }
        track.last = Some(fix);
    }
}

/// Agregar al update la posición del bus, el slot `current` y la entrada de historial
pub fn stage_fix(bus_key: &str, fix: &PositionFix, updates: &mut UpdateSet) -> StoreResult<()> {
    updates.set(paths::bus_field(bus_key, "latitude"), &fix.latitude)?;
    updates.set(paths::bus_field(bus_key, "longitude"), &fix.longitude)?;
    updates.set(paths::current_location(bus_key), fix)?;
    updates.set(paths::history_entry(bus_key, fix.timestamp), fix)?;
    Ok(())
}
