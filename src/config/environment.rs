//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno. Todas las variables
//! tienen un valor por defecto; un valor presente pero inválido es un error
//! de arranque.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::store::StoreConfig;
use crate::services::delivery_buffer::BufferConfig;
use crate::services::eta_service::EtaConfig;
use crate::services::history_retention::RetentionConfig;
use crate::services::location_tracker::TrackerConfig;

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub store: StoreConfig,
    pub tracker: TrackerConfig,
    pub retention: RetentionConfig,
    pub buffer: BufferConfig,
    pub eta: EtaConfig,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            port: 3000,
            host: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
            store: StoreConfig::default(),
            tracker: TrackerConfig::default(),
            retention: RetentionConfig::default(),
            buffer: BufferConfig::default(),
            eta: EtaConfig::default(),
        }
    }
}

impl EnvironmentConfig {
    /// Leer la configuración desde el entorno (después de `dotenv()`)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            port: parse_or("PORT", defaults.port)?,
            host: env::var("HOST").unwrap_or(defaults.host),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            store: StoreConfig {
                url: optional("STORE_URL"),
                auth_token: optional("STORE_AUTH_TOKEN"),
                timeout: millis_or("STORE_TIMEOUT_MS", defaults.store.timeout)?,
                seed_path: optional("STORE_SEED_PATH").map(PathBuf::from),
            },
            tracker: TrackerConfig {
                epsilon_deg: parse_or("LOCATION_EPSILON_DEG", defaults.tracker.epsilon_deg)?,
                ..defaults.tracker
            },
            retention: RetentionConfig {
                history_limit: parse_or("HISTORY_LIMIT", defaults.retention.history_limit)?,
                window: Duration::from_secs(
                    parse_or(
                        "HISTORY_RETENTION_HOURS",
                        defaults.retention.window.as_secs() / 3600,
                    )? * 3600,
                ),
                sweep_interval: Duration::from_secs(parse_or(
                    "RETENTION_SWEEP_SECS",
                    defaults.retention.sweep_interval.as_secs(),
                )?),
                ..defaults.retention
            },
            buffer: BufferConfig {
                snapshot_path: optional("BUFFER_SNAPSHOT_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.buffer.snapshot_path),
                flush_interval: millis_or("FLUSH_INTERVAL_MS", defaults.buffer.flush_interval)?,
                delivery_timeout: millis_or(
                    "DELIVERY_TIMEOUT_MS",
                    defaults.buffer.delivery_timeout,
                )?,
            },
            eta: EtaConfig {
                predictor_url: optional("PREDICTOR_URL"),
                timeout: millis_or("PREDICTOR_TIMEOUT_MS", defaults.eta.timeout)?,
                fallback_avg_speed_kmh: parse_or(
                    "FALLBACK_AVG_SPEED_KMH",
                    defaults.eta.fallback_avg_speed_kmh,
                )?,
            },
        })
    }

    /// Verificar si estamos en modo desarrollo
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Verificar si estamos en modo producción
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Obtener la dirección del servidor
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid value, got '{}'", key, raw)),
        None => Ok(default),
    }
}

fn millis_or(key: &str, default: Duration) -> Result<Duration> {
    parse_or(key, default.as_millis() as u64).map(Duration::from_millis)
}
