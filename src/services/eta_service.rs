//! Estimación de ETA
//!
//! Consulta al predictor remoto con un timeout propio. Si no hay predictor
//! configurado, si falla o si la respuesta no sirve, se usa la fórmula local:
//! distancia de gran círculo a velocidad promedio, mínimo 1 minuto, con un
//! rango de [0.7×, 1.5×]. La estimación nunca falla.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::metrics::Metrics;
use crate::models::{CheckStatus, Coordinates, EtaSource, PositionFix};
use crate::utils::geo;

#[derive(Debug, Clone)]
pub struct EtaConfig {
    pub predictor_url: Option<String>,
    pub timeout: Duration,
    /// Velocidad promedio nominal para la fórmula local
    pub fallback_avg_speed_kmh: f64,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            predictor_url: None,
            timeout: Duration::from_secs(2),
            fallback_avg_speed_kmh: 25.0,
        }
    }
}

#[derive(Error, Debug)]
pub enum PredictorError {
    #[error("predictor request failed: {0}")]
    Transport(String),

    #[error("predictor timed out after {0:?}")]
    Timeout(Duration),

    #[error("predictor answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("predictor answer is unusable: {0}")]
    InvalidAnswer(String),
}

/// Cuerpo enviado al predictor
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRequest {
    pub distance_km: f64,
    pub speed_kmh: f64,
    /// 1 = check-in, 0 = check-out
    pub status: u8,
    pub emergency: bool,
    pub origin: Coordinates,
    pub destination: Coordinates,
    pub history: Vec<PositionFix>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionResponse {
    pub eta_minutes: f64,
    #[serde(default)]
    pub eta_min: Option<f64>,
    #[serde(default)]
    pub eta_max: Option<f64>,
}

#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse, PredictorError>;
}

/// Cliente HTTP del servicio de predicción
pub struct HttpPredictor {
    url: String,
    client: reqwest::Client,
}

impl HttpPredictor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PredictorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PredictorError::Transport(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse, PredictorError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| PredictorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PredictorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<PredictionResponse>()
            .await
            .map_err(|e| PredictorError::InvalidAnswer(e.to_string()))
    }
}

/// Estimación adjunta al log de actividad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub eta_minutes: i64,
    pub range_min: i64,
    pub range_max: i64,
    pub source: EtaSource,
}

/// Señales auxiliares para el predictor
#[derive(Debug, Clone)]
pub struct EtaContext {
    pub speed_kmh: Option<f64>,
    pub status: CheckStatus,
    pub emergency: bool,
    pub history: Vec<PositionFix>,
}

pub struct EtaEstimator {
    predictor: Option<Arc<dyn Predictor>>,
    config: EtaConfig,
    metrics: Metrics,
}

impl EtaEstimator {
    /// Construir con el predictor HTTP si hay URL configurada
    pub fn new(config: EtaConfig, metrics: Metrics) -> Self {
        let predictor = match config.predictor_url.as_deref() {
            Some(url) => match HttpPredictor::new(url, config.timeout) {
                Ok(predictor) => {
                    log::info!("🔮 Predictor de ETA configurado: {}", url);
                    Some(Arc::new(predictor) as Arc<dyn Predictor>)
                }
                Err(e) => {
                    log::error!("❌ No se pudo crear el cliente del predictor: {}", e);
                    None
                }
            },
            None => {
                log::warn!("⚠️ PREDICTOR_URL no configurada, sólo se usará la fórmula local");
                None
            }
        };

        Self {
            predictor,
            config,
            metrics,
        }
    }

    pub fn with_predictor(predictor: Arc<dyn Predictor>, config: EtaConfig, metrics: Metrics) -> Self {
        Self {
            predictor: Some(predictor),
            config,
            metrics,
        }
    }

    pub async fn estimate(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        context: &EtaContext,
    ) -> Estimate {
        let distance_km = geo::distance_km(origin, destination);

        let estimate = match self.predict(origin, destination, distance_km, context).await {
            Some(estimate) => estimate,
            None => fallback_estimate(distance_km, self.config.fallback_avg_speed_kmh),
        };

        let source = match estimate.source {
            EtaSource::Predictor => "predictor",
            EtaSource::Fallback => "fallback",
        };
        self.metrics.eta_estimates_total.with_label_values(&[source]).inc();
        estimate
    }

    async fn predict(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        distance_km: f64,
        context: &EtaContext,
    ) -> Option<Estimate> {
        let predictor = self.predictor.as_ref()?;

        let request = PredictionRequest {
            distance_km,
            speed_kmh: context
                .speed_kmh
                .unwrap_or(self.config.fallback_avg_speed_kmh),
            status: match context.status {
                CheckStatus::CheckIn => 1,
                CheckStatus::CheckOut => 0,
            },
            emergency: context.emergency,
            origin: *origin,
            destination: *destination,
            history: context.history.clone(),
        };

        let answer = match tokio::time::timeout(self.config.timeout, predictor.predict(&request)).await {
            Ok(answer) => answer,
            Err(_) => Err(PredictorError::Timeout(self.config.timeout)),
        };

        match answer.and_then(predicted_estimate) {
            Ok(estimate) => Some(estimate),
            Err(e) => {
                log::warn!("⚠️ Predictor de ETA no disponible, usando fórmula local: {}", e);
                None
            }
        }
    }
}

fn predicted_estimate(response: PredictionResponse) -> Result<Estimate, PredictorError> {
    if !response.eta_minutes.is_finite() || response.eta_minutes < 1.0 {
        return Err(PredictorError::InvalidAnswer(format!(
            "eta_minutes = {}",
            response.eta_minutes
        )));
    }

    let eta_minutes = response.eta_minutes.round() as i64;
    let (default_min, default_max) = range_around(eta_minutes);
    let range_min = response
        .eta_min
        .filter(|v| v.is_finite())
        .map(|v| v.round() as i64)
        .unwrap_or(default_min);
    let range_max = response
        .eta_max
        .filter(|v| v.is_finite())
        .map(|v| v.round() as i64)
        .unwrap_or(default_max);

    Ok(Estimate {
        eta_minutes,
        range_min: range_min.min(eta_minutes),
        range_max: range_max.max(eta_minutes),
        source: EtaSource::Predictor,
    })
}

/// Fórmula local: minutos = round(distancia / velocidad * 60), mínimo 1
pub fn fallback_estimate(distance_km: f64, avg_speed_kmh: f64) -> Estimate {
    let speed = if avg_speed_kmh.is_finite() && avg_speed_kmh > 0.0 {
        avg_speed_kmh
    } else {
        EtaConfig::default().fallback_avg_speed_kmh
    };
    let distance = if distance_km.is_finite() { distance_km.max(0.0) } else { 0.0 };

    let eta_minutes = ((distance / speed) * 60.0).round().max(1.0) as i64;
    let (range_min, range_max) = range_around(eta_minutes);

    Estimate {
        eta_minutes,
        range_min,
        range_max,
        source: EtaSource::Fallback,
    }
}

fn range_around(minutes: i64) -> (i64, i64) {
    let low = ((minutes as f64) * 0.7).round().max(1.0) as i64;
    let high = ((minutes as f64) * 1.5).round() as i64;
    (low, high.max(minutes))
}
