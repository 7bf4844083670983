//! Métricas Prometheus del servicio de ingesta
//!
//! Cada instancia tiene su propio `Registry`, de modo que los tests pueden
//! crear tantos estados como necesiten. Se exponen en `GET /metrics`.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Escaneos por resultado (processed, conflict, not_found, invalid, error)
    pub scans_total: IntCounterVec,
    pub scan_duration: HistogramVec,
    /// Fixes por resultado (written, skipped)
    pub location_fixes_total: IntCounterVec,
    pub emergencies_total: IntCounter,
    /// Estimaciones por origen (predictor, fallback)
    pub eta_estimates_total: IntCounterVec,
    pub log_entries_enqueued_total: IntCounter,
    /// Entregas de log por resultado (delivered, failed)
    pub log_deliveries_total: IntCounterVec,
    pub pending_log_entries: IntGauge,
    pub history_entries_pruned_total: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("fleet".to_string()), None)?;

        let scans_total = IntCounterVec::new(
            Opts::new("scans_total", "Reader events by outcome"),
            &["outcome"],
        )?;
        let scan_duration = HistogramVec::new(
            HistogramOpts::new("scan_duration_seconds", "Time spent handling a reader event")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["outcome"],
        )?;
        let location_fixes_total = IntCounterVec::new(
            Opts::new("location_fixes_total", "Location fixes by result"),
            &["result"],
        )?;
        let emergencies_total = IntCounter::new("emergencies_total", "Emergency flags recorded")?;
        let eta_estimates_total = IntCounterVec::new(
            Opts::new("eta_estimates_total", "ETA estimates by source"),
            &["source"],
        )?;
        let log_entries_enqueued_total =
            IntCounter::new("log_entries_enqueued_total", "Activity log entries accepted by the buffer")?;
        let log_deliveries_total = IntCounterVec::new(
            Opts::new("log_deliveries_total", "Activity log deliveries by result"),
            &["result"],
        )?;
        let pending_log_entries =
            IntGauge::new("pending_log_entries", "Activity log entries waiting for delivery")?;
        let history_entries_pruned_total = IntCounter::new(
            "history_entries_pruned_total",
            "Location history entries removed by retention",
        )?;

        registry.register(Box::new(scans_total.clone()))?;
        registry.register(Box::new(scan_duration.clone()))?;
        registry.register(Box::new(location_fixes_total.clone()))?;
        registry.register(Box::new(emergencies_total.clone()))?;
        registry.register(Box::new(eta_estimates_total.clone()))?;
        registry.register(Box::new(log_entries_enqueued_total.clone()))?;
        registry.register(Box::new(log_deliveries_total.clone()))?;
        registry.register(Box::new(pending_log_entries.clone()))?;
        registry.register(Box::new(history_entries_pruned_total.clone()))?;

        Ok(Self {
            registry,
            scans_total,
            scan_duration,
            location_fixes_total,
            emergencies_total,
            eta_estimates_total,
            log_entries_enqueued_total,
            log_deliveries_total,
            pending_log_entries,
            history_entries_pruned_total,
        })
    }

    pub fn record_scan(&self, outcome: &str, seconds: f64) {
        self.scans_total.with_label_values(&[outcome]).inc();
        self.scan_duration.with_label_values(&[outcome]).observe(seconds);
    }

    /// Texto en formato de exposición Prometheus
    pub fn render(&self) -> prometheus::Result<(String, String)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        let body = String::from_utf8_lossy(&buffer).into_owned();
        Ok((encoder.format_type().to_string(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_are_independent_and_render() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();

        first.record_scan("processed", 0.02);
        first.location_fixes_total.with_label_values(&["written"]).inc();

        let (content_type, body) = first.render().unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("fleet_scans_total{outcome=\"processed\"} 1"));
        assert!(body.contains("fleet_location_fixes_total{result=\"written\"} 1"));

        let (_, other) = second.render().unwrap();
        assert!(!other.contains("outcome=\"processed\""));
    }
}
