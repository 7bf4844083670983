//! Utilidades geográficas
//!
//! Distancia de gran círculo y detección de cambios significativos de posición.

use crate::models::location::Coordinates;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calcular la distancia entre dos coordenadas en kilómetros
///
/// Usa la fórmula de Haversine sobre una Tierra esférica.
pub fn distance_km(from: &Coordinates, to: &Coordinates) -> f64 {
    let dlat = (to.lat - from.lat).to_radians();
    let dlng = (to.lng - from.lng).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (dlng / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Indica si `candidate` se aleja de `cached` más de `epsilon` grados en algún eje
///
/// Sin posición previa siempre hay cambio.
pub fn has_moved(cached: Option<&Coordinates>, candidate: &Coordinates, epsilon: f64) -> bool {
    match cached {
        None => true,
        Some(previous) => {
            (candidate.lat - previous.lat).abs() > epsilon
                || (candidate.lng - previous.lng).abs() > epsilon
        }
    }
}
