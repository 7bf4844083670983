//! Utilidades del sistema
//!
//! Este módulo contiene utilidades para manejo de errores, cálculos
//! geográficos, reloj de ingesta y locks por clave.

pub mod clock;
pub mod errors;
pub mod geo;
pub mod keyed_lock;

pub use errors::{AppError, AppResult};
