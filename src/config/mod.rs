//! Configuración del proyecto
//!
//! Este módulo contiene la configuración del store, variables de entorno
//! y parámetros de los servicios.

pub mod environment;
pub mod store;

pub use environment::*;
pub use store::StoreConfig;
