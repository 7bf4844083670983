//! Repositorios
//!
//! Acceso de sólo lectura al registro de flota en el store de documentos.

pub mod fleet_repository;

pub use fleet_repository::{FleetRepository, TagOwner};
