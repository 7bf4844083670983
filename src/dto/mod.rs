//! DTOs de la API
//!
//! Estructuras de request/response del endpoint de ingesta.

pub mod scan_dto;

pub use scan_dto::{ScanRequest, ScanResponse};
