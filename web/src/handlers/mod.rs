//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by route group.

pub mod callbacks;
pub mod correlations;
pub mod discovery;
pub mod health;

pub use callbacks::on_discover;
pub use correlations::{CorrelationView, get_correlation};
pub use discovery::{DiscoverPatientRequest, discover};
pub use health::{ReadinessReport, health_check, readiness};
