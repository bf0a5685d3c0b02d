//! Server crate for the crop recommendation service.
//!
//! This crate contains the orchestrator that runs one prediction request
//! through enrichment, inference, and validation, plus the HTTP surface
//! exposing it.

pub mod assets;
pub mod config;
pub mod error;
pub mod http;
pub mod orchestrator;

pub use assets::{Asset, AssetMount};
pub use config::{CliOverrides, ConfigError, ServiceConfig};
pub use error::{ErrorKind, PredictionError};
pub use http::{AppState, app_from_config, router};
pub use orchestrator::{PredictionOrchestrator, Stage};
