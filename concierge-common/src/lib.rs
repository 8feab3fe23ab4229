//! Concierge Common - Shared configuration, errors, and logging for the concierge services.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and HTTP status mapping
//! - Logging setup
//! - Small string utilities used for file names and log output

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    ConciergeConfig, Config, LlmConfig, ObservabilityConfig, ServerConfig, StorageConfig,
    WhatsAppConfig,
};
pub use error::{Error, Result, ResultExt};
pub use validation::{Validate, ValidationError, ValidationResult};
