//! Shared service library
//!
//! Provides basic functions shared by all services, including:
//! - SQLite client
//! - logging and HTTP access logging
//! - layered configuration loading
//! - API response envelopes and health types

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "axum")]
pub mod admin_api;
pub mod api_types;
pub mod config_loader;
pub mod logging;
pub mod serde_helpers;
pub mod service_bootstrap;
pub mod shutdown;

// Re-export commonly used API types
pub use api_types::{
    ComponentHealth, ErrorInfo, ErrorResponse, HealthStatus, ServiceStatus, SuccessResponse,
};

#[cfg(feature = "axum")]
pub use api_types::AppError;

pub use logging::LoggingConfig;

// Re-export common dependencies
pub use anyhow;
pub use serde;
pub use serde_json;
pub use tokio;
