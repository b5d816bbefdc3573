//! Layered configuration loading
//!
//! Sources, later ones override earlier ones:
//! 1. Built-in defaults (the config type's `Default`)
//! 2. YAML file (explicit path, or the service's default path if present)
//! 3. Prefixed environment variables, nested with `__`

use errors::{ServiceError, ServiceResult};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Build the standard layered figment for a service
///
/// An explicit `file` must exist; the `default_file` is optional.
pub fn layered_figment<T: Serialize>(
    defaults: &T,
    file: Option<&Path>,
    default_file: &str,
    env_prefix: &str,
) -> ServiceResult<Figment> {
    let mut figment = Figment::from(Serialized::defaults(defaults));

    match file {
        Some(path) => {
            if !path.exists() {
                return Err(ServiceError::MissingConfig(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            info!("Loading configuration from: {}", path.display());
            figment = figment.merge(Yaml::file(path));
        },
        None => {
            if Path::new(default_file).exists() {
                info!("Loading configuration from: {}", default_file);
            } else {
                debug!("No configuration file at {}, using defaults", default_file);
            }
            figment = figment.merge(Yaml::file(default_file));
        },
    }

    Ok(figment.merge(Env::prefixed(env_prefix).split("__")))
}

/// Extract a typed configuration, mapping figment errors to `ServiceError`
pub fn extract<T: DeserializeOwned>(figment: &Figment) -> ServiceResult<T> {
    figment
        .extract()
        .map_err(|e| ServiceError::Configuration(format!("Failed to load configuration: {}", e)))
}
