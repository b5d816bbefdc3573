//! Service configuration
//!
//! Layered with figment: built-in defaults, then the YAML file
//! (`--config` or `config/incsrv.yaml`), then `INCSRV_`-prefixed environment
//! variables nested with `__`, and finally the deployment variables
//! `PAGERDUTY_API_KEY`, `BASE_URL` and `DATABASE_PATH`.
//!
//! ```yaml
//! api:
//!   port: 6010
//! database:
//!   path: "data/incsrv.db"
//! remote:
//!   base_url: "https://api.pagerduty.com"
//!   api_version: 2
//! sync:
//!   interval_secs: 900
//! ```

use std::path::Path;

use common::{config_loader, LoggingConfig};
use figment::providers::Env;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IncsrvError, Result};

pub const DEFAULT_PORT: u16 = 6010;
pub const DEFAULT_CONFIG_FILE: &str = "config/incsrv.yaml";
pub const ENV_PREFIX: &str = "INCSRV_";

/// Unprefixed variables honored for compatibility with existing deployments
const DEPLOYMENT_VARS: [&str; 3] = ["PAGERDUTY_API_KEY", "BASE_URL", "DATABASE_PATH"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IncsrvConfig {
    pub service: ServiceConfig,
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "incsrv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, created on first start
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/incsrv.db".to_string(),
            max_connections: common::sqlite::client::DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Vendor REST API access
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    /// Sent as `Accept: application/vnd.pagerduty+json;version=<n>`
    pub api_version: u32,
    /// Request timeout; the HTTP client default applies when unset
    pub timeout_secs: Option<u64>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.pagerduty.com".to_string(),
            api_key: String::new(),
            api_version: 2,
            timeout_secs: None,
        }
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("api_version", &self.api_version)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Periodic sync interval; no scheduler when unset
    pub interval_secs: Option<u64>,
    /// Run one pass before the HTTP server starts accepting requests
    pub on_startup: bool,
}

impl IncsrvConfig {
    /// Load configuration from all layers
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let figment = config_loader::layered_figment(
            &Self::default(),
            file,
            DEFAULT_CONFIG_FILE,
            ENV_PREFIX,
        )?
        .merge(deployment_env());

        let config: Self = config_loader::extract(&figment)?;
        debug!("Config loaded: {:?}", config);
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Returns warnings for settings that degrade the service without
    /// preventing it from starting.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.api.port == 0 {
            return Err(IncsrvError::ConfigError(
                "api.port: Port cannot be 0".to_string(),
            ));
        }
        if self.remote.base_url.trim().is_empty() {
            return Err(IncsrvError::ConfigError(
                "remote.base_url: must not be empty".to_string(),
            ));
        }
        if self.database.path.trim().is_empty() {
            return Err(IncsrvError::ConfigError(
                "database.path: must not be empty".to_string(),
            ));
        }
        if self.sync.interval_secs == Some(0) {
            return Err(IncsrvError::ConfigError(
                "sync.interval_secs: must be at least 1".to_string(),
            ));
        }

        let mut warnings = Vec::new();
        if self.remote.api_key.trim().is_empty() {
            warnings.push(
                "remote.api_key is not set; sync passes will be rejected by the remote API"
                    .to_string(),
            );
        }
        if self.remote.timeout_secs == Some(0) {
            warnings.push("remote.timeout_secs is 0; using the client default".to_string());
        }

        for w in &warnings {
            warn!("{}", w);
        }
        Ok(warnings)
    }
}

/// Map the deployment variables onto their nested config keys
fn deployment_env() -> Env {
    Env::raw().only(&DEPLOYMENT_VARS).map(|key| {
        match key.as_str().to_ascii_lowercase().as_str() {
            "pagerduty_api_key" => "remote.api_key".into(),
            "base_url" => "remote.base_url".into(),
            "database_path" => "database.path".into(),
            other => other.to_string().into(),
        }
    })
}
