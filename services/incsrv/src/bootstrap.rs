//! Service Bootstrap and Initialization
//!
//! Handles configuration, logging, database and component setup.

use std::path::Path;
use std::sync::Arc;

use common::service_bootstrap::{get_service_port, ServiceInfo};
use common::sqlite::SqliteClient;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::config::{IncsrvConfig, DEFAULT_PORT};
use crate::error::{IncsrvError, Result};
use crate::remote_client::RemoteClient;
use crate::schema;
use crate::sync::{SyncStore, Synchronizer};

/// Initialize service info for unified bootstrap
pub fn create_service_info() -> ServiceInfo {
    ServiceInfo::new(
        "incsrv",
        "Incident Sync Service - PagerDuty Data Sync & Reporting",
        DEFAULT_PORT,
    )
}

/// Load `.env` in development builds
pub fn init_environment() {
    common::service_bootstrap::load_development_env();
}

/// Load and validate configuration
///
/// Validation warnings are logged by `validate` once logging is up, so this
/// only fails on hard errors.
pub fn load_configuration(
    file: Option<&Path>,
    service_info: &ServiceInfo,
) -> Result<IncsrvConfig> {
    let mut config = IncsrvConfig::load(file)?;
    config.api.port = get_service_port(config.api.port, service_info);
    Ok(config)
}

/// Start logging from the loaded configuration
pub fn init_logging(service_info: &ServiceInfo, config: &IncsrvConfig) -> Result<()> {
    common::service_bootstrap::init_logging(service_info, Some(&config.logging))
        .map_err(|e| IncsrvError::ConfigError(format!("Failed to initialize logging: {}", e)))
}

/// Open the database and make sure all tables exist
pub async fn setup_database(config: &IncsrvConfig) -> Result<Arc<SqliteClient>> {
    let client =
        SqliteClient::with_max_connections(&config.database.path, config.database.max_connections)
            .await
            .map_err(|e| {
                IncsrvError::ConfigError(format!(
                    "Failed to open database {}: {}",
                    config.database.path, e
                ))
            })?;

    schema::init_schema(client.pool()).await?;
    info!("Database ready: {}", client.path());

    Ok(Arc::new(client))
}

/// Build the synchronizer over the remote client and the given database
pub fn create_synchronizer(
    config: &IncsrvConfig,
    sqlite_client: &SqliteClient,
) -> Result<Arc<Synchronizer>> {
    let client = RemoteClient::new(&config.remote)?;
    info!("Remote API: {}", client.base_url());

    let store = SyncStore::new(sqlite_client.pool().clone());
    Ok(Arc::new(Synchronizer::new(Arc::new(client), store)))
}

/// Wire up all components into the shared application state
pub async fn create_app_state(config: IncsrvConfig) -> Result<Arc<AppState>> {
    let warnings = config.validate()?;
    if !warnings.is_empty() {
        warn!("{} configuration warning(s)", warnings.len());
    }

    let sqlite_client = setup_database(&config).await?;
    let synchronizer = create_synchronizer(&config, &sqlite_client)?;

    Ok(Arc::new(AppState::new(
        Arc::new(config),
        sqlite_client,
        synchronizer,
    )))
}
