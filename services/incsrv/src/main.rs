//! Incident Sync Service (incsrv)
//!
//! Pulls services, incidents, teams and escalation policies from the
//! PagerDuty REST API into SQLite and serves reports over the result.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::serve;
use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
#[cfg(feature = "swagger-ui")]
use utoipa::OpenApi;
#[cfg(feature = "swagger-ui")]
use utoipa_swagger_ui::SwaggerUi;

use incsrv::app_state::AppState;
use incsrv::bootstrap;
use incsrv::config::IncsrvConfig;
use incsrv::error::{IncsrvError, Result};
#[cfg(feature = "swagger-ui")]
use incsrv::routes::IncsrvApiDoc;
use incsrv::routes::create_routes;

#[derive(Parser, Debug)]
#[command(author, version, about = "incsrv - Incident Sync Service")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "INCSRV_CONFIG")]
    config: Option<PathBuf>,

    /// Disable the startup banner
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP service (default)
    Serve,
    /// Run a single sync pass, print its report and exit
    Sync,
    /// Check configuration, database and remote settings
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let service_info = bootstrap::create_service_info();

    bootstrap::init_environment();
    let config = bootstrap::load_configuration(args.config.as_deref(), &service_info)?;
    bootstrap::init_logging(&service_info, &config)?;

    match args.command {
        Some(Commands::Check) => check_config(config).await,
        Some(Commands::Sync) => sync_once(config).await,
        Some(Commands::Serve) | None => {
            if !args.no_color {
                common::service_bootstrap::print_startup_banner(&service_info);
            }
            run_service(config).await
        },
    }
}

/// Run the HTTP service until a shutdown signal arrives
async fn run_service(config: IncsrvConfig) -> Result<()> {
    let state = bootstrap::create_app_state(config).await?;
    let config = Arc::clone(&state.config);

    if config.sync.on_startup {
        info!("Running startup sync pass");
        let report = state.run_sync().await;
        if !report.is_complete() {
            warn!("Startup sync pass was incomplete");
        }
    }

    let shutdown_token = CancellationToken::new();
    let scheduler_handle = config
        .sync
        .interval_secs
        .map(|secs| start_sync_scheduler(Arc::clone(&state), secs, shutdown_token.clone()));

    let app = create_routes(Arc::clone(&state));

    #[cfg(feature = "swagger-ui")]
    let app = {
        info!("Swagger UI feature ENABLED - initializing at /docs");
        app.merge(SwaggerUi::new("/docs").url("/openapi.json", IncsrvApiDoc::openapi()))
    };

    #[cfg(not(feature = "swagger-ui"))]
    info!("Swagger UI feature DISABLED");

    let bind_address = format!("{}:{}", config.api.host, config.api.port);
    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        IncsrvError::ConfigError(format!("Invalid bind address '{}': {}", bind_address, e))
    })?;

    let socket = if addr.is_ipv6() {
        tokio::net::TcpSocket::new_v6()?
    } else {
        tokio::net::TcpSocket::new_v4()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr).map_err(|e| {
        IncsrvError::ConfigError(format!("Failed to bind to {}: {}", addr, e))
    })?;
    let listener = socket.listen(1024)?;

    info!("API server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let signal_handle = common::shutdown::cancel_on_shutdown(shutdown_token.clone());
    let server_token = shutdown_token.clone();
    let result = serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await;

    shutdown_token.cancel();
    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            error!("Sync scheduler task failed: {}", e);
        }
    }
    signal_handle.abort();
    state.sqlite_client.close().await;

    result?;
    info!("incsrv stopped");
    Ok(())
}

/// Periodic sync passes until the token is cancelled
///
/// A pass in flight when shutdown begins runs to completion.
fn start_sync_scheduler(
    state: Arc<AppState>,
    interval_secs: u64,
    token: CancellationToken,
) -> JoinHandle<()> {
    info!("Sync scheduler started: every {}s", interval_secs);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Sync scheduler stopped");
                    break;
                },
                _ = interval.tick() => {
                    let report = state.run_sync().await;
                    if !report.is_complete() {
                        warn!("Scheduled sync pass {} was incomplete", report.id);
                    }
                },
            }
        }
    })
}

/// Run one pass and print the report as JSON
///
/// Exits non-zero when any entity kind did not sync.
async fn sync_once(config: IncsrvConfig) -> Result<()> {
    let state = bootstrap::create_app_state(config).await?;
    let report = state.run_sync().await;
    state.sqlite_client.close().await;

    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|e| IncsrvError::InternalError(format!("Failed to render report: {}", e)))?;
    println!("{}", rendered);

    if report.is_complete() {
        Ok(())
    } else {
        Err(IncsrvError::InternalError(
            "sync pass incomplete".to_string(),
        ))
    }
}

/// Check configuration and database access
async fn check_config(config: IncsrvConfig) -> Result<()> {
    println!("=== incsrv configuration check ===\n");

    let warnings = match config.validate() {
        Ok(w) => {
            println!("✓ Configuration valid");
            w
        },
        Err(e) => {
            println!("✗ Configuration invalid: {}", e);
            return Err(e);
        },
    };
    for w in &warnings {
        println!("  ! {}", w);
    }

    println!("\n--- Service ---");
    println!("Name: {}", config.service.name);
    println!("API: http://{}:{}", config.api.host, config.api.port);
    println!("Log level: {}", config.logging.level);

    println!("\n--- Remote ---");
    println!("Base URL: {}", config.remote.base_url);
    println!(
        "API key: {}",
        if config.remote.api_key.is_empty() { "not set" } else { "set" }
    );
    match config.sync.interval_secs {
        Some(secs) => println!("Sync interval: {}s", secs),
        None => println!("Sync interval: disabled"),
    }

    println!("\n--- Database ---");
    println!("Path: {}", config.database.path);
    print!("Connection test: ");
    match bootstrap::setup_database(&config).await {
        Ok(client) => {
            println!("✓ OK");
            client.close().await;
        },
        Err(e) => {
            println!("✗ Failed - {}", e);
            return Err(e);
        },
    }

    println!("\n✓ All checks passed");
    Ok(())
}
