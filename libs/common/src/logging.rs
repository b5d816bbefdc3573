//! Unified logging module for incident sync services
//!
//! Console output plus daily-rolling log files, with a separate `api_access`
//! file for HTTP request logs and a reloadable filter for runtime level changes.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter,
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Target used for HTTP access logs
pub const API_ACCESS_TARGET: &str = "api_access";

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2026-10-19T08:12:44.809000Z [INFO] Sync pass finished`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Non-blocking writer guards must live for the whole process
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

// Dynamic log level reload support
type EnvFilterReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;
static LOG_FILTER_HANDLE: OnceLock<EnvFilterReloadHandle> = OnceLock::new();
static CURRENT_LOG_LEVEL: OnceLock<Mutex<String>> = OnceLock::new();

/// Logging section as it appears in service configuration files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base filter level (e.g. "info", "debug")
    pub level: String,
    /// Root directory for log files
    pub dir: String,
    /// Write file logs as JSON lines
    pub json: bool,
    /// Write `api_access` events to a separate file
    pub enable_api_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
            json: false,
            enable_api_log: true,
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name (e.g., "incsrv")
    pub service_name: String,
    /// Directory for this service's log files
    pub log_dir: PathBuf,
    /// Base level when RUST_LOG is not set
    pub base_level: Level,
    /// Enable JSON format for structured logging
    pub enable_json: bool,
    /// Maximum number of daily log files to keep
    pub max_log_files: usize,
    /// Enable API log separation
    pub enable_api_log: bool,
    /// API log level
    pub api_log_level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: PathBuf::from("logs"),
            base_level: Level::INFO,
            enable_json: false,
            max_log_files: 30,
            enable_api_log: true,
            api_log_level: Level::INFO,
        }
    }
}

/// Build the filter directive string, honouring RUST_LOG when present
fn build_filter_directive(config: &LogConfig, rust_log: Option<&str>) -> String {
    let api_level = if config.enable_api_log {
        config.api_log_level.as_str().to_lowercase()
    } else {
        "off".to_string()
    };

    match rust_log {
        Some(env_str) if env_str.contains(API_ACCESS_TARGET) => env_str.to_string(),
        Some(env_str) => {
            let effective_api_level = if env_str.contains("debug") || env_str.contains("trace") {
                "debug".to_string()
            } else {
                api_level
            };
            format!("{},{}={}", env_str, API_ACCESS_TARGET, effective_api_level)
        },
        None => format!(
            "{},{}=debug,{}={}",
            config.base_level.as_str().to_lowercase(),
            config.service_name,
            API_ACCESS_TARGET,
            api_level
        ),
    }
}

fn rolling_appender(
    log_dir: &Path,
    prefix: &str,
    max_files: usize,
) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(max_files)
        .build(log_dir)?;
    Ok(appender)
}

fn keep_guard(guard: WorkerGuard) {
    let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
    match guards.lock() {
        Ok(mut guards) => guards.push(guard),
        Err(poisoned) => {
            eprintln!("Warning: GUARDS lock was poisoned, recovering...");
            poisoned.into_inner().push(guard);
        },
    }
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let rust_log = std::env::var("RUST_LOG").ok();
    let filter_str = build_filter_directive(&config, rust_log.as_deref());

    let (reload_filter, reload_handle) = reload::Layer::new(EnvFilter::try_new(&filter_str)?);
    let _ = LOG_FILTER_HANDLE.set(reload_handle);
    let _ = CURRENT_LOG_LEVEL.set(Mutex::new(filter_str));

    let console_layer = fmt::layer()
        .with_ansi(true)
        .event_format(BracketedLevelFormat)
        .boxed();

    let business_appender =
        rolling_appender(&config.log_dir, &config.service_name, config.max_log_files)?;
    let (business_writer, guard) = tracing_appender::non_blocking(business_appender);
    keep_guard(guard);

    // Business file layer excludes the api_access target
    let business_file_layer = if config.enable_json {
        fmt::layer()
            .json()
            .with_writer(business_writer)
            .with_level(true)
            .with_target(true)
            .with_filter(filter::filter_fn(|metadata| {
                metadata.target() != API_ACCESS_TARGET
            }))
            .boxed()
    } else {
        fmt::layer()
            .with_writer(business_writer)
            .with_ansi(false)
            .event_format(BracketedLevelFormat)
            .with_filter(filter::filter_fn(|metadata| {
                metadata.target() != API_ACCESS_TARGET
            }))
            .boxed()
    };

    let api_file_layer = if config.enable_api_log {
        let api_prefix = format!("{}_api", config.service_name);
        let api_appender = rolling_appender(&config.log_dir, &api_prefix, config.max_log_files)?;
        let (api_writer, api_guard) = tracing_appender::non_blocking(api_appender);
        keep_guard(api_guard);

        Some(
            fmt::layer()
                .with_writer(api_writer)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .with_filter(filter::filter_fn(|metadata| {
                    metadata.target() == API_ACCESS_TARGET
                }))
                .boxed(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(reload_filter)
        .with(console_layer)
        .with(business_file_layer)
        .with(api_file_layer)
        .try_init()?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);

    start_log_compression_task(config.log_dir, config.service_name);

    Ok(())
}

/// Dynamically set log filter level at runtime
///
/// Accepts a plain level ("debug") or a full filter spec ("info,incsrv=debug").
pub fn set_log_level(level: &str) -> Result<(), String> {
    let handle = LOG_FILTER_HANDLE
        .get()
        .ok_or("Logging not initialized with reload support")?;

    let new_filter =
        EnvFilter::try_new(level).map_err(|e| format!("Invalid log level '{}': {}", level, e))?;

    handle
        .reload(new_filter)
        .map_err(|e| format!("Failed to reload log filter: {}", e))?;

    if let Some(current) = CURRENT_LOG_LEVEL.get() {
        if let Ok(mut guard) = current.lock() {
            *guard = level.to_string();
        }
    }

    tracing::info!("Log level changed to: {}", level);
    Ok(())
}

/// Get current log filter level
pub fn get_log_level() -> String {
    CURRENT_LOG_LEVEL
        .get()
        .and_then(|m| m.lock().ok())
        .map(|guard| guard.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

// ==================== Log Compression Support ====================

use tokio::time::{interval, Duration};

const COMPRESS_AFTER: Duration = Duration::from_secs(7 * 86400);
const DELETE_COMPRESSED_AFTER: Duration = Duration::from_secs(365 * 86400);

/// Start background log compression task
pub fn start_log_compression_task(log_dir: PathBuf, service_name: String) {
    tokio::spawn(async move {
        // Let the service finish starting first
        tokio::time::sleep(Duration::from_secs(60)).await;

        let mut interval = interval(Duration::from_secs(86400));
        loop {
            interval.tick().await;
            if let Err(e) = compress_old_logs(&log_dir, &service_name).await {
                tracing::error!("Log compression error for {}: {}", service_name, e);
            }
        }
    });
}

/// Compress log files older than 7 days, delete compressed logs older than 365 days
async fn compress_old_logs(
    log_dir: &Path,
    service_name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    use std::time::SystemTime;

    let mut entries = tokio::fs::read_dir(log_dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };

        if !file_name.starts_with(service_name) {
            continue;
        }

        let metadata = tokio::fs::metadata(&path).await?;
        let age = SystemTime::now().duration_since(metadata.modified()?)?;

        if file_name.ends_with(".log") {
            if age > COMPRESS_AFTER {
                compress_file(&path).await?;
                tokio::fs::remove_file(&path).await?;
                tracing::debug!("Compressed: {}", file_name);
            }
        } else if file_name.ends_with(".log.gz") && age > DELETE_COMPRESSED_AFTER {
            tokio::fs::remove_file(&path).await?;
            tracing::debug!("Deleted: {}", file_name);
        }
    }

    Ok(())
}

/// Compress a single file next to the original (`<name>.gz`)
async fn compress_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    use std::io::Write;

    let buffer = tokio::fs::read(path).await?;
    let output_path = format!("{}.gz", path.display());
    let output = std::fs::File::create(&output_path)?;
    let mut encoder = GzEncoder::new(output, Compression::best());
    encoder.write_all(&buffer)?;
    encoder.finish()?;

    Ok(())
}

// ============================================================================
// HTTP API Request Logging Middleware
// ============================================================================

/// Redact sensitive fields in a JSON string
///
/// Values under keys containing password, token, api_key, secret or
/// authorization are replaced with `***REDACTED***`, recursively.
/// Non-JSON input is returned unchanged.
#[allow(clippy::disallowed_methods)] // json! macro internally uses unwrap (compile-time safe, never panics)
pub fn redact_sensitive_fields(json_str: &str) -> String {
    use serde_json::{json, Value};

    const SENSITIVE_KEYS: &[&str] = &["password", "token", "api_key", "secret", "authorization"];

    let Ok(mut value) = serde_json::from_str::<Value>(json_str) else {
        return json_str.to_string();
    };

    fn redact_recursive(value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    if SENSITIVE_KEYS.iter().any(|&k| key_lower.contains(k)) {
                        *val = json!("***REDACTED***");
                    } else {
                        redact_recursive(val);
                    }
                }
            },
            Value::Array(arr) => {
                for item in arr.iter_mut() {
                    redact_recursive(item);
                }
            },
            _ => {},
        }
    }

    redact_recursive(&mut value);

    serde_json::to_string(&value).unwrap_or_else(|_| json_str.to_string())
}

/// Truncate body string to maximum length (on a char boundary)
pub fn truncate_body(body: &str, max_length: usize) -> String {
    if body.len() <= max_length {
        return body.to_string();
    }
    let mut cut = max_length;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}[truncated {} bytes]", &body[..cut], body.len() - cut)
}

/// HTTP API request logger middleware
///
/// - **INFO level**: POST/PUT/PATCH/DELETE requests (no body)
/// - **DEBUG level**: all requests, with JSON bodies truncated and redacted
///
/// Events go to the `api_access` target, which lands in the separate API log file.
///
/// Add this middleware to the router **before** `.with_state()`:
/// ```rust,ignore
/// let app = Router::new()
///     // ... routes ...
///     .layer(axum::middleware::from_fn(common::logging::http_request_logger))
///     .with_state(state);
/// ```
#[cfg(feature = "axum")]
pub async fn http_request_logger(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use axum::body::Body;
    use std::time::Instant;
    use tracing::{debug, info, level_enabled};

    const MAX_BODY_LENGTH: usize = 500;

    let method = req.method().clone();
    let uri = req.uri().clone();
    let is_mutating = matches!(method.as_str(), "POST" | "PUT" | "PATCH" | "DELETE");
    let content_type = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let start = Instant::now();

    let should_read_body =
        level_enabled!(Level::DEBUG) && is_mutating && content_type.contains("application/json");

    let (req, body_str) = if should_read_body {
        let (parts, body) = req.into_parts();
        let bytes = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("Failed to read request body: {}", e);
                let new_req = axum::extract::Request::from_parts(parts, Body::empty());
                return next.run(new_req).await;
            },
        };

        let body_str = match std::str::from_utf8(&bytes) {
            Ok(s) => truncate_body(&redact_sensitive_fields(s), MAX_BODY_LENGTH),
            Err(_) => "<binary data>".to_string(),
        };

        (
            axum::extract::Request::from_parts(parts, Body::from(bytes)),
            Some(body_str),
        )
    } else {
        (req, None)
    };

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();

    if is_mutating {
        info!(
            target: "api_access",
            method = %method,
            path = %uri.path(),
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "HTTP request"
        );
    }

    match body_str {
        Some(body) => debug!(
            target: "api_access",
            method = %method,
            path = %uri.path(),
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            request_body = %body,
            "HTTP request (detailed)"
        ),
        None if !is_mutating => debug!(
            target: "api_access",
            method = %method,
            path = %uri.path(),
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "HTTP request"
        ),
        None => {},
    }

    response
}
