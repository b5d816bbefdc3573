//! Unified service bootstrap utilities
//!
//! Startup banner, logging initialization and environment setup shared by
//! the service binaries.

use crate::logging::{self, LogConfig, LoggingConfig};
use std::path::PathBuf;
use tracing::{info, Level};

/// Service metadata for startup
pub struct ServiceInfo {
    /// Service name (e.g., "incsrv")
    pub name: String,
    /// Service version from Cargo.toml
    pub version: String,
    /// Service description
    pub description: String,
    /// Default port
    pub default_port: u16,
}

impl ServiceInfo {
    /// Create new service info
    pub fn new(name: impl Into<String>, description: impl Into<String>, default_port: u16) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: description.into(),
            default_port,
        }
    }
}

/// Print unified startup banner for any service
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = match service.name.as_str() {
        "incsrv" => {
            r#"
 ██╗███╗   ██╗ ██████╗███████╗██████╗ ██╗   ██╗
 ██║████╗  ██║██╔════╝██╔════╝██╔══██╗██║   ██║
 ██║██╔██╗ ██║██║     ███████╗██████╔╝██║   ██║
 ██║██║╚██╗██║██║     ╚════██║██╔══██╗╚██╗ ██╔╝
 ██║██║ ╚████║╚██████╗███████║██║  ██║ ╚████╔╝
 ╚═╝╚═╝  ╚═══╝ ╚═════╝╚══════╝╚═╝  ╚═╝  ╚═══╝
            "#
        },
        _ => "",
    };

    if !banner.is_empty() {
        info!("{}", banner);
    }
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!(" Default Port: {}", service.default_port);
    info!("");
}

/// Resolve the log directory for a service
///
/// Priority:
/// 1. `LOG_DIR` environment variable
/// 2. `logging.dir` from configuration
/// 3. Default "logs"
///
/// The service name is appended as a subdirectory.
pub fn resolve_log_dir(service: &ServiceInfo, logging_config: Option<&LoggingConfig>) -> PathBuf {
    let root = std::env::var("LOG_DIR")
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| logging_config.map(|c| c.dir.clone()))
        .unwrap_or_else(|| "logs".to_string());
    PathBuf::from(root).join(&service.name)
}

/// Initialize logging for a service with standard configuration
pub fn init_logging(
    service: &ServiceInfo,
    logging_config: Option<&LoggingConfig>,
) -> anyhow::Result<()> {
    let base_level = logging_config
        .and_then(|c| c.level.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: resolve_log_dir(service, logging_config),
        base_level,
        enable_json: logging_config.map(|c| c.json).unwrap_or(false),
        max_log_files: 30,
        enable_api_log: logging_config.map(|c| c.enable_api_log).unwrap_or(true),
        api_log_level: Level::INFO,
    };

    logging::init_with_config(log_config).map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}

/// Load environment variables in development mode
///
/// In debug builds, reads `.env` and sets variables that are not already set.
/// In release builds this is a no-op.
pub fn load_development_env() {
    #[cfg(debug_assertions)]
    {
        if let Ok(content) = std::fs::read_to_string(".env") {
            for (key, value) in parse_env_lines(&content) {
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }
}

/// Parse `KEY=VALUE` lines, skipping comments and blanks
fn parse_env_lines(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim().trim_matches('"')))
        .collect()
}

/// Helper to get service port from configuration or environment
///
/// `SERVICE_PORT` (then `<NAME>_PORT`) only applies when the configured
/// port is unset or equal to the default.
pub fn get_service_port(config_port: u16, service: &ServiceInfo) -> u16 {
    let is_default = config_port == 0 || config_port == service.default_port;

    if is_default {
        let service_env = format!("{}_PORT", service.name.to_uppercase());
        for var in ["SERVICE_PORT", service_env.as_str()] {
            if let Some(p) = std::env::var(var).ok().and_then(|s| s.parse::<u16>().ok()) {
                return p;
            }
        }
    }

    if config_port > 0 {
        config_port
    } else {
        service.default_port
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_service_info_creation() {
        let service = ServiceInfo::new("test_service", "Test Service", 8080);
        assert_eq!(service.name, "test_service");
        assert_eq!(service.description, "Test Service");
        assert_eq!(service.default_port, 8080);
    }

    #[test]
    fn test_non_default_port_wins() {
        let service = ServiceInfo::new("portprobe", "Test", 8080);
        assert_eq!(get_service_port(9090, &service), 9090);
    }

    #[test]
    fn test_parse_env_lines() {
        let content = "# comment\n\nPAGERDUTY_API_KEY=abc\nBASE_URL = \"https://x\"\nnot a pair\n";
        let parsed = parse_env_lines(content);
        assert_eq!(
            parsed,
            vec![("PAGERDUTY_API_KEY", "abc"), ("BASE_URL", "https://x")]
        );
    }

    #[test]
    fn test_resolve_log_dir_from_config() {
        let service = ServiceInfo::new("incsrv", "Test", 6010);
        let cfg = LoggingConfig {
            dir: "/var/log/app".to_string(),
            ..Default::default()
        };
        if std::env::var("LOG_DIR").is_err() {
            assert_eq!(
                resolve_log_dir(&service, Some(&cfg)),
                PathBuf::from("/var/log/app/incsrv")
            );
        }
    }
}
