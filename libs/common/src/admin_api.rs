//! Shared admin endpoints
//!
//! Runtime log level inspection and changes, mounted by each service under
//! `/api/admin/logs/level`.

use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::api_types::{AppError, SuccessResponse};
use crate::logging;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LogLevelResponse {
    /// Active filter directive
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SetLogLevelRequest {
    /// Plain level ("debug") or a full filter spec ("info,incsrv=debug")
    pub level: String,
}

/// Get the current log filter
///
/// @route GET /api/admin/logs/level
pub async fn get_log_level() -> Json<SuccessResponse<LogLevelResponse>> {
    Json(SuccessResponse::new(LogLevelResponse {
        level: logging::get_log_level(),
    }))
}

/// Replace the log filter at runtime
///
/// @route POST /api/admin/logs/level
/// @input Json<SetLogLevelRequest>
/// @side-effects Reloads the global tracing filter
pub async fn set_log_level(
    Json(req): Json<SetLogLevelRequest>,
) -> Result<Json<SuccessResponse<LogLevelResponse>>, AppError> {
    let level = req.level.trim();
    if level.is_empty() {
        return Err(AppError::bad_request("level must not be empty"));
    }

    logging::set_log_level(level).map_err(AppError::bad_request)?;

    Ok(Json(SuccessResponse::new(LogLevelResponse {
        level: logging::get_log_level(),
    })))
}
