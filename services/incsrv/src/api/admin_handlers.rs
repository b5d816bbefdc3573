//! Admin API handlers for incsrv service management
//!
//! Re-exports shared admin handlers from common crate.

pub use common::admin_api::{get_log_level, set_log_level, LogLevelResponse, SetLogLevelRequest};
