//! HTTP API handlers

pub mod admin_handlers;
pub mod health_handlers;
pub mod report_handlers;
pub mod sync_handlers;
