//! incsrv library exports for testing

pub mod api;
pub mod app_state;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod remote_client;
pub mod reports;
pub mod routes;
pub mod schema;
pub mod sync;

// Re-export commonly used types
pub use app_state::AppState;
pub use config::IncsrvConfig;
pub use error::{IncsrvError, Result};
pub use reconcile::{EntityKind, EntityReport, EntityStatus};
pub use remote_client::{FetchError, Fetcher, RemoteClient};
pub use sync::{SyncReport, SyncStore, Synchronizer};
