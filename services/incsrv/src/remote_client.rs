//! Vendor REST API client
//!
//! One authenticated GET per resource collection. Only the first page is
//! consumed; there are no query parameters and no retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::{IncsrvError, Result};
use crate::reconcile::EntityKind;

/// Failure at the fetch boundary
///
/// Callers treat any of these as "nothing to sync this pass".
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request for {resource} failed: {source}")]
    Transport {
        resource: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{resource} returned HTTP {status}")]
    Status { resource: &'static str, status: u16 },

    #[error("{resource} body is not valid JSON: {source}")]
    Decode {
        resource: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn resource(&self) -> &'static str {
        match self {
            Self::Transport { resource, .. }
            | Self::Status { resource, .. }
            | Self::Decode { resource, .. } => resource,
        }
    }
}

/// Source of remote collections
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the raw payload for one entity kind
    async fn fetch(&self, kind: EntityKind) -> std::result::Result<Value, FetchError>;
}

/// HTTP client for the vendor API
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();

        let mut auth = HeaderValue::from_str(&format!("Token token={}", config.api_key))
            .map_err(|e| IncsrvError::ConfigError(format!("remote.api_key: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let accept = HeaderValue::from_str(&format!(
            "application/vnd.pagerduty+json;version={}",
            config.api_version
        ))
        .map_err(|e| IncsrvError::ConfigError(format!("remote.api_version: {}", e)))?;
        headers.insert(ACCEPT, accept);

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(secs) = config.timeout_secs.filter(|s| *s > 0) {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let http = builder
            .build()
            .map_err(|e| IncsrvError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }

    async fn get_collection(&self, resource: &'static str) -> std::result::Result<Value, FetchError> {
        let url = self.url_for(resource);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Transport { resource, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                resource,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport { resource, source })?;

        serde_json::from_slice(&body).map_err(|source| FetchError::Decode { resource, source })
    }
}

#[async_trait]
impl Fetcher for RemoteClient {
    async fn fetch(&self, kind: EntityKind) -> std::result::Result<Value, FetchError> {
        let result = self.get_collection(kind.resource()).await;
        if let Err(e) = &result {
            warn!("Fetch {} failed: {}", e.resource(), e);
        }
        result
    }
}
