//! HTTP snapshot loader.

use std::time::Duration;

use async_trait::async_trait;
use heatwatch_types::{Snapshot, TimeRange};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::SnapshotLoader;
use crate::SyncError;

/// Path of the bulk snapshot endpoint.
const INITIAL_DATA_PATH: &str = "/api/initial-data";

/// Loads snapshots from `GET {base_url}/api/initial-data?range=<range>`.
#[derive(Debug, Clone)]
pub struct HttpSnapshotLoader {
    client: Client,
    base_url: String,
    description: String,
}

impl HttpSnapshotLoader {
    /// Create a new builder for configuring the loader.
    pub fn builder() -> HttpSnapshotLoaderBuilder {
        HttpSnapshotLoaderBuilder::default()
    }

    /// Base URL of the server, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, INITIAL_DATA_PATH)
    }
}

#[async_trait]
impl SnapshotLoader for HttpSnapshotLoader {
    async fn load(&self, range: &TimeRange) -> Result<Snapshot, SyncError> {
        debug!(range = %range, url = %self.endpoint(), "Loading snapshot");

        let response = self
            .client
            .get(self.endpoint())
            .query(&[("range", range.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::Transport(format!(
                "server returned status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        Ok(Snapshot::from_value(body)?)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Builder for [`HttpSnapshotLoader`].
#[derive(Debug, Default)]
pub struct HttpSnapshotLoaderBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl HttpSnapshotLoaderBuilder {
    /// Set the server base URL (default: `http://localhost:5000`).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the loader.
    pub fn build(self) -> Result<HttpSnapshotLoader, SyncError> {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(10));

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(format!("failed to build HTTP client: {}", e)))?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| "http://localhost:5000".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(HttpSnapshotLoader {
            client,
            description: format!("http: {}", base_url),
            base_url,
        })
    }
}
