//! Snapshot providers.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, header};
use tracing::debug;
use url::Url;

use super::Snapshot;
use crate::auth::{TokenSource, bearer_header};
use crate::utils::http_client::endpoint;
use crate::{Error, Result};

/// Trait for anything able to produce a dashboard snapshot.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &'static str;

    /// Fetch the current snapshot.
    async fn fetch(&self) -> Result<Snapshot>;
}

/// Fetches the aggregate from `GET {base}/api/dashboard`.
pub struct DashboardClient {
    client: Client,
    url: Url,
    tokens: Arc<dyn TokenSource>,
}

impl DashboardClient {
    pub fn new(client: Client, base_url: &Url, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        Ok(Self {
            client,
            url: endpoint(base_url, &["api", "dashboard"])?,
            tokens,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl SnapshotProvider for DashboardClient {
    fn name(&self) -> &'static str {
        "dashboard"
    }

    async fn fetch(&self) -> Result<Snapshot> {
        let mut request = self
            .client
            .get(self.url.clone())
            .header(header::ACCEPT, "application/json");
        if let Some(auth) = bearer_header(self.tokens.as_ref()) {
            request = request.header(header::AUTHORIZATION, auth);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                url: self.url.to_string(),
                status: status.as_u16(),
            });
        }

        // Misrouted requests often come back as the SPA's index.html with a 200.
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("application/json") {
            return Err(Error::UnexpectedContentType {
                url: self.url.to_string(),
                content_type,
            });
        }

        let body = response.bytes().await?;
        let snapshot = serde_json::from_slice(&body)?;
        debug!(url = %self.url, "Fetched dashboard snapshot");
        Ok(snapshot)
    }
}

/// Always returns the same snapshot.
#[derive(Debug, Clone)]
pub struct MockSnapshotProvider {
    snapshot: Snapshot,
}

impl MockSnapshotProvider {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }
}

impl Default for MockSnapshotProvider {
    fn default() -> Self {
        Self::new(Snapshot::mock())
    }
}

#[async_trait]
impl SnapshotProvider for MockSnapshotProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch(&self) -> Result<Snapshot> {
        Ok(self.snapshot.clone())
    }
}
