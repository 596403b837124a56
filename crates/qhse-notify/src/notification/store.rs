//! Remote notification store.
//!
//! Read and delete acknowledgements are forwarded to the back end on a
//! best-effort basis. The engine never reads the store back; callers keep
//! their own optimistic copy of the list (see [`super::NotificationFeed`]).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use tracing::debug;
use url::Url;

use crate::auth::{TokenSource, bearer_header};
use crate::utils::http_client::endpoint;
use crate::{Error, Result};

/// Trait for the back end holding notification read/delete state.
#[async_trait]
pub trait RemoteNotificationStore: Send + Sync {
    /// Mark a notification as read.
    async fn mark_read(&self, id: &str) -> Result<()>;

    /// Delete a notification.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Outcome of a best-effort side-channel call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideChannelOutcome {
    /// The back end accepted the call.
    Acknowledged,
    /// The call failed; the failure has already been logged.
    Failed { reason: String },
}

impl SideChannelOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged)
    }
}

impl From<Result<()>> for SideChannelOutcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::Acknowledged,
            Err(e) => Self::Failed {
                reason: e.to_string(),
            },
        }
    }
}

/// HTTP client for `/api/notifications`.
pub struct HttpNotificationStore {
    client: Client,
    base_url: Url,
    tokens: Arc<dyn TokenSource>,
}

impl HttpNotificationStore {
    pub fn new(client: Client, base_url: Url, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            base_url,
            tokens,
        }
    }

    async fn send(&self, method: Method, segments: &[&str]) -> Result<()> {
        let url = endpoint(&self.base_url, segments)?;

        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(auth) = bearer_header(self.tokens.as_ref()) {
            request = request.header(header::AUTHORIZATION, auth);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(%method, %url, "Notification store call acknowledged");
        Ok(())
    }
}

#[async_trait]
impl RemoteNotificationStore for HttpNotificationStore {
    async fn mark_read(&self, id: &str) -> Result<()> {
        self.send(Method::POST, &["api", "notifications", id, "read"])
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.send(Method::DELETE, &["api", "notifications", id]).await
    }
}

/// Store that accepts every call without doing anything.
///
/// Used in mock mode, where there is no back end to notify.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotificationStore;

#[async_trait]
impl RemoteNotificationStore for NoopNotificationStore {
    async fn mark_read(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}
