use async_trait::async_trait;
use converse_core::InvokeError;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Retrieves remote content (images) referenced by URL in caller messages.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, InvokeError>;
}

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpContentFetcher {
    client: Client,
}

impl HttpContentFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpContentFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT).unwrap_or_else(|e| {
            warn!("{}; image fetches will use an untimed client", e);
            Self::with_client(Client::new())
        })
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, InvokeError> {
        debug!("Fetching image content from {}", url);
        let response = self.client.get(url).send().await.map_err(|e| {
            warn!("Image fetch failed for {}: {}", url, e);
            InvokeError::content_fetch(url, e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Image fetch for {} returned {}", url, status);
            return Err(InvokeError::content_fetch(url, format!("HTTP {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| InvokeError::content_fetch(url, e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
