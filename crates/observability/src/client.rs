use crate::config::LangfuseConfig;
use crate::error::ObservabilityError;
use reqwest::{header::HeaderMap, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-event results of one ingestion call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Deserialize)]
struct IngestionResponse {
    #[serde(default)]
    successes: Vec<Value>,
    #[serde(default)]
    errors: Vec<IngestionFailure>,
}

#[derive(Debug, Deserialize)]
struct IngestionFailure {
    id: Option<String>,
    status: Option<u16>,
    message: Option<String>,
}

#[derive(Clone)]
pub struct LangfuseClient {
    client: Client,
    host: String,
    public_key: String,
    secret_key: SecretString,
}

impl LangfuseClient {
    pub fn new(host: impl Into<String>, public_key: impl Into<String>, secret_key: SecretString) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            host: host.into(),
            public_key: public_key.into(),
            secret_key,
        }
    }

    pub fn from_config(config: &LangfuseConfig) -> Self {
        Self::new(
            config.host.clone(),
            config.public_key.clone(),
            config.secret_key.clone(),
        )
    }

    /// Sends one batch of ingestion envelopes.
    pub async fn ingest(&self, batch: &[Value]) -> Result<IngestionOutcome, ObservabilityError> {
        if batch.is_empty() {
            return Ok(IngestionOutcome::default());
        }

        let url = format!("{}/api/public/ingestion", self.host.trim_end_matches('/'));
        let payload = json!({ "batch": batch });
        let mut attempt = 0;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            attempt += 1;
            let request = self
                .client
                .post(&url)
                .basic_auth(&self.public_key, Some(self.secret_key.expose_secret()))
                .json(&payload);

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Ok(outcome(batch.len(), &body));
                    }
                    if should_retry(status) && attempt < MAX_ATTEMPTS {
                        backoff = next_delay(status, response.headers(), backoff);
                        debug!("Langfuse returned {}, retrying in {:?}", status, backoff);
                        sleep(backoff).await;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(ObservabilityError::Http {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(err) => {
                    if (err.is_timeout() || err.is_connect()) && attempt < MAX_ATTEMPTS {
                        debug!("Langfuse request failed ({}), retrying in {:?}", err, backoff);
                        sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                        continue;
                    }
                    return Err(ObservabilityError::Request(err));
                }
            }
        }
    }
}

fn outcome(sent: usize, body: &str) -> IngestionOutcome {
    let Ok(parsed) = serde_json::from_str::<IngestionResponse>(body) else {
        return IngestionOutcome {
            succeeded: sent,
            failed: 0,
        };
    };

    for failure in &parsed.errors {
        warn!(
            "Langfuse rejected event {}: status {:?}, {}",
            failure.id.as_deref().unwrap_or("<unknown>"),
            failure.status,
            failure.message.as_deref().unwrap_or("no message")
        );
    }

    let failed = parsed.errors.len().min(sent);
    let succeeded = if parsed.successes.is_empty() {
        sent - failed
    } else {
        parsed.successes.len()
    };
    IngestionOutcome { succeeded, failed }
}

fn should_retry(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn next_delay(status: StatusCode, headers: &HeaderMap, backoff: Duration) -> Duration {
    if status == StatusCode::TOO_MANY_REQUESTS {
        if let Some(seconds) = headers
            .get("Retry-After")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
        {
            return Duration::from_secs(seconds);
        }
    }
    backoff.saturating_mul(2)
}
