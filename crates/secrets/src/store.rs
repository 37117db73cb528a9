use crate::error::SecretError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use aws_sdk_secretsmanager::Client;
use std::collections::HashMap;
use tracing::{debug, info};

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns the raw string value stored under `name`.
    async fn get_secret(&self, name: &str) -> Result<String, SecretError>;
}

pub struct AwsSecretsManagerStore {
    client: Client,
}

impl AwsSecretsManagerStore {
    pub async fn new(region: &str) -> Self {
        info!("Initializing Secrets Manager client for region {}", region);
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&aws_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for AwsSecretsManagerStore {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        debug!("Fetching secret {}", name);
        let output = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| SecretError::Fetch {
                name: name.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        output
            .secret_string()
            .map(str::to_string)
            .ok_or_else(|| SecretError::Missing(name.to_string()))
    }
}

/// In-memory store for local development and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, String>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::Missing(name.to_string()))
    }
}
