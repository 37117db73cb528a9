use crate::error::SecretError;
use crate::store::SecretStore;
use secrecy::SecretString;
use serde::Deserialize;
use std::env;
use tracing::info;

pub const SECRET_KEY_FIELD: &str = "LANGFUSE_SECRET_KEY";
pub const PUBLIC_KEY_FIELD: &str = "LANGFUSE_PUBLIC_KEY";
pub const HOST_FIELD: &str = "LANGFUSE_HOST";

/// Credentials for the Langfuse ingestion API.
#[derive(Debug, Clone)]
pub struct LangfuseCredentials {
    pub secret_key: SecretString,
    pub public_key: String,
    pub host: String,
}

#[derive(Deserialize)]
struct RawCredentials {
    #[serde(rename = "LANGFUSE_SECRET_KEY", alias = "langfuse_secret_key", alias = "secret_key")]
    secret_key: Option<String>,
    #[serde(rename = "LANGFUSE_PUBLIC_KEY", alias = "langfuse_public_key", alias = "public_key")]
    public_key: Option<String>,
    #[serde(rename = "LANGFUSE_HOST", alias = "langfuse_host", alias = "host")]
    host: Option<String>,
}

impl LangfuseCredentials {
    /// Parses the flat JSON object stored under `name`.
    pub fn from_secret_json(name: &str, raw: &str) -> Result<Self, SecretError> {
        let parsed: RawCredentials =
            serde_json::from_str(raw).map_err(|e| SecretError::Malformed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        Self::from_parts(name, parsed.secret_key, parsed.public_key, parsed.host)
    }

    /// Single lookup against `store`; the result is not cached.
    pub async fn load(store: &dyn SecretStore, name: &str) -> Result<Self, SecretError> {
        let raw = store.get_secret(name).await?;
        let credentials = Self::from_secret_json(name, &raw)?;
        info!("Loaded Langfuse credentials for host {}", credentials.host);
        Ok(credentials)
    }

    pub fn from_env() -> Result<Self, SecretError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SecretError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_parts(
            "environment",
            lookup(SECRET_KEY_FIELD),
            lookup(PUBLIC_KEY_FIELD),
            lookup(HOST_FIELD),
        )
    }

    fn from_parts(
        name: &str,
        secret_key: Option<String>,
        public_key: Option<String>,
        host: Option<String>,
    ) -> Result<Self, SecretError> {
        let secret_key = required(name, SECRET_KEY_FIELD, secret_key)?;
        let public_key = required(name, PUBLIC_KEY_FIELD, public_key)?;
        let host = required(name, HOST_FIELD, host)?;

        Ok(Self {
            secret_key: SecretString::new(secret_key),
            public_key,
            host: host.trim_end_matches('/').to_string(),
        })
    }
}

fn required(name: &str, field: &'static str, value: Option<String>) -> Result<String, SecretError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SecretError::MissingField {
            name: name.to_string(),
            field,
        }),
    }
}
