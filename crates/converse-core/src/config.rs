use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub truncation: TruncationConfig,
    #[serde(default)]
    pub masking: MaskingConfig,
    #[serde(default)]
    pub langfuse: LangfuseSettings,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub primary: String,
    /// Omitted in a present `[llm]` section means no fallback model.
    #[serde(default)]
    pub fallback: Option<String>,
    pub region: String,
    /// Upper bound for downloading one referenced image.
    pub fetch_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary: "us.amazon.nova-pro-v1:0".to_string(),
            fallback: Some("us.amazon.nova-lite-v1:0".to_string()),
            region: default_region(),
            fetch_timeout_ms: 30_000,
        }
    }
}

impl LlmConfig {
    pub fn with_env_overrides(&self) -> Self {
        let primary = env::var("LLM_PRIMARY_MODEL").unwrap_or_else(|_| self.primary.clone());
        let fallback = env::var("LLM_FALLBACK_MODEL")
            .ok()
            .or_else(|| self.fallback.clone());
        let region = env::var("AWS_REGION").unwrap_or_else(|_| self.region.clone());
        Self {
            primary,
            fallback,
            region,
            ..self.clone()
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_jitter_ms: u64,
    pub fallback_on_throttle: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 20_000,
            max_jitter_ms: 250,
            fallback_on_throttle: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncationConfig {
    pub keep_recent_user_messages: usize,
    pub max_chars_per_message: usize,
    pub chars_per_token: usize,
    pub token_budget: Option<usize>,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            keep_recent_user_messages: 2,
            max_chars_per_message: 1000,
            chars_per_token: 4,
            token_budget: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskingConfig {
    pub enabled: bool,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LangfuseSettings {
    pub enabled: bool,
    pub secret_name: String,
    pub region: String,
    pub flush_interval_ms: u64,
    pub max_batch_size: usize,
    pub queue_capacity: usize,
}

impl Default for LangfuseSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            secret_name: "LangFuse-LLM-monitoring".to_string(),
            region: default_region(),
            flush_interval_ms: 2000,
            max_batch_size: 50,
            queue_capacity: 1000,
        }
    }
}

impl LangfuseSettings {
    pub fn with_env_overrides(&self) -> Self {
        let secret_name =
            env::var("LANGFUSE_SECRET_NAME").unwrap_or_else(|_| self.secret_name.clone());
        Self {
            secret_name,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 256,
        }
    }
}

/// Price per 1000 tokens, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

impl ModelPrice {
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub default: Option<ModelPrice>,
    pub models: HashMap<String, ModelPrice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn with_env_overrides(&self) -> Self {
        let bind = env::var("SERVER_BIND").unwrap_or_else(|_| self.bind.clone());
        Self { bind }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn load_from_env() -> anyhow::Result<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| Self::default_config_path());
        Self::load(Path::new(&config_path))
    }

    pub fn default_config_path() -> String {
        "./config.toml".to_string()
    }

    pub fn with_env_overrides(&self) -> Self {
        Self {
            llm: self.llm.with_env_overrides(),
            langfuse: self.langfuse.with_env_overrides(),
            server: self.server.with_env_overrides(),
            ..self.clone()
        }
    }
}
