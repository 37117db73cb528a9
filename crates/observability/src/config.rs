use converse_core::config::LangfuseSettings;
use secrecy::SecretString;
use secrets::LangfuseCredentials;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct LangfuseConfig {
    pub host: String,
    pub public_key: String,
    pub secret_key: SecretString,
    pub flush_interval: Duration,
    pub max_batch_size: usize,
    pub queue_capacity: usize,
}

impl LangfuseConfig {
    pub fn new(credentials: LangfuseCredentials) -> Self {
        Self {
            host: credentials.host,
            public_key: credentials.public_key,
            secret_key: credentials.secret_key,
            flush_interval: Duration::from_secs(2),
            max_batch_size: 50,
            queue_capacity: 1000,
        }
    }

    pub fn from_settings(credentials: LangfuseCredentials, settings: &LangfuseSettings) -> Self {
        Self {
            flush_interval: Duration::from_millis(settings.flush_interval_ms.max(1)),
            max_batch_size: settings.max_batch_size.max(1),
            queue_capacity: settings.queue_capacity.max(1),
            ..Self::new(credentials)
        }
    }
}
