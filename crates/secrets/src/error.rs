use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Failed to fetch secret '{name}': {reason}")]
    Fetch { name: String, reason: String },

    #[error("Secret '{0}' not found or has no string value")]
    Missing(String),

    #[error("Secret '{name}' is not valid JSON: {reason}")]
    Malformed { name: String, reason: String },

    #[error("Secret '{name}' is missing field {field}")]
    MissingField { name: String, field: &'static str },
}
