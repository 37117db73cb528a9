use thiserror::Error;

pub const THROTTLING: &str = "ThrottlingException";
pub const SERVICE_UNAVAILABLE: &str = "ServiceUnavailable";
pub const INPUT_TOO_LONG: &str = "InputTooLong";
pub const VALIDATION_EXCEPTION: &str = "ValidationException";

const RETRYABLE_CODES: &[&str] = &[
    THROTTLING,
    SERVICE_UNAVAILABLE,
    "ServiceUnavailableException",
    "ModelNotReadyException",
    "InternalServerException",
];

const TOO_LONG_MARKERS: &[&str] = &[
    "too long",
    "too many input tokens",
    "max input tokens",
    "context length",
    "input is too large",
];

/// Failure reported by a model provider for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(THROTTLING, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(SERVICE_UNAVAILABLE, message)
    }

    pub fn input_too_long(message: impl Into<String>) -> Self {
        Self::new(INPUT_TOO_LONG, message)
    }

    pub fn is_retryable(&self) -> bool {
        RETRYABLE_CODES.contains(&self.code.as_str())
    }

    pub fn is_throttling(&self) -> bool {
        self.code == THROTTLING
    }

    pub fn is_token_limit(&self) -> bool {
        if self.code == INPUT_TOO_LONG {
            return true;
        }
        if self.code != VALIDATION_EXCEPTION {
            return false;
        }
        let message = self.message.to_lowercase();
        TOO_LONG_MARKERS.iter().any(|marker| message.contains(marker))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvokeError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Provider error {code} after {attempts} attempt(s): {message}")]
    Provider {
        code: String,
        message: String,
        retryable: bool,
        attempts: u32,
    },

    #[error("Input still exceeds the model context after {attempts} attempt(s): {message}")]
    TokenLimit { message: String, attempts: u32 },

    #[error("Failed to fetch content from {url}: {reason}")]
    ContentFetch { url: String, reason: String },
}

impl InvokeError {
    pub fn validation(message: impl Into<String>) -> Self {
        InvokeError::Validation(message.into())
    }

    pub fn content_fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        InvokeError::ContentFetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn from_provider(error: ProviderError, attempts: u32) -> Self {
        let retryable = error.is_retryable();
        InvokeError::Provider {
            code: error.code,
            message: error.message,
            retryable,
            attempts,
        }
    }

    /// Stable machine-readable code for callers and trace metadata.
    pub fn code(&self) -> &str {
        match self {
            InvokeError::Validation(_) => "ValidationError",
            InvokeError::Provider { code, .. } => code,
            InvokeError::TokenLimit { .. } => "TokenLimitError",
            InvokeError::ContentFetch { .. } => "ContentFetchError",
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            InvokeError::Provider { attempts, .. } | InvokeError::TokenLimit { attempts, .. } => {
                *attempts
            }
            InvokeError::Validation(_) | InvokeError::ContentFetch { .. } => 0,
        }
    }

    /// True when the caller may reasonably try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InvokeError::Provider { retryable: true, .. })
    }
}
