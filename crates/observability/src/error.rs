use thiserror::Error;

/// Failures of the tracing backend. Callers log these and carry on; they are
/// never turned into invocation errors.
#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("Langfuse request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Langfuse returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Tracer unavailable: {0}")]
    Unavailable(String),

    #[error("Flush timed out after {waited_ms} ms with {pending} event(s) pending")]
    FlushTimeout { waited_ms: u64, pending: usize },
}
