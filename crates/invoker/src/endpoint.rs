use crate::middleware::{Call, Endpoint};
use crate::policy::{RetryPolicy, TruncationPolicy, TruncationStage};
use async_trait::async_trait;
use converse_core::{InvocationResult, InvokeError, TokenUsage};
use llm::{normalize, to_tool_config, ContentFetcher, ConverseCall, ModelProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Calls the provider, retrying transient failures with backoff, switching
/// to the fallback model on throttling and shrinking context on token-limit
/// errors. Every path is bounded by the retry policy's attempt count.
pub struct ResilientEndpoint {
    provider: Arc<dyn ModelProvider>,
    fetcher: Arc<dyn ContentFetcher>,
    retry: RetryPolicy,
    truncation: TruncationPolicy,
    fallback_model: Option<String>,
}

impl ResilientEndpoint {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        fetcher: Arc<dyn ContentFetcher>,
        retry: RetryPolicy,
        truncation: TruncationPolicy,
        fallback_model: Option<String>,
    ) -> Self {
        Self {
            provider,
            fetcher,
            retry,
            truncation,
            fallback_model,
        }
    }
}

#[async_trait]
impl Endpoint for ResilientEndpoint {
    async fn call(&self, call: Call) -> Result<InvocationResult, InvokeError> {
        let request = call.request;
        let (messages, pre_truncated) = self.truncation.pre_truncate(request.messages);
        let (system, conversation) = normalize(&messages, self.fetcher.as_ref()).await?;
        let tool_config = request.tools.as_ref().and_then(to_tool_config);

        let mut model_id = request.model_id.clone();
        let mut fallback_used = false;
        let mut stage = TruncationStage::Full;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let (system_blocks, wire_messages) = self.truncation.apply(stage, &system, &conversation);
            let converse_call = ConverseCall {
                model_id: model_id.clone(),
                system: system_blocks,
                messages: wire_messages,
                inference_config: request.inference_config.clone(),
                guardrail_config: request.guardrail_config.clone(),
                tool_config: tool_config.clone(),
                additional_model_request_fields: request.additional_model_request_fields.clone(),
            };

            let error = match self.provider.converse(&converse_call).await {
                Ok(reply) => {
                    info!(
                        "{} answered on attempt {} via {}",
                        model_id,
                        attempt,
                        self.provider.name()
                    );
                    let truncation = match stage {
                        TruncationStage::Full if pre_truncated => Some("pre_truncated".to_string()),
                        TruncationStage::Full => None,
                        other => Some(other.as_str().to_string()),
                    };
                    return Ok(InvocationResult {
                        text: reply.text,
                        usage: TokenUsage::new(reply.usage.input_tokens, reply.usage.output_tokens),
                        raw: reply.raw,
                        model_id,
                        attempts: attempt,
                        stop_reason: reply.stop_reason,
                        tool_calls: reply.tool_calls,
                        request_id: reply.request_id,
                        fallback_used,
                        truncation,
                        cost: None,
                        cache_hit: false,
                        trace_id: None,
                        observation_id: None,
                    });
                }
                Err(error) => error,
            };

            let attempts_left = self.retry.has_attempts_left(attempt);

            if error.is_token_limit() {
                match stage.next() {
                    Some(next_stage) if attempts_left => {
                        warn!(
                            "{} rejected input as too long on attempt {}; retrying with {} context",
                            model_id,
                            attempt,
                            next_stage.as_str()
                        );
                        stage = next_stage;
                        continue;
                    }
                    _ => {
                        return Err(InvokeError::TokenLimit {
                            message: error.message,
                            attempts: attempt,
                        })
                    }
                }
            }

            if !error.is_retryable() || !attempts_left {
                warn!(
                    "{} failed on attempt {} with {}; giving up",
                    model_id, attempt, error.code
                );
                return Err(InvokeError::from_provider(error, attempt));
            }

            if error.is_throttling() && self.retry.fallback_on_throttle {
                if let Some(fallback) = self.fallback_model.as_ref().filter(|f| **f != model_id) {
                    warn!("{} throttled; switching to fallback {}", model_id, fallback);
                    model_id = fallback.clone();
                    fallback_used = true;
                }
            }

            let delay = self.retry.delay_for(attempt - 1);
            warn!(
                "Attempt {} failed with {}; retrying in {:?}",
                attempt, error.code, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}
