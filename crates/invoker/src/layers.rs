use crate::cache::{cache_key, ResponseCache};
use crate::middleware::{Call, Middleware, Next};
use crate::policy::{validate, PiiMasker};
use crate::usage::UsageTracker;
use async_trait::async_trait;
use converse_core::{InvocationResult, InvokeError};
use observability::{ObservationType, TraceEvent, Tracer};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const GENERATION_NAME: &str = "Bedrock Converse";
pub const TOOL_GENERATION_NAME: &str = "Bedrock Converse Tool Use";

pub struct ValidationLayer;

#[async_trait]
impl Middleware for ValidationLayer {
    fn name(&self) -> &str {
        "validation"
    }

    async fn handle(&self, call: Call, next: Next<'_>) -> Result<InvocationResult, InvokeError> {
        validate(&call.request)?;
        next.run(call).await
    }
}

/// Masks message text before it reaches the trace or the provider.
#[derive(Default)]
pub struct MaskingLayer {
    masker: PiiMasker,
}

impl MaskingLayer {
    pub fn new(masker: PiiMasker) -> Self {
        Self { masker }
    }
}

#[async_trait]
impl Middleware for MaskingLayer {
    fn name(&self) -> &str {
        "masking"
    }

    async fn handle(&self, mut call: Call, next: Next<'_>) -> Result<InvocationResult, InvokeError> {
        self.masker.mask_messages(&mut call.request.messages);
        next.run(call).await
    }
}

/// Ends a started generation as cancelled when the invocation future is
/// dropped before an outcome is recorded.
struct PendingGeneration {
    tracer: Arc<dyn Tracer>,
    event: Option<TraceEvent>,
}

impl PendingGeneration {
    fn disarm(&mut self) {
        self.event = None;
    }
}

impl Drop for PendingGeneration {
    fn drop(&mut self) {
        let Some(mut event) = self.event.take() else {
            return;
        };
        event.metadata.insert("cancelled".to_string(), json!(true));
        event.finish_err("cancelled");
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Generation {} cancelled outside a runtime; not ended", event.id);
            return;
        };
        let tracer = self.tracer.clone();
        handle.spawn(async move {
            if let Err(err) = tracer.end(&event).await {
                warn!("Failed to finalize cancelled generation: {}", err);
            }
        });
    }
}

/// Opens a generation observation around the rest of the chain.
pub struct ObservationLayer {
    tracer: Arc<dyn Tracer>,
}

impl ObservationLayer {
    pub fn new(tracer: Arc<dyn Tracer>) -> Self {
        Self { tracer }
    }
}

#[async_trait]
impl Middleware for ObservationLayer {
    fn name(&self) -> &str {
        "observation"
    }

    async fn handle(&self, call: Call, next: Next<'_>) -> Result<InvocationResult, InvokeError> {
        let request = &call.request;
        let name = if request.tools.is_some() {
            TOOL_GENERATION_NAME
        } else {
            GENERATION_NAME
        };
        let input = serde_json::to_value(&request.messages).unwrap_or(Value::Null);
        let mut event = TraceEvent::start(&call.context, name, ObservationType::Generation, input)
            .with_model(request.model_id.clone())
            .with_model_parameters(request.model_parameters())
            .with_prompt(request.prompt.clone());
        for (key, value) in &request.metadata {
            event.metadata.insert(key.clone(), value.clone());
        }
        if let Some(tools) = &request.tools {
            let names: Vec<&str> = tools
                .tools
                .iter()
                .map(|tool| tool.function.name.as_str())
                .collect();
            event.metadata.insert("tools".to_string(), json!(names));
        }
        event
            .metadata
            .insert("requested_model".to_string(), json!(request.model_id));

        if let Err(err) = self.tracer.start(&event, &call.context).await {
            warn!("Failed to start generation trace: {}", err);
        }

        let mut pending = PendingGeneration {
            tracer: self.tracer.clone(),
            event: Some(event.clone()),
        };
        let inner = Call {
            context: call.context.child(event.id),
            request: call.request,
        };
        let outcome = next.run(inner).await;
        pending.disarm();

        let outcome = match outcome {
            Ok(mut result) => {
                let output = if result.tool_calls.is_empty() {
                    json!(result.text)
                } else {
                    json!({ "text": result.text, "toolCalls": result.tool_calls })
                };
                let metadata = [
                    ("attempts", json!(result.attempts)),
                    ("served_model", json!(result.model_id)),
                    ("fallback_used", json!(result.fallback_used)),
                    ("truncation", json!(result.truncation)),
                    ("request_id", json!(result.request_id)),
                    ("stop_reason", json!(result.stop_reason)),
                    ("cache_hit", json!(result.cache_hit)),
                    ("cost", json!(result.cost)),
                ];
                for (key, value) in metadata {
                    event.metadata.insert(key.to_string(), value);
                }
                event.model = Some(result.model_id.clone());
                let usage = (!result.cache_hit).then_some(result.usage);
                event.finish_ok(output, usage);

                result.trace_id = Some(event.trace_id);
                result.observation_id = Some(event.id);
                Ok(result)
            }
            Err(err) => {
                event
                    .metadata
                    .insert("error_code".to_string(), json!(err.code()));
                event
                    .metadata
                    .insert("attempts".to_string(), json!(err.attempts()));
                event.finish_err(err.to_string());
                Err(err)
            }
        };

        if let Err(err) = self.tracer.end(&event).await {
            warn!("Failed to finalize generation trace: {}", err);
        }
        outcome
    }
}

pub struct CacheLayer {
    cache: Arc<ResponseCache>,
}

impl CacheLayer {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Middleware for CacheLayer {
    fn name(&self) -> &str {
        "cache"
    }

    async fn handle(&self, call: Call, next: Next<'_>) -> Result<InvocationResult, InvokeError> {
        let key = cache_key(&call.request);
        if let Some(mut cached) = self.cache.get(&key) {
            debug!("Serving {} from response cache", call.request.model_id);
            cached.cache_hit = true;
            cached.attempts = 0;
            cached.cost = None;
            return Ok(cached);
        }

        let result = next.run(call).await?;
        self.cache.insert(key, result.clone());
        Ok(result)
    }
}

/// Records usage for calls that completed. A dropped call never gets here.
pub struct UsageLayer {
    tracker: Arc<UsageTracker>,
}

impl UsageLayer {
    pub fn new(tracker: Arc<UsageTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl Middleware for UsageLayer {
    fn name(&self) -> &str {
        "usage"
    }

    async fn handle(&self, call: Call, next: Next<'_>) -> Result<InvocationResult, InvokeError> {
        let mut result = next.run(call).await?;
        result.cost = Some(self.tracker.record(&result.usage, &result.model_id));
        Ok(result)
    }
}
