use crate::cache::ResponseCache;
use crate::endpoint::ResilientEndpoint;
use crate::layers::{CacheLayer, MaskingLayer, ObservationLayer, UsageLayer, ValidationLayer};
use crate::middleware::{Call, Middleware, Next};
use crate::policy::{PiiMasker, RetryPolicy, TruncationPolicy};
use crate::usage::{PriceTable, UsageStats, UsageTracker};
use converse_core::config::Config;
use converse_core::{InvocationRequest, InvocationResult, InvokeError};
use llm::{ContentFetcher, HttpContentFetcher, ModelProvider};
use observability::{FlushStats, NoopTracer, ObservabilityError, TraceContext, Tracer};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Observed, resilient entry point for model invocations.
///
/// Chain: validation, masking, observation, cache, usage, then the resilient
/// provider endpoint. Usage tracker and cache are shared objects injected at
/// construction and may be handed to several invokers.
pub struct ObservedInvoker {
    layers: Vec<Arc<dyn Middleware>>,
    endpoint: ResilientEndpoint,
    tracer: Arc<dyn Tracer>,
    usage: Arc<UsageTracker>,
}

impl ObservedInvoker {
    pub fn builder(provider: Arc<dyn ModelProvider>) -> ObservedInvokerBuilder {
        ObservedInvokerBuilder::new(provider)
    }

    pub fn from_config(
        provider: Arc<dyn ModelProvider>,
        tracer: Arc<dyn Tracer>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let fetcher =
            HttpContentFetcher::new(Duration::from_millis(config.llm.fetch_timeout_ms.max(1)))?;
        let mut builder = Self::builder(provider)
            .tracer(tracer)
            .fetcher(Arc::new(fetcher))
            .retry_policy(RetryPolicy::from_config(&config.retry))
            .truncation_policy(TruncationPolicy::from_config(&config.truncation))
            .masking(config.masking.enabled)
            .fallback_model(config.llm.fallback.clone())
            .usage_tracker(Arc::new(UsageTracker::new(PriceTable::from_config(
                &config.pricing,
            ))));
        if config.cache.enabled {
            builder = builder.cache(Arc::new(ResponseCache::new(config.cache.capacity)));
        }
        Ok(builder.build())
    }

    pub async fn invoke(&self, request: InvocationRequest) -> Result<InvocationResult, InvokeError> {
        self.invoke_in(request, TraceContext::new()).await
    }

    /// Invokes under an existing trace, e.g. as a step of a larger pipeline.
    pub async fn invoke_in(
        &self,
        request: InvocationRequest,
        context: TraceContext,
    ) -> Result<InvocationResult, InvokeError> {
        Next::new(&self.layers, &self.endpoint)
            .run(Call::new(request, context))
            .await
    }

    pub fn usage_stats(&self) -> UsageStats {
        self.usage.stats()
    }

    pub fn tracer(&self) -> Arc<dyn Tracer> {
        self.tracer.clone()
    }

    pub async fn flush(&self, timeout: Duration) -> Result<FlushStats, ObservabilityError> {
        self.tracer.flush(timeout).await
    }
}

pub struct ObservedInvokerBuilder {
    provider: Arc<dyn ModelProvider>,
    tracer: Arc<dyn Tracer>,
    fetcher: Arc<dyn ContentFetcher>,
    usage: Arc<UsageTracker>,
    cache: Option<Arc<ResponseCache>>,
    retry: RetryPolicy,
    truncation: TruncationPolicy,
    masking: bool,
    fallback_model: Option<String>,
}

impl ObservedInvokerBuilder {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            tracer: Arc::new(NoopTracer),
            fetcher: Arc::new(HttpContentFetcher::default()),
            usage: Arc::new(UsageTracker::default()),
            cache: None,
            retry: RetryPolicy::default(),
            truncation: TruncationPolicy::default(),
            masking: true,
            fallback_model: None,
        }
    }

    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn truncation_policy(mut self, truncation: TruncationPolicy) -> Self {
        self.truncation = truncation;
        self
    }

    pub fn masking(mut self, enabled: bool) -> Self {
        self.masking = enabled;
        self
    }

    pub fn fallback_model(mut self, model: Option<String>) -> Self {
        self.fallback_model = model;
        self
    }

    pub fn build(self) -> ObservedInvoker {
        let mut layers: Vec<Arc<dyn Middleware>> = vec![Arc::new(ValidationLayer)];
        if self.masking {
            layers.push(Arc::new(MaskingLayer::new(PiiMasker::new())));
        }
        layers.push(Arc::new(ObservationLayer::new(self.tracer.clone())));
        if let Some(cache) = self.cache {
            layers.push(Arc::new(CacheLayer::new(cache)));
        }
        layers.push(Arc::new(UsageLayer::new(self.usage.clone())));

        let names: Vec<&str> = layers.iter().map(|layer| layer.name()).collect();
        info!("Invocation chain: {}", names.join(" -> "));

        ObservedInvoker {
            layers,
            endpoint: ResilientEndpoint::new(
                self.provider,
                self.fetcher,
                self.retry,
                self.truncation,
                self.fallback_model,
            ),
            tracer: self.tracer,
            usage: self.usage,
        }
    }
}
