use crate::error::ObservabilityError;
use crate::events::{ObservationType, TraceContext, TraceEvent};
use crate::exporter::FlushStats;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

/// Sink for observation lifecycles.
///
/// Every method may fail; callers log the failure and continue the traced work.
#[async_trait]
pub trait Tracer: Send + Sync {
    async fn start(
        &self,
        event: &TraceEvent,
        context: &TraceContext,
    ) -> Result<(), ObservabilityError>;

    async fn end(&self, event: &TraceEvent) -> Result<(), ObservabilityError>;

    async fn flush(&self, timeout: Duration) -> Result<FlushStats, ObservabilityError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

#[async_trait]
impl Tracer for NoopTracer {
    async fn start(&self, _: &TraceEvent, _: &TraceContext) -> Result<(), ObservabilityError> {
        Ok(())
    }

    async fn end(&self, _: &TraceEvent) -> Result<(), ObservabilityError> {
        Ok(())
    }

    async fn flush(&self, _: Duration) -> Result<FlushStats, ObservabilityError> {
        Ok(FlushStats::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Start(TraceEvent, TraceContext),
    End(TraceEvent),
}

/// Keeps every observation in memory. With `failing()` every call errors
/// instead, which exercises the swallow-and-log paths of callers.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    records: Mutex<Vec<Recorded>>,
    fail: bool,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn records(&self) -> Vec<Recorded> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn ended(&self) -> Vec<TraceEvent> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                Recorded::End(event) => Some(event),
                Recorded::Start(..) => None,
            })
            .collect()
    }

    fn push(&self, record: Recorded) -> Result<(), ObservabilityError> {
        if self.fail {
            return Err(ObservabilityError::Unavailable(
                "recording tracer is configured to fail".to_string(),
            ));
        }
        self.records
            .lock()
            .map_err(|_| ObservabilityError::Unavailable("recorder lock poisoned".to_string()))?
            .push(record);
        Ok(())
    }
}

#[async_trait]
impl Tracer for RecordingTracer {
    async fn start(
        &self,
        event: &TraceEvent,
        context: &TraceContext,
    ) -> Result<(), ObservabilityError> {
        self.push(Recorded::Start(event.clone(), context.clone()))
    }

    async fn end(&self, event: &TraceEvent) -> Result<(), ObservabilityError> {
        self.push(Recorded::End(event.clone()))
    }

    async fn flush(&self, _: Duration) -> Result<FlushStats, ObservabilityError> {
        if self.fail {
            return Err(ObservabilityError::Unavailable(
                "recording tracer is configured to fail".to_string(),
            ));
        }
        Ok(FlushStats::default())
    }
}

/// Wraps an async step in an observation of the given type.
///
/// `step` receives the child context so nested work can attach to this
/// observation. Tracer failures are logged and never change the step's result.
pub async fn observe<T, E, F, Fut>(
    tracer: &dyn Tracer,
    context: &TraceContext,
    name: &str,
    observation_type: ObservationType,
    input: Value,
    step: F,
) -> Result<T, E>
where
    T: Serialize,
    E: Display,
    F: FnOnce(TraceContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut event = TraceEvent::start(context, name, observation_type, input);
    if let Err(err) = tracer.start(&event, context).await {
        warn!("Failed to start observation '{}': {}", name, err);
    }

    let result = step(context.child(event.id)).await;

    match &result {
        Ok(value) => event.finish_ok(serde_json::to_value(value).unwrap_or(Value::Null), None),
        Err(err) => event.finish_err(err.to_string()),
    }
    if let Err(err) = tracer.end(&event).await {
        warn!("Failed to end observation '{}': {}", name, err);
    }

    result
}
