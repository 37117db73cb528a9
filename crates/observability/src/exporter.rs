use crate::client::LangfuseClient;
use crate::config::LangfuseConfig;
use crate::error::ObservabilityError;
use crate::events::{TraceContext, TraceEvent};
use crate::ingestion::{end_envelopes, start_envelopes};
use crate::tracer::Tracer;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub events_flushed: usize,
    pub events_failed: usize,
    pub batches_sent: usize,
    pub dropped_events: u64,
}

/// Buffers ingestion envelopes and ships them to Langfuse in batches.
///
/// The queue is bounded; when full the oldest envelope is dropped and counted.
/// A background task flushes on `flush_interval` or as soon as a batch fills.
/// Call [`LangfuseExporter::flush`] before the process exits.
#[derive(Clone)]
pub struct LangfuseExporter {
    config: LangfuseConfig,
    client: LangfuseClient,
    queue: Arc<Mutex<VecDeque<Value>>>,
    notify: Arc<Notify>,
    flush_lock: Arc<Mutex<()>>,
    dropped_events: Arc<AtomicU64>,
}

impl LangfuseExporter {
    pub fn new(config: LangfuseConfig) -> Self {
        let client = LangfuseClient::from_config(&config);
        let exporter = Self {
            config,
            client,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
            flush_lock: Arc::new(Mutex::new(())),
            dropped_events: Arc::new(AtomicU64::new(0)),
        };
        exporter.spawn_flush_loop();
        exporter
    }

    pub async fn enqueue(&self, envelopes: Vec<Value>) {
        let mut queue = self.queue.lock().await;
        for envelope in envelopes {
            if queue.len() >= self.config.queue_capacity {
                queue.pop_front();
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(envelope);
        }
        if queue.len() >= self.config.max_batch_size {
            self.notify.notify_one();
        }
    }

    pub async fn flush(&self, timeout: Duration) -> Result<FlushStats, ObservabilityError> {
        let start = Instant::now();
        let _guard = self.flush_lock.lock().await;
        let mut stats = FlushStats::default();
        loop {
            if start.elapsed() > timeout {
                let pending = self.queue.lock().await.len();
                return Err(ObservabilityError::FlushTimeout {
                    waited_ms: start.elapsed().as_millis() as u64,
                    pending,
                });
            }

            let batch = self.drain_batch().await;
            if batch.is_empty() {
                stats.dropped_events = self.dropped_events();
                return Ok(stats);
            }

            match self.client.ingest(&batch).await {
                Ok(outcome) => {
                    stats.events_flushed += outcome.succeeded;
                    stats.events_failed += outcome.failed;
                    stats.batches_sent += 1;
                }
                Err(err) => {
                    warn!("Dropping batch of {} Langfuse event(s): {}", batch.len(), err);
                    stats.events_failed += batch.len();
                }
            }
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub async fn pending_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    fn spawn_flush_loop(&self) {
        let exporter = self.clone();
        tokio::spawn(async move {
            let period = exporter.config.flush_interval;
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = exporter.notify.notified() => {}
                }
                if let Err(err) = exporter.flush(exporter.config.flush_interval).await {
                    debug!("Background Langfuse flush incomplete: {}", err);
                }
            }
        });
    }

    async fn drain_batch(&self) -> Vec<Value> {
        let mut queue = self.queue.lock().await;
        let take = queue.len().min(self.config.max_batch_size);
        queue.drain(..take).collect()
    }
}

#[async_trait]
impl Tracer for LangfuseExporter {
    async fn start(
        &self,
        event: &TraceEvent,
        context: &TraceContext,
    ) -> Result<(), ObservabilityError> {
        self.enqueue(start_envelopes(event, context)).await;
        Ok(())
    }

    async fn end(&self, event: &TraceEvent) -> Result<(), ObservabilityError> {
        self.enqueue(end_envelopes(event)).await;
        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> Result<FlushStats, ObservabilityError> {
        LangfuseExporter::flush(self, timeout).await
    }
}
