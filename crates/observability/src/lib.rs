//! Observation model and Langfuse export for model invocations.
//!
//! Invocations and auxiliary steps are described as [`TraceEvent`]s and handed
//! to a [`Tracer`]. [`LangfuseExporter`] batches them onto the Langfuse
//! ingestion API; [`NoopTracer`] and [`RecordingTracer`] cover local runs and
//! tests.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod exporter;
pub mod ingestion;
pub mod tracer;

pub use client::{IngestionOutcome, LangfuseClient};
pub use config::LangfuseConfig;
pub use error::ObservabilityError;
pub use events::{Level, ObservationType, TraceContext, TraceEvent};
pub use exporter::{FlushStats, LangfuseExporter};
pub use tracer::{observe, NoopTracer, Recorded, RecordingTracer, Tracer};
