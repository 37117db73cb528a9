//! Observed, resilient invocation of hosted models.

pub mod cache;
pub mod endpoint;
pub mod layers;
pub mod middleware;
pub mod policy;
pub mod usage;
pub mod wrapper;

pub use cache::{cache_key, ResponseCache};
pub use endpoint::ResilientEndpoint;
pub use middleware::{Call, Endpoint, Middleware, Next};
pub use policy::{validate, PiiMasker, RetryPolicy, TruncationPolicy, TruncationStage};
pub use usage::{PriceTable, UsageStats, UsageTracker};
pub use wrapper::{ObservedInvoker, ObservedInvokerBuilder};
