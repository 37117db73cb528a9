pub mod masking;
pub mod retry;
pub mod truncation;
pub mod validation;

pub use masking::PiiMasker;
pub use retry::RetryPolicy;
pub use truncation::{TruncationPolicy, TruncationStage};
pub use validation::validate;
