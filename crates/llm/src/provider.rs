use crate::models::{ConverseCall, ConverseReply};
use async_trait::async_trait;
use converse_core::ProviderError;

/// A hosted model reachable through a Converse-style request/response API.
///
/// One call is one attempt; retry and fallback decisions belong to the caller.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn converse(&self, call: &ConverseCall) -> Result<ConverseReply, ProviderError>;
}
