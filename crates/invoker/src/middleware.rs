//! Continuation-style middleware around a single model invocation.
//!
//! Each layer receives the call descriptor and a [`Next`] handle. It may
//! rewrite the call, short-circuit with its own result, or run the rest of
//! the chain and post-process what comes back. Tracing context travels inside
//! the descriptor; nothing is read from global state.

use async_trait::async_trait;
use converse_core::{InvocationRequest, InvocationResult, InvokeError};
use observability::TraceContext;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Call {
    pub request: InvocationRequest,
    pub context: TraceContext,
}

impl Call {
    pub fn new(request: InvocationRequest, context: TraceContext) -> Self {
        Self { request, context }
    }
}

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, call: Call, next: Next<'_>) -> Result<InvocationResult, InvokeError>;
}

/// Terminal step of the chain.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, call: Call) -> Result<InvocationResult, InvokeError>;
}

/// The remainder of the chain after the current layer.
pub struct Next<'a> {
    layers: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub fn new(layers: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self { layers, endpoint }
    }

    pub async fn run(self, call: Call) -> Result<InvocationResult, InvokeError> {
        match self.layers.split_first() {
            Some((layer, rest)) => {
                layer
                    .handle(
                        call,
                        Next {
                            layers: rest,
                            endpoint: self.endpoint,
                        },
                    )
                    .await
            }
            None => self.endpoint.call(call).await,
        }
    }
}
