use crate::errors::ApiError;
use crate::models::{ConverseBody, HealthResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use converse_core::InvocationResult;
use invoker::{ObservedInvoker, UsageStats};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub invoker: Arc<ObservedInvoker>,
    /// Model used when a request leaves `modelId` empty.
    pub default_model: String,
}

impl AppState {
    pub fn new(invoker: Arc<ObservedInvoker>, default_model: impl Into<String>) -> Self {
        Self {
            invoker,
            default_model: default_model.into(),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/converse", post(converse))
        .route("/usage", get(usage))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn converse(
    State(state): State<AppState>,
    payload: Result<Json<ConverseBody>, JsonRejection>,
) -> Result<Json<InvocationResult>, ApiError> {
    let Json(body) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let context = body.trace_context();
    let mut request = body.request;
    if request.model_id.trim().is_empty() {
        request.model_id = state.default_model.clone();
    }

    info!(
        "Converse request for {} with {} message(s)",
        request.model_id,
        request.messages.len()
    );
    match state.invoker.invoke_in(request, context).await {
        Ok(result) => Ok(Json(result)),
        Err(err) => {
            warn!("Converse request failed: {}", err);
            Err(err.into())
        }
    }
}

async fn usage(State(state): State<AppState>) -> Json<UsageStats> {
    Json(state.invoker.usage_stats())
}
