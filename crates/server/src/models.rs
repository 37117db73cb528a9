use converse_core::InvocationRequest;
use observability::TraceContext;
use serde::{Deserialize, Serialize};

/// Body of `POST /converse`: an invocation request plus optional trace
/// attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseBody {
    #[serde(flatten)]
    pub request: InvocationRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_name: Option<String>,
}

impl ConverseBody {
    pub fn trace_context(&self) -> TraceContext {
        let mut context = TraceContext::new().with_tags(self.tags.clone());
        if let Some(name) = &self.trace_name {
            context = context.with_name(name.clone());
        }
        if let Some(session_id) = &self.session_id {
            context = context.with_session(session_id.clone());
        }
        if let Some(user_id) = &self.user_id {
            context = context.with_user(user_id.clone());
        }
        context
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
