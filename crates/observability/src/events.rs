use chrono::{DateTime, Utc};
use converse_core::{PromptRef, TokenUsage};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationType {
    Generation,
    Retrieval,
    Evaluation,
    Span,
}

impl ObservationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationType::Generation => "generation",
            ObservationType::Retrieval => "retrieval",
            ObservationType::Evaluation => "evaluation",
            ObservationType::Span => "span",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// Where an observation sits in a trace. Passed explicitly down the call
/// chain; there is no ambient "current observation".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: Uuid,
    pub parent_observation_id: Option<Uuid>,
    pub name: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub tags: Vec<String>,
}

impl TraceContext {
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            parent_observation_id: None,
            name: None,
            session_id: None,
            user_id: None,
            tags: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Context for observations nested under `observation_id`.
    pub fn child(&self, observation_id: Uuid) -> Self {
        Self {
            parent_observation_id: Some(observation_id),
            ..self.clone()
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_observation_id.is_none()
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub id: Uuid,
    pub trace_id: Uuid,
    pub parent_observation_id: Option<Uuid>,
    pub name: String,
    pub observation_type: ObservationType,
    pub input: Value,
    pub output: Option<Value>,
    pub metadata: Map<String, Value>,
    pub model: Option<String>,
    pub model_parameters: Option<Value>,
    pub usage: Option<TokenUsage>,
    pub prompt: Option<PromptRef>,
    pub level: Level,
    pub status_message: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TraceEvent {
    pub fn start(
        context: &TraceContext,
        name: impl Into<String>,
        observation_type: ObservationType,
        input: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trace_id: context.trace_id,
            parent_observation_id: context.parent_observation_id,
            name: name.into(),
            observation_type,
            input,
            output: None,
            metadata: Map::new(),
            model: None,
            model_parameters: None,
            usage: None,
            prompt: None,
            level: Level::Info,
            status_message: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_model_parameters(mut self, parameters: Value) -> Self {
        self.model_parameters = Some(parameters);
        self
    }

    pub fn with_prompt(mut self, prompt: Option<PromptRef>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn finish_ok(&mut self, output: Value, usage: Option<TokenUsage>) {
        self.output = Some(output);
        self.usage = usage;
        self.level = Level::Info;
        self.end_time = Some(self.end_now());
    }

    pub fn finish_err(&mut self, message: impl Into<String>) {
        self.level = Level::Error;
        self.status_message = Some(message.into());
        self.end_time = Some(self.end_now());
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }

    // Wall clocks can step backwards; an end never precedes its start.
    fn end_now(&self) -> DateTime<Utc> {
        Utc::now().max(self.start_time)
    }
}
