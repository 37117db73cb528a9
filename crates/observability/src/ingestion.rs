//! Mapping of observations onto Langfuse ingestion envelopes.

use crate::events::{Level, ObservationType, TraceContext, TraceEvent};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

fn timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn envelope(kind: &str, body: Value) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "type": kind,
        "timestamp": timestamp(Utc::now()),
        "body": body,
    })
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::Info => "DEFAULT",
        Level::Warning => "WARNING",
        Level::Error => "ERROR",
    }
}

fn observation_kind(observation_type: ObservationType) -> &'static str {
    match observation_type {
        ObservationType::Generation => "generation",
        ObservationType::Retrieval | ObservationType::Evaluation | ObservationType::Span => "span",
    }
}

fn metadata(event: &TraceEvent) -> Value {
    let mut metadata = event.metadata.clone();
    if event.observation_type != ObservationType::Generation {
        metadata.insert(
            "observation_type".to_string(),
            Value::String(event.observation_type.as_str().to_string()),
        );
    }
    Value::Object(metadata)
}

fn insert_some(body: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        body.insert(key.to_string(), value);
    }
}

/// Envelopes for an observation that just started. Root observations also
/// create their trace.
pub fn start_envelopes(event: &TraceEvent, context: &TraceContext) -> Vec<Value> {
    let mut envelopes = Vec::with_capacity(2);

    if context.is_root() {
        let mut trace = Map::new();
        trace.insert("id".to_string(), json!(event.trace_id));
        trace.insert(
            "name".to_string(),
            json!(context.name.clone().unwrap_or_else(|| event.name.clone())),
        );
        trace.insert("timestamp".to_string(), json!(timestamp(event.start_time)));
        trace.insert("input".to_string(), event.input.clone());
        trace.insert("tags".to_string(), json!(context.tags));
        insert_some(&mut trace, "sessionId", context.session_id.clone().map(Value::String));
        insert_some(&mut trace, "userId", context.user_id.clone().map(Value::String));
        envelopes.push(envelope("trace-create", Value::Object(trace)));
    }

    let mut body = Map::new();
    body.insert("id".to_string(), json!(event.id));
    body.insert("traceId".to_string(), json!(event.trace_id));
    body.insert("name".to_string(), json!(event.name));
    body.insert("startTime".to_string(), json!(timestamp(event.start_time)));
    body.insert("input".to_string(), event.input.clone());
    body.insert("metadata".to_string(), metadata(event));
    body.insert("level".to_string(), json!(level_name(event.level)));
    insert_some(
        &mut body,
        "parentObservationId",
        event.parent_observation_id.map(|id| json!(id)),
    );
    if event.observation_type == ObservationType::Generation {
        insert_some(&mut body, "model", event.model.clone().map(Value::String));
        insert_some(&mut body, "modelParameters", event.model_parameters.clone());
        if let Some(prompt) = &event.prompt {
            body.insert("promptName".to_string(), json!(prompt.name));
            body.insert("promptVersion".to_string(), json!(prompt.version));
        }
    }

    let kind = format!("{}-create", observation_kind(event.observation_type));
    envelopes.push(envelope(&kind, Value::Object(body)));
    envelopes
}

/// Envelopes for a finished observation. Root observations also copy their
/// output onto the trace.
pub fn end_envelopes(event: &TraceEvent) -> Vec<Value> {
    let mut envelopes = Vec::with_capacity(2);

    let mut body = Map::new();
    body.insert("id".to_string(), json!(event.id));
    body.insert("traceId".to_string(), json!(event.trace_id));
    body.insert("metadata".to_string(), metadata(event));
    body.insert("level".to_string(), json!(level_name(event.level)));
    insert_some(&mut body, "endTime", event.end_time.map(|t| json!(timestamp(t))));
    insert_some(&mut body, "output", event.output.clone());
    insert_some(
        &mut body,
        "statusMessage",
        event.status_message.clone().map(Value::String),
    );
    if event.observation_type == ObservationType::Generation {
        insert_some(&mut body, "model", event.model.clone().map(Value::String));
        insert_some(
            &mut body,
            "usage",
            event.usage.map(|usage| {
                json!({
                    "input": usage.input_tokens,
                    "output": usage.output_tokens,
                    "total": usage.total_tokens,
                    "unit": "TOKENS",
                })
            }),
        );
    }

    let kind = format!("{}-update", observation_kind(event.observation_type));
    envelopes.push(envelope(&kind, Value::Object(body)));

    if event.parent_observation_id.is_none() {
        let mut trace = Map::new();
        trace.insert("id".to_string(), json!(event.trace_id));
        insert_some(&mut trace, "output", event.output.clone());
        envelopes.push(envelope("trace-create", Value::Object(trace)));
    }

    envelopes
}

#[cfg(test)]
mod tests {
    use super::*;
    use converse_core::{PromptRef, TokenUsage};

    fn generation(context: &TraceContext) -> TraceEvent {
        TraceEvent::start(
            context,
            "Bedrock Converse",
            ObservationType::Generation,
            json!([{"role": "user", "content": "Hi"}]),
        )
        .with_model("us.amazon.nova-pro-v1:0")
        .with_model_parameters(json!({"temperature": 0.2}))
        .with_prompt(Some(PromptRef {
            name: "greeter".to_string(),
            version: 3,
        }))
    }

    #[test]
    fn should_create_trace_for_root_generation() {
        let context = TraceContext::new()
            .with_name("chat")
            .with_session("s-1")
            .with_tags(vec!["prod".to_string()]);
        let event = generation(&context);

        let envelopes = start_envelopes(&event, &context);

        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0]["type"], "trace-create");
        assert_eq!(envelopes[0]["body"]["name"], "chat");
        assert_eq!(envelopes[0]["body"]["sessionId"], "s-1");
        assert_eq!(envelopes[1]["type"], "generation-create");
        let body = &envelopes[1]["body"];
        assert_eq!(body["traceId"], json!(context.trace_id));
        assert_eq!(body["model"], "us.amazon.nova-pro-v1:0");
        assert_eq!(body["promptName"], "greeter");
        assert_eq!(body["promptVersion"], 3);
        assert!(body.get("parentObservationId").is_none());
    }

    #[test]
    fn should_nest_spans_without_trace_create() {
        let root = TraceContext::new();
        let parent = Uuid::new_v4();
        let context = root.child(parent);
        let event = TraceEvent::start(&context, "search", ObservationType::Retrieval, json!("q"));

        let envelopes = start_envelopes(&event, &context);

        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0]["type"], "span-create");
        assert_eq!(envelopes[0]["body"]["parentObservationId"], json!(parent));
        assert_eq!(
            envelopes[0]["body"]["metadata"]["observation_type"],
            "retrieval"
        );
    }

    #[test]
    fn should_report_usage_in_tokens_on_update() {
        let context = TraceContext::new();
        let mut event = generation(&context);
        event.finish_ok(json!("Hello!"), Some(TokenUsage::new(12, 4)));

        let envelopes = end_envelopes(&event);

        assert_eq!(envelopes[0]["type"], "generation-update");
        assert_eq!(
            envelopes[0]["body"]["usage"],
            json!({"input": 12, "output": 4, "total": 16, "unit": "TOKENS"})
        );
        assert_eq!(envelopes[0]["body"]["level"], "DEFAULT");
        assert_eq!(envelopes[1]["type"], "trace-create");
        assert_eq!(envelopes[1]["body"]["output"], "Hello!");
    }

    #[test]
    fn should_carry_error_status_on_update() {
        let context = TraceContext::new();
        let mut event = generation(&context);
        event.finish_err("ValidationException: bad input");

        let envelopes = end_envelopes(&event);

        assert_eq!(envelopes[0]["body"]["level"], "ERROR");
        assert_eq!(
            envelopes[0]["body"]["statusMessage"],
            "ValidationException: bad input"
        );
        assert!(envelopes[0]["body"].get("usage").is_none());
    }
}
