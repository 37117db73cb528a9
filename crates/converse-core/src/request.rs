use crate::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailConfig {
    #[serde(alias = "guardrailIdentifier")]
    pub identifier: String,
    #[serde(alias = "guardrailVersion")]
    pub version: String,
    #[serde(default)]
    pub trace: bool,
}

/// Reference to a managed prompt, attached to the generation so the
/// observability backend can link runs to prompt versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRef {
    pub name: String,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_schema")]
    pub parameters: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolFunction,
}

impl ToolDefinition {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: ToolFunction {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn is_function(&self) -> bool {
        self.kind == "function"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    #[default]
    Auto,
    Any,
    Tool(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSet {
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub choice: ToolChoice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON-encoded arguments, as OpenAI-style callers expect them.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub index: usize,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub inference_config: InferenceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrail_config: Option<GuardrailConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_model_request_fields: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptRef>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl InvocationRequest {
    pub fn new(model_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            model_id: model_id.into(),
            ..Self::default()
        }
    }

    pub fn with_inference_config(mut self, inference_config: InferenceConfig) -> Self {
        self.inference_config = inference_config;
        self
    }

    pub fn with_guardrail(mut self, guardrail: GuardrailConfig) -> Self {
        self.guardrail_config = Some(guardrail);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>, choice: ToolChoice) -> Self {
        self.tools = Some(ToolSet { tools, choice });
        self
    }

    pub fn with_prompt(mut self, prompt: PromptRef) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Flattened view of every knob that shapes the generation, recorded on
    /// the trace next to the model id.
    pub fn model_parameters(&self) -> Value {
        let mut params = Map::new();
        if let Ok(Value::Object(inference)) = serde_json::to_value(&self.inference_config) {
            params.extend(inference);
        }
        if let Some(Value::Object(extra)) = &self.additional_model_request_fields {
            params.extend(extra.clone());
        }
        if let Some(guardrail) = &self.guardrail_config {
            params.insert(
                "guardrailIdentifier".to_string(),
                Value::String(guardrail.identifier.clone()),
            );
            params.insert(
                "guardrailVersion".to_string(),
                Value::String(guardrail.version.clone()),
            );
        }
        Value::Object(params)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostRecord {
    pub request_cost: f64,
    pub cumulative_cost: f64,
    pub total_requests: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub text: String,
    pub usage: TokenUsage,
    pub raw: Value,
    pub model_id: String,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub fallback_used: bool,
    /// Context reduction applied before the successful attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostRecord>,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_keep_total_equal_to_input_plus_output() {
        let usage = TokenUsage::new(120, 30);
        assert_eq!(usage.total_tokens, 150);
    }

    #[test]
    fn should_deserialize_camel_case_request() {
        let json = r#"{
            "messages": [{"role": "user", "content": "Hi"}],
            "modelId": "us.amazon.nova-pro-v1:0",
            "inferenceConfig": {"maxTokens": 256, "temperature": 0.2, "topP": 0.9, "stopSequences": ["END"]},
            "guardrailConfig": {"guardrailIdentifier": "gr-1", "guardrailVersion": "2", "trace": true},
            "metadata": {"team": "search"}
        }"#;

        let request: InvocationRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.model_id, "us.amazon.nova-pro-v1:0");
        assert_eq!(request.inference_config.max_tokens, Some(256));
        assert_eq!(request.inference_config.top_p, Some(0.9));
        assert_eq!(request.inference_config.stop_sequences, vec!["END"]);
        let guardrail = request.guardrail_config.unwrap();
        assert_eq!(guardrail.identifier, "gr-1");
        assert!(guardrail.trace);
        assert_eq!(request.metadata["team"], json!("search"));
    }

    #[test]
    fn should_merge_model_parameters() {
        let mut request = InvocationRequest::new("model", vec![Message::user("Hi")])
            .with_inference_config(InferenceConfig {
                max_tokens: Some(100),
                temperature: Some(0.5),
                ..InferenceConfig::default()
            })
            .with_guardrail(GuardrailConfig {
                identifier: "gr".to_string(),
                version: "1".to_string(),
                trace: false,
            });
        request.additional_model_request_fields = Some(json!({"top_k": 50}));

        let params = request.model_parameters();

        assert_eq!(params["maxTokens"], json!(100));
        assert_eq!(params["temperature"], json!(0.5));
        assert_eq!(params["top_k"], json!(50));
        assert_eq!(params["guardrailIdentifier"], json!("gr"));
        assert!(params.get("topP").is_none());
    }

    #[test]
    fn should_parse_tool_choice_variants() {
        let auto: ToolChoice = serde_json::from_str("\"auto\"").unwrap();
        let any: ToolChoice = serde_json::from_str("\"any\"").unwrap();
        let named: ToolChoice = serde_json::from_str(r#"{"tool":"get_weather"}"#).unwrap();

        assert_eq!(auto, ToolChoice::Auto);
        assert_eq!(any, ToolChoice::Any);
        assert_eq!(named, ToolChoice::Tool("get_weather".to_string()));
    }

    #[test]
    fn should_deserialize_openai_style_tool_definition() {
        let json = r#"{
            "type": "function",
            "function": {
                "name": "get_weather",
                "description": "Current weather for a city",
                "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
            }
        }"#;
        let tool: ToolDefinition = serde_json::from_str(json).unwrap();

        assert!(tool.is_function());
        assert_eq!(tool.function.name, "get_weather");
        assert_eq!(tool.function.parameters["properties"]["city"]["type"], json!("string"));
    }
}
