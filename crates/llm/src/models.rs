use converse_core::{GuardrailConfig, InferenceConfig, TokenUsage, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemBlock {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Maps a file extension to a Converse image format; `jpg` is accepted as `jpeg`.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "gif" => Some(ImageFormat::Gif),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBlock {
    pub format: ImageFormat,
    pub source: ImageSource,
}

/// One content block in the Converse wire shape: `{"text": ..}` or `{"image": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentBlock {
    Text(String),
    Image(ImageBlock),
}

impl ContentBlock {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text(text) => Some(text),
            ContentBlock::Image(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverseMessage {
    pub role: ConversationRole,
    pub content: Vec<ContentBlock>,
}

impl ConverseMessage {
    pub fn text_len(&self) -> usize {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .map(|text| text.chars().count())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolChoiceSpec {
    Any,
    Tool(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub tools: Vec<ToolSpec>,
    pub tool_choice: Option<ToolChoiceSpec>,
}

/// Everything a provider needs for one attempt, already in wire shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConverseCall {
    pub model_id: String,
    pub system: Vec<SystemBlock>,
    pub messages: Vec<ConverseMessage>,
    pub inference_config: InferenceConfig,
    pub guardrail_config: Option<GuardrailConfig>,
    pub tool_config: Option<ToolConfig>,
    pub additional_model_request_fields: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConverseReply {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
    pub request_id: Option<String>,
    pub latency_ms: Option<u64>,
    pub raw: Value,
}

impl ConverseReply {
    pub fn text(text: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
            stop_reason: Some("end_turn".to_string()),
            usage,
            request_id: None,
            latency_ms: None,
            raw: Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BedrockSettings {
    pub region: String,
    pub timeout_secs: u64,
}

impl Default for BedrockSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            timeout_secs: 60,
        }
    }
}
