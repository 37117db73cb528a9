use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod request;

pub use error::{InvokeError, ProviderError};
pub use request::{
    CostRecord, GuardrailConfig, InferenceConfig, InvocationRequest, InvocationResult, PromptRef,
    TokenUsage, ToolCall, ToolCallFunction, ToolChoice, ToolDefinition, ToolFunction, ToolSet,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One element of a multi-part message body, in the provider-agnostic
/// (OpenAI-style) shape callers usually already have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }

    pub fn has_images(&self) -> bool {
        match self {
            MessageContent::Text(_) => false,
            MessageContent::Parts(parts) => parts
                .iter()
                .any(|part| matches!(part, ContentPart::ImageUrl { .. })),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
        }
    }

    /// Character count over every text fragment; images count as zero.
    pub fn text_len(&self) -> usize {
        match &self.content {
            MessageContent::Text(text) => text.chars().count(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => text.chars().count(),
                    ContentPart::ImageUrl { .. } => 0,
                })
                .sum(),
        }
    }

    /// Applies `f` to every text fragment in place.
    pub fn map_texts<F>(&mut self, mut f: F)
    where
        F: FnMut(&str) -> String,
    {
        match &mut self.content {
            MessageContent::Text(text) => *text = f(text),
            MessageContent::Parts(parts) => {
                for part in parts.iter_mut() {
                    if let ContentPart::Text { text } = part {
                        *text = f(text);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_role_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn should_reject_unknown_role() {
        let result: Result<Message, _> =
            serde_json::from_str(r#"{"role":"tool","content":"hi"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn should_deserialize_plain_text_content() {
        let message: Message =
            serde_json::from_str(r#"{"role":"user","content":"Hello"}"#).unwrap();
        assert_eq!(message, Message::user("Hello"));
    }

    #[test]
    fn should_deserialize_mixed_parts() {
        let json = r#"{
            "role": "user",
            "content": [
                {"type": "text", "text": "What is in this picture?"},
                {"type": "image_url", "image_url": {"url": "https://example.com/cat.jpg"}}
            ]
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();

        assert_eq!(
            message.content,
            MessageContent::Parts(vec![
                ContentPart::text("What is in this picture?"),
                ContentPart::image_url("https://example.com/cat.jpg"),
            ])
        );
        assert!(message.content.has_images());
    }

    #[test]
    fn should_reject_null_content() {
        let result: Result<Message, _> =
            serde_json::from_str(r#"{"role":"user","content":null}"#);
        assert!(result.is_err());
    }

    #[test]
    fn should_count_text_characters_only() {
        let message = Message::with_parts(
            Role::User,
            vec![
                ContentPart::text("abc"),
                ContentPart::image_url("https://example.com/a.png"),
                ContentPart::text("dé"),
            ],
        );
        assert_eq!(message.text_len(), 5);
    }

    #[test]
    fn should_map_every_text_fragment() {
        let mut message = Message::with_parts(
            Role::User,
            vec![
                ContentPart::text("one"),
                ContentPart::image_url("https://example.com/a.png"),
                ContentPart::text("two"),
            ],
        );
        message.map_texts(|text| text.to_uppercase());

        assert_eq!(
            message.content,
            MessageContent::Parts(vec![
                ContentPart::text("ONE"),
                ContentPart::image_url("https://example.com/a.png"),
                ContentPart::text("TWO"),
            ])
        );
    }
}
