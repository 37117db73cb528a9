pub mod bedrock;
pub mod fetch;
pub mod models;
pub mod normalizer;
pub mod provider;
pub mod tools;

pub use bedrock::BedrockClient;
pub use fetch::{ContentFetcher, HttpContentFetcher};
pub use models::{
    BedrockSettings, ContentBlock, ConversationRole, ConverseCall, ConverseMessage, ConverseReply,
    ImageBlock, ImageFormat, ImageSource, SystemBlock, ToolChoiceSpec, ToolConfig, ToolSpec,
};
pub use normalizer::{denormalize, normalize, Normalized};
pub use provider::ModelProvider;
pub use tools::{to_tool_config, tool_calls_from_uses, ToolUse};
