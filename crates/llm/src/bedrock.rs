use crate::models::{
    BedrockSettings, ContentBlock as WireBlock, ConversationRole as WireRole, ConverseCall,
    ConverseMessage, ConverseReply, ImageFormat as WireImageFormat, SystemBlock, ToolChoiceSpec,
    ToolConfig,
};
use crate::provider::ModelProvider;
use crate::tools::{tool_calls_from_uses, ToolUse};
use anyhow::Result;
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_bedrockruntime::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::{converse::ConverseOutput as ConverseResponse, RequestId},
    primitives::Blob,
    types::{
        AnyToolChoice, ContentBlock, ConversationRole, ConverseOutput, GuardrailConfiguration,
        GuardrailTrace, ImageBlock, ImageFormat, ImageSource, InferenceConfiguration, Message,
        SpecificToolChoice, SystemContentBlock, Tool, ToolChoice, ToolConfiguration,
        ToolInputSchema, ToolSpecification,
    },
    Client,
};
use aws_smithy_types::{Document, Number};
use converse_core::{GuardrailConfig, InferenceConfig, ProviderError, TokenUsage};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};

const CLIENT_VALIDATION: &str = "ClientValidationError";

pub struct BedrockClient {
    client: Client,
    settings: BedrockSettings,
}

impl BedrockClient {
    pub async fn new(settings: BedrockSettings) -> Result<Self> {
        info!("Initializing BedrockClient for region {}", settings.region);
        // Retries are owned by the invocation wrapper, so the SDK must not retry on its own.
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.region.clone()))
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(settings.timeout_secs))
                    .build(),
            )
            .load()
            .await;

        let client = Client::new(&aws_config);

        Ok(Self { client, settings })
    }

    pub fn from_client(client: Client, settings: BedrockSettings) -> Self {
        Self { client, settings }
    }

    pub fn region(&self) -> &str {
        &self.settings.region
    }
}

#[async_trait]
impl ModelProvider for BedrockClient {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn converse(&self, call: &ConverseCall) -> Result<ConverseReply, ProviderError> {
        let system = to_system_blocks(&call.system);
        let messages = call
            .messages
            .iter()
            .map(to_sdk_message)
            .collect::<Result<Vec<_>, _>>()?;
        let guardrail = call
            .guardrail_config
            .as_ref()
            .map(to_guardrail_configuration);
        let tool_config = call
            .tool_config
            .as_ref()
            .map(to_tool_configuration)
            .transpose()?;

        info!("Sending request to Bedrock model: {}", call.model_id);
        let response = self
            .client
            .converse()
            .model_id(&call.model_id)
            .set_system(system)
            .set_messages(Some(messages))
            .inference_config(to_inference_configuration(&call.inference_config)?)
            .set_guardrail_config(guardrail)
            .set_tool_config(tool_config)
            .set_additional_model_request_fields(
                call.additional_model_request_fields
                    .as_ref()
                    .map(json_to_document),
            )
            .send()
            .await
            .map_err(|e| {
                let mapped = map_sdk_error(e);
                error!("Bedrock converse error: {}", mapped);
                mapped
            })?;

        info!("Received response from Bedrock model: {}", call.model_id);
        Ok(to_reply(&response))
    }
}

fn map_sdk_error<E, R>(err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if let Some(service_error) = err.as_service_error() {
        let code = service_error.code().unwrap_or("UnknownServiceError").to_string();
        let message = service_error
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| service_error.to_string());
        return ProviderError::new(code, message);
    }

    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ProviderError::unavailable(message)
        }
        _ => ProviderError::new(CLIENT_VALIDATION, message),
    }
}

fn to_system_blocks(blocks: &[SystemBlock]) -> Option<Vec<SystemContentBlock>> {
    if blocks.is_empty() {
        return None;
    }
    Some(
        blocks
            .iter()
            .map(|block| SystemContentBlock::Text(block.text.clone()))
            .collect(),
    )
}

fn to_sdk_message(message: &ConverseMessage) -> Result<Message, ProviderError> {
    let role = match message.role {
        WireRole::User => ConversationRole::User,
        WireRole::Assistant => ConversationRole::Assistant,
    };
    let content = message
        .content
        .iter()
        .map(to_sdk_block)
        .collect::<Result<Vec<_>, _>>()?;

    Message::builder()
        .role(role)
        .set_content(Some(content))
        .build()
        .map_err(|e| client_error("Failed to build Bedrock message", e))
}

fn to_sdk_block(block: &WireBlock) -> Result<ContentBlock, ProviderError> {
    match block {
        WireBlock::Text(text) => Ok(ContentBlock::Text(text.clone())),
        WireBlock::Image(image) => {
            let format = match image.format {
                WireImageFormat::Png => ImageFormat::Png,
                WireImageFormat::Jpeg => ImageFormat::Jpeg,
                WireImageFormat::Gif => ImageFormat::Gif,
                WireImageFormat::Webp => ImageFormat::Webp,
            };
            let image = ImageBlock::builder()
                .format(format)
                .source(ImageSource::Bytes(Blob::new(image.source.bytes.clone())))
                .build()
                .map_err(|e| client_error("Failed to build image block", e))?;
            Ok(ContentBlock::Image(image))
        }
    }
}

fn to_inference_configuration(
    config: &InferenceConfig,
) -> Result<InferenceConfiguration, ProviderError> {
    let max_tokens = config
        .max_tokens
        .map(i32::try_from)
        .transpose()
        .map_err(|e| client_error("maxTokens out of range", e))?;
    let stop_sequences = if config.stop_sequences.is_empty() {
        None
    } else {
        Some(config.stop_sequences.clone())
    };
    Ok(InferenceConfiguration::builder()
        .set_max_tokens(max_tokens)
        .set_temperature(config.temperature)
        .set_top_p(config.top_p)
        .set_stop_sequences(stop_sequences)
        .build())
}

fn to_guardrail_configuration(config: &GuardrailConfig) -> GuardrailConfiguration {
    let trace = if config.trace {
        GuardrailTrace::Enabled
    } else {
        GuardrailTrace::Disabled
    };
    GuardrailConfiguration::builder()
        .guardrail_identifier(&config.identifier)
        .guardrail_version(&config.version)
        .trace(trace)
        .build()
}

fn to_tool_configuration(config: &ToolConfig) -> Result<ToolConfiguration, ProviderError> {
    let tools = config
        .tools
        .iter()
        .map(|spec| {
            let description = if spec.description.is_empty() {
                None
            } else {
                Some(spec.description.clone())
            };
            ToolSpecification::builder()
                .name(&spec.name)
                .set_description(description)
                .input_schema(ToolInputSchema::Json(json_to_document(&spec.input_schema)))
                .build()
                .map(Tool::ToolSpec)
                .map_err(|e| client_error("Failed to build tool specification", e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let tool_choice = match &config.tool_choice {
        None => None,
        Some(ToolChoiceSpec::Any) => Some(ToolChoice::Any(AnyToolChoice::builder().build())),
        Some(ToolChoiceSpec::Tool(name)) => Some(ToolChoice::Tool(
            SpecificToolChoice::builder()
                .name(name)
                .build()
                .map_err(|e| client_error("Failed to build tool choice", e))?,
        )),
    };

    ToolConfiguration::builder()
        .set_tools(Some(tools))
        .set_tool_choice(tool_choice)
        .build()
        .map_err(|e| client_error("Failed to build tool configuration", e))
}

fn client_error(context: &str, err: impl std::fmt::Display) -> ProviderError {
    ProviderError::new(CLIENT_VALIDATION, format!("{}: {}", context, err))
}

fn to_reply(response: &ConverseResponse) -> ConverseReply {
    let request_id = response.request_id().map(str::to_string);
    let mut text: Option<String> = None;
    let mut uses = Vec::new();
    let mut raw_content = Vec::new();

    if let Some(ConverseOutput::Message(message)) = response.output() {
        for block in message.content() {
            match block {
                ContentBlock::Text(block_text) => {
                    raw_content.push(json!({ "text": block_text }));
                    if text.is_none() {
                        text = Some(block_text.clone());
                    }
                }
                ContentBlock::ToolUse(tool_use) => {
                    let input = document_to_json(tool_use.input());
                    raw_content.push(json!({
                        "toolUse": {
                            "toolUseId": tool_use.tool_use_id(),
                            "name": tool_use.name(),
                            "input": input,
                        }
                    }));
                    uses.push(ToolUse {
                        id: tool_use.tool_use_id().to_string(),
                        name: tool_use.name().to_string(),
                        input,
                    });
                }
                other => debug!("Ignoring unsupported output block: {:?}", other),
            }
        }
    }

    let usage = response
        .usage()
        .map(|usage| {
            TokenUsage::new(
                usage.input_tokens().max(0) as u64,
                usage.output_tokens().max(0) as u64,
            )
        })
        .unwrap_or_default();
    let latency_ms = response
        .metrics()
        .map(|metrics| metrics.latency_ms().max(0) as u64);
    let stop_reason = response.stop_reason().as_str().to_string();

    let raw = json!({
        "output": { "message": { "role": "assistant", "content": raw_content } },
        "stopReason": stop_reason,
        "usage": {
            "inputTokens": usage.input_tokens,
            "outputTokens": usage.output_tokens,
            "totalTokens": response.usage().map(|u| u.total_tokens()).unwrap_or_default(),
        },
        "metrics": { "latencyMs": latency_ms },
        "ResponseMetadata": { "RequestId": request_id },
    });

    ConverseReply {
        text: text.unwrap_or_default(),
        tool_calls: tool_calls_from_uses(uses),
        stop_reason: Some(stop_reason),
        usage,
        request_id,
        latency_ms,
        raw,
    }
}

pub(crate) fn json_to_document(value: &Value) -> Document {
    match value {
        Value::Null => Document::Null,
        Value::Bool(flag) => Document::Bool(*flag),
        Value::Number(number) => {
            if let Some(unsigned) = number.as_u64() {
                Document::Number(Number::PosInt(unsigned))
            } else if let Some(signed) = number.as_i64() {
                Document::Number(Number::NegInt(signed))
            } else {
                Document::Number(Number::Float(number.as_f64().unwrap_or_default()))
            }
        }
        Value::String(text) => Document::String(text.clone()),
        Value::Array(items) => Document::Array(items.iter().map(json_to_document).collect()),
        Value::Object(map) => Document::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), json_to_document(value)))
                .collect(),
        ),
    }
}

pub(crate) fn document_to_json(document: &Document) -> Value {
    match document {
        Document::Null => Value::Null,
        Document::Bool(flag) => Value::Bool(*flag),
        Document::Number(Number::PosInt(unsigned)) => Value::from(*unsigned),
        Document::Number(Number::NegInt(signed)) => Value::from(*signed),
        Document::Number(Number::Float(float)) => serde_json::Number::from_f64(*float)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Document::String(text) => Value::String(text.clone()),
        Document::Array(items) => Value::Array(items.iter().map(document_to_json).collect()),
        Document::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), document_to_json(value)))
                .collect(),
        ),
    }
}
