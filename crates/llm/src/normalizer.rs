//! Conversion from provider-agnostic messages to the Converse wire shape.

use crate::fetch::ContentFetcher;
use crate::models::{
    ContentBlock, ConversationRole, ConverseMessage, ImageBlock, ImageFormat, ImageSource,
    SystemBlock,
};
use converse_core::{ContentPart, InvokeError, Message, MessageContent, Role};
use tracing::debug;
use url::Url;

pub type Normalized = (Vec<SystemBlock>, Vec<ConverseMessage>);

/// Splits `messages` into system blocks and conversation messages.
///
/// Remote images are downloaded through `fetcher` and inlined as bytes. Any
/// fetch failure aborts the whole normalization; no partial output is returned.
pub async fn normalize(
    messages: &[Message],
    fetcher: &dyn ContentFetcher,
) -> Result<Normalized, InvokeError> {
    let mut system = Vec::new();
    let mut conversation = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            Role::System => system.push(system_block(message)?),
            Role::User | Role::Assistant => {
                let role = if message.role == Role::User {
                    ConversationRole::User
                } else {
                    ConversationRole::Assistant
                };
                let content = content_blocks(&message.content, fetcher).await?;
                conversation.push(ConverseMessage { role, content });
            }
        }
    }

    debug!(
        "Normalized {} message(s) into {} system block(s) and {} conversation message(s)",
        messages.len(),
        system.len(),
        conversation.len()
    );
    Ok((system, conversation))
}

/// Rebuilds caller-shaped messages from normalized output. Image blocks have
/// no URL to return to and are left out.
pub fn denormalize(system: &[SystemBlock], messages: &[ConverseMessage]) -> Vec<Message> {
    let mut result: Vec<Message> = system
        .iter()
        .map(|block| Message::system(block.text.clone()))
        .collect();

    for message in messages {
        let role = match message.role {
            ConversationRole::User => Role::User,
            ConversationRole::Assistant => Role::Assistant,
        };
        let parts = message
            .content
            .iter()
            .filter_map(|block| block.as_text().map(ContentPart::text))
            .collect();
        result.push(Message::with_parts(role, parts));
    }

    result
}

fn system_block(message: &Message) -> Result<SystemBlock, InvokeError> {
    let text = match &message.content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => {
            let mut texts = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    ContentPart::Text { text } => texts.push(text.as_str()),
                    ContentPart::ImageUrl { .. } => {
                        return Err(InvokeError::validation(
                            "System messages may only contain text",
                        ))
                    }
                }
            }
            texts.join("\n")
        }
    };
    Ok(SystemBlock { text })
}

async fn content_blocks(
    content: &MessageContent,
    fetcher: &dyn ContentFetcher,
) -> Result<Vec<ContentBlock>, InvokeError> {
    match content {
        MessageContent::Text(text) => Ok(vec![ContentBlock::Text(text.clone())]),
        MessageContent::Parts(parts) => {
            let mut blocks = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    ContentPart::Text { text } => blocks.push(ContentBlock::Text(text.clone())),
                    ContentPart::ImageUrl { image_url } => {
                        let format = image_format(&image_url.url)?;
                        let bytes = fetcher.fetch(&image_url.url).await?;
                        blocks.push(ContentBlock::Image(ImageBlock {
                            format,
                            source: ImageSource { bytes },
                        }));
                    }
                }
            }
            Ok(blocks)
        }
    }
}

fn image_format(raw_url: &str) -> Result<ImageFormat, InvokeError> {
    if raw_url.is_empty() {
        return Err(InvokeError::validation("Image URL cannot be empty"));
    }
    let parsed = Url::parse(raw_url)
        .map_err(|e| InvokeError::validation(format!("Invalid image URL '{}': {}", raw_url, e)))?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(InvokeError::validation(format!(
            "Invalid image URL '{}': missing host",
            raw_url
        )));
    }

    let extension = parsed.path().rsplit('.').next().unwrap_or_default();
    ImageFormat::from_extension(extension).ok_or_else(|| {
        InvokeError::content_fetch(
            raw_url,
            format!("unsupported image format '{}'", extension),
        )
    })
}
