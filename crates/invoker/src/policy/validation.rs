use converse_core::{InvocationRequest, InvokeError, Role};

/// Rejects requests that can never succeed, before any remote work is done.
pub fn validate(request: &InvocationRequest) -> Result<(), InvokeError> {
    if request.model_id.trim().is_empty() {
        return Err(InvokeError::validation("modelId cannot be empty"));
    }
    if request.messages.is_empty() {
        return Err(InvokeError::validation("messages cannot be empty"));
    }

    for (index, message) in request.messages.iter().enumerate() {
        if message.content.is_empty() {
            return Err(InvokeError::validation(format!(
                "Message {} ({}) has empty content",
                index,
                message.role.as_str()
            )));
        }
    }

    if request.messages.iter().all(|m| m.role == Role::System) {
        return Err(InvokeError::validation(
            "At least one user or assistant message is required",
        ));
    }

    let inference = &request.inference_config;
    if let Some(temperature) = inference.temperature {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(InvokeError::validation(format!(
                "temperature must be within [0, 1], got {}",
                temperature
            )));
        }
    }
    if let Some(top_p) = inference.top_p {
        if !(0.0..=1.0).contains(&top_p) {
            return Err(InvokeError::validation(format!(
                "topP must be within [0, 1], got {}",
                top_p
            )));
        }
    }
    if inference.max_tokens == Some(0) {
        return Err(InvokeError::validation("maxTokens must be greater than 0"));
    }

    if let Some(tools) = &request.tools {
        if tools
            .tools
            .iter()
            .any(|tool| tool.function.name.trim().is_empty())
        {
            return Err(InvokeError::validation("Tool names cannot be empty"));
        }
    }

    Ok(())
}
