use crate::models::{ToolChoiceSpec, ToolConfig, ToolSpec};
use converse_core::{ToolCall, ToolCallFunction, ToolChoice, ToolSet};
use serde_json::Value;

/// A tool invocation requested by the model, before numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Converts OpenAI-style function tools into a Converse tool configuration.
///
/// Non-function tools are skipped. Returns `None` when nothing is left to send.
pub fn to_tool_config(tool_set: &ToolSet) -> Option<ToolConfig> {
    let tools: Vec<ToolSpec> = tool_set
        .tools
        .iter()
        .filter(|tool| tool.is_function())
        .map(|tool| ToolSpec {
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            input_schema: tool.function.parameters.clone(),
        })
        .collect();

    if tools.is_empty() {
        return None;
    }

    let tool_choice = match &tool_set.choice {
        ToolChoice::Auto => None,
        ToolChoice::Any => Some(ToolChoiceSpec::Any),
        ToolChoice::Tool(name) => Some(ToolChoiceSpec::Tool(name.clone())),
    };

    Some(ToolConfig { tools, tool_choice })
}

pub fn tool_calls_from_uses(uses: Vec<ToolUse>) -> Vec<ToolCall> {
    uses.into_iter()
        .enumerate()
        .map(|(index, tool_use)| ToolCall {
            index,
            id: tool_use.id,
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: tool_use.name,
                arguments: tool_use.input.to_string(),
            },
        })
        .collect()
}
