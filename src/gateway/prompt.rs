//! Rendering known tools for LLM consumption.

use serde_json::{json, Map, Value};

use super::types::ServedTool;
use crate::registry::Tool;

/// Tools listed in the prompt context.
pub const MAX_PROMPT_TOOLS: usize = 20;
/// Parameters listed per tool in the prompt context.
pub const MAX_PROMPT_PARAMS: usize = 5;
/// Tools exposed as function specs.
pub const MAX_FUNCTION_TOOLS: usize = 10;

/// Prefix for function names, keeping them apart from built-in functions.
pub const FUNCTION_PREFIX: &str = "mcp_";

/// Markdown summary of `tools` for a system prompt. Empty when there are none.
pub fn render_tool_context(tools: &[ServedTool]) -> String {
    if tools.is_empty() {
        return String::new();
    }

    let mut lines = vec![
        "## Available MCP Tools".to_string(),
        "You have access to the following tools via the MCP protocol:".to_string(),
        String::new(),
    ];

    for served in tools.iter().take(MAX_PROMPT_TOOLS) {
        let tool = &served.tool;
        let description = if tool.description.is_empty() {
            "No description"
        } else {
            &tool.description
        };
        lines.push(format!("- **{}** ({}): {description}", tool.name, served.server));
        for param in tool.parameters.iter().take(MAX_PROMPT_PARAMS) {
            let required = if param.required { "required" } else { "optional" };
            lines.push(format!(
                "  - `{}` ({}, {required})",
                param.name, param.param_type
            ));
        }
    }

    lines.push(String::new());
    lines.push("To use a tool, ask me to invoke it with the required parameters.".to_string());
    lines.join("\n")
}

/// An OpenAI function-calling spec for one tool.
pub fn function_spec(tool: &Tool) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &tool.parameters {
        let param_type = match param.param_type.as_str() {
            "" | "any" => "string",
            other => other,
        };
        properties.insert(
            param.name.clone(),
            json!({ "type": param_type, "description": param.description }),
        );
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    let description = if tool.description.is_empty() {
        format!("MCP tool: {}", tool.name)
    } else {
        tool.description.clone()
    };

    json!({
        "type": "function",
        "function": {
            "name": format!("{FUNCTION_PREFIX}{}", tool.name),
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        }
    })
}

/// Function specs for the first [`MAX_FUNCTION_TOOLS`] tools.
pub fn function_specs<'a>(tools: impl IntoIterator<Item = &'a Tool>) -> Vec<Value> {
    tools
        .into_iter()
        .take(MAX_FUNCTION_TOOLS)
        .map(function_spec)
        .collect()
}
