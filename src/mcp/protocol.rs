use rust_mcp_schema::schema_utils::ServerMessage;
use rust_mcp_schema::{
    ClientCapabilities, Implementation, InitializeRequestParams, InitializeResult,
    ListPromptsResult, ListToolsResult, RpcError, LATEST_PROTOCOL_VERSION,
};
use serde_json::Value;

use crate::core::config::McpServerConfig;

/// JSON-RPC code used by servers to indicate unsupported methods.
pub const MCP_METHOD_NOT_FOUND: i64 = -32601;

pub(crate) fn client_details_for(config: &McpServerConfig) -> InitializeRequestParams {
    let protocol_version = config
        .protocol_version
        .clone()
        .unwrap_or_else(|| LATEST_PROTOCOL_VERSION.to_string());
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "hearth".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("Hearth".to_string()),
            description: Some("Hearth terminal chat client".to_string()),
            icons: Vec::new(),
            website_url: None,
        },
        meta: None,
        protocol_version,
    }
}

pub(crate) fn parse_initialize_result(message: ServerMessage) -> Result<InitializeResult, String> {
    let value = parse_response_value(message)?;
    let result =
        serde_json::from_value::<InitializeResult>(value).map_err(|err| err.to_string())?;
    if result.protocol_version.trim().is_empty() {
        return Err("Unexpected initialize response.".to_string());
    }
    Ok(result)
}

pub(crate) fn parse_list_tools(message: ServerMessage) -> Result<ListToolsResult, String> {
    parse_response(message)
}

pub(crate) fn parse_list_prompts(message: ServerMessage) -> Result<ListPromptsResult, String> {
    parse_response(message)
}

fn parse_response<T: serde::de::DeserializeOwned>(message: ServerMessage) -> Result<T, String> {
    let value = parse_response_value(message)?;
    serde_json::from_value::<T>(value).map_err(|err| err.to_string())
}

pub(crate) fn parse_response_value(message: ServerMessage) -> Result<Value, String> {
    match message {
        ServerMessage::Response(response) => {
            serde_json::to_value(&response.result).map_err(|err| err.to_string())
        }
        ServerMessage::Error(error) => Err(format_rpc_error(&error.error)),
        other => Err(format_unexpected_server_message(&other)),
    }
}

pub(crate) fn is_method_not_found(message: &ServerMessage) -> bool {
    matches!(
        message,
        ServerMessage::Error(error) if error.error.code == MCP_METHOD_NOT_FOUND
    )
}

pub(crate) fn format_unexpected_server_message(message: &ServerMessage) -> String {
    format!("Unexpected MCP server message: {message:?}")
}

pub(crate) fn format_rpc_error(error: &RpcError) -> String {
    let mut output = format!("MCP error {}: {}", error.code, error.message);
    if let Some(data) = &error.data {
        let details = data
            .get("details")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
            .or_else(|| data.as_str().map(|value| value.to_string()))
            .or_else(|| serde_json::to_string_pretty(data).ok());

        if let Some(details) = details {
            if !details.is_empty() {
                output.push('\n');
                output.push_str(&details);
            }
        }
    }
    output
}

/// Text rendering of a content block list from a tool result or prompt.
///
/// Text blocks are joined with newlines; other blocks are kept as compact
/// JSON so nothing the server sent is silently dropped.
pub(crate) fn content_to_text(content: &Value) -> String {
    let blocks: Vec<&Value> = match content {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };

    blocks
        .into_iter()
        .map(|block| match block.get("type").and_then(Value::as_str) {
            Some("text") => block
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => serde_json::to_string(block)
                .unwrap_or_else(|_| "Unsupported content.".to_string()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result of `tools/call` reduced to what gets fed back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallText {
    pub text: String,
    pub is_error: bool,
}

pub(crate) fn parse_call_tool(message: ServerMessage) -> Result<ToolCallText, String> {
    let value = parse_response_value(message)?;
    let is_error = value
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let mut text = content_to_text(value.get("content").unwrap_or(&Value::Null));
    if text.trim().is_empty() {
        if let Some(structured) = value.get("structuredContent") {
            text = serde_json::to_string(structured).map_err(|err| err.to_string())?;
        }
    }
    Ok(ToolCallText { text, is_error })
}

/// One message of a `prompts/get` result.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptText {
    pub role: String,
    pub text: String,
}

pub(crate) fn parse_get_prompt(message: ServerMessage) -> Result<Vec<PromptText>, String> {
    let value = parse_response_value(message)?;
    let Some(messages) = value.get("messages").and_then(Value::as_array) else {
        return Err("Prompt response is missing messages.".to_string());
    };
    Ok(messages
        .iter()
        .map(|message| PromptText {
            role: message
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or("user")
                .to_string(),
            text: content_to_text(message.get("content").unwrap_or(&Value::Null)),
        })
        .collect())
}
