//! Wire payloads for the Ollama HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::message::{Message, Role, ToolCall};
use crate::core::parameters::ModelParameters;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChatToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
            images: message.images.clone(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(ChatToolCall::from)
                .collect(),
            tool_name: message.tool_name.clone(),
        }
    }
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self::from(&Message::new(Role::System, content))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatToolCall {
    pub function: ChatToolCallFunction,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatToolCallFunction {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_arguments")]
    pub arguments: Map<String, Value>,
}

/// Some servers send tool arguments as a JSON-encoded string rather than an
/// object; accept both.
fn deserialize_arguments<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::String(text) if text.trim().is_empty() => Ok(Map::new()),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(serde::de::Error::custom(format!(
                "tool arguments are not a JSON object: {text}"
            ))),
        },
        other => Err(serde::de::Error::custom(format!(
            "tool arguments are not a JSON object: {other}"
        ))),
    }
}

impl From<&ToolCall> for ChatToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            function: ChatToolCallFunction {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

impl From<ChatToolCall> for ToolCall {
    fn from(call: ChatToolCall) -> Self {
        ToolCall::new(call.function.name, call.function.arguments)
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ChatToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatToolFunction,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ChatToolFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

impl ChatToolDefinition {
    pub fn function(name: &str, description: Option<&str>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: ChatToolFunction {
                name: name.to_string(),
                description: description.map(str::to_string),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
    pub keep_alive: String,
}

/// One NDJSON line from a streamed `/api/chat` response.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ChatChunk {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub total_duration: Option<u64>,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub eval_duration: Option<u64>,
}

impl ChatChunk {
    pub fn content(&self) -> &str {
        self.message
            .as_ref()
            .map(|message| message.content.as_str())
            .unwrap_or("")
    }

    pub fn tool_calls(&self) -> &[ChatToolCall] {
        self.message
            .as_ref()
            .map(|message| message.tool_calls.as_slice())
            .unwrap_or(&[])
    }

    /// Generation speed reported on the final chunk.
    pub fn tokens_per_second(&self) -> Option<f64> {
        let count = self.eval_count? as f64;
        let nanos = self.eval_duration? as f64;
        (nanos > 0.0).then(|| count / (nanos / 1_000_000_000.0))
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct ModelDetails {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub parameter_size: Option<String>,
    #[serde(default)]
    pub quantization_level: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub details: Option<ModelDetails>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ModelsResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

#[derive(Serialize)]
pub struct ModelRequest<'a> {
    pub model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct ShowResponse {
    #[serde(default)]
    pub modelfile: Option<String>,
    #[serde(default)]
    pub parameters: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub details: Option<ModelDetails>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl ShowResponse {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }

    /// Options baked into the model's Modelfile.
    pub fn default_parameters(&self) -> Result<ModelParameters, String> {
        match self.parameters.as_deref() {
            Some(text) => ModelParameters::parse(text),
            None => Ok(ModelParameters::default()),
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
}

impl PullProgress {
    pub fn percent(&self) -> Option<u8> {
        let total = self.total.filter(|total| *total > 0)?;
        let completed = self.completed.unwrap_or(0).min(total);
        Some(((completed * 100) / total) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_request_omits_empty_optionals() {
        let request = ChatRequest {
            model: "llama3.2".to_string(),
            messages: vec![ChatMessage::system("be brief")],
            stream: true,
            tools: Vec::new(),
            format: None,
            options: Map::new(),
            keep_alive: "5m".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "llama3.2",
                "messages": [{"role": "system", "content": "be brief"}],
                "stream": true,
                "keep_alive": "5m"
            })
        );
    }

    #[test]
    fn chunk_parses_tool_calls_with_string_arguments() {
        let chunk: ChatChunk = serde_json::from_str(
            r#"{"model":"m","message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"shell","arguments":"{\"command\":\"ls\"}"}}]},"done":false}"#,
        )
        .unwrap();
        let calls = chunk.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "shell");
        assert_eq!(calls[0].function.arguments.get("command"), Some(&json!("ls")));
    }

    #[test]
    fn final_chunk_reports_speed() {
        let chunk: ChatChunk = serde_json::from_str(
            r#"{"done":true,"done_reason":"stop","eval_count":50,"eval_duration":500000000}"#,
        )
        .unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.content(), "");
        assert_eq!(chunk.tokens_per_second(), Some(100.0));
    }

    #[test]
    fn show_exposes_modelfile_defaults_and_capabilities() {
        let show: ShowResponse = serde_json::from_value(json!({
            "parameters": "num_ctx                        8192\nstop                           \"<|start_header_id|>\"\nstop                           \"<|eot_id|>\"\ntemperature 0.6",
            "capabilities": ["completion", "tools"]
        }))
        .unwrap();
        assert!(show.supports("tools"));
        assert!(!show.supports("vision"));

        let defaults = show.default_parameters().unwrap();
        assert_eq!(
            serde_json::to_value(&defaults).unwrap(),
            json!({
                "num_ctx": 8192,
                "stop": ["<|start_header_id|>", "<|eot_id|>"],
                "temperature": 0.6
            })
        );
        assert!(ShowResponse::default().default_parameters().unwrap().is_empty());
    }

    #[test]
    fn pull_progress_percent() {
        let progress = PullProgress {
            status: "downloading".to_string(),
            digest: None,
            total: Some(200),
            completed: Some(50),
        };
        assert_eq!(progress.percent(), Some(25));
    }
}
