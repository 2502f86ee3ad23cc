//! Tools the model may call: built-ins plus whatever MCP servers expose.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ChatToolDefinition;
use crate::core::message::ToolCall;

pub mod builtin;
pub mod mcp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    Builtin,
    Mcp(String),
}

impl ToolSource {
    pub fn label(&self) -> &str {
        match self {
            ToolSource::Builtin => "built-in",
            ToolSource::Mcp(server_id) => server_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    /// JSON schema describing the arguments object.
    pub input_schema: Value,
    pub source: ToolSource,
}

impl ToolSpec {
    pub fn definition(&self) -> ChatToolDefinition {
        ChatToolDefinition::function(
            &self.name,
            self.description.as_deref(),
            self.input_schema.clone(),
        )
    }
}

/// What a tool produced. `is_error` marks results the tool itself flagged
/// as failures; they still go back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    async fn call(&self, arguments: Map<String, Value>) -> Result<ToolOutput, String>;
}

/// Result of dispatching one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub call: ToolCall,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    fn failed(call: &ToolCall, content: String) -> Self {
        Self {
            call: call.clone(),
            content,
            is_error: true,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Tool call cancelled")]
pub struct ToolCancelled;

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    validator: Option<jsonschema::Validator>,
}

/// Registry and dispatcher for every available tool.
pub struct ToolBridge {
    tools: Vec<RegisteredTool>,
    timeout: Duration,
}

impl ToolBridge {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: Vec::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Add a tool. The first tool registered under a name wins; later ones
    /// are dropped with a warning and `false` is returned.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        let spec = tool.spec();
        if self.get(&spec.name).is_some() {
            warn!(
                tool = %spec.name,
                source = spec.source.label(),
                "Ignoring tool with a name that is already registered"
            );
            return false;
        }

        let validator = match jsonschema::validator_for(&spec.input_schema) {
            Ok(validator) => Some(validator),
            Err(err) => {
                debug!(tool = %spec.name, error = %err, "Tool schema is not usable for validation");
                None
            }
        };
        self.tools.push(RegisteredTool { tool, validator });
        true
    }

    fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|entry| entry.tool.spec().name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter().map(|entry| entry.tool.spec())
    }

    pub fn names(&self) -> Vec<String> {
        self.specs().map(|spec| spec.name.clone()).collect()
    }

    /// Wire definitions for the enabled tools, in registration order.
    pub fn definitions_for(&self, enabled: &[String]) -> Vec<ChatToolDefinition> {
        self.specs()
            .filter(|spec| enabled.iter().any(|name| name == &spec.name))
            .map(ToolSpec::definition)
            .collect()
    }

    /// Validate and run a tool call under the configured timeout.
    ///
    /// Every failure becomes an error outcome for the model to read; only
    /// cancellation is reported as `Err`.
    pub async fn invoke(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<ToolOutcome, ToolCancelled> {
        let Some(entry) = self.get(&call.name) else {
            return Ok(ToolOutcome::failed(
                call,
                format!("Unknown tool: {}", call.name),
            ));
        };

        if let Some(validator) = &entry.validator {
            let instance = Value::Object(call.arguments.clone());
            let errors: Vec<String> = validator
                .iter_errors(&instance)
                .map(|err| err.to_string())
                .collect();
            if !errors.is_empty() {
                return Ok(ToolOutcome::failed(
                    call,
                    format!(
                        "Invalid arguments for tool '{}': {}",
                        call.name,
                        errors.join("; ")
                    ),
                ));
            }
        }

        debug!(tool = %call.name, arguments = %call.arguments_json(), "Invoking tool");
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ToolCancelled),
            result = tokio::time::timeout(self.timeout, entry.tool.call(call.arguments.clone())) => result,
        };

        let outcome = match result {
            Ok(Ok(output)) => ToolOutcome {
                call: call.clone(),
                content: output.content,
                is_error: output.is_error,
            },
            Ok(Err(message)) => ToolOutcome::failed(call, message),
            Err(_) => ToolOutcome::failed(
                call,
                format!(
                    "Tool '{}' timed out after {} seconds",
                    call.name,
                    self.timeout.as_secs_f64()
                ),
            ),
        };
        debug!(tool = %call.name, is_error = outcome.is_error, "Tool finished");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests;
