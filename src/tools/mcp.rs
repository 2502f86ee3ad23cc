use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::mcp::client::StdioClient;
use crate::tools::{Tool, ToolOutput, ToolSource, ToolSpec};

/// A tool served by a connected MCP server.
pub struct McpTool {
    spec: ToolSpec,
    client: Arc<StdioClient>,
}

impl McpTool {
    pub fn new(client: Arc<StdioClient>, tool: &rust_mcp_schema::Tool) -> Self {
        let input_schema = serde_json::to_value(&tool.input_schema)
            .unwrap_or_else(|_| json!({"type": "object", "properties": {}}));
        Self {
            spec: ToolSpec {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema,
                source: ToolSource::Mcp(client.server_id().to_string()),
            },
            client,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<ToolOutput, String> {
        let result = self.client.call_tool(&self.spec.name, arguments).await?;
        Ok(ToolOutput {
            content: result.text,
            is_error: result.is_error,
        })
    }
}
