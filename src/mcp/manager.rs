use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::core::config::{Config, McpServerConfig};
use crate::mcp::client::StdioClient;
use crate::mcp::prompt_args::{parse_prompt_args, validate_prompt_args};
use crate::mcp::protocol::PromptText;
use crate::tools::mcp::McpTool;
use crate::tools::ToolBridge;

/// A connected, initialized MCP server and what it offers.
pub struct McpServer {
    pub config: McpServerConfig,
    pub client: Arc<StdioClient>,
    pub tools: Vec<rust_mcp_schema::Tool>,
    pub prompts: Vec<rust_mcp_schema::Prompt>,
}

impl McpServer {
    pub fn prompt(&self, name: &str) -> Option<&rust_mcp_schema::Prompt> {
        self.prompts.iter().find(|prompt| prompt.name == name)
    }
}

/// Owns every MCP server connection for the life of a chat.
#[derive(Default)]
pub struct McpManager {
    servers: Vec<McpServer>,
    failures: Vec<(String, String)>,
}

impl McpManager {
    /// Start and initialize every enabled server concurrently. Servers that
    /// fail are recorded and skipped.
    pub async fn connect_all(config: &Config) -> Self {
        let attempts = config.enabled_mcp_servers().map(|server| async move {
            let result = connect_server(server).await;
            (server.id.clone(), result)
        });

        let mut manager = Self::default();
        for (id, result) in join_all(attempts).await {
            match result {
                Ok(server) => manager.servers.push(server),
                Err(err) => {
                    warn!(server_id = %id, error = %err, "MCP server failed to start");
                    manager.failures.push((id, err));
                }
            }
        }
        manager
    }

    pub fn servers(&self) -> &[McpServer] {
        &self.servers
    }

    pub fn failures(&self) -> &[(String, String)] {
        &self.failures
    }

    pub fn server(&self, id: &str) -> Option<&McpServer> {
        self.servers
            .iter()
            .find(|server| server.config.id.eq_ignore_ascii_case(id))
    }

    /// Expose every discovered tool through the bridge.
    pub fn register_tools(&self, bridge: &mut ToolBridge) {
        for server in &self.servers {
            for tool in &server.tools {
                bridge.register(Arc::new(McpTool::new(server.client.clone(), tool)));
            }
        }
    }

    /// Fetch a prompt, parsing `raw_args` against the prompt's declared
    /// arguments first.
    pub async fn get_prompt(
        &self,
        server_id: &str,
        prompt_name: &str,
        raw_args: &str,
    ) -> Result<Vec<PromptText>, String> {
        let server = self
            .server(server_id)
            .ok_or_else(|| format!("Unknown MCP server: {server_id}"))?;
        let prompt = server.prompt(prompt_name).ok_or_else(|| {
            format!(
                "Unknown prompt '{}' on server '{}'.",
                prompt_name,
                server.config.label()
            )
        })?;

        let declared = prompt.arguments.as_slice();
        let args = parse_prompt_args(raw_args, declared)?;
        validate_prompt_args(&args, declared)?;
        server.client.get_prompt(&prompt.name, args).await
    }

    pub async fn shutdown(&self) {
        for server in &self.servers {
            server.client.shutdown().await;
        }
    }
}

async fn connect_server(config: &McpServerConfig) -> Result<McpServer, String> {
    let client = StdioClient::spawn(config)?;
    let details = match client.initialize(config).await {
        Ok(details) => details,
        Err(err) => {
            client.shutdown().await;
            return Err(err);
        }
    };
    debug!(
        server_id = %config.id,
        server = %details.server_info.name,
        protocol = %details.protocol_version,
        "MCP server initialized"
    );

    let tools = match client.list_tools().await {
        Ok(tools) => tools
            .into_iter()
            .filter(|tool| config.allows_tool(&tool.name))
            .collect(),
        Err(err) => {
            warn!(server_id = %config.id, error = %err, "Failed to list MCP tools");
            Vec::new()
        }
    };

    let prompts = match client.list_prompts().await {
        Ok(prompts) => prompts,
        Err(err) => {
            warn!(server_id = %config.id, error = %err, "Failed to list MCP prompts");
            Vec::new()
        }
    };

    Ok(McpServer {
        config: config.clone(),
        client,
        tools,
        prompts,
    })
}
