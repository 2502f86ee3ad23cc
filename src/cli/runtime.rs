//! Shared startup for every subcommand: environment, config, store, and
//! model client, plus tool discovery for the commands that need it.

use std::error::Error;
use std::sync::Arc;

use tracing::debug;

use crate::core::chat_stream::OllamaClient;
use crate::core::config::{Config, EnvConfig};
use crate::core::controller::ChatController;
use crate::core::parameters::ModelParameters;
use crate::core::session::{NewSession, Session};
use crate::core::store::{SessionStore, SqliteSessionStore};
use crate::mcp::McpManager;
use crate::tools::builtin::builtin_tools;
use crate::tools::ToolBridge;

pub struct Runtime {
    pub env: EnvConfig,
    pub config: Config,
    pub store: Arc<SqliteSessionStore>,
    pub client: Arc<OllamaClient>,
}

impl Runtime {
    pub async fn open(env: EnvConfig) -> Result<Self, Box<dyn Error>> {
        let config = Config::load()?;
        let store = SqliteSessionStore::open(&env.database_path()).await?;
        let client = OllamaClient::new(&env)?;
        Ok(Self {
            env,
            config,
            store: Arc::new(store),
            client: Arc::new(client),
        })
    }

    /// Built-in tools first, then every tool the MCP servers expose.
    /// Server start-up failures are reported and skipped.
    pub async fn tools(&self) -> (ToolBridge, McpManager) {
        let mut bridge = ToolBridge::new(self.config.tool_timeout());
        for tool in builtin_tools(self.client.http().clone()) {
            bridge.register(tool);
        }

        let mcp = McpManager::connect_all(&self.config).await;
        for (server_id, err) in mcp.failures() {
            eprintln!("⚠️  MCP server '{server_id}' unavailable: {err}");
        }
        mcp.register_tools(&mut bridge);
        (bridge, mcp)
    }

    pub fn controller(&self, tools: Arc<ToolBridge>) -> ChatController {
        let store: Arc<dyn SessionStore> = self.store.clone();
        ChatController::new(
            store,
            self.client.clone(),
            tools,
            self.config.max_tool_rounds(),
        )
    }

    /// Settings for a new session. Its parameters start from the model's
    /// Modelfile so they can be inspected and tweaked with `/params`.
    pub async fn new_session_settings(
        &self,
        tools: &ToolBridge,
        model: Option<&str>,
        system: Option<&str>,
    ) -> NewSession {
        let model = model.unwrap_or(self.config.model());
        let system = system
            .map(str::to_string)
            .or_else(|| self.config.system_prompt.clone());
        NewSession::new(model)
            .with_parameters(self.model_defaults(model).await)
            .with_system(system)
            .with_keep_alive(self.config.keep_alive_minutes())
            .with_tools(self.config.initial_tools(&tools.names()))
    }

    /// The model's Modelfile options, or none when the server can't say.
    pub async fn model_defaults(&self, model: &str) -> ModelParameters {
        let defaults = match self.client.show(model).await {
            Ok(show) => show.default_parameters(),
            Err(err) => Err(err.to_string()),
        };
        defaults.unwrap_or_else(|err| {
            debug!(model, error = %err, "Starting session without model defaults");
            ModelParameters::default()
        })
    }

    /// Look a session up by full id or unique prefix.
    pub async fn find_session(&self, id_or_prefix: &str) -> Result<Session, Box<dyn Error>> {
        let id = self.store.resolve_session_id(id_or_prefix).await?;
        self.store
            .get_session(&id)
            .await?
            .ok_or_else(|| format!("Session not found: {id_or_prefix}").into())
    }
}
