//! JSON-RPC client for MCP servers spoken to over a child process's stdio.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::{
    CallToolRequestParams, GetPromptRequestParams, InitializeResult, ListPromptsResult,
    ListToolsResult, PaginatedRequestParams, RequestId,
};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, warn};

use crate::core::config::McpServerConfig;
use crate::mcp::protocol::{
    client_details_for, is_method_not_found, parse_call_tool, parse_get_prompt,
    parse_initialize_result, parse_list_prompts, parse_list_tools, PromptText, ToolCallText,
    MCP_METHOD_NOT_FOUND,
};

pub const MCP_MAX_TOOL_LIST: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

type PendingMap = Arc<std::sync::Mutex<HashMap<RequestId, oneshot::Sender<ServerMessage>>>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

pub struct StdioClient {
    server_id: String,
    writer: Arc<Mutex<Writer>>,
    pending: PendingMap,
    next_request_id: AtomicI64,
    request_timeout: Duration,
    server_details: RwLock<Option<InitializeResult>>,
    child: Mutex<Option<Child>>,
}

impl StdioClient {
    /// Spawn the configured server process and wire up its pipes.
    pub fn spawn(config: &McpServerConfig) -> Result<Arc<Self>, String> {
        debug!(server_id = %config.id, command = %config.command, args = ?config.args, "Starting MCP stdio server");
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        if let Some(env) = &config.env {
            cmd.envs(env);
        }

        let mut child = cmd
            .spawn()
            .map_err(|err| format!("Failed to start '{}': {err}", config.command))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| "Unable to retrieve stdin.".to_string())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "Unable to retrieve stdout.".to_string())?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| "Unable to retrieve stderr.".to_string())?;

        Self::spawn_stderr_drain(config.id.clone(), stderr);
        Ok(Self::build(
            config.id.clone(),
            stdin,
            stdout,
            REQUEST_TIMEOUT,
            Some(child),
        ))
    }

    /// Build a client over arbitrary byte streams.
    pub fn from_streams<W, R>(
        server_id: String,
        writer: W,
        reader: R,
        request_timeout: Duration,
    ) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::build(server_id, writer, reader, request_timeout, None)
    }

    fn build<W, R>(
        server_id: String,
        writer: W,
        reader: R,
        request_timeout: Duration,
        child: Option<Child>,
    ) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let writer: Arc<Mutex<Writer>> = Arc::new(Mutex::new(Box::new(writer)));
        Self::spawn_reader(
            server_id.clone(),
            reader,
            pending.clone(),
            writer.clone(),
        );
        Arc::new(Self {
            server_id,
            writer,
            pending,
            next_request_id: AtomicI64::new(0),
            request_timeout,
            server_details: RwLock::new(None),
            child: Mutex::new(child),
        })
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    fn spawn_reader<R>(server_id: String, reader: R, pending: PendingMap, writer: Arc<Mutex<Writer>>)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let value = match serde_json::from_str::<Value>(&line) {
                    Ok(value) => value,
                    Err(_) => {
                        debug!(server_id = %server_id, "Ignoring non-JSON MCP output");
                        continue;
                    }
                };
                let items = match value {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                for item in items {
                    match serde_json::from_value::<ServerMessage>(item) {
                        Ok(message) => {
                            Self::dispatch_message(&server_id, &pending, &writer, message).await
                        }
                        Err(err) => {
                            debug!(server_id = %server_id, error = %err, "Unparseable MCP message")
                        }
                    }
                }
            }
            debug!(server_id = %server_id, "MCP stdio stream closed");
            // Dropping the senders wakes every waiter with a closed-channel error.
            lock_pending(&pending).clear();
        });
    }

    fn spawn_stderr_drain(server_id: String, stderr: tokio::process::ChildStderr) {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                debug!(server_id = %server_id, "stderr: {line}");
            }
        });
    }

    async fn dispatch_message(
        server_id: &str,
        pending: &PendingMap,
        writer: &Arc<Mutex<Writer>>,
        message: ServerMessage,
    ) {
        match &message {
            ServerMessage::Response(response) => {
                debug!(server_id = %server_id, response_id = ?response.id, "Received MCP response");
                let waiter = lock_pending(pending).remove(&response.id);
                if let Some(tx) = waiter {
                    let _ = tx.send(message);
                }
            }
            ServerMessage::Error(error) => {
                debug!(
                    server_id = %server_id,
                    error_id = ?error.id,
                    error_code = error.error.code,
                    "Received MCP error"
                );
                let waiter = error.id.as_ref().and_then(|id| lock_pending(pending).remove(id));
                if let Some(tx) = waiter {
                    let _ = tx.send(message);
                }
            }
            ServerMessage::Request(request) => {
                let method = request.method().to_string();
                debug!(server_id = %server_id, method = %method, "Received MCP server request");
                let id = serde_json::to_value(request.request_id()).unwrap_or(Value::Null);
                let reply = if method == "ping" {
                    json!({"jsonrpc": "2.0", "id": id, "result": {}})
                } else {
                    json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": MCP_METHOD_NOT_FOUND, "message": format!("Method not found: {method}")}
                    })
                };
                if let Err(err) = write_line(writer, &reply.to_string()).await {
                    warn!(server_id = %server_id, error = %err, "Failed to answer MCP server request");
                }
            }
            ServerMessage::Notification(_) => {
                debug!(server_id = %server_id, "Received MCP notification");
            }
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Integer(self.next_request_id.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn send_request(&self, request: RequestFromClient) -> Result<ServerMessage, String> {
        let request_id = self.next_request_id();
        debug!(server_id = %self.server_id, request_id = ?request_id, "Sending MCP request");
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(request_id.clone()),
        )
        .map_err(|err| err.to_string())?;
        let payload = serde_json::to_string(&message).map_err(|err| err.to_string())?;

        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(request_id.clone(), tx);
        // Clears the entry however this future ends, including being dropped.
        let mut guard = PendingRequest {
            server_id: self.server_id.clone(),
            request_id: request_id.clone(),
            pending: self.pending.clone(),
            writer: self.writer.clone(),
            sent: false,
        };

        write_line(&self.writer, &payload).await?;
        guard.sent = true;

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err("MCP server closed the connection.".to_string()),
            Err(_) => {
                debug!(server_id = %self.server_id, request_id = ?request_id, "MCP request timed out");
                Err("MCP request timed out.".to_string())
            }
        }
    }

    async fn send_notification(&self, notification: NotificationFromClient) -> Result<(), String> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| err.to_string())?;
        let payload = serde_json::to_string(&message).map_err(|err| err.to_string())?;
        write_line(&self.writer, &payload).await
    }

    pub async fn initialize(&self, config: &McpServerConfig) -> Result<InitializeResult, String> {
        let response = self
            .send_request(RequestFromClient::InitializeRequest(client_details_for(
                config,
            )))
            .await?;
        let result = parse_initialize_result(response)?;
        *self.server_details.write().await = Some(result.clone());
        self.send_notification(NotificationFromClient::InitializedNotification(None))
            .await?;
        Ok(result)
    }

    pub async fn server_details(&self) -> Option<InitializeResult> {
        self.server_details.read().await.clone()
    }

    async fn fetch_tools_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Option<ListToolsResult>, String> {
        let response = self
            .send_request(RequestFromClient::ListToolsRequest(paginated_params(cursor)))
            .await?;
        if is_method_not_found(&response) {
            return Ok(None);
        }
        parse_list_tools(response).map(Some)
    }

    /// All tools the server offers, following pagination up to
    /// [`MCP_MAX_TOOL_LIST`] entries.
    pub async fn list_tools(&self) -> Result<Vec<rust_mcp_schema::Tool>, String> {
        let Some(first) = self.fetch_tools_page(None).await? else {
            return Ok(Vec::new());
        };
        let mut tools = first.tools;
        let mut next_cursor = first.next_cursor;

        while tools.len() < MCP_MAX_TOOL_LIST {
            let Some(cursor) = next_cursor.take() else {
                break;
            };
            match self.fetch_tools_page(Some(cursor)).await? {
                Some(page) => {
                    tools.extend(page.tools);
                    next_cursor = page.next_cursor;
                }
                None => break,
            }
        }

        tools.truncate(MCP_MAX_TOOL_LIST);
        Ok(tools)
    }

    pub async fn list_prompts(&self) -> Result<Vec<rust_mcp_schema::Prompt>, String> {
        let mut prompts = Vec::new();
        let mut cursor = None;
        loop {
            let response = self
                .send_request(RequestFromClient::ListPromptsRequest(paginated_params(
                    cursor,
                )))
                .await?;
            if is_method_not_found(&response) {
                return Ok(prompts);
            }
            let ListPromptsResult {
                prompts: page,
                next_cursor,
                ..
            } = parse_list_prompts(response)?;
            prompts.extend(page);
            match next_cursor {
                Some(next) if prompts.len() < MCP_MAX_TOOL_LIST => cursor = Some(next),
                _ => break,
            }
        }
        Ok(prompts)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallText, String> {
        let params = CallToolRequestParams::new(name).with_arguments(arguments);
        let response = self
            .send_request(RequestFromClient::CallToolRequest(params))
            .await?;
        parse_call_tool(response)
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<Vec<PromptText>, String> {
        let params = GetPromptRequestParams {
            name: name.to_string(),
            arguments: (!arguments.is_empty()).then_some(arguments),
            meta: None,
        };
        let response = self
            .send_request(RequestFromClient::GetPromptRequest(params))
            .await?;
        parse_get_prompt(response)
    }

    /// Stop the server process, if this client owns one.
    pub async fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                debug!(server_id = %self.server_id, error = %err, "Failed to stop MCP server");
            }
        }
    }
}

/// An in-flight request's slot in the pending map.
///
/// If the slot is still occupied on drop, nobody answered: the entry is
/// removed and, when the request reached the server, it is told to stop
/// with `notifications/cancelled`.
struct PendingRequest {
    server_id: String,
    request_id: RequestId,
    pending: PendingMap,
    writer: Arc<Mutex<Writer>>,
    sent: bool,
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        let abandoned = lock_pending(&self.pending).remove(&self.request_id).is_some();
        if !abandoned || !self.sent {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notifications/cancelled",
            "params": {"requestId": self.request_id, "reason": "Client abandoned the request"}
        });
        let server_id = self.server_id.clone();
        let writer = self.writer.clone();
        handle.spawn(async move {
            if let Err(err) = write_line(&writer, &notification.to_string()).await {
                debug!(server_id = %server_id, error = %err, "Failed to send MCP cancellation");
            }
        });
    }
}

fn lock_pending(
    pending: &PendingMap,
) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<ServerMessage>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn paginated_params(cursor: Option<String>) -> Option<PaginatedRequestParams> {
    cursor.map(|cursor| PaginatedRequestParams {
        cursor: Some(cursor),
        meta: None,
    })
}

async fn write_line(writer: &Mutex<Writer>, payload: &str) -> Result<(), String> {
    let mut writer = tokio::time::timeout(WRITE_TIMEOUT, writer.lock())
        .await
        .map_err(|_| "Timed out waiting for MCP stdio writer.".to_string())?;
    let mut line = String::with_capacity(payload.len() + 1);
    line.push_str(payload);
    line.push('\n');
    tokio::time::timeout(WRITE_TIMEOUT, async {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| "Timed out writing MCP stdio message.".to_string())?
    .map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader, DuplexStream, Lines};

    struct FakeServer {
        requests: Lines<BufReader<DuplexStream>>,
        replies: DuplexStream,
    }

    impl FakeServer {
        async fn next_request(&mut self) -> Value {
            let line = self
                .requests
                .next_line()
                .await
                .expect("read request")
                .expect("request line");
            serde_json::from_str(&line).expect("request json")
        }

        async fn reply(&mut self, value: Value) {
            let mut line = value.to_string();
            line.push('\n');
            self.replies.write_all(line.as_bytes()).await.unwrap();
        }
    }

    fn connect(timeout: Duration) -> (Arc<StdioClient>, FakeServer) {
        let (client_writer, server_reader) = duplex(64 * 1024);
        let (server_writer, client_reader) = duplex(64 * 1024);
        let client =
            StdioClient::from_streams("fake".to_string(), client_writer, client_reader, timeout);
        let server = FakeServer {
            requests: BufReader::new(server_reader).lines(),
            replies: server_writer,
        };
        (client, server)
    }

    #[tokio::test]
    async fn responses_are_matched_to_requests_by_id() {
        let (client, mut server) = connect(Duration::from_secs(5));

        let first = {
            let client = client.clone();
            tokio::spawn(async move { client.call_tool("first", Map::new()).await })
        };
        let first_request = server.next_request().await;
        let second = {
            let client = client.clone();
            tokio::spawn(async move { client.call_tool("second", Map::new()).await })
        };
        let second_request = server.next_request().await;

        assert_eq!(first_request["method"], "tools/call");
        assert_eq!(first_request["params"]["name"], "first");
        assert_ne!(first_request["id"], second_request["id"]);

        // Answer out of order.
        server
            .reply(json!({
                "jsonrpc": "2.0",
                "id": second_request["id"],
                "result": {"content": [{"type": "text", "text": "two"}]}
            }))
            .await;
        server
            .reply(json!({
                "jsonrpc": "2.0",
                "id": first_request["id"],
                "result": {"content": [{"type": "text", "text": "one"}], "isError": true}
            }))
            .await;

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.text, "one");
        assert!(first.is_error);
        assert_eq!(second.text, "two");
        assert!(!second.is_error);
    }

    #[tokio::test]
    async fn unanswered_requests_time_out() {
        let (client, mut server) = connect(Duration::from_millis(50));
        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.call_tool("slow", Map::new()).await }
        });
        let _ = server.next_request().await;
        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err, "MCP request timed out.");
        assert!(lock_pending(&client.pending).is_empty());
    }

    #[tokio::test]
    async fn abandoned_requests_are_cleared_and_cancelled() {
        let (client, mut server) = connect(Duration::from_secs(60));
        for _ in 0..5 {
            let call = client.call_tool("slow", Map::new());
            assert!(tokio::time::timeout(Duration::from_millis(10), call)
                .await
                .is_err());
        }
        assert!(lock_pending(&client.pending).is_empty());

        let mut requested = Vec::new();
        let mut cancelled = Vec::new();
        while cancelled.len() < 5 {
            let message = server.next_request().await;
            match message["method"].as_str() {
                Some("tools/call") => requested.push(message["id"].clone()),
                Some("notifications/cancelled") => {
                    assert!(message.get("id").is_none());
                    cancelled.push(message["params"]["requestId"].clone());
                }
                other => panic!("unexpected message {other:?}"),
            }
        }
        assert_eq!(requested.len(), 5);
        for id in &requested {
            assert!(cancelled.contains(id), "no cancellation for {id}");
        }
    }

    #[tokio::test]
    async fn closed_stream_fails_pending_requests() {
        let (client, server) = connect(Duration::from_secs(5));
        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.call_tool("gone", Map::new()).await }
        });
        let FakeServer { mut requests, replies } = server;
        let _ = requests.next_line().await;
        drop(replies);
        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err, "MCP server closed the connection.");
    }

    #[tokio::test]
    async fn server_pings_are_answered() {
        let (_client, mut server) = connect(Duration::from_secs(5));
        server
            .reply(json!({"jsonrpc": "2.0", "id": 42, "method": "ping"}))
            .await;
        let reply = server.next_request().await;
        assert_eq!(reply["id"], 42);
        assert_eq!(reply["result"], json!({}));
    }
}
