use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Map, Value};
use tokio::process::Command;

use crate::tools::{Tool, ToolOutput, ToolSource, ToolSpec};

pub const DATE_TIME_TOOL: &str = "date_time";
pub const SHELL_TOOL: &str = "shell";
pub const FETCH_URL_TOOL: &str = "fetch_url";

/// Longest page body handed back to the model, in characters.
pub const MAX_FETCH_CHARS: usize = 20_000;
/// Bytes read off the wire before the rest of the body is abandoned.
const MAX_FETCH_BYTES: usize = MAX_FETCH_CHARS * 4;
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// The tools compiled into the client, in listing order.
pub fn builtin_tools(http: reqwest::Client) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(DateTimeTool::new()),
        Arc::new(ShellTool::new()),
        Arc::new(FetchUrlTool::new(http)),
    ]
}

fn string_argument<'a>(arguments: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| format!("Missing required string argument '{key}'."))
}

pub struct DateTimeTool {
    spec: ToolSpec,
}

impl DateTimeTool {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec {
                name: DATE_TIME_TOOL.to_string(),
                description: Some("Get the current local date and time.".to_string()),
                input_schema: json!({"type": "object", "properties": {}}),
                source: ToolSource::Builtin,
            },
        }
    }
}

impl Default for DateTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for DateTimeTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, _arguments: Map<String, Value>) -> Result<ToolOutput, String> {
        let now = Local::now();
        Ok(ToolOutput::ok(
            now.format("%A, %Y-%m-%d %H:%M:%S %:z").to_string(),
        ))
    }
}

pub struct ShellTool {
    spec: ToolSpec,
}

impl ShellTool {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec {
                name: SHELL_TOOL.to_string(),
                description: Some(
                    "Run a shell command with `sh -c` and return its output and exit status."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string", "description": "The command line to run."}
                    },
                    "required": ["command"]
                }),
                source: ToolSource::Builtin,
            },
        }
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<ToolOutput, String> {
        let command = string_argument(&arguments, "command")?;
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| format!("Failed to run command: {err}"))?;

        let mut text = String::new();
        text.push_str(&String::from_utf8_lossy(&output.stdout));
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        let status = match output.status.code() {
            Some(code) => code.to_string(),
            None => "terminated by signal".to_string(),
        };
        text.push_str(&format!("exit status: {status}"));

        Ok(ToolOutput {
            content: text,
            is_error: !output.status.success(),
        })
    }
}

pub struct FetchUrlTool {
    spec: ToolSpec,
    http: reqwest::Client,
}

impl FetchUrlTool {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            spec: ToolSpec {
                name: FETCH_URL_TOOL.to_string(),
                description: Some("Fetch a web page over HTTP(S) and return its text.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "The http or https URL to fetch."}
                    },
                    "required": ["url"]
                }),
                source: ToolSource::Builtin,
            },
            http,
        }
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<ToolOutput, String> {
        let raw = string_argument(&arguments, "url")?;
        let url = reqwest::Url::parse(raw.trim()).map_err(|err| format!("Invalid URL: {err}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("Unsupported URL scheme: {}", url.scheme()));
        }

        let response = self
            .http
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|err| format!("Request failed: {err}"))?;
        let status = response.status();
        let (bytes, capped) = read_capped(response, MAX_FETCH_BYTES).await?;
        let body = String::from_utf8_lossy(&bytes);

        let mut text = truncate_chars(&body, MAX_FETCH_CHARS);
        if capped && body.chars().count() <= MAX_FETCH_CHARS {
            text.push_str("\n[truncated]");
        }
        if status.is_success() {
            Ok(ToolOutput::ok(text))
        } else {
            Ok(ToolOutput::error(format!("HTTP {status}\n{text}")))
        }
    }
}

/// Read at most `cap` bytes of the body; the flag is set when more remained.
async fn read_capped(
    mut response: reqwest::Response,
    cap: usize,
) -> Result<(Vec<u8>, bool), String> {
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| format!("Failed to read response body: {err}"))?
    {
        let room = cap - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n[truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo", 2), "hé\n[truncated]");
    }

    #[tokio::test]
    async fn shell_reports_output_and_status() {
        let mut arguments = Map::new();
        arguments.insert("command".to_string(), json!("echo out; echo err >&2; exit 3"));
        let output = ShellTool::new().call(arguments).await.unwrap();
        assert_eq!(output.content, "out\nerr\nexit status: 3");
        assert!(output.is_error);
    }

    #[tokio::test]
    async fn shell_requires_command() {
        let err = ShellTool::new().call(Map::new()).await.unwrap_err();
        assert_eq!(err, "Missing required string argument 'command'.");
    }

    #[tokio::test]
    async fn fetch_rejects_non_http_schemes() {
        let mut arguments = Map::new();
        arguments.insert("url".to_string(), json!("file:///etc/passwd"));
        let err = FetchUrlTool::new(reqwest::Client::new())
            .call(arguments)
            .await
            .unwrap_err();
        assert_eq!(err, "Unsupported URL scheme: file");
    }

    #[tokio::test]
    async fn fetch_stops_reading_large_bodies() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        const BODY_BYTES: usize = 50 * 1024 * 1024;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let delivered = Arc::new(AtomicUsize::new(0));

        let server = tokio::spawn({
            let delivered = delivered.clone();
            async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {BODY_BYTES}\r\n\r\n"
                );
                socket.write_all(head.as_bytes()).await.unwrap();
                let block = vec![b'a'; 64 * 1024];
                while delivered.load(Ordering::SeqCst) < BODY_BYTES {
                    if socket.write_all(&block).await.is_err() {
                        break;
                    }
                    delivered.fetch_add(block.len(), Ordering::SeqCst);
                }
            }
        });

        let mut arguments = Map::new();
        arguments.insert("url".to_string(), json!(format!("http://{addr}/big")));
        let output = FetchUrlTool::new(reqwest::Client::new())
            .call(arguments)
            .await
            .unwrap();
        assert!(!output.is_error);
        assert!(output.content.ends_with("\n[truncated]"));
        assert_eq!(
            output.content.chars().count(),
            MAX_FETCH_CHARS + "\n[truncated]".len()
        );

        tokio::time::timeout(Duration::from_secs(10), server)
            .await
            .expect("server notices the closed connection")
            .unwrap();
        assert!(delivered.load(Ordering::SeqCst) < BODY_BYTES / 2);
    }

    #[tokio::test]
    async fn date_time_returns_current_year() {
        let output = DateTimeTool::new().call(Map::new()).await.unwrap();
        assert!(output.content.contains(&Local::now().format("%Y").to_string()));
    }
}
