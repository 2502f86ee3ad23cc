//! Streaming client for the Ollama HTTP API.

use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use memchr::memchr;
use thiserror::Error;
use tracing::debug;

use crate::api::{
    ChatChunk, ChatRequest, ModelInfo, ModelRequest, ModelsResponse, PullProgress, ShowResponse,
};
use crate::core::config::EnvConfig;
use crate::utils::url::construct_api_url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Could not reach the model server at {url}: {message}")]
    Connect { url: String, message: String },
    #[error("Model server returned HTTP {status}. {message}")]
    Status { status: u16, message: String },
    #[error("Malformed response from the model server: {0}")]
    Malformed(String),
    #[error("{0}")]
    Stream(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Lazy, finite stream of response fragments. It ends after the final
/// fragment or the first error and cannot be restarted.
pub type ChatStream = BoxStream<'static, Result<ChatChunk, ModelError>>;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, ModelError>;
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

pub(crate) fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return format!("API Error: {}\n```json\n{}\n```", summary, pretty_json);
                }
            }
            return format!("API Error:\n```json\n{}\n```", pretty_json);
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{}\n```", trimmed)
    } else {
        format!("API Error:\n```\n{}\n```", trimmed)
    }
}

/// Accumulates response bytes and yields complete newline-terminated lines.
#[derive(Debug, Default)]
pub struct NdjsonBuffer {
    buffer: Vec<u8>,
}

impl NdjsonBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn next_line(&mut self) -> Option<Result<String, ModelError>> {
        let newline_pos = memchr(b'\n', &self.buffer)?;
        let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        let line = &line[..newline_pos];
        Some(
            std::str::from_utf8(line)
                .map(|text| text.trim().to_string())
                .map_err(|err| ModelError::Malformed(format!("invalid UTF-8 in stream: {err}"))),
        )
    }

    /// Treat any unterminated trailing bytes as a final line.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() && !self.buffer.ends_with(b"\n") {
            self.buffer.push(b'\n');
        }
    }
}

/// Parse one NDJSON line of a chat response. Blank lines yield `None`.
pub(crate) fn parse_chat_line(line: &str) -> Result<Option<ChatChunk>, ModelError> {
    parse_line(line)
}

fn parse_line<T: serde::de::DeserializeOwned>(line: &str) -> Result<Option<T>, ModelError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|err| ModelError::Malformed(format!("{err}: {line}")))?;
    if value.get("error").is_some() {
        return Err(ModelError::Stream(format_api_error(line)));
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|err| ModelError::Malformed(format!("{err}: {line}")))
}

struct NdjsonState<S, P, F> {
    body: Pin<Box<S>>,
    buffer: NdjsonBuffer,
    parse: P,
    is_final: F,
    eof: bool,
    finished: bool,
}

/// Turn a byte stream of NDJSON into a stream of parsed items.
///
/// The stream stops after an item for which `is_final` holds, or after the
/// first error. Running out of bytes before a final item is an error.
pub(crate) fn ndjson_stream<S, B, E, T, P, F>(
    body: S,
    parse: P,
    is_final: F,
) -> BoxStream<'static, Result<T, ModelError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
    T: Send + 'static,
    P: Fn(&str) -> Result<Option<T>, ModelError> + Send + 'static,
    F: Fn(&T) -> bool + Send + 'static,
{
    let state = NdjsonState {
        body: Box::pin(body),
        buffer: NdjsonBuffer::default(),
        parse,
        is_final,
        eof: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(line) = state.buffer.next_line() {
                match line.and_then(|line| (state.parse)(&line)) {
                    Ok(Some(item)) => {
                        state.finished = (state.is_final)(&item);
                        return Some((Ok(item), state));
                    }
                    Ok(None) => continue,
                    Err(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                }
            }

            if state.eof {
                state.finished = true;
                let err = ModelError::Stream("Response ended before completion".to_string());
                return Some((Err(err), state));
            }

            match state.body.next().await {
                Some(Ok(bytes)) => state.buffer.push(bytes.as_ref()),
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(ModelError::Stream(err.to_string())), state));
                }
                None => {
                    state.eof = true;
                    state.buffer.finish();
                }
            }
        }
    })
    .boxed()
}

/// HTTP client for an Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(env: &EnvConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(!env.verify_ssl)
            .build()
            .map_err(|err| ModelError::Client(err.to_string()))?;
        Ok(Self {
            http,
            base_url: env.ollama_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The underlying HTTP client, shared with tools that fetch URLs.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn send_error(&self, err: reqwest::Error) -> ModelError {
        if err.is_connect() || err.is_timeout() {
            ModelError::Connect {
                url: self.base_url.clone(),
                message: err.to_string(),
            }
        } else {
            ModelError::Stream(err.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ModelError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        Err(ModelError::Status {
            status: status.as_u16(),
            message: format_api_error(&body),
        })
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ModelError> {
        let url = construct_api_url(&self.base_url, "api/tags");
        debug!(%url, "listing models");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| self.send_error(err))?;
        let response = Self::check_status(response).await?;
        let mut models = response
            .json::<ModelsResponse>()
            .await
            .map_err(|err| ModelError::Malformed(err.to_string()))?
            .models;
        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }

    pub async fn show(&self, model: &str) -> Result<ShowResponse, ModelError> {
        let url = construct_api_url(&self.base_url, "api/show");
        debug!(%url, model, "showing model");
        let response = self
            .http
            .post(url)
            .json(&ModelRequest {
                model,
                stream: None,
            })
            .send()
            .await
            .map_err(|err| self.send_error(err))?;
        Self::check_status(response)
            .await?
            .json::<ShowResponse>()
            .await
            .map_err(|err| ModelError::Malformed(err.to_string()))
    }

    /// Download a model, yielding progress updates until `success`.
    pub async fn pull(
        &self,
        model: &str,
    ) -> Result<BoxStream<'static, Result<PullProgress, ModelError>>, ModelError> {
        let url = construct_api_url(&self.base_url, "api/pull");
        debug!(%url, model, "pulling model");
        let response = self
            .http
            .post(url)
            .json(&ModelRequest {
                model,
                stream: Some(true),
            })
            .send()
            .await
            .map_err(|err| self.send_error(err))?;
        let response = Self::check_status(response).await?;
        Ok(ndjson_stream(
            response.bytes_stream(),
            parse_line::<PullProgress>,
            |progress: &PullProgress| progress.status == "success",
        ))
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, ModelError> {
        let url = construct_api_url(&self.base_url, "api/chat");
        debug!(
            %url,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending chat request"
        );
        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|err| self.send_error(err))?;
        let response = Self::check_status(response).await?;
        Ok(ndjson_stream(
            response.bytes_stream(),
            parse_chat_line,
            |chunk: &ChatChunk| chunk.done,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
        let parts: Vec<Result<Vec<u8>, std::io::Error>> =
            parts.iter().map(|part| Ok(part.as_bytes().to_vec())).collect();
        stream::iter(parts)
    }

    async fn collect_chat(parts: &[&str]) -> Vec<Result<ChatChunk, ModelError>> {
        ndjson_stream(body(parts), parse_chat_line, |chunk: &ChatChunk| chunk.done)
            .collect()
            .await
    }

    #[test]
    fn buffer_yields_lines_split_across_chunks() {
        let mut buffer = NdjsonBuffer::default();
        buffer.push(br#"{"message":{"role":"assistant","#);
        assert!(buffer.next_line().is_none());
        buffer.push(b"\"content\":\"Hi\"}}\n{\"do");
        let line = buffer.next_line().expect("line").expect("utf8");
        assert_eq!(line, r#"{"message":{"role":"assistant","content":"Hi"}}"#);
        assert!(buffer.next_line().is_none());
        buffer.push(b"ne\":true}");
        buffer.finish();
        assert_eq!(buffer.next_line().unwrap().unwrap(), r#"{"done":true}"#);
    }

    #[tokio::test]
    async fn stream_reassembles_fragments_and_stops_after_done() {
        let items = collect_chat(&[
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n{\"mess",
            "age\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n\n",
            "{\"done\":true,\"done_reason\":\"stop\"}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"ignored\"}}\n",
        ])
        .await;

        let chunks: Vec<ChatChunk> = items.into_iter().map(|item| item.unwrap()).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content(), "Hel");
        assert_eq!(chunks[1].content(), "lo");
        assert!(chunks[2].done);
        assert_eq!(chunks[2].done_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn stream_routes_error_lines() {
        let items = collect_chat(&[
            "{\"message\":{\"role\":\"assistant\",\"content\":\"a\"}}\n",
            "{\"error\":\"model ran out of memory\"}\n",
        ])
        .await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        match &items[1] {
            Err(ModelError::Stream(text)) => {
                let expected = r#"API Error: model ran out of memory
```json
{
  "error": "model ran out of memory"
}
```"#;
                assert_eq!(text, expected);
            }
            other => panic!("expected stream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_reports_truncated_responses() {
        let items = collect_chat(&["{\"message\":{\"role\":\"assistant\",\"content\":\"a\"}}"]).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().content(), "a");
        assert!(matches!(items[1], Err(ModelError::Stream(_))));
    }

    #[tokio::test]
    async fn stream_rejects_malformed_lines() {
        let items = collect_chat(&["not json\n"]).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ModelError::Malformed(_))));
    }

    #[tokio::test]
    async fn pull_progress_stream_ends_on_success() {
        let items: Vec<_> = ndjson_stream(
            body(&[
                "{\"status\":\"pulling manifest\"}\n",
                "{\"status\":\"downloading\",\"digest\":\"sha256:1\",\"total\":10,\"completed\":5}\n",
                "{\"status\":\"success\"}\n",
            ]),
            parse_line::<PullProgress>,
            |progress: &PullProgress| progress.status == "success",
        )
        .collect()
        .await;

        let statuses: Vec<String> = items
            .into_iter()
            .map(|item| item.unwrap().status)
            .collect();
        assert_eq!(statuses, vec!["pulling manifest", "downloading", "success"]);
    }

    #[test]
    fn format_api_error_prettifies_json_with_summary() {
        let raw = r#"{"error":{"message":"model overloaded","type":"invalid_request_error"}}"#;
        let formatted = format_api_error(raw);

        let expected = r#"API Error: model overloaded
```json
{
  "error": {
    "message": "model overloaded",
    "type": "invalid_request_error"
  }
}
```"#;
        assert_eq!(formatted, expected);
    }

    #[test]
    fn format_api_error_handles_json_without_summary() {
        let raw = r#"{"status":"failed"}"#;
        let formatted = format_api_error(raw);

        let expected = r#"API Error:
```json
{
  "status": "failed"
}
```"#;
        assert_eq!(formatted, expected);
    }

    #[test]
    fn format_api_error_handles_xml_and_plaintext() {
        assert_eq!(
            format_api_error("<error>bad</error>"),
            "API Error:\n```xml\n<error>bad</error>\n```"
        );
        assert_eq!(format_api_error("api failure"), "API Error:\n```\napi failure\n```");
        assert_eq!(format_api_error("  "), "API Error:\n```\n<empty>\n```");
    }
}
