//! Turn-taking for a session: send the user's message, stream the reply,
//! run any tools the model asks for, and persist every step.
//!
//! A turn moves through
//! `Idle → AwaitingModel → (ToolInvoked → AwaitingTool → AwaitingModel)* → Idle`.
//! Whatever happens (completion, cancellation, or an error) the session ends
//! the turn in `Idle`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ChatMessage, ChatRequest};
use crate::core::chat_stream::{ChatBackend, ModelError};
use crate::core::message::{Message, ToolCall, ToolInvocation};
use crate::core::session::{name_from_prompt, Session, DEFAULT_SESSION_NAME};
use crate::core::store::{SessionStore, StoreError};
use crate::tools::{ToolBridge, ToolCancelled};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    AwaitingModel,
    ToolInvoked,
    AwaitingTool,
}

impl fmt::Display for ChatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChatState::Idle => "idle",
            ChatState::AwaitingModel => "awaiting model",
            ChatState::ToolInvoked => "tool invoked",
            ChatState::AwaitingTool => "awaiting tool",
        };
        f.write_str(label)
    }
}

/// Progress reported while a turn runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    State(ChatState),
    Chunk(String),
    ToolStarted { name: String, arguments: String },
    ToolFinished {
        name: String,
        content: String,
        is_error: bool,
    },
    Notice(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed {
        reply: String,
        tokens_per_second: Option<f64>,
    },
    Cancelled,
    /// The model kept asking for tools past the configured round limit.
    ToolRoundLimit { rounds: u32 },
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Session {0} already has a reply in progress")]
    Busy(String),
}

/// What the user sends in one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserInput {
    pub text: String,
    /// Base64-encoded images.
    pub images: Vec<String>,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }
}

impl From<&str> for UserInput {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

struct ModelReply {
    content: String,
    tool_calls: Vec<ToolCall>,
    tokens_per_second: Option<f64>,
}

type Events<'a> = &'a UnboundedSender<TurnEvent>;

pub struct ChatController {
    store: Arc<dyn SessionStore>,
    backend: Arc<dyn ChatBackend>,
    tools: Arc<ToolBridge>,
    max_tool_rounds: u32,
    in_flight: Mutex<HashSet<String>>,
    states: Mutex<HashMap<String, ChatState>>,
}

/// Releases a session's in-flight slot even if the turn future is dropped.
struct InFlight<'a> {
    controller: &'a ChatController,
    session_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(&self.controller.in_flight).remove(&self.session_id);
        lock(&self.controller.states).remove(&self.session_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn emit(events: Events<'_>, event: TurnEvent) {
    // A closed receiver only means nobody is watching.
    let _ = events.send(event);
}

impl ChatController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        backend: Arc<dyn ChatBackend>,
        tools: Arc<ToolBridge>,
        max_tool_rounds: u32,
    ) -> Self {
        Self {
            store,
            backend,
            tools,
            max_tool_rounds,
            in_flight: Mutex::new(HashSet::new()),
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn tools(&self) -> &ToolBridge {
        &self.tools
    }

    pub fn state(&self, session_id: &str) -> ChatState {
        lock(&self.states)
            .get(session_id)
            .copied()
            .unwrap_or(ChatState::Idle)
    }

    fn set_state(&self, session_id: &str, state: ChatState, events: Events<'_>) {
        debug!(session_id, %state, "Chat state changed");
        if state == ChatState::Idle {
            lock(&self.states).remove(session_id);
        } else {
            lock(&self.states).insert(session_id.to_string(), state);
        }
        emit(events, TurnEvent::State(state));
    }

    fn begin(&self, session_id: &str) -> Result<InFlight<'_>, ChatError> {
        if !lock(&self.in_flight).insert(session_id.to_string()) {
            return Err(ChatError::Busy(session_id.to_string()));
        }
        Ok(InFlight {
            controller: self,
            session_id: session_id.to_string(),
        })
    }

    /// Run one user turn to completion, cancellation, or error.
    ///
    /// Only one turn may be in flight per session. Messages persisted before
    /// a cancellation or error stay in the session.
    pub async fn run_turn(
        &self,
        session_id: &str,
        input: UserInput,
        events: &UnboundedSender<TurnEvent>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ChatError> {
        let _guard = self.begin(session_id)?;
        let result = self.drive_turn(session_id, input, events, cancel).await;
        self.set_state(session_id, ChatState::Idle, events);
        result
    }

    async fn drive_turn(
        &self,
        session_id: &str,
        input: UserInput,
        events: Events<'_>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ChatError> {
        let mut session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;

        if session.name == DEFAULT_SESSION_NAME && !session.messages.iter().any(Message::is_user) {
            session.name = name_from_prompt(&input.text);
            self.store.update_session(&session).await?;
        }

        let user_message = Message::user(input.text).with_images(input.images);
        self.store.append_message(session_id, &user_message).await?;
        session.messages.push(user_message);

        let mut rounds = 0;
        loop {
            self.set_state(session_id, ChatState::AwaitingModel, events);
            let request = self.build_request(&session);
            let Some(reply) = self.stream_reply(request, events, cancel).await? else {
                debug!(session_id, "Turn cancelled while awaiting the model");
                return Ok(TurnOutcome::Cancelled);
            };

            if reply.tool_calls.is_empty() {
                let message = Message::assistant(reply.content.clone());
                self.store.append_message(session_id, &message).await?;
                return Ok(TurnOutcome::Completed {
                    reply: reply.content,
                    tokens_per_second: reply.tokens_per_second,
                });
            }

            if rounds >= self.max_tool_rounds {
                if !reply.content.trim().is_empty() {
                    let message = Message::assistant(reply.content);
                    self.store.append_message(session_id, &message).await?;
                }
                emit(
                    events,
                    TurnEvent::Notice(format!(
                        "Stopped after {rounds} tool round(s); the model kept requesting tools."
                    )),
                );
                return Ok(TurnOutcome::ToolRoundLimit { rounds });
            }
            rounds += 1;

            let assistant =
                Message::assistant(reply.content).with_tool_calls(reply.tool_calls.clone());
            let seq = self.store.append_message(session_id, &assistant).await?;
            session.messages.push(assistant);
            self.set_state(session_id, ChatState::ToolInvoked, events);

            for call in &reply.tool_calls {
                self.set_state(session_id, ChatState::AwaitingTool, events);
                emit(
                    events,
                    TurnEvent::ToolStarted {
                        name: call.name.clone(),
                        arguments: call.arguments_json(),
                    },
                );

                let outcome = match self.tools.invoke(call, cancel).await {
                    Ok(outcome) => outcome,
                    Err(ToolCancelled) => {
                        debug!(session_id, tool = %call.name, "Turn cancelled during tool call");
                        return Ok(TurnOutcome::Cancelled);
                    }
                };

                let message = Message::tool_result(&call.name, outcome.content.clone());
                self.store.append_message(session_id, &message).await?;
                session.messages.push(message);
                self.store
                    .record_tool_invocation(
                        session_id,
                        &ToolInvocation {
                            call: outcome.call,
                            result: outcome.content.clone(),
                            is_error: outcome.is_error,
                            message_seq: seq,
                            created_at: Utc::now(),
                        },
                    )
                    .await?;
                emit(
                    events,
                    TurnEvent::ToolFinished {
                        name: call.name.clone(),
                        content: outcome.content,
                        is_error: outcome.is_error,
                    },
                );
            }
        }
    }

    /// The request sent for the session's current history.
    pub fn build_request(&self, session: &Session) -> ChatRequest {
        let mut messages = Vec::with_capacity(session.messages.len() + 1);
        if let Some(system) = session.system.as_deref() {
            if !system.trim().is_empty() {
                messages.push(ChatMessage::system(system));
            }
        }
        messages.extend(session.messages.iter().map(ChatMessage::from));

        ChatRequest {
            model: session.model.clone(),
            messages,
            stream: true,
            tools: self.tools.definitions_for(&session.tools),
            format: session.format.to_wire(),
            options: session.parameters.to_json_object(),
            keep_alive: format!("{}m", session.keep_alive),
        }
    }

    /// Stream one reply, forwarding text as it arrives. `None` means the
    /// turn was cancelled and the partial reply was discarded.
    async fn stream_reply(
        &self,
        request: ChatRequest,
        events: Events<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<ModelReply>, ChatError> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat request"
        );
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            stream = self.backend.chat_stream(request) => stream?,
        };

        let mut reply = ModelReply {
            content: String::new(),
            tool_calls: Vec::new(),
            tokens_per_second: None,
        };
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                next = stream.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            let content = chunk.content();
            if !content.is_empty() {
                reply.content.push_str(content);
                emit(events, TurnEvent::Chunk(content.to_string()));
            }
            reply
                .tool_calls
                .extend(chunk.tool_calls().iter().cloned().map(ToolCall::from));
            if chunk.done {
                reply.tokens_per_second = chunk.tokens_per_second();
                debug!(done_reason = ?chunk.done_reason, "Model reply finished");
                break;
            }
        }
        Ok(Some(reply))
    }
}
