//! Line-oriented interactive chat.
//!
//! Each line is either a slash command or a message for the model. While a
//! reply streams, Ctrl+C cancels it; at the prompt, Ctrl+C exits.

use std::error::Error;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::runtime::Runtime;
use crate::cli::sessions::{default_export_path, format_summary, format_timestamp};
use crate::cli::ChatArgs;
use crate::commands::{help_text, process_input, Action, CommandResult, SystemChange};
use crate::core::controller::{ChatController, TurnEvent, TurnOutcome, UserInput};
use crate::core::message::Role;
use crate::core::session::Session;
use crate::core::store::SessionStore;
use crate::mcp::McpManager;
use crate::utils::logging::{export_transcript, render_transcript, LoggingState};

const TOOL_PREVIEW_CHARS: usize = 120;

enum Flow {
    Continue,
    Quit,
}

struct Repl {
    runtime: Runtime,
    controller: ChatController,
    mcp: McpManager,
    session: Session,
    logging: LoggingState,
    pending_images: Vec<(String, String)>,
}

/// Tracks whether the cursor sits mid-line while a reply streams.
struct Printer {
    stdout: io::Stdout,
    mid_line: bool,
}

impl Printer {
    fn new() -> Self {
        Self {
            stdout: io::stdout(),
            mid_line: false,
        }
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.mid_line {
            writeln!(self.stdout)?;
            self.mid_line = false;
        }
        Ok(())
    }

    fn event(&mut self, event: TurnEvent) -> io::Result<()> {
        match event {
            TurnEvent::Chunk(text) => {
                write!(self.stdout, "{text}")?;
                self.mid_line = !text.ends_with('\n');
                self.stdout.flush()
            }
            TurnEvent::ToolStarted { name, arguments } => {
                self.end_line()?;
                writeln!(self.stdout, "🔧 {name} {}", preview(&arguments))
            }
            TurnEvent::ToolFinished {
                name,
                content,
                is_error,
            } => {
                let marker = if is_error { "⚠️ " } else { "↳" };
                writeln!(self.stdout, "   {marker} {name}: {}", preview(&content))
            }
            TurnEvent::Notice(notice) => {
                self.end_line()?;
                writeln!(self.stdout, "⚠️  {notice}")
            }
            TurnEvent::State(_) => Ok(()),
        }
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(TOOL_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}…", &flat[..cut]),
        None => flat,
    }
}

pub async fn run_chat(runtime: Runtime, args: ChatArgs) -> Result<(), Box<dyn Error>> {
    let (bridge, mcp) = runtime.tools().await;
    let session = initial_session(&runtime, &bridge, &args).await?;
    let controller = runtime.controller(Arc::new(bridge));
    let logging = LoggingState::new(args.log.clone())?;

    let mut repl = Repl {
        runtime,
        controller,
        mcp,
        session,
        logging,
        pending_images: Vec::new(),
    };
    repl.print_banner();
    let result = repl.run().await;
    repl.mcp.shutdown().await;
    result
}

async fn initial_session(
    runtime: &Runtime,
    bridge: &crate::tools::ToolBridge,
    args: &ChatArgs,
) -> Result<Session, Box<dyn Error>> {
    let existing = if args.new {
        None
    } else if let Some(id) = &args.session {
        Some(runtime.find_session(id).await?)
    } else {
        match runtime.store.list_sessions().await?.first() {
            Some(latest) => runtime.store.get_session(&latest.id).await?,
            None => None,
        }
    };

    let mut session = match existing {
        Some(session) => session,
        None => {
            let settings = runtime
                .new_session_settings(bridge, args.model.as_deref(), args.system.as_deref())
                .await;
            return Ok(runtime
                .store
                .create_session(match &args.name {
                    Some(name) => settings.with_name(name.clone()),
                    None => settings,
                })
                .await?);
        }
    };

    let mut changed = false;
    if let Some(model) = &args.model {
        session.model = model.clone();
        changed = true;
    }
    if let Some(system) = &args.system {
        session.system = Some(system.clone());
        changed = true;
    }
    if let Some(name) = &args.name {
        session.name = name.clone();
        changed = true;
    }
    if changed {
        runtime.store.update_session(&session).await?;
    }
    Ok(session)
}

impl Repl {
    fn print_banner(&self) {
        eprintln!("🔥 hearth · {}", self.runtime.client.base_url());
        self.print_session_header();
        let servers = self.mcp.servers().len();
        if servers > 0 {
            eprintln!("🔌 {servers} MCP server(s) connected");
        }
        if self.logging.is_active() {
            eprintln!("📝 Logging {}", self.logging.get_status_string());
        }
        eprintln!("💡 Type /help for commands. Ctrl+C stops a reply or exits.");
    }

    fn print_session_header(&self) {
        eprintln!(
            "💬 {} ({}) · model {} · {} messages",
            self.session.name,
            self.session.short_id(),
            self.session.model,
            self.session.messages.len()
        );
        if let Some(reply) = self.session.last_reply() {
            eprintln!("   last reply: {}", preview(&reply.content));
        }
    }

    async fn run(&mut self) -> Result<(), Box<dyn Error>> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("› ");
            io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    return Ok(());
                }
            };
            let Some(line) = line else {
                println!();
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }

            let flow = match process_input(&line) {
                CommandResult::Message(text) => {
                    self.send(text).await;
                    Flow::Continue
                }
                CommandResult::Action(action) => match self.apply(action).await {
                    Ok(flow) => flow,
                    Err(err) => {
                        eprintln!("❌ {err}");
                        Flow::Continue
                    }
                },
                CommandResult::Error(message) => {
                    eprintln!("❌ {message}");
                    Flow::Continue
                }
            };
            if let Flow::Quit = flow {
                return Ok(());
            }
        }
    }

    /// Run one turn, streaming output until it completes or Ctrl+C cancels it.
    async fn send(&mut self, text: String) {
        if let Err(err) = self.logging.log_chat(Role::User, &text) {
            eprintln!("❌ Failed to log message: {err}");
        }
        let images: Vec<String> = self
            .pending_images
            .drain(..)
            .map(|(_, data)| data)
            .collect();
        let input = UserInput { text, images };

        let session_id = self.session.id.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut printer = Printer::new();

        let result = {
            let turn = self.controller.run_turn(&session_id, input, &tx, &cancel);
            tokio::pin!(turn);
            loop {
                tokio::select! {
                    result = &mut turn => break result,
                    Some(event) = rx.recv() => {
                        if let Err(err) = printer.event(event) {
                            eprintln!("❌ {err}");
                        }
                    }
                    _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => cancel.cancel(),
                }
            }
        };
        while let Ok(event) = rx.try_recv() {
            let _ = printer.event(event);
        }
        let _ = printer.end_line();

        match result {
            Ok(TurnOutcome::Completed {
                reply,
                tokens_per_second,
            }) => {
                if let Some(rate) = tokens_per_second {
                    eprintln!("   ({rate:.1} tok/s)");
                }
                if let Err(err) = self.logging.log_chat(Role::Assistant, &reply) {
                    eprintln!("❌ Failed to log message: {err}");
                }
            }
            Ok(TurnOutcome::Cancelled) => eprintln!("⏹  Cancelled."),
            Ok(TurnOutcome::ToolRoundLimit { .. }) => {}
            Err(err) => eprintln!("❌ {err}"),
        }

        if let Err(err) = self.reload().await {
            eprintln!("❌ {err}");
        }
    }

    async fn reload(&mut self) -> Result<(), Box<dyn Error>> {
        if let Some(session) = self.runtime.store.get_session(&self.session.id).await? {
            self.session = session;
        }
        Ok(())
    }

    async fn save(&self) -> Result<(), Box<dyn Error>> {
        self.runtime.store.update_session(&self.session).await?;
        Ok(())
    }

    async fn new_session(&mut self, name: Option<String>) -> Result<(), Box<dyn Error>> {
        let settings = self
            .runtime
            .new_session_settings(self.controller.tools(), Some(&self.session.model), None)
            .await;
        let settings = match name {
            Some(name) => settings.with_name(name),
            None => settings,
        };
        self.session = self.runtime.store.create_session(settings).await?;
        self.pending_images.clear();
        self.print_session_header();
        Ok(())
    }

    async fn apply(&mut self, action: Action) -> Result<Flow, Box<dyn Error>> {
        match action {
            Action::Help => println!("{}", help_text()),
            Action::Quit => return Ok(Flow::Quit),
            Action::New { name } => self.new_session(name).await?,
            Action::Sessions => {
                for summary in self.runtime.store.list_sessions().await? {
                    println!("{}", format_summary(&summary, summary.id == self.session.id));
                }
            }
            Action::Switch(id) => {
                self.session = self.runtime.find_session(&id).await?;
                self.pending_images.clear();
                self.print_session_header();
            }
            Action::Delete => {
                let deleted = self.session.clone();
                self.runtime.store.delete_session(&deleted.id).await?;
                println!("🗑️  Deleted session {} ({})", deleted.short_id(), deleted.name);
                self.new_session(None).await?;
            }
            Action::Rename(name) => {
                self.session.name = name;
                self.save().await?;
                println!("✅ Renamed to: {}", self.session.name);
            }
            Action::System(change) => self.apply_system(change).await?,
            Action::Model(model) => {
                self.session.model = model;
                self.save().await?;
                println!("✅ Model set to: {}", self.session.model);
            }
            Action::Params => {
                if self.session.parameters.is_empty() {
                    println!("No parameters set; the model's defaults apply.");
                } else {
                    println!("{}", self.session.parameters.to_pretty_json());
                }
            }
            Action::Param { key, value } => {
                match value {
                    Some(value) => {
                        self.session.parameters.set(&key, &value)?;
                        println!("✅ Set {key}");
                    }
                    None => {
                        let Some(previous) = self.session.parameters.get(&key).cloned() else {
                            return Err(format!("Parameter '{key}' is not set.").into());
                        };
                        self.session.parameters.unset(&key);
                        println!("✅ Cleared {key} (was {previous})");
                    }
                }
                self.save().await?;
            }
            Action::Format(format) => {
                self.session.format = format;
                self.save().await?;
                if self.session.format.is_text() {
                    println!("✅ Replies will be plain text.");
                } else {
                    println!("✅ Format set to: {}", self.session.format);
                }
            }
            Action::KeepAlive(minutes) => {
                self.session.keep_alive = minutes;
                self.save().await?;
                println!("✅ Keep-alive set to {minutes} minutes.");
            }
            Action::Tools => {
                for spec in self.controller.tools().specs() {
                    let mark = if self.session.tool_enabled(&spec.name) {
                        "●"
                    } else {
                        "○"
                    };
                    println!("  {mark} {:<20} [{}]", spec.name, spec.source.label());
                }
            }
            Action::Tool { name, enabled } => {
                if !self.controller.tools().contains(&name) {
                    return Err(format!("Unknown tool: {name}").into());
                }
                let changed = if enabled {
                    self.session.enable_tool(&name)
                } else {
                    self.session.disable_tool(&name)
                };
                if changed {
                    self.save().await?;
                }
                println!(
                    "✅ {name} {}",
                    if enabled { "enabled" } else { "disabled" }
                );
            }
            Action::Image(path) => self.attach_image(&path).await?,
            Action::Prompt { server, name, args } => {
                let messages = self.mcp.get_prompt(&server, &name, &args).await?;
                let text = messages
                    .iter()
                    .map(|message| message.text.as_str())
                    .filter(|text| !text.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                if text.is_empty() {
                    return Err(format!("Prompt '{name}' returned no text.").into());
                }
                println!("📝 {}", preview(&text));
                self.send(text).await;
            }
            Action::History => print!("{}", render_transcript(&self.session.messages)),
            Action::Calls => {
                let calls = self
                    .runtime
                    .store
                    .tool_invocations(&self.session.id)
                    .await?;
                if calls.is_empty() {
                    println!("No tool calls in this session.");
                }
                for call in calls {
                    println!(
                        "{} {} {} → {}{}",
                        format_timestamp(call.created_at),
                        call.call.name,
                        call.call.arguments_json(),
                        if call.is_error { "error: " } else { "" },
                        preview(&call.result)
                    );
                }
            }
            Action::Log(None) => println!("{}", self.logging.toggle_logging()?),
            Action::Log(Some(path)) => println!("{}", self.logging.set_log_file(path)?),
            Action::Export(path) => {
                let path = path.unwrap_or_else(|| default_export_path(&self.session.id));
                export_transcript(&self.session.messages, &path, false)?;
                println!("✅ Exported to {}", path.display());
            }
        }
        Ok(Flow::Continue)
    }

    async fn apply_system(&mut self, change: SystemChange) -> Result<(), Box<dyn Error>> {
        match change {
            SystemChange::Show => match &self.session.system {
                Some(system) => println!("{system}"),
                None => println!("No system prompt."),
            },
            SystemChange::Clear => {
                self.session.system = None;
                self.save().await?;
                println!("✅ System prompt cleared.");
            }
            SystemChange::Set(text) => {
                self.session.system = Some(text);
                self.save().await?;
                println!("✅ System prompt set.");
            }
        }
        Ok(())
    }

    async fn attach_image(&mut self, path: &Path) -> Result<(), Box<dyn Error>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| format!("Failed to read {}: {err}", path.display()))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.pending_images
            .push((path.display().to_string(), encoded));
        let names: Vec<&str> = self
            .pending_images
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        println!("📎 Attached to your next message: {}", names.join(", "));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\n  b\tc"), "a b c");
        let long = "x".repeat(TOOL_PREVIEW_CHARS + 5);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), TOOL_PREVIEW_CHARS + 1);
        assert!(shown.ends_with('…'));
    }
}
