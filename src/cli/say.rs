//! REPL-less "say" command: one prompt, one streamed answer.

use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::runtime::Runtime;
use crate::core::controller::{TurnEvent, TurnOutcome, UserInput};
use crate::core::store::SessionStore;

pub async fn run_say(
    runtime: &Runtime,
    prompt: Vec<String>,
    model: Option<String>,
    session: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        return Err("Usage: hearth say <prompt>".into());
    }

    let (bridge, mcp) = runtime.tools().await;
    let session = match session {
        Some(id) => {
            let mut session = runtime.find_session(&id).await?;
            if let Some(model) = model {
                session.model = model;
                runtime.store.update_session(&session).await?;
            }
            session
        }
        None => {
            let settings = runtime
                .new_session_settings(&bridge, model.as_deref(), None)
                .await;
            runtime.store.create_session(settings).await?
        }
    };
    let controller = runtime.controller(Arc::new(bridge));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let turn = controller.run_turn(&session.id, UserInput::text(prompt), &tx, &cancel);
    tokio::pin!(turn);

    let mut stdout = io::stdout();
    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            Some(event) = rx.recv() => print_event(&mut stdout, event)?,
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => cancel.cancel(),
        }
    };
    while let Ok(event) = rx.try_recv() {
        print_event(&mut stdout, event)?;
    }
    writeln!(stdout)?;
    mcp.shutdown().await;

    match result? {
        TurnOutcome::Completed { .. } | TurnOutcome::ToolRoundLimit { .. } => {
            eprintln!("💾 Saved in session {}", session.short_id());
            Ok(())
        }
        TurnOutcome::Cancelled => Err("Cancelled.".into()),
    }
}

fn print_event(stdout: &mut io::Stdout, event: TurnEvent) -> io::Result<()> {
    match event {
        TurnEvent::Chunk(text) => {
            write!(stdout, "{text}")?;
            stdout.flush()
        }
        TurnEvent::ToolStarted { name, arguments } => {
            eprintln!("🔧 {name} {arguments}");
            Ok(())
        }
        TurnEvent::ToolFinished { name, is_error, .. } if is_error => {
            eprintln!("⚠️  {name} failed");
            Ok(())
        }
        TurnEvent::Notice(notice) => {
            eprintln!("⚠️  {notice}");
            Ok(())
        }
        TurnEvent::ToolFinished { .. } | TurnEvent::State(_) => Ok(()),
    }
}
