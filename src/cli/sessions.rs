//! `hearth sessions`, `hearth delete`, and `hearth export`.

use std::error::Error;
use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};

use crate::cli::runtime::Runtime;
use crate::core::session::{short_id, SessionSummary};
use crate::core::store::SessionStore;
use crate::utils::logging::export_transcript;

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_summary(summary: &SessionSummary, current: bool) -> String {
    format!(
        "{} {}  {}  {:<16}  {:>4} msgs  {}",
        if current { "▶" } else { " " },
        short_id(&summary.id),
        format_timestamp(summary.updated_at),
        summary.model,
        summary.message_count,
        summary.name
    )
}

pub async fn list_sessions(runtime: &Runtime) -> Result<(), Box<dyn Error>> {
    let sessions = runtime.store.list_sessions().await?;
    if sessions.is_empty() {
        println!("No saved sessions. Run 'hearth' to start one.");
        return Ok(());
    }
    println!("💬 Sessions (most recent first)");
    for summary in &sessions {
        println!("{}", format_summary(summary, false));
    }
    Ok(())
}

pub async fn delete_session(runtime: &Runtime, id: &str) -> Result<(), Box<dyn Error>> {
    let session = runtime.find_session(id).await?;
    runtime.store.delete_session(&session.id).await?;
    println!("🗑️  Deleted session {} ({})", session.short_id(), session.name);
    Ok(())
}

pub fn default_export_path(session_id: &str) -> PathBuf {
    PathBuf::from(format!(
        "hearth-{}-{}.txt",
        short_id(session_id),
        Local::now().format("%Y-%m-%d")
    ))
}

pub async fn export_session(
    runtime: &Runtime,
    id: &str,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let session = runtime.find_session(id).await?;
    let path = output.unwrap_or_else(|| default_export_path(&session.id));
    export_transcript(&session.messages, &path, false)?;
    println!("✅ Exported {} messages to {}", session.messages.len(), path.display());
    Ok(())
}
