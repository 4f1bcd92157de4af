//! `stagegate list` command implementation.

use crate::engine::Engine;
use crate::error::Result;
use crate::workflow::Session;
use chrono::{DateTime, Local, Utc};

/// Default number of sessions to show.
const DEFAULT_LIMIT: usize = 20;

/// Run the list command.
///
/// Shows live sessions, most recently accessed first.
///
/// # Errors
///
/// Returns an error if the storage backend fails.
pub async fn run(engine: &Engine, limit: Option<usize>) -> Result<()> {
    let sessions = recent_sessions(engine, limit.unwrap_or(DEFAULT_LIMIT)).await?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!("{:<38} {:<20} {:<20} Stage", "Session ID", "Created", "Last Active");
    println!("{}", "─".repeat(90));

    for (session, stage) in &sessions {
        println!(
            "{:<38} {:<20} {:<20} {}",
            session.session_id,
            format_local_time(session.created_at),
            format_local_time(session.last_accessed_at),
            stage
        );
    }

    println!("{}", "─".repeat(90));
    println!("Showing {} session(s)", sessions.len());

    Ok(())
}

/// Up to `limit` sessions with their current stage.
async fn recent_sessions(engine: &Engine, limit: usize) -> Result<Vec<(Session, String)>> {
    let mut rows = Vec::new();
    for session in engine.workflow().list_sessions().await?.into_iter().take(limit) {
        let stage = match engine.workflow().load(&session.session_id).await {
            Ok(state) => state.current_stage.to_string(),
            Err(_) => "(unreadable)".to_string(),
        };
        rows.push((session, stage));
    }
    Ok(rows)
}

/// Format UTC time as local time for display.
fn format_local_time(utc: DateTime<Utc>) -> String {
    let local: DateTime<Local> = utc.into();
    local.format("%Y-%m-%d %H:%M").to_string()
}
