//! `stagegate status` command implementation.

use crate::engine::Engine;
use crate::error::{Error, Result};

/// Run the status command.
///
/// Prints the session's workflow record as JSON.
///
/// # Errors
///
/// Returns an error if storage fails or the session has no record.
pub async fn run(engine: &Engine, session_id: &str) -> Result<()> {
    println!("{}", status_json(engine, session_id).await?);
    Ok(())
}

async fn status_json(engine: &Engine, session_id: &str) -> Result<String> {
    let state = engine.workflow().load(session_id).await?;
    if !state.persisted {
        return Err(Error::NotFound(format!("session '{session_id}'")));
    }
    Ok(serde_json::to_string_pretty(&state)?)
}
