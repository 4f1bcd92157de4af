//! `stagegate end` command implementation.

use crate::engine::Engine;
use crate::error::Result;

/// Run the end command.
///
/// # Errors
///
/// Returns an error if storage fails.
pub async fn run(engine: &Engine, session_id: &str) -> Result<()> {
    engine.end_session(session_id).await?;
    println!("Ended session {session_id}.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::test_support::review_engine;
    use crate::hooks::HookRegistry;

    #[tokio::test]
    async fn end_removes_session() {
        let engine = review_engine(HookRegistry::new());
        engine
            .workflow()
            .transition("s", &"review".into())
            .await
            .unwrap();

        run(&engine, "s").await.unwrap();
        assert!(!engine.workflow().load("s").await.unwrap().persisted);
        assert!(engine.workflow().list_sessions().await.unwrap().is_empty());
    }
}
