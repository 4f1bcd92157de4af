//! `stagegate transition` command implementation.

use crate::engine::Engine;
use crate::error::Result;
use crate::workflow::Stage;

/// Run the transition command.
///
/// Moves a session to `stage`, subject to the transition table.
///
/// # Errors
///
/// Returns an error if the transition is illegal or storage fails.
pub async fn run(engine: &Engine, session_id: &str, stage: &str) -> Result<()> {
    let state = engine
        .workflow()
        .transition(session_id, &Stage::new(stage))
        .await?;

    let from = state
        .history
        .last()
        .map_or("?", Stage::as_str);
    println!("{session_id}: {from} -> {}", state.current_stage);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::test_support::review_engine;
    use crate::error::Error;
    use crate::hooks::HookRegistry;

    #[tokio::test]
    async fn manual_transition_persists() {
        let engine = review_engine(HookRegistry::new());
        run(&engine, "s", "review").await.unwrap();
        assert_eq!(
            engine.workflow().load("s").await.unwrap().current_stage,
            Stage::new("review")
        );
    }

    #[tokio::test]
    async fn illegal_manual_transition_fails() {
        let engine = review_engine(HookRegistry::new());
        let err = run(&engine, "s", "approved").await.unwrap_err();
        assert!(matches!(err, Error::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn unknown_stage_fails() {
        let engine = review_engine(HookRegistry::new());
        let err = run(&engine, "s", "published").await.unwrap_err();
        assert!(matches!(err, Error::UnknownStage(_)));
    }
}
