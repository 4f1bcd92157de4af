//! `stagegate check` command implementation.

use crate::engine::Engine;
use crate::error::Result;
use crate::hooks::{AggregateOutcome, OperationRequest};
use serde::Serialize;
use std::io::{self, Read, Write};

/// Run the check command.
///
/// Reads an operation request as JSON from stdin, runs it through the hook
/// chain and writes the outcome as JSON to stdout. A blocked operation is a
/// successful run; the decision is in the output.
///
/// # Errors
///
/// Returns an error if stdin is not a valid request or stdout fails.
pub async fn run(engine: &Engine) -> Result<()> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;

    let outcome = check(engine, &input).await?;
    write_json(&outcome)
}

/// Parse `input` and decide it.
async fn check(engine: &Engine, input: &str) -> Result<AggregateOutcome> {
    let request: OperationRequest = serde_json::from_str(input)?;
    Ok(engine.decide(request).await)
}

/// Write a serializable value as JSON to stdout.
fn write_json<T: Serialize>(output: &T) -> Result<()> {
    let json = serde_json::to_string(output)?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(json.as_bytes())?;
    stdout.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::test_support::review_engine;
    use crate::error::Error;
    use crate::hooks::{HookRegistry, StageGate};
    use crate::workflow::Stage;
    use std::sync::Arc;

    #[tokio::test]
    async fn check_allows_without_hooks() {
        let engine = review_engine(HookRegistry::new());
        let outcome = check(&engine, r#"{"session_id": "s", "operation": "read"}"#)
            .await
            .unwrap();
        assert_eq!(outcome, AggregateOutcome::allow());
    }

    #[tokio::test]
    async fn check_reports_block() {
        let mut registry = HookRegistry::new();
        registry.register(
            Arc::new(
                StageGate::new("gate", &["publish".to_string()], vec![Stage::new("approved")])
                    .unwrap(),
            ),
            None,
        );
        let engine = review_engine(registry);

        let outcome = check(
            &engine,
            r#"{"session_id": "s", "operation": "publish", "payload": {"doc": 1}}"#,
        )
        .await
        .unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["decision"], "block");
        assert_eq!(json["hook"], "gate");
    }

    #[tokio::test]
    async fn malformed_request_is_an_error() {
        let engine = review_engine(HookRegistry::new());
        let err = check(&engine, "not json").await.unwrap_err();
        assert!(matches!(err, Error::Serde(_)));
    }
}
