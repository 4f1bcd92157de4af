//! Aggregate outcome types returned to the protocol layer.

use crate::error::Error;
use crate::hooks::Annotations;
use crate::workflow::Stage;
use serde::Serialize;

/// Final decision for one operation after the whole chain ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AggregateOutcome {
    /// The operation may proceed.
    Allow {
        /// Annotations merged across the chain.
        annotations: Annotations,

        /// Stage the session moved to, if the chain applied a transition.
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<Stage>,
    },

    /// The operation must be rejected.
    Block(Block),
}

/// Why an operation was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    /// Human-readable reason, suitable for the end client.
    pub reason: String,

    /// Hook that blocked, if one did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,

    /// Category of the rejection.
    pub cause: BlockCause,
}

/// Category of a blocked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCause {
    /// A hook returned `Block`.
    Hook,
    /// A hook raised an error, panicked or timed out.
    HookFailure,
    /// The requested stage transition was illegal, stale or ambiguous.
    Rejected,
    /// Storage could not be reached or returned bad data.
    Unavailable,
}

impl Block {
    /// A block issued by hook `hook`.
    #[must_use]
    pub fn by_hook(hook: &str, reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
            hook: Some(hook.to_string()),
            cause: BlockCause::Hook,
        }
    }

    /// A fail-closed block for a hook that could not decide.
    #[must_use]
    pub fn hook_failure(hook: &str, detail: &str) -> Self {
        Self {
            reason: format!("hook failure in '{hook}': {detail}"),
            hook: Some(hook.to_string()),
            cause: BlockCause::HookFailure,
        }
    }
}

impl From<&Error> for Block {
    fn from(err: &Error) -> Self {
        let cause = if err.is_rejection() {
            BlockCause::Rejected
        } else {
            BlockCause::Unavailable
        };
        Self {
            reason: err.to_string(),
            hook: None,
            cause,
        }
    }
}

impl AggregateOutcome {
    /// Allow without annotations or transition.
    #[must_use]
    pub fn allow() -> Self {
        Self::Allow {
            annotations: Annotations::new(),
            stage: None,
        }
    }

    /// Whether the operation may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// The block reason, if blocked.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allow { .. } => None,
            Self::Block(block) => Some(&block.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn allow_serialization() {
        let output = AggregateOutcome::allow();
        let json = serde_json::to_string(&output).unwrap();
        assert_eq!(json, r#"{"decision":"allow","annotations":{}}"#);
    }

    #[test]
    fn allow_with_stage_serialization() {
        let output = AggregateOutcome::Allow {
            annotations: Annotations::from([("k".to_string(), json!(1))]),
            stage: Some(Stage::new("review")),
        };
        let json = serde_json::to_string(&output).unwrap();
        assert_eq!(
            json,
            r#"{"decision":"allow","annotations":{"k":1},"stage":"review"}"#
        );
    }

    #[test]
    fn block_serialization() {
        let output = AggregateOutcome::Block(Block::by_hook("gate", "Review required"));
        let json = serde_json::to_string(&output).unwrap();
        assert_eq!(
            json,
            r#"{"decision":"block","reason":"Review required","hook":"gate","cause":"hook"}"#
        );
        assert_eq!(output.reason(), Some("Review required"));
        assert!(!output.is_allowed());
    }

    #[test]
    fn hook_failure_reason_is_readable() {
        let block = Block::hook_failure("policy", "connection refused");
        assert_eq!(block.cause, BlockCause::HookFailure);
        assert!(block.reason.contains("hook failure"));
        assert!(block.reason.contains("connection refused"));
    }

    #[test]
    fn errors_map_to_causes() {
        let illegal = Error::IllegalTransition {
            from: Stage::new("a"),
            to: Stage::new("b"),
        };
        assert_eq!(Block::from(&illegal).cause, BlockCause::Rejected);

        let down = Error::Unavailable("redis: connection refused".to_string());
        let block = Block::from(&down);
        assert_eq!(block.cause, BlockCause::Unavailable);
        assert!(block.reason.contains("connection refused"));
    }
}
