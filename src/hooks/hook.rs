//! Core hook types and trait.

use crate::hooks::HookContext;
use crate::workflow::Stage;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Values hooks leave for later hooks in the same chain. Keys are unique;
/// the last write per key wins.
pub type Annotations = BTreeMap<String, Value>;

/// The result of evaluating one hook.
#[derive(Debug, Clone, PartialEq)]
pub enum HookResult {
    /// Let the operation proceed.
    Allow,

    /// Let the operation proceed and record annotations.
    Annotate(Annotations),

    /// Stop the chain and reject the operation.
    Block {
        /// Human-readable reason, returned to the client.
        reason: String,
    },

    /// Let the operation proceed and ask for a stage transition.
    Transition {
        /// Stage to move the session to.
        target: Stage,
        /// Annotations recorded alongside the request.
        annotations: Annotations,
    },
}

impl HookResult {
    /// Shorthand for `Allow`.
    #[must_use]
    pub fn allow() -> Self {
        Self::Allow
    }

    /// Shorthand for `Annotate` with a single entry.
    #[must_use]
    pub fn annotate(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Annotate(BTreeMap::from([(key.into(), value.into())]))
    }

    /// Shorthand for `Block { reason }`.
    #[must_use]
    pub fn block(reason: impl Into<String>) -> Self {
        Self::Block {
            reason: reason.into(),
        }
    }

    /// Shorthand for `Transition` without annotations.
    #[must_use]
    pub fn transition(target: impl Into<Stage>) -> Self {
        Self::Transition {
            target: target.into(),
            annotations: Annotations::new(),
        }
    }

    /// Attach an annotation, turning `Allow` into `Annotate`.
    ///
    /// `Block` is returned unchanged.
    #[must_use]
    pub fn with_annotation(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        match self {
            Self::Allow => Self::annotate(key, value),
            Self::Annotate(mut annotations) => {
                annotations.insert(key.into(), value.into());
                Self::Annotate(annotations)
            }
            Self::Transition {
                target,
                mut annotations,
            } => {
                annotations.insert(key.into(), value.into());
                Self::Transition {
                    target,
                    annotations,
                }
            }
            block @ Self::Block { .. } => block,
        }
    }
}

/// Hook execution errors.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The hook could not reach a decision.
    #[error("Hook execution failed: {reason}")]
    ExecutionFailed {
        /// Failure description.
        reason: String,
    },

    /// The hook exceeded the timeout its wrapper imposed.
    #[error("Hook timed out after {timeout:?}")]
    Timeout {
        /// Configured limit.
        timeout: Duration,
    },
}

impl HookError {
    /// Shorthand for `ExecutionFailed { reason }`.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            reason: reason.into(),
        }
    }
}

/// An interceptor evaluated around every operation.
///
/// Hooks read the context and answer with a [`HookResult`]. They never
/// write workflow state themselves; a transition is only a request that
/// the chain applies once every hook has allowed the operation.
#[async_trait]
pub trait Hook: Send + Sync {
    /// A unique name for this hook.
    fn name(&self) -> &str;

    /// Evaluate the hook. May suspend, e.g. to query a policy service.
    ///
    /// # Errors
    ///
    /// An error blocks the operation.
    async fn evaluate(&self, ctx: &HookContext) -> Result<HookResult, HookError>;
}
