//! Hook registry and execution chain.

use crate::error::{Error, Result};
use crate::hooks::{AggregateOutcome, Annotations, Block, Hook, HookContext, HookResult};
use crate::workflow::{Stage, WorkflowMachine};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Order given to hooks registered without one.
pub const DEFAULT_ORDER: i32 = 100;

/// A registered hook with its resolved position.
struct HookEntry {
    hook: Arc<dyn Hook>,
    order: i32,
    seq: u64,
}

/// What the chain decided before anything was written.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainVerdict {
    /// A hook blocked (or failed); later hooks did not run.
    Blocked(Block),

    /// Every hook allowed the operation.
    Allowed {
        /// Annotations merged across the chain.
        annotations: Annotations,
        /// The single stage the chain asked to move to.
        transition: Option<Stage>,
    },
}

/// Ordered set of hooks evaluated around every operation.
///
/// Hooks run by ascending `order`; equal orders run in registration order.
/// A `Block` stops the chain immediately. Transition requests are applied
/// only after every hook has allowed the operation.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<HookEntry>,
    next_seq: u64,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.names())
            .finish()
    }
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. Lower `order` runs first; `None` means
    /// [`DEFAULT_ORDER`].
    pub fn register(&mut self, hook: Arc<dyn Hook>, order: Option<i32>) {
        let entry = HookEntry {
            hook,
            order: order.unwrap_or(DEFAULT_ORDER),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.hooks.push(entry);
        self.hooks.sort_by_key(|e| (e.order, e.seq));
    }

    /// Unregister every hook named `name`. Returns `true` if any was removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|e| e.hook.name() != name);
        self.hooks.len() < before
    }

    /// Registered hook names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|e| e.hook.name()).collect()
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run the chain without touching storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AmbiguousTransition`] if hooks that all allowed the
    /// operation asked for different target stages.
    pub async fn evaluate(&self, mut ctx: HookContext) -> Result<ChainVerdict> {
        let mut requests: Vec<(String, Stage)> = Vec::new();

        for entry in &self.hooks {
            let hook = entry.hook.as_ref();
            let name = hook.name();

            let result = match AssertUnwindSafe(hook.evaluate(&ctx)).catch_unwind().await {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => {
                    warn!(
                        event = "hook_failed",
                        hook = name,
                        session_id = ctx.session_id(),
                        "{err}"
                    );
                    return Ok(ChainVerdict::Blocked(Block::hook_failure(
                        name,
                        &err.to_string(),
                    )));
                }
                Err(panic) => {
                    let detail = panic_message(panic.as_ref());
                    warn!(
                        event = "hook_failed",
                        hook = name,
                        session_id = ctx.session_id(),
                        "Hook panicked: {detail}"
                    );
                    return Ok(ChainVerdict::Blocked(Block::hook_failure(
                        name,
                        &format!("panicked: {detail}"),
                    )));
                }
            };

            match result {
                HookResult::Allow => {}
                HookResult::Annotate(annotations) => ctx.merge_annotations(annotations),
                HookResult::Block { reason } => {
                    info!(
                        event = "hook_blocked",
                        hook = name,
                        session_id = ctx.session_id(),
                        operation = ctx.operation(),
                        "{reason}"
                    );
                    return Ok(ChainVerdict::Blocked(Block::by_hook(name, &reason)));
                }
                HookResult::Transition {
                    target,
                    annotations,
                } => {
                    debug!(hook = name, to = %target, "Hook requested transition");
                    ctx.merge_annotations(annotations);
                    requests.push((name.to_string(), target));
                }
            }
        }

        let transition = single_target(requests).inspect_err(|e| {
            warn!(
                event = "transition_rejected",
                session_id = ctx.session_id(),
                "{e}"
            );
        })?;

        Ok(ChainVerdict::Allowed {
            annotations: ctx.into_annotations(),
            transition,
        })
    }

    /// Run the chain and apply the requested transition, if any.
    ///
    /// The transition is committed against the stage in the context
    /// snapshot, so a session that moved on meanwhile is rejected rather
    /// than advanced twice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AmbiguousTransition`], [`Error::IllegalTransition`],
    /// [`Error::StageConflict`] or a storage error; no write happens in any
    /// of these cases.
    pub async fn run(
        &self,
        ctx: HookContext,
        workflow: &WorkflowMachine,
    ) -> Result<AggregateOutcome> {
        let session_id = ctx.session_id().to_string();
        let snapshot = ctx.stage().clone();

        match self.evaluate(ctx).await? {
            ChainVerdict::Blocked(block) => Ok(AggregateOutcome::Block(block)),
            ChainVerdict::Allowed {
                annotations,
                transition: None,
            } => Ok(AggregateOutcome::Allow {
                annotations,
                stage: None,
            }),
            ChainVerdict::Allowed {
                annotations,
                transition: Some(target),
            } => {
                let state = workflow
                    .transition_from(&session_id, &snapshot, &target, annotations.clone())
                    .await?;
                Ok(AggregateOutcome::Allow {
                    annotations,
                    stage: Some(state.current_stage),
                })
            }
        }
    }
}

/// Collapse transition requests into at most one target.
fn single_target(requests: Vec<(String, Stage)>) -> Result<Option<Stage>> {
    let Some((_, first)) = requests.first() else {
        return Ok(None);
    };
    if requests.iter().all(|(_, target)| target == first) {
        return Ok(Some(first.clone()));
    }
    Err(Error::AmbiguousTransition { requests })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
