//! Built-in hooks that can be declared in `config.toml`.
//!
//! ```toml
//! [[hooks]]
//! name = "writes-need-review"
//! kind = "stage_gate"
//! operations = ["write_*", "delete_*"]
//! stages = ["review", "approved"]
//!
//! [[hooks]]
//! name = "submit"
//! kind = "advance"
//! operations = ["submit"]
//! from = ["draft"]
//! to = "review"
//! timeout_ms = 500
//! ```

use crate::error::{Error, Result};
use crate::hooks::{Hook, HookContext, HookError, HookRegistry, HookResult};
use crate::workflow::Stage;
use async_trait::async_trait;
use glob::Pattern;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// One `[[hooks]]` entry.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HookSpec {
    /// Unique hook name, reported in block reasons.
    pub name: String,

    /// Position in the chain; lower runs first.
    #[serde(default)]
    pub order: Option<i32>,

    /// Fail the hook if it has not answered within this many milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// What the hook does.
    #[serde(flatten)]
    pub kind: HookKind,
}

/// Built-in hook behaviours.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookKind {
    /// Block matching operations outside the listed stages.
    StageGate {
        /// Operation globs the gate applies to.
        operations: Vec<String>,
        /// Stages in which matching operations are allowed.
        stages: Vec<String>,
    },

    /// Request a transition when a matching operation runs in `from`.
    Advance {
        /// Operation globs that trigger the transition.
        operations: Vec<String>,
        /// Stages the transition starts from.
        from: Vec<String>,
        /// Target stage.
        to: String,
    },
}

/// Build a registry from config declarations.
///
/// # Errors
///
/// Returns [`Error::Config`] if a glob is invalid or two hooks share a name.
pub fn build_hooks(specs: &[HookSpec]) -> Result<HookRegistry> {
    let mut registry = HookRegistry::new();

    for spec in specs {
        if registry.names().contains(&spec.name.as_str()) {
            return Err(Error::Config(format!("duplicate hook name '{}'", spec.name)));
        }

        let hook: Arc<dyn Hook> = match &spec.kind {
            HookKind::StageGate { operations, stages } => Arc::new(StageGate::new(
                &spec.name,
                operations,
                stages.iter().map(Stage::new).collect(),
            )?),
            HookKind::Advance {
                operations,
                from,
                to,
            } => Arc::new(Advance::new(
                &spec.name,
                operations,
                from.iter().map(Stage::new).collect(),
                Stage::new(to),
            )?),
        };

        let hook: Arc<dyn Hook> = match spec.timeout_ms {
            Some(ms) => Arc::new(TimeoutHook::new(hook, Duration::from_millis(ms))),
            None => hook,
        };
        registry.register(hook, spec.order);
    }

    Ok(registry)
}

fn compile_patterns(hook: &str, patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| Error::Config(format!("hook '{hook}': invalid pattern '{p}': {e}")))
        })
        .collect()
}

fn matches_any(patterns: &[Pattern], operation: &str) -> bool {
    patterns.iter().any(|p| p.matches(operation))
}

/// Blocks matching operations unless the session is in an allowed stage.
#[derive(Debug)]
pub struct StageGate {
    name: String,
    operations: Vec<Pattern>,
    stages: Vec<Stage>,
}

impl StageGate {
    /// Create a gate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an operation glob is invalid.
    pub fn new(name: &str, operations: &[String], stages: Vec<Stage>) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            operations: compile_patterns(name, operations)?,
            stages,
        })
    }
}

#[async_trait]
impl Hook for StageGate {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, ctx: &HookContext) -> Result<HookResult, HookError> {
        if !matches_any(&self.operations, ctx.operation()) || self.stages.contains(ctx.stage()) {
            return Ok(HookResult::allow());
        }

        let allowed = self
            .stages
            .iter()
            .map(Stage::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Ok(HookResult::block(format!(
            "Operation '{}' is not allowed in stage '{}' (allowed in: {allowed})",
            ctx.operation(),
            ctx.stage()
        )))
    }
}

/// Requests a transition when a matching operation runs in a source stage.
#[derive(Debug)]
pub struct Advance {
    name: String,
    operations: Vec<Pattern>,
    from: Vec<Stage>,
    to: Stage,
}

impl Advance {
    /// Create an advance hook.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an operation glob is invalid.
    pub fn new(name: &str, operations: &[String], from: Vec<Stage>, to: Stage) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            operations: compile_patterns(name, operations)?,
            from,
            to,
        })
    }
}

#[async_trait]
impl Hook for Advance {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, ctx: &HookContext) -> Result<HookResult, HookError> {
        if matches_any(&self.operations, ctx.operation()) && self.from.contains(ctx.stage()) {
            Ok(HookResult::transition(self.to.clone())
                .with_annotation("advanced_to", self.to.as_str()))
        } else {
            Ok(HookResult::allow())
        }
    }
}

/// Fails the wrapped hook if it does not answer in time.
pub struct TimeoutHook<H: ?Sized = dyn Hook> {
    inner: Arc<H>,
    timeout: Duration,
}

impl<H: Hook + ?Sized> TimeoutHook<H> {
    /// Wrap `inner` with a deadline.
    #[must_use]
    pub fn new(inner: Arc<H>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<H: Hook + ?Sized> Hook for TimeoutHook<H> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn evaluate(&self, ctx: &HookContext) -> Result<HookResult, HookError> {
        tokio::time::timeout(self.timeout, self.inner.evaluate(ctx))
            .await
            .map_err(|_| HookError::Timeout {
                timeout: self.timeout,
            })?
    }
}
