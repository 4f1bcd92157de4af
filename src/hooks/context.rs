//! Hook context and the builder that assembles it.

use crate::error::Result;
use crate::hooks::Annotations;
use crate::workflow::{Stage, WorkflowMachine, WorkflowState};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// An already-parsed operation handed over by the protocol layer.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationRequest {
    /// Session identifier.
    pub session_id: String,

    /// Operation name (e.g. the tool being called).
    pub operation: String,

    /// Operation arguments, opaque to the core.
    #[serde(default)]
    pub payload: Value,
}

impl OperationRequest {
    /// Create a request.
    #[must_use]
    pub fn new(session_id: &str, operation: &str, payload: Value) -> Self {
        Self {
            session_id: session_id.to_string(),
            operation: operation.to_string(),
            payload,
        }
    }
}

/// Read-mostly view of one operation passed to every hook in the chain.
///
/// The workflow snapshot is taken once, before the first hook runs. The
/// annotation map grows as the chain merges each hook's annotations in.
#[derive(Debug, Clone)]
pub struct HookContext {
    request: OperationRequest,
    workflow: WorkflowState,
    annotations: Annotations,
}

impl HookContext {
    /// Create a context from a request and a workflow snapshot.
    #[must_use]
    pub fn new(request: OperationRequest, workflow: WorkflowState) -> Self {
        Self {
            request,
            workflow,
            annotations: Annotations::new(),
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.request.session_id
    }

    /// Operation name.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.request.operation
    }

    /// Operation payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.request.payload
    }

    /// Workflow state at context-build time.
    #[must_use]
    pub fn workflow(&self) -> &WorkflowState {
        &self.workflow
    }

    /// Stage at context-build time.
    #[must_use]
    pub fn stage(&self) -> &Stage {
        &self.workflow.current_stage
    }

    /// Annotations left by hooks that already ran.
    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// Look up one annotation.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&Value> {
        self.annotations.get(key)
    }

    /// Merge a hook's annotations; existing keys are overwritten.
    pub(crate) fn merge_annotations(&mut self, annotations: Annotations) {
        self.annotations.extend(annotations);
    }

    pub(crate) fn into_annotations(self) -> Annotations {
        self.annotations
    }
}

/// Assembles a [`HookContext`] per operation.
///
/// Building a context only reads workflow state; it never writes storage.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    workflow: Arc<WorkflowMachine>,
}

impl ContextBuilder {
    /// Create a builder reading from `workflow`.
    #[must_use]
    pub fn new(workflow: Arc<WorkflowMachine>) -> Self {
        Self { workflow }
    }

    /// Build the context for `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow state cannot be loaded.
    pub async fn build(&self, request: OperationRequest) -> Result<HookContext> {
        let workflow = self.workflow.load(&request.session_id).await?;
        Ok(HookContext::new(request, workflow))
    }
}
