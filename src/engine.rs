//! Engine facade tying storage, workflow and hooks together.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::hooks::{
    AggregateOutcome, Block, ContextBuilder, HookRegistry, OperationRequest, build_hooks,
};
use crate::storage::{self, keys};
use crate::workflow::WorkflowMachine;
use serde_json::Value;
use std::sync::Arc;
use tracing::{Instrument, info_span, warn};
use uuid::Uuid;

/// Processes operations for every session.
///
/// Built explicitly and passed around; holds no global state. One engine
/// serves all sessions concurrently through `&self`.
#[derive(Debug)]
pub struct Engine {
    workflow: Arc<WorkflowMachine>,
    contexts: ContextBuilder,
    registry: HookRegistry,
}

impl Engine {
    /// Create an engine from a workflow machine and a hook registry.
    #[must_use]
    pub fn new(workflow: WorkflowMachine, registry: HookRegistry) -> Self {
        let workflow = Arc::new(workflow);
        Self {
            contexts: ContextBuilder::new(Arc::clone(&workflow)),
            workflow,
            registry,
        }
    }

    /// Build an engine from configuration: open storage, compile the
    /// transition table and instantiate the declared hooks.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be opened or the workflow or hook
    /// configuration is invalid.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let table = config.workflow.table()?;
        let registry = build_hooks(&config.hooks)?;
        let store = storage::open(&config.storage).await?;
        let workflow =
            WorkflowMachine::new(store, table).with_session_ttl(config.storage.session_ttl());
        Ok(Self::new(workflow, registry))
    }

    /// The workflow machine.
    #[must_use]
    pub fn workflow(&self) -> &WorkflowMachine {
        &self.workflow
    }

    /// The hook registry.
    #[must_use]
    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    /// Run one operation through the hook chain.
    ///
    /// Dropping the returned future before it completes abandons the
    /// operation; the transition write is the only point at which anything
    /// is committed.
    ///
    /// # Errors
    ///
    /// Returns rejections ([`Error::is_rejection`]) and storage failures.
    /// Hook failures are not errors; they come back as a `Block`.
    pub async fn process(&self, request: OperationRequest) -> Result<AggregateOutcome> {
        let span = info_span!(
            "operation",
            request_id = %Uuid::new_v4(),
            session_id = %request.session_id,
            operation = %request.operation,
        );

        async move {
            let ctx = self.contexts.build(request).await?;
            self.registry.run(ctx, &self.workflow).await
        }
        .instrument(span)
        .await
    }

    /// Like [`process`](Self::process), with every error folded into a
    /// `Block` carrying a readable reason.
    pub async fn decide(&self, request: OperationRequest) -> AggregateOutcome {
        let session_id = request.session_id.clone();
        match self.process(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if !e.is_rejection() {
                    warn!(session_id = %session_id, "Operation failed: {e}");
                }
                AggregateOutcome::Block(Block::from(&e))
            }
        }
    }

    /// End a session and delete its data.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        self.workflow.end_session(session_id).await
    }

    /// Store application data for a session under the session TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn put_data(&self, session_id: &str, key: &str, value: &Value) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.workflow
            .store()
            .set(&keys::data(session_id, key), &json, self.workflow.session_ttl())
            .await
    }

    /// Read application data for a session.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or the stored value is not JSON.
    pub async fn get_data(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        self.workflow
            .store()
            .get(&keys::data(session_id, key))
            .await?
            .map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }

    /// Remove expired records from storage.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn sweep(&self) -> Result<usize> {
        self.workflow.store().sweep().await
    }
}
