//! Workflow state machine.
//!
//! The machine is the only writer of workflow records. Every mutation of a
//! session runs under that session's lock, so load, legality check and
//! write never interleave with another mutation of the same session.
//! Different sessions use different locks and never contend.

use crate::error::{Error, Result};
use crate::storage::{StorageProvider, keys};
use crate::workflow::{Session, Stage, TransitionTable, WorkflowState};
use dashmap::DashMap;
use futures::TryStreamExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

/// Authoritative per-session stage tracking.
pub struct WorkflowMachine {
    store: Arc<dyn StorageProvider>,
    table: TransitionTable,
    session_ttl: Option<Duration>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for WorkflowMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowMachine")
            .field("table", &self.table)
            .field("session_ttl", &self.session_ttl)
            .field("active_locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

/// Holds a session lock and drops the map entry once nobody else wants it.
struct SessionLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    session_id: &'a str,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionLock<'_> {
    fn drop(&mut self) {
        // Release first so the map holds the only remaining reference.
        self.guard.take();
        self.locks
            .remove_if(self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl WorkflowMachine {
    /// Create a machine over `store` with no session expiry.
    #[must_use]
    pub fn new(store: Arc<dyn StorageProvider>, table: TransitionTable) -> Self {
        Self {
            store,
            table,
            session_ttl: None,
            locks: DashMap::new(),
        }
    }

    /// Expire idle sessions after `ttl`. Each commit restarts the clock.
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// The transition table in force.
    #[must_use]
    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Session expiry in force.
    #[must_use]
    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl
    }

    /// The underlying storage provider.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StorageProvider> {
        &self.store
    }

    /// Load a session's workflow state.
    ///
    /// An unseen session gets a default state at the initial stage, which
    /// is returned without being written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if storage cannot be reached, a
    /// serialization error for a corrupt record, or [`Error::UnknownStage`]
    /// if the stored stage is no longer in the table.
    pub async fn load(&self, session_id: &str) -> Result<WorkflowState> {
        let raw = self
            .store
            .get(&keys::workflow(session_id))
            .await
            .inspect_err(|e| note_storage_error(session_id, e))?;

        let Some(raw) = raw else {
            return Ok(WorkflowState::new(session_id, self.table.initial().clone()));
        };

        let mut state: WorkflowState = serde_json::from_str(&raw)?;
        if !self.table.contains(&state.current_stage) {
            return Err(Error::UnknownStage(state.current_stage.to_string()));
        }
        state.persisted = true;
        Ok(state)
    }

    /// Move a session to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalTransition`] if `target` is not a successor of
    /// the current stage, in which case nothing is written.
    pub async fn transition(&self, session_id: &str, target: &Stage) -> Result<WorkflowState> {
        self.commit(session_id, None, target, BTreeMap::new()).await
    }

    /// Move a session to `target` only if it is still in `expected`.
    ///
    /// Used when the decision to transition was taken against an earlier
    /// snapshot. `metadata` is merged into the stored metadata on success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StageConflict`] if the session has left `expected`,
    /// plus everything [`transition`](Self::transition) returns.
    pub async fn transition_from(
        &self,
        session_id: &str,
        expected: &Stage,
        target: &Stage,
        metadata: BTreeMap<String, Value>,
    ) -> Result<WorkflowState> {
        self.commit(session_id, Some(expected), target, metadata).await
    }

    async fn commit(
        &self,
        session_id: &str,
        expected: Option<&Stage>,
        target: &Stage,
        metadata: BTreeMap<String, Value>,
    ) -> Result<WorkflowState> {
        let _lock = self.lock_session(session_id).await;

        let mut state = self.load(session_id).await?;
        let from = state.current_stage.clone();

        if let Some(expected) = expected {
            if from != *expected {
                warn!(
                    event = "transition_rejected",
                    session_id,
                    expected = %expected,
                    actual = %from,
                    to = %target,
                    "Stage changed since snapshot"
                );
                return Err(Error::StageConflict {
                    expected: expected.clone(),
                    actual: from,
                });
            }
        }

        if let Err(e) = self.table.check(&from, target) {
            warn!(
                event = "transition_rejected",
                session_id,
                from = %from,
                to = %target,
                "{e}"
            );
            return Err(e);
        }

        state.advance(target.clone(), metadata);
        let raw = serde_json::to_string(&state)?;

        // Sole commit point: either the whole record lands or nothing does.
        self.store
            .set(&keys::workflow(session_id), &raw, self.session_ttl)
            .await
            .inspect_err(|e| note_storage_error(session_id, e))?;
        state.persisted = true;

        info!(
            event = "transition_applied",
            session_id,
            from = %from,
            to = %target,
            "Transition applied"
        );
        Ok(state)
    }

    /// End a session, deleting its workflow record and application data.
    ///
    /// Ending an unknown session succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        let _lock = self.lock_session(session_id).await;

        let data_keys: Vec<String> = self
            .store
            .list(&keys::data_prefix(session_id))
            .await?
            .try_collect()
            .await?;
        for key in data_keys {
            self.store.delete(&key).await?;
        }
        self.store
            .delete(&keys::workflow(session_id))
            .await
            .inspect_err(|e| note_storage_error(session_id, e))?;

        info!(session_id, "Session ended");
        Ok(())
    }

    /// List persisted sessions, most recently accessed first.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let ids: Vec<String> = self
            .store
            .list(keys::WORKFLOW_PREFIX)
            .await?
            .try_collect()
            .await?;

        let mut sessions = Vec::with_capacity(ids.len());
        for key in ids {
            let Some(session_id) = keys::session_from_workflow_key(&key) else {
                continue;
            };
            // A record may expire or end between listing and loading.
            match self.load(session_id).await {
                Ok(state) if state.persisted => sessions.push(state.session),
                Ok(_) => {}
                Err(e @ Error::Unavailable(_)) => return Err(e),
                Err(e) => warn!(session_id, "Skipping unreadable workflow record: {e}"),
            }
        }

        sessions.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        Ok(sessions)
    }

    async fn lock_session<'a>(&'a self, session_id: &'a str) -> SessionLock<'a> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_default()
            .value()
            .clone();
        let guard = lock.lock_owned().await;
        SessionLock {
            locks: &self.locks,
            session_id,
            guard: Some(guard),
        }
    }
}

fn note_storage_error(session_id: &str, e: &Error) {
    if let Error::Unavailable(reason) = e {
        error!(event = "storage_unavailable", session_id, "{reason}");
    }
}
