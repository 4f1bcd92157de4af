//! Session and workflow state types.

use crate::workflow::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One logical conversation or work unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier (supplied by the protocol layer).
    pub session_id: String,

    /// When the session was first persisted.
    pub created_at: DateTime<Utc>,

    /// When the session's workflow last changed.
    pub last_accessed_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session starting now.
    #[must_use]
    pub fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            created_at: now,
            last_accessed_at: now,
        }
    }
}

/// Workflow state stored per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Session bookkeeping.
    pub session: Session,

    /// Stage the session is in.
    pub current_stage: Stage,

    /// Stages the session has left, oldest first.
    #[serde(default)]
    pub history: Vec<Stage>,

    /// Values recorded by hooks at transition time.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,

    /// Whether this state has been written to storage.
    #[serde(skip)]
    pub persisted: bool,
}

impl WorkflowState {
    /// Create the default state of an unseen session.
    #[must_use]
    pub fn new(session_id: &str, initial: Stage) -> Self {
        Self {
            session: Session::new(session_id),
            current_stage: initial,
            history: Vec::new(),
            metadata: BTreeMap::new(),
            persisted: false,
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    /// Move to `target`, recording the stage being left.
    pub(crate) fn advance(&mut self, target: Stage, metadata: BTreeMap<String, Value>) {
        let previous = std::mem::replace(&mut self.current_stage, target);
        self.history.push(previous);
        self.metadata.extend(metadata);
        self.session.last_accessed_at = Utc::now();
    }
}
