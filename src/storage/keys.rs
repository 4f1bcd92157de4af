//! Storage key builders.
//!
//! Workflow records and application session data share one substrate and
//! are told apart by namespace.

/// Namespace holding one workflow record per session.
pub const WORKFLOW_PREFIX: &str = "workflow:";

/// Namespace holding application session data.
pub const DATA_PREFIX: &str = "data:";

/// Key for a session's workflow record.
#[must_use]
pub fn workflow(session_id: &str) -> String {
    format!("{WORKFLOW_PREFIX}{session_id}")
}

/// Key for one application data entry of a session.
#[must_use]
pub fn data(session_id: &str, key: &str) -> String {
    format!("{DATA_PREFIX}{session_id}:{key}")
}

/// Prefix covering every application data entry of a session.
#[must_use]
pub fn data_prefix(session_id: &str) -> String {
    format!("{DATA_PREFIX}{session_id}:")
}

/// Recover the session id from a workflow key.
#[must_use]
pub fn session_from_workflow_key(key: &str) -> Option<&str> {
    key.strip_prefix(WORKFLOW_PREFIX)
}
