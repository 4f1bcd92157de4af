//! Per-session workflow stages and the machine that advances them.

pub mod machine;
pub mod stage;
pub mod state;

pub use machine::WorkflowMachine;
pub use stage::{Stage, TransitionTable};
pub use state::{Session, WorkflowState};
