//! stagegate - Session-scoped workflow stages with hook-gated operations.
//!
//! Every operation a client performs runs through an ordered chain of hooks
//! that can annotate it, block it or ask to move the session to another
//! workflow stage. Stages and their legal transitions come from a
//! configurable table; session state lives behind a pluggable storage
//! provider (memory, files, or Redis).

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod storage;
pub mod workflow;

pub use config::Config;
pub use engine::Engine;
pub use error::{Error, Result};
