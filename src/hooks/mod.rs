//! Hook trait, chain execution and built-in hooks.

pub mod builtin;
pub mod context;
pub mod hook;
pub mod output;
pub mod registry;

pub use builtin::{Advance, HookKind, HookSpec, StageGate, TimeoutHook, build_hooks};
pub use context::{ContextBuilder, HookContext, OperationRequest};
pub use hook::{Annotations, Hook, HookError, HookResult};
pub use output::{AggregateOutcome, Block, BlockCause};
pub use registry::{ChainVerdict, DEFAULT_ORDER, HookRegistry};
