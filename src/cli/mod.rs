//! CLI command implementations.

pub mod check;
pub mod clean;
pub mod end;
pub mod list;
pub mod status;
pub mod transition;
