//! Unified tool interface
//!
//! Two tool kinds, identical from the LLM's view: direct tools execute
//! synchronously inside the Handler; subtask tools yield a CONTINUATION for
//! the orchestrator above to resolve.

mod context;
mod error;
mod registry;

pub mod builtin;

pub use context::ToolContext;
pub use error::ToolError;
pub use registry::{DirectTool, RegisteredTool, ToolOutcome, ToolRegistry};
