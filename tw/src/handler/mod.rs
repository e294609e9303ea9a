//! Handler session
//!
//! One session type owns a conversation: history, resource accounting, the
//! tool registry, and the multi-step tool-calling loop. Sessions are created
//! per top-level user turn (the REPL keeps one alive for continuity) or per
//! nested atomic execution, and harvested for metrics when done.

mod history;
mod metrics;
mod session;

pub use history::ConversationHistory;
pub use metrics::{ContextMetrics, ResourceMetrics, TurnMetrics};
pub use session::{Handler, PromptSpec};
