//! Per-session resource accounting

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{ResourceKind, TaskError};

/// Turn counter state
#[derive(Debug, Clone, Serialize)]
pub struct TurnMetrics {
    pub used: u32,
    pub limit: u32,
    pub last_turn_at: Option<DateTime<Utc>>,
}

/// Context-window accounting state
#[derive(Debug, Clone, Serialize)]
pub struct ContextMetrics {
    pub used: u32,
    pub limit: u32,
    pub peak: u32,
}

/// Combined per-session metrics
#[derive(Debug, Clone, Serialize)]
pub struct ResourceMetrics {
    pub turns: TurnMetrics,
    pub context: ContextMetrics,
}

impl ResourceMetrics {
    pub fn new(turn_limit: u32, context_limit: u32) -> Self {
        Self {
            turns: TurnMetrics {
                used: 0,
                limit: turn_limit,
                last_turn_at: None,
            },
            context: ContextMetrics {
                used: 0,
                limit: context_limit,
                peak: 0,
            },
        }
    }

    /// Count one assistant reply
    ///
    /// Only assistant messages increment the counter; user and tool messages
    /// never do.
    pub fn record_assistant_turn(&mut self) {
        self.turns.used += 1;
        self.turns.last_turn_at = Some(Utc::now());
        debug!(used = self.turns.used, limit = self.turns.limit, "ResourceMetrics: turn recorded");
    }

    /// Enforce the turn limit before the next LLM dispatch
    pub fn check_turns(&self) -> Result<(), TaskError> {
        if self.turns.used >= self.turns.limit {
            return Err(TaskError::exhausted(
                ResourceKind::Turns,
                self.turns.used as u64,
                self.turns.limit as u64,
            ));
        }
        Ok(())
    }

    /// Record a payload estimate and enforce the window before dispatch
    ///
    /// Warns at 80% of the limit; exceeding it is an error and the dispatch
    /// must not happen.
    pub fn check_context(&mut self, estimated_tokens: u32) -> Result<(), TaskError> {
        self.context.used = estimated_tokens;
        self.context.peak = self.context.peak.max(estimated_tokens);

        if estimated_tokens > self.context.limit {
            return Err(TaskError::exhausted(
                ResourceKind::Context,
                estimated_tokens as u64,
                self.context.limit as u64,
            ));
        }
        if estimated_tokens * 10 >= self.context.limit * 8 {
            warn!(
                used = estimated_tokens,
                limit = self.context.limit,
                "context window above 80% of limit"
            );
        }
        Ok(())
    }
}
