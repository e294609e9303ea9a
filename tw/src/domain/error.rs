//! Error taxonomy: resource exhaustion vs task failure
//!
//! Errors are values (spec-level policy): components return them, the
//! dispatcher converts them into FAILED results at the boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resource that ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Turns,
    Context,
    Output,
    ToolBudget,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            ResourceKind::Turns => "turns",
            ResourceKind::Context => "context",
            ResourceKind::Output => "output",
            ResourceKind::ToolBudget => "tool_budget",
        };
        write!(f, "{}", tag)
    }
}

/// Enumerated failure tags carried by `TaskError::TaskFailure`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MissingInput,
    TemplateNotFound,
    OutputFormatFailure,
    ContextRetrievalFailure,
    ContextParsingFailure,
    SubtaskFailure,
    UnboundSymbol,
    CycleDetected,
    DepthExceeded,
    UnknownCommand,
    Timeout,
    Cancelled,
    ToolError,
    ProviderError,
    InvalidInput,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            FailureReason::MissingInput => "missing_input",
            FailureReason::TemplateNotFound => "template_not_found",
            FailureReason::OutputFormatFailure => "output_format_failure",
            FailureReason::ContextRetrievalFailure => "context_retrieval_failure",
            FailureReason::ContextParsingFailure => "context_parsing_failure",
            FailureReason::SubtaskFailure => "subtask_failure",
            FailureReason::UnboundSymbol => "unbound_symbol",
            FailureReason::CycleDetected => "cycle_detected",
            FailureReason::DepthExceeded => "depth_exceeded",
            FailureReason::UnknownCommand => "unknown_command",
            FailureReason::Timeout => "timeout",
            FailureReason::Cancelled => "cancelled",
            FailureReason::ToolError => "tool_error",
            FailureReason::ProviderError => "provider_error",
            FailureReason::InvalidInput => "invalid_input",
        };
        write!(f, "{}", tag)
    }
}

/// The two error kinds every component can return
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskError {
    #[error("resource exhaustion: {resource} used {used} of {limit}")]
    ResourceExhaustion {
        resource: ResourceKind,
        used: u64,
        limit: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    #[error("task failure ({reason}): {message}")]
    TaskFailure {
        reason: FailureReason,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

impl TaskError {
    /// Build a `TaskFailure` with no details
    pub fn failure(reason: FailureReason, message: impl Into<String>) -> Self {
        TaskError::TaskFailure {
            reason,
            message: message.into(),
            details: None,
        }
    }

    /// Build a `TaskFailure` carrying structured details
    pub fn failure_with(reason: FailureReason, message: impl Into<String>, details: serde_json::Value) -> Self {
        TaskError::TaskFailure {
            reason,
            message: message.into(),
            details: Some(details),
        }
    }

    /// Build a `ResourceExhaustion`
    pub fn exhausted(resource: ResourceKind, used: u64, limit: u64) -> Self {
        TaskError::ResourceExhaustion {
            resource,
            used,
            limit,
            reason: None,
        }
    }

    /// Build a `ResourceExhaustion` with an explanatory tag
    pub fn exhausted_because(resource: ResourceKind, used: u64, limit: u64, reason: impl Into<String>) -> Self {
        TaskError::ResourceExhaustion {
            resource,
            used,
            limit,
            reason: Some(reason.into()),
        }
    }

    /// Failure reason when this is a `TaskFailure`
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            TaskError::TaskFailure { reason, .. } => Some(*reason),
            TaskError::ResourceExhaustion { .. } => None,
        }
    }

    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, TaskError::ResourceExhaustion { .. })
    }

    /// Process exit code for the CLI surface: 1 for failures, 2 for exhaustion
    pub fn exit_code(&self) -> i32 {
        match self {
            TaskError::TaskFailure { .. } => 1,
            TaskError::ResourceExhaustion { .. } => 2,
        }
    }
}
