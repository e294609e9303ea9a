//! The universal result envelope

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::TaskError;
use super::request::SubtaskRequest;

/// Result status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Complete,
    Failed,
    Continuation,
    Partial,
}

/// Free-form notes attached to every result
///
/// The well-known keys are typed; anything else rides in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskNotes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_used: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_source: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_files_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,

    /// Present exactly when status is CONTINUATION
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtask_request: Option<SubtaskRequest>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TaskNotes {
    /// Attach an ad-hoc note
    pub fn set_extra(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.extra.insert(key.into(), value);
    }
}

/// The universal result envelope returned by every executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    pub content: String,
    pub notes: TaskNotes,

    /// Parsed JSON payload when the template declared `output_format: json`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_content: Option<serde_json::Value>,
}

impl TaskResult {
    /// Successful completion with plain content
    pub fn complete(content: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Complete,
            content: content.into(),
            notes: TaskNotes::default(),
            parsed_content: None,
        }
    }

    /// Failure; the error is carried in `notes.error`
    pub fn failed(error: TaskError) -> Self {
        Self::failed_with_content(error, String::new())
    }

    /// Failure preserving partial content (allowed for atomic tasks)
    pub fn failed_with_content(error: TaskError, content: impl Into<String>) -> Self {
        let mut notes = TaskNotes::default();
        notes.error = Some(error);
        Self {
            status: TaskStatus::Failed,
            content: content.into(),
            notes,
            parsed_content: None,
        }
    }

    /// A continuation asking the orchestrator to run `request` and resume
    pub fn continuation(request: SubtaskRequest, content: impl Into<String>) -> Self {
        let mut notes = TaskNotes::default();
        notes.subtask_request = Some(request);
        Self {
            status: TaskStatus::Continuation,
            content: content.into(),
            notes,
            parsed_content: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == TaskStatus::Complete
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    /// Builder-style notes attachment
    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.notes.template_used = Some(name.into());
        self
    }

    /// Error carried by a FAILED result, if any
    pub fn error(&self) -> Option<&TaskError> {
        self.notes.error.as_ref()
    }
}
