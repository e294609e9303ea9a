//! Core data model: result envelope, error taxonomy, request types

mod error;
mod request;
mod result;

pub use error::{FailureReason, ResourceKind, TaskError};
pub use request::{
    AssociativeMatchResult, ContextGenerationInput, ContextManagement, FileMatch, InheritMode,
    ResolvedContextManagement, SubtaskRequest,
};
pub use result::{TaskNotes, TaskResult, TaskStatus};
