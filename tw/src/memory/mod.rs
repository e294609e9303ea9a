//! Memory System
//!
//! Owns the global file→metadata index and answers context-retrieval
//! requests. Retrieval delegates to the Task System's associative-matching
//! template - an atomic task like any other - so the Memory System itself
//! never reads file contents and never calls a model directly.
//!
//! The index is a swappable snapshot: readers clone an `Arc`, writers
//! replace the pointer in bulk. Only `update_global_index` and
//! `index_git_repository` mutate it.

use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock, Weak};

use tracing::{debug, info};

use fileindex::{GlobalIndex, IndexOptions, index_repository};

use crate::domain::{AssociativeMatchResult, ContextGenerationInput, FailureReason, TaskError};
use crate::task::TaskSystem;

/// Global-index holder and retrieval front-end
pub struct MemorySystem {
    index: RwLock<Arc<GlobalIndex>>,
    /// Installed once at startup; Weak because the Task System holds the
    /// memory system in turn
    task_system: OnceLock<Weak<TaskSystem>>,
}

impl MemorySystem {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Arc::new(GlobalIndex::new())),
            task_system: OnceLock::new(),
        }
    }

    /// Create with a pre-built index (tests, offline runs)
    pub fn with_index(index: GlobalIndex) -> Self {
        Self {
            index: RwLock::new(Arc::new(index)),
            task_system: OnceLock::new(),
        }
    }

    /// Wire the metacircular pair; called once during startup
    pub fn attach_task_system(&self, task_system: Weak<TaskSystem>) {
        if self.task_system.set(task_system).is_err() {
            debug!("MemorySystem::attach_task_system: already attached, ignoring");
        }
    }

    /// Current index snapshot
    pub fn get_global_index(&self) -> Arc<GlobalIndex> {
        self.index.read().expect("index lock poisoned").clone()
    }

    /// Replace the index in bulk
    pub fn update_global_index(&self, index: GlobalIndex) {
        info!(files = index.len(), "MemorySystem::update_global_index: swapping snapshot");
        *self.index.write().expect("index lock poisoned") = Arc::new(index);
    }

    /// Re-index a repository and swap the result in
    ///
    /// Delegated to the external indexer library.
    pub fn index_git_repository(&self, path: impl AsRef<Path>, options: &IndexOptions) -> Result<usize, TaskError> {
        let index = index_repository(path.as_ref(), options).map_err(|e| {
            TaskError::failure(
                FailureReason::ContextRetrievalFailure,
                format!("indexing failed: {}", e),
            )
        })?;
        let count = index.len();
        self.update_global_index(index);
        Ok(count)
    }

    /// Retrieve relevant file paths for a context-generation input
    ///
    /// Validates the input, then delegates to the Task System's matcher.
    /// Any downstream failure surfaces as `context_retrieval_failure` with an
    /// empty match set in the details.
    pub async fn get_relevant_context_for(
        &self,
        input: &ContextGenerationInput,
    ) -> Result<AssociativeMatchResult, TaskError> {
        input.validate()?;
        debug!(query = %input.effective_query(), "MemorySystem::get_relevant_context_for: called");

        let task_system = self
            .task_system
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                TaskError::failure(
                    FailureReason::ContextRetrievalFailure,
                    "no task system attached for associative matching",
                )
            })?;

        let snapshot = self.get_global_index();
        if snapshot.is_empty() {
            return Ok(AssociativeMatchResult::empty());
        }

        task_system
            .generate_context_for_memory_system(input, &snapshot)
            .await
            .map_err(|e| {
                TaskError::failure(
                    FailureReason::ContextRetrievalFailure,
                    format!("associative matching failed: {}", e),
                )
            })
    }
}

impl Default for MemorySystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_starts_empty() {
        let memory = MemorySystem::new();
        assert!(memory.get_global_index().is_empty());
    }

    #[test]
    fn test_update_swaps_snapshot() {
        let memory = MemorySystem::new();
        let before = memory.get_global_index();

        let mut index = GlobalIndex::new();
        index.insert("/repo/auth.py", "login flow");
        memory.update_global_index(index);

        let after = memory.get_global_index();
        assert!(before.is_empty());
        assert_eq!(after.len(), 1);
    }

    #[test]
    fn test_index_git_repository_populates() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("main.rs"), "fn main() {}").unwrap();

        let memory = MemorySystem::new();
        let count = memory.index_git_repository(temp.path(), &IndexOptions::default()).unwrap();

        assert_eq!(count, 1);
        assert_eq!(memory.get_global_index().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let memory = MemorySystem::new();
        let err = memory
            .get_relevant_context_for(&ContextGenerationInput::default())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(FailureReason::InvalidInput));
    }

    #[tokio::test]
    async fn test_empty_index_short_circuits_to_empty_result() {
        let memory = MemorySystem::new();
        let result = memory
            .get_relevant_context_for(&ContextGenerationInput::from_query("anything"))
            .await
            .unwrap();
        assert!(result.matches.is_empty());
    }

    #[tokio::test]
    async fn test_unattached_task_system_is_retrieval_failure() {
        let mut index = GlobalIndex::new();
        index.insert("/repo/a.py", "auth");
        let memory = MemorySystem::with_index(index);

        let err = memory
            .get_relevant_context_for(&ContextGenerationInput::from_query("auth"))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(FailureReason::ContextRetrievalFailure));
    }
}
