//! Context resolution for atomic executions
//!
//! Precedence per setting: request-level override, then template-level
//! declaration, then system defaults. When the effective settings ask for
//! fresh context, retrieval goes through the Memory System and the returned
//! paths are union-merged with explicit ones - explicit paths are always
//! included.

use std::path::Path;

use tracing::{debug, warn};

use crate::domain::{ContextGenerationInput, ResolvedContextManagement, SubtaskRequest, TaskError};
use crate::memory::MemorySystem;
use crate::tools::builtin::read_file_raw;

use super::template::TemplateDefinition;

/// Fully assembled context for one atomic execution
#[derive(Debug, Clone, Default)]
pub struct ResolvedContext {
    /// Concatenated file contents with path-labelled delimiters
    pub context_string: Option<String>,

    /// Paths whose contents made it into the context string
    pub included_files: Vec<String>,

    /// Where the context came from: "none", "explicit", "fresh_retrieval",
    /// or "explicit+fresh_retrieval"
    pub source: String,
}

impl ResolvedContext {
    pub fn none() -> Self {
        Self {
            source: "none".to_string(),
            ..Default::default()
        }
    }
}

/// Resolve and assemble the context for a request against a template
pub async fn resolve_context(
    request: &SubtaskRequest,
    template: &TemplateDefinition,
    memory: &MemorySystem,
) -> Result<ResolvedContext, TaskError> {
    let settings = ResolvedContextManagement::resolve(
        request.context_management.as_ref(),
        template.context_management.as_ref(),
    );

    // Explicit paths: request override wins over template declaration
    let explicit: Vec<String> = request
        .file_paths
        .clone()
        .or_else(|| template.file_paths.clone())
        .unwrap_or_default();

    let mut paths = explicit.clone();
    let mut fresh_count = 0usize;

    if settings.fresh_context {
        let input = ContextGenerationInput {
            template_description: Some(template.description.clone()),
            template_type: Some(template.template_type.clone()),
            template_subtype: Some(template.subtype.clone()),
            inputs: Some(request.inputs.clone()),
            ..Default::default()
        };
        let matched = memory.get_relevant_context_for(&input).await?;
        for file_match in matched.matches {
            let path = file_match.path.display().to_string();
            if !paths.contains(&path) {
                paths.push(path);
                fresh_count += 1;
            }
        }
    }

    let source = match (!explicit.is_empty(), fresh_count > 0) {
        (false, false) => "none",
        (true, false) => "explicit",
        (false, true) => "fresh_retrieval",
        (true, true) => "explicit+fresh_retrieval",
    };

    if paths.is_empty() {
        debug!(template = %template.name, "resolve_context: no context");
        return Ok(ResolvedContext::none());
    }

    // Read contents through the file-access path and label each section
    let mut sections = Vec::new();
    let mut included_files = Vec::new();
    for path in &paths {
        match read_file_raw(Path::new(path)).await {
            Ok(content) => {
                sections.push(format!("=== FILE: {} ===\n{}", path, content));
                included_files.push(path.clone());
            }
            Err(e) => {
                warn!(%path, error = %e, "resolve_context: skipping unreadable file");
            }
        }
    }

    debug!(
        template = %template.name,
        files = included_files.len(),
        source,
        "resolve_context: assembled"
    );

    Ok(ResolvedContext {
        context_string: if sections.is_empty() { None } else { Some(sections.join("\n\n")) },
        included_files,
        source: source.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContextManagement;

    fn template() -> TemplateDefinition {
        TemplateDefinition {
            name: "t".to_string(),
            template_type: "atomic".to_string(),
            subtype: "test".to_string(),
            description: "test template".to_string(),
            params: vec![],
            system_prompt: String::new(),
            instructions: String::new(),
            output_format: None,
            context_management: Some(ContextManagement {
                fresh_context: Some(false),
                ..Default::default()
            }),
            file_paths: None,
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_no_context_when_nothing_requested() {
        let memory = MemorySystem::new();
        let request = SubtaskRequest::by_name("t");

        let resolved = resolve_context(&request, &template(), &memory).await.unwrap();

        assert_eq!(resolved.source, "none");
        assert!(resolved.context_string.is_none());
        assert!(resolved.included_files.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_request_paths_are_read_and_labelled() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("a.py");
        std::fs::write(&file, "def login(): pass").unwrap();

        let memory = MemorySystem::new();
        let mut request = SubtaskRequest::by_name("t");
        request.file_paths = Some(vec![file.display().to_string()]);

        let resolved = resolve_context(&request, &template(), &memory).await.unwrap();

        assert_eq!(resolved.source, "explicit");
        assert_eq!(resolved.included_files.len(), 1);
        let context = resolved.context_string.unwrap();
        assert!(context.contains("=== FILE:"));
        assert!(context.contains("def login"));
    }

    #[tokio::test]
    async fn test_request_paths_override_template_paths() {
        let temp = tempfile::tempdir().unwrap();
        let request_file = temp.path().join("req.py");
        let template_file = temp.path().join("tpl.py");
        std::fs::write(&request_file, "request content").unwrap();
        std::fs::write(&template_file, "template content").unwrap();

        let memory = MemorySystem::new();
        let mut tpl = template();
        tpl.file_paths = Some(vec![template_file.display().to_string()]);
        let mut request = SubtaskRequest::by_name("t");
        request.file_paths = Some(vec![request_file.display().to_string()]);

        let resolved = resolve_context(&request, &tpl, &memory).await.unwrap();

        let context = resolved.context_string.unwrap();
        assert!(context.contains("request content"));
        assert!(!context.contains("template content"));
    }

    #[tokio::test]
    async fn test_template_paths_used_when_request_silent() {
        let temp = tempfile::tempdir().unwrap();
        let template_file = temp.path().join("tpl.py");
        std::fs::write(&template_file, "template content").unwrap();

        let memory = MemorySystem::new();
        let mut tpl = template();
        tpl.file_paths = Some(vec![template_file.display().to_string()]);

        let resolved = resolve_context(&SubtaskRequest::by_name("t"), &tpl, &memory).await.unwrap();

        assert!(resolved.context_string.unwrap().contains("template content"));
    }

    #[tokio::test]
    async fn test_unreadable_files_are_skipped() {
        let memory = MemorySystem::new();
        let mut request = SubtaskRequest::by_name("t");
        request.file_paths = Some(vec!["/definitely/not/here.py".to_string()]);

        let resolved = resolve_context(&request, &template(), &memory).await.unwrap();

        assert!(resolved.included_files.is_empty());
        assert!(resolved.context_string.is_none());
    }

    #[tokio::test]
    async fn test_fresh_context_with_empty_index_adds_nothing() {
        // fresh_context enabled, but the index is empty - retrieval yields
        // an empty result rather than an error
        let memory = MemorySystem::new();
        let mut tpl = template();
        tpl.context_management = None; // fall back to atomic defaults (fresh enabled)

        let resolved = resolve_context(&SubtaskRequest::by_name("t"), &tpl, &memory).await.unwrap();
        assert_eq!(resolved.source, "none");
    }
}
