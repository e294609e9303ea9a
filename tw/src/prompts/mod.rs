//! Prompt and template sources
//!
//! Builtin templates are embedded in the binary; additional packs load from
//! a YAML directory named in config.

pub mod embedded;

use std::path::Path;

use tracing::{debug, info};

use crate::domain::{FailureReason, TaskError};
use crate::task::TemplateDefinition;

pub use embedded::{ASSOCIATIVE_MATCHING_ALIAS, BASE_SYSTEM_PROMPT, builtin_templates};

/// Load every `*.yml`/`*.yaml` template definition in a directory
///
/// Files are read in name order so registration order is stable.
pub fn load_template_pack(dir: impl AsRef<Path>) -> Result<Vec<TemplateDefinition>, TaskError> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| {
        TaskError::failure(
            FailureReason::InvalidInput,
            format!("cannot read template pack {}: {}", dir.display(), e),
        )
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yml") | Some("yaml")
            )
        })
        .collect();
    paths.sort();

    let mut templates = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            TaskError::failure(
                FailureReason::InvalidInput,
                format!("cannot read template {}: {}", path.display(), e),
            )
        })?;
        let template: TemplateDefinition = serde_yaml::from_str(&content).map_err(|e| {
            TaskError::failure(
                FailureReason::InvalidInput,
                format!("cannot parse template {}: {}", path.display(), e),
            )
        })?;
        debug!(name = %template.name, path = %path.display(), "load_template_pack: loaded");
        templates.push(template);
    }

    info!(count = templates.len(), dir = %dir.display(), "load_template_pack: done");
    Ok(templates)
}
