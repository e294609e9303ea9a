//! Template registry with `type:subtype` alias index

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{FailureReason, TaskError};

use super::template::TemplateDefinition;

/// Registry of atomic templates, keyed by unique name with a unique
/// `type:subtype` alias index
///
/// Populated at startup; effectively immutable afterwards.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Arc<TemplateDefinition>>,
    aliases: HashMap<String, String>,
    /// Insertion order; similarity ranking breaks ties with it
    order: Vec<String>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template
    ///
    /// Rejects invalid definitions, duplicate names, and duplicate aliases.
    pub fn register(&mut self, template: TemplateDefinition) -> Result<(), TaskError> {
        template.validate()?;

        if self.templates.contains_key(&template.name) {
            return Err(TaskError::failure(
                FailureReason::InvalidInput,
                format!("duplicate template name: {}", template.name),
            ));
        }
        let alias = template.alias();
        if self.aliases.contains_key(&alias) {
            return Err(TaskError::failure(
                FailureReason::InvalidInput,
                format!("duplicate template alias: {}", alias),
            ));
        }

        debug!(name = %template.name, %alias, "TemplateRegistry::register: called");
        let name = template.name.clone();
        self.aliases.insert(alias, name.clone());
        self.order.push(name.clone());
        self.templates.insert(name, Arc::new(template));
        Ok(())
    }

    /// Look up by name first, then by `type:subtype` alias
    pub fn find(&self, identifier: &str) -> Option<Arc<TemplateDefinition>> {
        if let Some(template) = self.templates.get(identifier) {
            return Some(template.clone());
        }
        self.aliases
            .get(identifier)
            .and_then(|name| self.templates.get(name))
            .cloned()
    }

    /// Templates in registration order
    pub fn iter(&self) -> impl Iterator<Item = Arc<TemplateDefinition>> + '_ {
        self.order.iter().filter_map(|name| self.templates.get(name)).cloned()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
