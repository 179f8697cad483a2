//! Template loading collaborator interface.
//!
//! Loading template *source* (filesystem, embedded assets) is outside the
//! evaluation core; the core only needs parsed ASTs by name. [`MemoryLoader`]
//! is the shipped reference implementation, sufficient for embedding and for
//! the test suites.

use ahash::AHashMap;

use crate::{exception::TemplateError, nodes::Node};

/// Provides parsed templates by name.
pub trait TemplateLoader: Send + Sync {
    /// Returns the template's AST, or `TemplateNotFoundError`.
    fn load_template(&self, name: &str) -> Result<Node, TemplateError>;

    /// True when a template is available under `name`.
    fn template_exists(&self, name: &str) -> bool;
}

/// An in-memory name → AST map.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    templates: AHashMap<String, Node>,
}

impl MemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a template, replacing any previous one under the same name.
    pub fn insert(&mut self, name: impl Into<String>, template: Node) {
        self.templates.insert(name.into(), template);
    }

    /// Builder-style registration for test setups.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, template: Node) -> Self {
        self.insert(name, template);
        self
    }
}

impl TemplateLoader for MemoryLoader {
    fn load_template(&self, name: &str) -> Result<Node, TemplateError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::template_not_found(name))
    }

    fn template_exists(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::ErrorKind;

    #[test]
    fn missing_template_reports_its_name() {
        let loader = MemoryLoader::new();
        let err = loader.load_template("base.html").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateNotFoundError);
        assert!(err.message().contains("base.html"));
        assert!(!loader.template_exists("base.html"));
    }
}
