use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infra::resources::ResourceError;

/// Structured errors surfaced while turning templates and markdown into HTML.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("template `{template}` references undefined variable `{name}`")]
    MissingVariable { template: String, name: String },
    #[error("{filter} filter failed: {message}")]
    Filter {
        filter: &'static str,
        message: String,
    },
    #[error("syntax highlighting failed: {language}: {message}")]
    Highlighting { language: String, message: String },
    #[error("document processing failed: {message}")]
    Document { message: String },
}

/// Host callback payload attached to slides and help links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationCommand {
    pub name: String,
    pub params: String,
}

impl PresentationCommand {
    pub fn new(name: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: params.into(),
        }
    }

    /// Compact JSON form embedded into generated markup.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
