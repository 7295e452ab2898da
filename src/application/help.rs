//! Help documents opened from presentation links.
//!
//! An absolute request (`?file=`) renders markdown through the help template
//! and remembers the file's directory, so relative references inside the
//! rendered page (images, linked documents) resolve against it afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use tracing::debug;

use crate::{
    application::{
        error::PresentationError,
        knit::{KnitGate, derived_path},
        presentation::local_mathjax,
        render::{
            FilterChain, MarkdownConverter, RenderError, TemplateRenderer, VariableMap,
            first_heading, mathjax_required,
        },
    },
    infra::{
        files::{MARKDOWN_CONTENT_TYPE, R_MARKDOWN_CONTENT_TYPE, content_type_for, join_within},
        lock::{self, LockSite},
    },
};

pub const HELP_TEMPLATE: &str = "presentation/helpdoc.html";

/// The directory of the most recent absolute help request.
#[derive(Debug, Default)]
pub struct HelpDirectory {
    slot: RwLock<Option<PathBuf>>,
}

impl HelpDirectory {
    pub fn remember(&self, directory: &Path) {
        *lock::write(&self.slot, LockSite::HelpDirectory, "remember") =
            Some(directory.to_path_buf());
    }

    pub fn current(&self) -> Option<PathBuf> {
        lock::read(&self.slot, LockSite::HelpDirectory, "current").clone()
    }
}

/// What an absolute help request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelpContent {
    Document(String),
    File(PathBuf),
}

pub struct HelpService {
    knit: Arc<KnitGate>,
    markdown: Arc<dyn MarkdownConverter>,
    templates: TemplateRenderer,
    directory: HelpDirectory,
    js_callbacks: String,
}

impl HelpService {
    pub fn new(
        knit: Arc<KnitGate>,
        markdown: Arc<dyn MarkdownConverter>,
        templates: TemplateRenderer,
        js_callbacks: impl Into<String>,
    ) -> Self {
        Self {
            knit,
            markdown,
            templates,
            directory: HelpDirectory::default(),
            js_callbacks: js_callbacks.into(),
        }
    }

    pub fn directory(&self) -> &HelpDirectory {
        &self.directory
    }

    /// Handle `?file=<path>`. `path` is already alias-expanded.
    pub fn open(&self, path: &Path) -> Result<HelpContent, PresentationError> {
        if !path.exists() {
            return Err(PresentationError::NotFound(format!(
                "{} not found",
                path.display()
            )));
        }

        if let Some(parent) = path.parent() {
            self.directory.remember(parent);
        }

        let content_type = content_type_for(path);
        if content_type == MARKDOWN_CONTENT_TYPE || content_type == R_MARKDOWN_CONTENT_TYPE {
            let html = self.render_document(path, &content_type)?;
            Ok(HelpContent::Document(html))
        } else {
            Ok(HelpContent::File(path.to_path_buf()))
        }
    }

    /// Resolve a path relative to the remembered help directory.
    pub fn resolve_relative(&self, relative: &str) -> Result<PathBuf, PresentationError> {
        let directory = self.directory.current().unwrap_or_default();
        if directory.as_os_str().is_empty() || !directory.is_dir() {
            return Err(PresentationError::NotFound(format!(
                "Directory not found: {}",
                directory.display()
            )));
        }

        join_within(&directory, relative)
            .ok_or_else(|| PresentationError::NotFound(format!("{relative} not found")))
    }

    fn render_document(&self, path: &Path, content_type: &str) -> Result<String, PresentationError> {
        let markdown_path = if content_type == R_MARKDOWN_CONTENT_TYPE {
            self.knit.ensure_fresh(path)?;
            derived_path(path)
        } else {
            path.to_path_buf()
        };

        let text = fs::read_to_string(&markdown_path)?;
        let content = self.markdown.to_html(&text)?;
        let title = first_heading(&content)?.unwrap_or_default();
        debug!(
            target = "application::help",
            op = "help::render",
            path = %markdown_path.display(),
            title = %title,
            "Rendering help document"
        );

        let mathjax = if mathjax_required(&text) {
            local_mathjax(&self.resource("presentation/mathjax.html")?)
        } else {
            String::new()
        };

        let mut vars = VariableMap::new();
        vars.insert("title", title)
            .insert("styles", &*self.resource("presentation/helpdoc.css")?)
            .insert("r_highlight", &*self.resource("r_highlight.html")?)
            .insert("mathjax", mathjax)
            .insert("content", content)
            .insert("js_callbacks", self.js_callbacks.as_str());

        Ok(self
            .templates
            .render(HELP_TEMPLATE, &vars, &FilterChain::default())?)
    }

    fn resource(&self, logical_path: &str) -> Result<Arc<str>, RenderError> {
        Ok(self.templates.resources().get(logical_path)?)
    }
}
