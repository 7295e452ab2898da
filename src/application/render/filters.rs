//! Text filters applied to rendered documents after variable substitution.

use std::{
    cell::RefCell,
    fmt,
    path::{Path, PathBuf},
    rc::Rc,
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use lol_html::{RewriteStrSettings, element, rewrite_str};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::{Captures, Regex};
use tracing::debug;
use url::Url;

use super::types::{PresentationCommand, RenderError};

const HOST_CALLBACK: &str = "window.parent.dispatchPresentationCommand";
const HELP_SCHEMES: [&str; 2] = ["help-topic:", "help-doc:"];

static ANCHOR_HREF: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"<a href="([^"]+)""#).ok());

/// A single text-to-text transform in a [`FilterChain`].
pub trait TextFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, input: String) -> Result<String, RenderError>;
}

/// Ordered composition of filters; the output of one feeds the next.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn TextFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl TextFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn push(&mut self, filter: Box<dyn TextFilter>) {
        self.filters.push(filter);
    }

    pub fn apply(&self, input: String) -> Result<String, RenderError> {
        self.filters
            .iter()
            .try_fold(input, |text, filter| filter.apply(text))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|filter| filter.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Rewrites anchors for display inside the host pane: external links open a
/// new window and `help-topic:`/`help-doc:` links call back into the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkFixupFilter;

impl TextFilter for LinkFixupFilter {
    fn name(&self) -> &'static str {
        "link_fixup"
    }

    fn apply(&self, input: String) -> Result<String, RenderError> {
        let Some(pattern) = ANCHOR_HREF.as_ref() else {
            return Err(RenderError::Filter {
                filter: self.name(),
                message: "anchor pattern unavailable".to_string(),
            });
        };

        Ok(pattern
            .replace_all(&input, |captures: &Captures<'_>| fixup_link(captures))
            .into_owned())
    }
}

fn fixup_link(captures: &Captures<'_>) -> String {
    let matched = &captures[0];
    let href = percent_decode(&captures[1]);

    if href.starts_with('#') {
        return matched.to_string();
    }
    if href.contains("://") {
        return format!("{matched} target=\"_blank\"");
    }

    let Some(command) = help_command(&href) else {
        return matched.to_string();
    };

    let payload = command.to_json().replace('\'', "\\u0027");
    format!("{matched} onclick='{HOST_CALLBACK}({payload}); return false;'")
}

/// Parse `help-topic:<name>:<params>` style hrefs. Empty parameters yield `None`.
fn help_command(href: &str) -> Option<PresentationCommand> {
    let rest = HELP_SCHEMES
        .iter()
        .find_map(|scheme| href.strip_prefix(scheme))?;
    let (name, params) = rest.split_once(':')?;
    let (name, params) = (name.trim(), params.trim());
    if params.is_empty() {
        return None;
    }
    Some(PresentationCommand::new(name, params))
}

fn percent_decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

/// Inlines local `<img src>` files as `data:` URIs so the document is
/// self-contained.
#[derive(Debug, Clone)]
pub struct Base64ImageFilter {
    base_dir: PathBuf,
}

impl Base64ImageFilter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute URLs (remote, `data:`) and sources resolving outside the
    /// base directory are left alone.
    fn encode(&self, src: &str) -> Option<String> {
        if src.is_empty() || Url::parse(src).is_ok() {
            return None;
        }
        let base = Url::from_directory_path(&self.base_dir).ok()?;
        let path = base.join(src).ok()?.to_file_path().ok()?;
        if !path.starts_with(&self.base_dir) {
            return None;
        }
        let contents = std::fs::read(&path).ok()?;
        let mime = mime_guess::from_path(&path).first_or_octet_stream();
        Some(format!("data:{};base64,{}", mime.as_ref(), STANDARD.encode(contents)))
    }
}

impl TextFilter for Base64ImageFilter {
    fn name(&self) -> &'static str {
        "base64_image"
    }

    fn apply(&self, input: String) -> Result<String, RenderError> {
        let embedded = Rc::new(RefCell::new(0usize));

        let rewritten = rewrite_str(
            &input,
            RewriteStrSettings {
                element_content_handlers: vec![element!("img[src]", {
                    let embedded = Rc::clone(&embedded);
                    move |el| {
                        if let Some(src) = el.get_attribute("src")
                            && let Some(uri) = self.encode(&src)
                        {
                            el.set_attribute("src", &uri)?;
                            *embedded.borrow_mut() += 1;
                        }
                        Ok(())
                    }
                })],
                ..RewriteStrSettings::default()
            },
        )
        .map_err(|err| RenderError::Filter {
            filter: self.name(),
            message: err.to_string(),
        })?;

        debug!(
            target = "application::render::filters",
            op = "base64_image::apply",
            base_dir = %self.base_dir.display(),
            embedded = *embedded.borrow(),
            "Inlined local images"
        );

        Ok(rewritten)
    }
}
