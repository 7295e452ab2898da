//! Markdown to HTML conversion for slide bodies and help documents.

use std::{cell::RefCell, rc::Rc};

use comrak::{Arena, format_html, options::Options, parse_document};
use lol_html::{RewriteStrSettings, element, rewrite_str, text};

use super::{highlight::highlight_code_blocks, types::RenderError};

/// Converts markdown into an HTML fragment.
pub trait MarkdownConverter: Send + Sync {
    fn to_html(&self, markdown: &str) -> Result<String, RenderError>;
}

/// Comrak-backed converter with the GFM extensions slide authors expect.
/// Raw HTML passes through untouched since documents are local and trusted.
/// Fenced blocks with a language are highlighted into `syntax-` classed spans.
pub struct ComrakMarkdown {
    options: Options<'static>,
}

impl Default for ComrakMarkdown {
    fn default() -> Self {
        let mut options = Options::default();

        let ext = &mut options.extension;
        ext.strikethrough = true;
        ext.table = true;
        ext.autolink = true;
        ext.tasklist = true;
        ext.footnotes = true;
        ext.superscript = true;

        let render = &mut options.render;
        render.r#unsafe = true;
        render.github_pre_lang = true;

        Self { options }
    }
}

impl MarkdownConverter for ComrakMarkdown {
    fn to_html(&self, markdown: &str) -> Result<String, RenderError> {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);
        highlight_code_blocks(root)?;

        let mut html = String::new();
        format_html(root, &self.options, &mut html).map_err(|err| RenderError::Document {
            message: err.to_string(),
        })?;
        Ok(html)
    }
}

/// Whether `text` contains TeX delimiters that need the formula renderer.
pub fn mathjax_required(text: &str) -> bool {
    ["$$", "\\(", "\\["]
        .iter()
        .any(|delimiter| text.contains(delimiter))
}

/// Text of the first `<h1>` in `html`, as it appears in the markup.
pub fn first_heading(html: &str) -> Result<Option<String>, RenderError> {
    let headings_seen = Rc::new(RefCell::new(0usize));
    let title = Rc::new(RefCell::new(String::new()));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("h1", {
                    let headings_seen = Rc::clone(&headings_seen);
                    move |_| {
                        *headings_seen.borrow_mut() += 1;
                        Ok(())
                    }
                }),
                text!("h1", {
                    let headings_seen = Rc::clone(&headings_seen);
                    let title = Rc::clone(&title);
                    move |chunk| {
                        if *headings_seen.borrow() == 1 {
                            title.borrow_mut().push_str(chunk.as_str());
                        }
                        Ok(())
                    }
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Document {
        message: err.to_string(),
    })?;

    let title = title.borrow().trim().to_string();
    Ok((*headings_seen.borrow() > 0).then_some(title))
}
