//! Rendering pipeline: template substitution, text filters, markdown and slide rendering.
//!
//! Everything here is synchronous and free of HTTP concerns. Callers on the
//! async side run it inside `spawn_blocking`.

mod deck;
mod filters;
mod highlight;
mod markdown;
mod template;
mod types;

pub use deck::{RenderedSlides, RevealSlideRenderer, SlideRenderer};
pub use filters::{Base64ImageFilter, FilterChain, LinkFixupFilter, TextFilter};
pub use markdown::{ComrakMarkdown, MarkdownConverter, first_heading, mathjax_required};
pub use template::{TemplateRenderer, VariableMap, substitute};
pub use types::{PresentationCommand, RenderError};

/// Escape text for inclusion in HTML element content or a quoted attribute.
pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
