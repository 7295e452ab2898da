//! Rendering a parsed deck into reveal.js sections and host commands.

use std::{fmt::Write as _, sync::Arc};

use crate::domain::slides::{Slide, SlideDeck};

use super::{
    escape_html,
    markdown::{MarkdownConverter, mathjax_required},
    types::{PresentationCommand, RenderError},
};

const INIT_COMMAND_FIELDS: [&str; 1] = ["source"];
const SLIDE_COMMAND_FIELDS: [&str; 6] = [
    "help-doc",
    "help-topic",
    "console",
    "console-input",
    "execute",
    "pause",
];

/// Everything the page template needs from a deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSlides {
    /// Concatenated `<section>` elements.
    pub html: String,
    /// `key: value,` lines spliced into the `Reveal.initialize` call.
    pub reveal_config: String,
    /// JSON array of commands run once when the deck loads.
    pub init_commands: String,
    /// JSON array holding one command array per slide.
    pub slide_commands: String,
    pub mathjax_required: bool,
}

pub trait SlideRenderer: Send + Sync {
    fn render(&self, deck: &SlideDeck) -> Result<RenderedSlides, RenderError>;
}

pub struct RevealSlideRenderer {
    markdown: Arc<dyn MarkdownConverter>,
}

impl RevealSlideRenderer {
    pub fn new(markdown: Arc<dyn MarkdownConverter>) -> Self {
        Self { markdown }
    }

    fn render_section(&self, slide: &Slide, out: &mut String) -> Result<(), RenderError> {
        let id = slide
            .field("id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("slide-{}", slide.index));
        let mut classes: Vec<&str> = Vec::new();
        if slide.index == 1 {
            classes.push("title-slide");
        }
        if let Some(class) = slide.field("class") {
            classes.extend(class.split_whitespace());
        }

        let _ = write!(out, "<section id=\"{}\"", escape_html(&id));
        if !classes.is_empty() {
            let _ = write!(out, " class=\"{}\"", escape_html(&classes.join(" ")));
        }
        out.push_str(">\n");

        if slide.index == 1 {
            let _ = writeln!(out, "<h1>{}</h1>", escape_html(&slide.title));
            for field in ["author", "date"] {
                if let Some(value) = slide.field(field) {
                    let _ = writeln!(out, "<p class=\"{field}\">{}</p>", escape_html(value));
                }
            }
        } else {
            let _ = writeln!(out, "<h2>{}</h2>", escape_html(&slide.title));
        }

        if !slide.body.is_empty() {
            out.push_str(&self.markdown.to_html(&slide.body)?);
        }
        out.push_str("</section>\n");
        Ok(())
    }
}

impl SlideRenderer for RevealSlideRenderer {
    fn render(&self, deck: &SlideDeck) -> Result<RenderedSlides, RenderError> {
        let mut html = String::new();
        let mut init_commands = Vec::new();
        let mut slide_commands = Vec::with_capacity(deck.len());
        let mut needs_math = false;

        for slide in deck.slides() {
            self.render_section(slide, &mut html)?;
            needs_math |= mathjax_required(&slide.title) || mathjax_required(&slide.body);

            let mut commands = Vec::new();
            for (name, value) in slide.fields() {
                if INIT_COMMAND_FIELDS.contains(&name) {
                    init_commands.push(PresentationCommand::new(name, value));
                } else if SLIDE_COMMAND_FIELDS.contains(&name) {
                    commands.push(PresentationCommand::new(name, value));
                }
            }
            slide_commands.push(commands);
        }

        let reveal_config = deck
            .slides()
            .first()
            .map(reveal_config)
            .unwrap_or_default();

        Ok(RenderedSlides {
            html,
            reveal_config,
            init_commands: to_json(&init_commands)?,
            slide_commands: to_json(&slide_commands)?,
            mathjax_required: needs_math,
        })
    }
}

fn reveal_config(first: &Slide) -> String {
    let mut config = String::new();
    if let Some(speed) = first.field("transition-speed")
        && matches!(speed, "default" | "fast" | "slow")
    {
        let _ = writeln!(config, "transitionSpeed: '{speed}',");
    }
    if let Some(rtl) = first.field("rtl")
        && matches!(rtl, "true" | "false")
    {
        let _ = writeln!(config, "rtl: {rtl},");
    }
    config
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RenderError> {
    serde_json::to_string(value).map_err(|err| RenderError::Document {
        message: format!("failed to encode slide commands: {err}"),
    })
}
