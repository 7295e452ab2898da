//! Slide deck model and the `slides.md` document parser.
//!
//! A deck document is a sequence of slides. Each slide starts with a title
//! line underlined by three or more `=` characters, followed by optional
//! `name: value` field lines and a markdown body:
//!
//! ```text
//! Quarterly Review
//! ================
//! author: Data Team
//! transition: fade
//!
//! Plots
//! =====
//! incremental: true
//!
//! - first point
//! ```

use std::{fmt, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no slides found in presentation")]
    Empty,
    #[error("unexpected content before the first slide at line {line}")]
    Preamble { line: usize },
    #[error("invalid transition `{value}` on slide {slide}")]
    InvalidTransition { value: String, slide: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition {
    None,
    Default,
    #[default]
    Linear,
    Fade,
    Zoom,
    Rotate,
    Concave,
    Cube,
    Page,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Transition::None => "none",
            Transition::Default => "default",
            Transition::Linear => "linear",
            Transition::Fade => "fade",
            Transition::Zoom => "zoom",
            Transition::Rotate => "rotate",
            Transition::Concave => "concave",
            Transition::Cube => "cube",
            Transition::Page => "page",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transition {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "none" => Ok(Transition::None),
            "default" => Ok(Transition::Default),
            "linear" => Ok(Transition::Linear),
            "fade" => Ok(Transition::Fade),
            "zoom" => Ok(Transition::Zoom),
            "rotate" => Ok(Transition::Rotate),
            "concave" => Ok(Transition::Concave),
            "cube" => Ok(Transition::Cube),
            "page" => Ok(Transition::Page),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slide {
    /// 1-based position within the deck.
    pub index: usize,
    pub title: String,
    pub fields: Vec<(String, String)>,
    pub body: String,
}

impl Slide {
    /// First value recorded for `name`, if any.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Parsed deck; built per render request and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideDeck {
    title: String,
    transition: Transition,
    slides: Vec<Slide>,
}

impl SlideDeck {
    pub fn new(slides: Vec<Slide>) -> Result<Self, ParseError> {
        let first = slides.first().ok_or(ParseError::Empty)?;
        let transition = match first.field("transition") {
            Some(value) => value
                .parse::<Transition>()
                .map_err(|_| ParseError::InvalidTransition {
                    value: value.to_string(),
                    slide: first.index,
                })?,
            None => Transition::default(),
        };

        Ok(Self {
            title: first.title.clone(),
            transition,
            slides,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}

/// Turns the text of a slide document into a deck.
pub trait SlideParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<SlideDeck, ParseError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RpresParser;

impl SlideParser for RpresParser {
    fn parse(&self, text: &str) -> Result<SlideDeck, ParseError> {
        let lines: Vec<&str> = text.lines().collect();
        let starts: Vec<usize> = (0..lines.len())
            .filter(|&index| is_slide_start(&lines, index))
            .collect();

        let Some(&first_start) = starts.first() else {
            return Err(ParseError::Empty);
        };

        if let Some(offset) = lines[..first_start]
            .iter()
            .position(|line| !line.trim().is_empty())
        {
            return Err(ParseError::Preamble { line: offset + 1 });
        }

        let slides = starts
            .iter()
            .enumerate()
            .map(|(position, &start)| {
                let end = starts.get(position + 1).copied().unwrap_or(lines.len());
                parse_slide(&lines[start..end], position + 1)
            })
            .collect();

        SlideDeck::new(slides)
    }
}

fn is_underline(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3 && trimmed.chars().all(|ch| ch == '=')
}

fn is_slide_start(lines: &[&str], index: usize) -> bool {
    let line = lines[index];
    !line.trim().is_empty()
        && !is_underline(line)
        && lines.get(index + 1).is_some_and(|next| is_underline(next))
}

fn field_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    let valid_name = name.starts_with(|ch: char| ch.is_ascii_lowercase() || ch.is_ascii_digit())
        && name
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');
    valid_name.then_some((name, value))
}

fn parse_slide(lines: &[&str], index: usize) -> Slide {
    let title = lines[0].trim().to_string();

    let mut cursor = 2;
    let mut fields = Vec::new();
    while let Some((name, value)) = lines.get(cursor).and_then(|line| field_line(line)) {
        fields.push((name.to_string(), value.trim().to_string()));
        cursor += 1;
    }

    let body_lines = lines.get(cursor..).unwrap_or_default();
    let body = body_lines.join("\n").trim_matches('\n').to_string();

    Slide {
        index,
        title,
        fields,
        body: body.trim_end().to_string(),
    }
}
