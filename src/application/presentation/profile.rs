//! How a deck is dressed for its destination.
//!
//! A standalone export has to work from a single file opened anywhere, so it
//! embeds the reveal.js assets and inlines images. The in-pane document is
//! served next to its assets and talks back to the host page.

use std::path::Path;

use crate::{
    application::render::{Base64ImageFilter, FilterChain, LinkFixupFilter},
    config::ProgramMode,
    domain::slides::Transition,
};

pub const REMOTE_MATHJAX_URL: &str = "https://c328740.ssl.cf1.rackcdn.com/mathjax/2.0-latest";
pub const LOCAL_MATHJAX_URL: &str = "mathjax";

const REMOTE_WEB_FONTS: &str = "@import url('https://fonts.googleapis.com/css?family=News+Cycle:400,700');\n\
@import url('https://fonts.googleapis.com/css?family=Lato:400,700,400italic,700italic');";
const LOCAL_WEB_FONTS: &str = "@import url('revealjs/fonts/NewsCycle.css');\n\
@import url('revealjs/fonts/Lato.css');";

/// Where the rendered document ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Standalone,
    InPane { zoomed: bool },
}

impl RenderMode {
    /// Maps the path after `/presentation/` onto a pane mode.
    pub fn for_pane_path(path: &str) -> Option<Self> {
        match path {
            "" => Some(Self::InPane { zoomed: false }),
            "zoom" => Some(Self::InPane { zoomed: true }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetDelivery {
    /// Asset text inlined into `<style>`/`<script>` elements.
    Embedded,
    /// Relative `revealjs/...` URLs served by the router.
    Linked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetOrigin {
    Remote,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimensions {
    Fixed { width: u32, height: u32 },
    Detect { zoomed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageHandling {
    InlineAsBase64,
    RewriteLinks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderProfile {
    pub mode: RenderMode,
    pub assets: AssetDelivery,
    pub print_css: bool,
    pub mathjax: AssetOrigin,
    pub fonts: AssetOrigin,
    pub interactive: bool,
    pub dimensions: Dimensions,
    pub suppress_transition: bool,
    pub disable_media_preload: bool,
    pub filtering: ImageHandling,
}

impl RenderProfile {
    pub fn for_mode(mode: RenderMode, program_mode: ProgramMode) -> Self {
        match mode {
            RenderMode::Standalone => Self {
                mode,
                assets: AssetDelivery::Embedded,
                print_css: true,
                mathjax: AssetOrigin::Remote,
                fonts: AssetOrigin::Remote,
                interactive: false,
                dimensions: Dimensions::Fixed {
                    width: 960,
                    height: 700,
                },
                suppress_transition: false,
                disable_media_preload: false,
                filtering: ImageHandling::InlineAsBase64,
            },
            RenderMode::InPane { zoomed } => Self {
                mode,
                assets: AssetDelivery::Linked,
                print_css: false,
                mathjax: AssetOrigin::Local,
                fonts: AssetOrigin::Local,
                interactive: true,
                dimensions: Dimensions::Detect { zoomed },
                // The desktop web view cannot keep up with animated transitions.
                suppress_transition: program_mode == ProgramMode::Desktop,
                disable_media_preload: true,
                filtering: ImageHandling::RewriteLinks,
            },
        }
    }

    pub fn width(&self) -> String {
        match self.dimensions {
            Dimensions::Fixed { width, .. } => width.to_string(),
            Dimensions::Detect { zoomed } => format!("revealDetectWidth({zoomed})"),
        }
    }

    pub fn height(&self) -> String {
        match self.dimensions {
            Dimensions::Fixed { height, .. } => height.to_string(),
            Dimensions::Detect { zoomed } => format!("revealDetectHeight({zoomed})"),
        }
    }

    pub fn transition(&self, deck: Transition) -> &'static str {
        if self.suppress_transition {
            Transition::None.as_str()
        } else {
            deck.as_str()
        }
    }

    pub fn web_fonts(&self) -> &'static str {
        match self.fonts {
            AssetOrigin::Remote => REMOTE_WEB_FONTS,
            AssetOrigin::Local => LOCAL_WEB_FONTS,
        }
    }

    /// Rewrites the stock MathJax snippet to point at this profile's origin.
    pub fn mathjax_snippet(&self, remote_snippet: &str) -> String {
        match self.mathjax {
            AssetOrigin::Remote => remote_snippet.to_string(),
            AssetOrigin::Local => local_mathjax(remote_snippet),
        }
    }

    pub fn filters(&self, presentation_dir: &Path) -> FilterChain {
        match self.filtering {
            ImageHandling::InlineAsBase64 => {
                FilterChain::new().with(Base64ImageFilter::new(presentation_dir))
            }
            ImageHandling::RewriteLinks => FilterChain::new().with(LinkFixupFilter),
        }
    }
}

pub fn local_mathjax(remote_snippet: &str) -> String {
    remote_snippet.replacen(REMOTE_MATHJAX_URL, LOCAL_MATHJAX_URL, 1)
}
