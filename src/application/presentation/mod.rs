//! Turning a presentation directory into a complete reveal.js document.

mod profile;
mod state;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use tracing::info;

pub use profile::{
    AssetDelivery, AssetOrigin, Dimensions, ImageHandling, LOCAL_MATHJAX_URL, REMOTE_MATHJAX_URL,
    RenderMode, RenderProfile, local_mathjax,
};
pub use state::PresentationState;

use crate::{
    application::{
        error::PresentationError,
        knit::KnitGate,
        render::{
            RenderError, RenderedSlides, SlideRenderer, TemplateRenderer, VariableMap,
            escape_html,
        },
    },
    config::ProgramMode,
    domain::slides::{SlideDeck, SlideParser},
};

pub const SLIDES_TEMPLATE: &str = "presentation/slides.html";
pub const SLIDES_SOURCE: &str = "slides.md";
pub const SLIDES_R_SOURCE: &str = "slides.Rmd";

const MEDIA_PRELOAD_AUTO: &str = "controls preload=\"auto\"";
const MEDIA_PRELOAD_NONE: &str = "controls preload=\"none\"";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub html: String,
    pub title: String,
    pub mode: RenderMode,
}

pub struct PresentationAssembler {
    knit: Arc<KnitGate>,
    parser: Arc<dyn SlideParser>,
    slides: Arc<dyn SlideRenderer>,
    templates: TemplateRenderer,
    program_mode: ProgramMode,
}

impl PresentationAssembler {
    pub fn new(
        knit: Arc<KnitGate>,
        parser: Arc<dyn SlideParser>,
        slides: Arc<dyn SlideRenderer>,
        templates: TemplateRenderer,
        program_mode: ProgramMode,
    ) -> Self {
        Self {
            knit,
            parser,
            slides,
            templates,
            program_mode,
        }
    }

    pub fn assemble(
        &self,
        directory: &Path,
        mode: RenderMode,
    ) -> Result<RenderedDocument, PresentationError> {
        let started_at = Instant::now();
        let directory = absolute(directory);

        let r_source = directory.join(SLIDES_R_SOURCE);
        if r_source.exists() {
            self.knit.ensure_fresh(&r_source)?;
        }

        let source = directory.join(SLIDES_SOURCE);
        if !source.is_file() {
            return Err(PresentationError::NotFound(format!(
                "{SLIDES_SOURCE} file not found in {}",
                directory.display()
            )));
        }

        let text = fs::read_to_string(&source)?;
        let deck = self.parser.parse(&text)?;
        let rendered = self.slides.render(&deck)?;

        let profile = RenderProfile::for_mode(mode, self.program_mode);
        let variables = self.variables(&deck, rendered, &profile)?;
        let html =
            self.templates
                .render(SLIDES_TEMPLATE, &variables, &profile.filters(&directory))?;

        info!(
            target = "application::presentation",
            op = "presentation::assemble",
            result = "rendered",
            directory = %directory.display(),
            mode = ?mode,
            slides = deck.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Presentation assembled"
        );

        Ok(RenderedDocument {
            html,
            title: deck.title().to_string(),
            mode,
        })
    }

    /// Writes the standalone document to `<dir>/<dir name>.html`.
    pub fn export_standalone(&self, directory: &Path) -> Result<PathBuf, PresentationError> {
        let directory = absolute(directory);
        let name = directory.file_name().ok_or_else(|| {
            PresentationError::NotFound(format!(
                "cannot name an export for {}",
                directory.display()
            ))
        })?;
        let target = directory.join(format!("{}.html", name.to_string_lossy()));

        let document = self.assemble(&directory, RenderMode::Standalone)?;
        fs::write(&target, document.html)?;

        info!(
            target = "application::presentation",
            op = "presentation::export",
            result = "written",
            path = %target.display(),
            "Standalone presentation written"
        );
        Ok(target)
    }

    fn variables(
        &self,
        deck: &SlideDeck,
        rendered: RenderedSlides,
        profile: &RenderProfile,
    ) -> Result<VariableMap, RenderError> {
        let slides = if profile.disable_media_preload {
            rendered.html.replace(MEDIA_PRELOAD_AUTO, MEDIA_PRELOAD_NONE)
        } else {
            rendered.html
        };

        let mut vars = VariableMap::new();
        vars.insert("title", escape_html(deck.title()))
            .insert("slides", slides)
            .insert("slides_css", &*self.resource("presentation/slides.css")?)
            .insert("r_highlight", &*self.resource("r_highlight.html")?)
            .insert("reveal_config", rendered.reveal_config);

        match profile.assets {
            AssetDelivery::Embedded => {
                let print_css = if profile.print_css {
                    self.embed("revealjs/css/print/pdf.css", " media=\"print\"")?
                } else {
                    String::new()
                };
                vars.insert("reveal_print_pdf_css", print_css)
                    .insert("reveal_css", self.embed("revealjs/css/reveal.min.css", "")?)
                    .insert(
                        "reveal_theme_css",
                        self.embed("revealjs/css/theme/simple.css", "")?,
                    )
                    .insert("reveal_head_js", self.embed("revealjs/lib/js/head.min.js", "")?)
                    .insert("reveal_js", self.embed("revealjs/js/reveal.min.js", "")?);
            }
            AssetDelivery::Linked => {
                vars.insert("reveal_print_pdf_css", "")
                    .insert("reveal_css", link("revealjs/css/reveal.css"))
                    .insert("reveal_theme_css", link("revealjs/css/theme/simple.css"))
                    .insert("reveal_head_js", link("revealjs/lib/js/head.min.js"))
                    .insert("reveal_js", link("revealjs/js/reveal.js"));
            }
        }

        let mathjax = if rendered.mathjax_required {
            profile.mathjax_snippet(&self.resource("presentation/mathjax.html")?)
        } else {
            String::new()
        };
        vars.insert("google_webfonts", profile.web_fonts())
            .insert("mathjax", mathjax);

        if profile.interactive {
            vars.insert(
                "slide_commands",
                format!("var slideCommands = {};", rendered.slide_commands),
            )
            .insert("slides_js", &*self.resource("presentation/slides.js")?)
            .insert(
                "init_commands",
                format!("presentationReady({}, slideCommands);", rendered.init_commands),
            );
        } else {
            vars.insert("slide_commands", "")
                .insert("slides_js", "")
                .insert("init_commands", "");
        }

        vars.insert("reveal_width", profile.width())
            .insert("reveal_height", profile.height())
            .insert("reveal_transition", profile.transition(deck.transition()));

        Ok(vars)
    }

    fn resource(&self, logical_path: &str) -> Result<Arc<str>, RenderError> {
        Ok(self.templates.resources().get(logical_path)?)
    }

    fn embed(&self, asset: &str, attributes: &str) -> Result<String, RenderError> {
        let text = self.resource(&format!("presentation/{asset}"))?;
        Ok(if asset.ends_with("css") {
            format!("<style type=\"text/css\"{attributes}>\n{text}\n</style>")
        } else {
            format!("<script type=\"text/javascript\"{attributes}>\n{text}\n</script>")
        })
    }
}

fn link(asset: &str) -> String {
    if asset.ends_with("css") {
        format!("<link rel=\"stylesheet\" href=\"{asset}\">")
    } else {
        format!("<script src=\"{asset}\"></script>")
    }
}

fn absolute(directory: &Path) -> PathBuf {
    std::path::absolute(directory).unwrap_or_else(|_| directory.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        application::{
            knit::{BuildError, KnitrVersionCheck},
            render::{ComrakMarkdown, RevealSlideRenderer},
        },
        config::KnitSettings,
        domain::slides::RpresParser,
        infra::{
            process::{ProcessError, ProcessOutput, ProcessRequest, ProcessRunner},
            resources::ResourceStore,
        },
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Templates and helpers copied from the shipped resource tree.
    const SHIPPED: [&str; 5] = [
        "presentation/slides.html",
        "presentation/slides.css",
        "presentation/slides.js",
        "presentation/mathjax.html",
        "r_highlight.html",
    ];

    /// Writes `slides.md` into the working directory when asked to knit.
    #[derive(Default)]
    struct KnitRunner {
        runs: AtomicUsize,
    }

    impl ProcessRunner for KnitRunner {
        fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput, ProcessError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let dir = request.working_dir.clone().expect("working dir");
            fs::write(dir.join("slides.md"), "Knitted\n=======\n").expect("write derived");
            Ok(ProcessOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    struct Knitr;

    impl KnitrVersionCheck for Knitr {
        fn installed_version(&self) -> Result<Option<String>, BuildError> {
            Ok(Some("1.40".into()))
        }
    }

    struct Fixture {
        resources: TempDir,
        deck: TempDir,
        runner: Arc<KnitRunner>,
    }

    impl Fixture {
        fn new() -> Self {
            let resources = TempDir::new().expect("resources");
            let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("resources");
            for path in SHIPPED {
                let full = resources.path().join(path);
                fs::create_dir_all(full.parent().expect("parent")).expect("mkdir");
                fs::copy(shipped.join(path), full).expect("copy shipped resource");
            }
            let files = [
                ("presentation/revealjs/css/print/pdf.css", "PDFCSS"),
                ("presentation/revealjs/css/reveal.min.css", "REVEALCSS"),
                ("presentation/revealjs/css/theme/simple.css", "THEMECSS"),
                ("presentation/revealjs/lib/js/head.min.js", "HEADJS"),
                ("presentation/revealjs/js/reveal.min.js", "REVEALJS"),
            ];
            for (path, text) in files {
                let full = resources.path().join(path);
                fs::create_dir_all(full.parent().expect("parent")).expect("mkdir");
                fs::write(full, text).expect("write resource");
            }

            Self {
                resources,
                deck: TempDir::new().expect("deck"),
                runner: Arc::new(KnitRunner::default()),
            }
        }

        fn write_slides(&self, text: &str) {
            fs::write(self.deck.path().join(SLIDES_SOURCE), text).expect("write slides");
        }

        fn assembler(&self, program_mode: ProgramMode) -> PresentationAssembler {
            let knit = KnitGate::new(
                self.runner.clone(),
                Arc::new(Knitr),
                KnitSettings::default(),
            );
            PresentationAssembler::new(
                Arc::new(knit),
                Arc::new(RpresParser),
                Arc::new(RevealSlideRenderer::new(Arc::new(ComrakMarkdown::default()))),
                TemplateRenderer::new(Arc::new(ResourceStore::new(self.resources.path()))),
                program_mode,
            )
        }
    }

    #[test]
    fn missing_slides_is_not_found() {
        let fixture = Fixture::new();
        let err = fixture
            .assembler(ProgramMode::Server)
            .assemble(fixture.deck.path(), RenderMode::InPane { zoomed: false })
            .expect_err("missing slides");

        assert!(matches!(err, PresentationError::NotFound(_)));
        assert_eq!(
            err.to_string(),
            format!("slides.md file not found in {}", fixture.deck.path().display())
        );
    }

    #[test]
    fn pane_document_links_assets_and_wires_commands() {
        let fixture = Fixture::new();
        fixture.write_slides(
            "Intro\n=====\nsource: setup.R\n\nNext\n====\n\n<video controls preload=\"auto\" src=\"a.mp4\"></video>\n\n[docs](help-topic:stats:lm)\n",
        );

        let doc = fixture
            .assembler(ProgramMode::Server)
            .assemble(fixture.deck.path(), RenderMode::InPane { zoomed: true })
            .expect("assembled");

        assert_eq!(doc.title, "Intro");
        let html = doc.html;
        assert!(html.contains("<link rel=\"stylesheet\" href=\"revealjs/css/reveal.css\">"));
        assert!(html.contains("<script src=\"revealjs/js/reveal.js\"></script>"));
        assert!(!html.contains("PDFCSS"));
        assert!(html.contains("revealjs/fonts/Lato.css"));
        assert!(html.contains("function presentationReady(initCommands, slideCommands)"));
        assert!(html.contains("var slideCommands = [[],[]];"), "{html}");
        assert!(html.contains(
            r#"presentationReady([{"name":"source","params":"setup.R"}], slideCommands);"#
        ));
        assert!(html.contains("width: revealDetectWidth(true),"));
        assert!(html.contains("height: revealDetectHeight(true),"));
        assert!(html.contains("controls preload=\"none\""));
        assert!(!html.contains("controls preload=\"auto\""));
        assert!(html.contains("onclick='window.parent.dispatchPresentationCommand("));
        assert!(!html.contains("MathJax.js"));
    }

    #[test]
    fn desktop_pane_suppresses_transition() {
        let fixture = Fixture::new();
        fixture.write_slides("Intro\n=====\ntransition: zoom\n");

        let server = fixture
            .assembler(ProgramMode::Server)
            .assemble(fixture.deck.path(), RenderMode::InPane { zoomed: false })
            .expect("server");
        let desktop = fixture
            .assembler(ProgramMode::Desktop)
            .assemble(fixture.deck.path(), RenderMode::InPane { zoomed: false })
            .expect("desktop");

        assert!(server.html.contains("transition: 'zoom'"));
        assert!(desktop.html.contains("transition: 'none'"));
    }

    #[test]
    fn standalone_embeds_assets_and_inlines_images() {
        let fixture = Fixture::new();
        fs::write(fixture.deck.path().join("plot.png"), [0x89, b'P', b'N', b'G']).expect("png");
        fixture.write_slides(
            "Intro\n=====\ntransition: cube\n\nMath\n====\n\n$$x^2$$\n\n![plot](plot.png)\n",
        );

        let doc = fixture
            .assembler(ProgramMode::Desktop)
            .assemble(fixture.deck.path(), RenderMode::Standalone)
            .expect("assembled");
        let html = doc.html;

        assert!(html.contains("<style type=\"text/css\" media=\"print\">\nPDFCSS\n</style>"));
        assert!(html.contains("<style type=\"text/css\">\nREVEALCSS\n</style>"));
        assert!(html.contains("<script type=\"text/javascript\">\nREVEALJS\n</script>"));
        assert!(html.contains("https://fonts.googleapis.com/css?family=Lato"));
        assert!(html.contains("https://c328740.ssl.cf1.rackcdn.com/mathjax/2.0-latest/MathJax.js"));
        assert!(html.contains("width: 960,"));
        assert!(html.contains("height: 700,"));
        assert!(html.contains("transition: 'cube'"));
        assert!(html.contains("src=\"data:image/png;base64,iVBORw==\""));

        let script = &html[html.rfind("<script type=\"text/javascript\">").expect("inline script")..];
        assert!(script.contains("Reveal.initialize({"));
        assert!(!script.contains("slideCommands"));
        assert!(!script.contains("presentationReady"));
        assert!(!html.contains("= ;"));

        for relative in ["href=\"revealjs/", "src=\"revealjs/", "src=\"mathjax/", "revealjs/fonts/", "src=\"plot.png\""] {
            assert!(!html.contains(relative), "standalone output references {relative}");
        }
    }

    #[test]
    fn pane_mathjax_is_served_locally() {
        let fixture = Fixture::new();
        fixture.write_slides("Intro\n=====\n\nSum\n===\n\n\\(x\\)\n");

        let doc = fixture
            .assembler(ProgramMode::Server)
            .assemble(fixture.deck.path(), RenderMode::InPane { zoomed: false })
            .expect("assembled");
        assert!(
            doc.html
                .contains("src=\"mathjax/MathJax.js?config=TeX-AMS-MML_HTMLorMML\"></script>")
        );
    }

    #[test]
    fn stale_r_markdown_is_knitted_first() {
        let fixture = Fixture::new();
        fs::write(fixture.deck.path().join(SLIDES_R_SOURCE), "rmd").expect("rmd");

        let doc = fixture
            .assembler(ProgramMode::Server)
            .assemble(fixture.deck.path(), RenderMode::InPane { zoomed: false })
            .expect("assembled");

        assert_eq!(fixture.runner.runs.load(Ordering::SeqCst), 1);
        assert_eq!(doc.title, "Knitted");
    }

    #[test]
    fn export_writes_named_file() {
        let fixture = Fixture::new();
        fixture.write_slides("Intro\n=====\n");

        let target = fixture
            .assembler(ProgramMode::Server)
            .export_standalone(fixture.deck.path())
            .expect("exported");

        let name = fixture.deck.path().file_name().expect("name").to_string_lossy();
        assert_eq!(target, fixture.deck.path().join(format!("{name}.html")));
        let written = fs::read_to_string(target).expect("read export");
        assert!(written.contains("<title>Intro</title>"));
    }
}
