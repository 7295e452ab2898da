//! Wiring of the long-lived services the routers and commands share.

use std::sync::Arc;

use crate::{
    application::{
        accounts::{AccountService, InMemoryAccounts},
        build::SourceBuildContext,
        help::HelpService,
        knit::{KnitGate, KnitrVersionCheck, ScriptVersionCheck},
        presentation::{PresentationAssembler, PresentationState},
        render::{ComrakMarkdown, MarkdownConverter, RevealSlideRenderer, TemplateRenderer},
    },
    config::Settings,
    domain::slides::{RpresParser, SlideParser},
    infra::{
        assets::AssetRoots,
        process::{ProcessRunner, SystemProcessRunner},
        range_cache::FileRangeCache,
        resources::ResourceStore,
    },
};

/// External collaborators; tests swap in scripted implementations.
#[derive(Clone)]
pub struct Collaborators {
    pub runner: Arc<dyn ProcessRunner>,
    pub version_check: Option<Arc<dyn KnitrVersionCheck>>,
    pub markdown: Arc<dyn MarkdownConverter>,
    pub parser: Arc<dyn SlideParser>,
}

impl Collaborators {
    pub fn system() -> Self {
        Self {
            runner: Arc::new(SystemProcessRunner),
            version_check: None,
            markdown: Arc::new(ComrakMarkdown::default()),
            parser: Arc::new(RpresParser),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_version_check(mut self, version_check: Arc<dyn KnitrVersionCheck>) -> Self {
        self.version_check = Some(version_check);
        self
    }
}

/// Everything needed to serve presentations, help and the RPC surface.
#[derive(Clone)]
pub struct PresentationContext {
    pub state: Arc<PresentationState>,
    pub resources: Arc<ResourceStore>,
    pub knit: Arc<KnitGate>,
    pub assembler: Arc<PresentationAssembler>,
    pub help: Arc<HelpService>,
    pub range_cache: Arc<FileRangeCache>,
    pub assets: Arc<AssetRoots>,
    pub builds: Arc<SourceBuildContext>,
    pub accounts: AccountService,
}

impl PresentationContext {
    pub fn new(settings: &Settings, collaborators: Collaborators) -> Self {
        let Collaborators {
            runner,
            version_check,
            markdown,
            parser,
        } = collaborators;

        let knit_settings = settings.knit.clone();
        let version_check = version_check.unwrap_or_else(|| {
            Arc::new(ScriptVersionCheck::new(
                runner.clone(),
                knit_settings.r_path.clone(),
                knit_settings.timeout,
            ))
        });
        let knit = Arc::new(KnitGate::new(runner.clone(), version_check, knit_settings.clone()));

        let resources = Arc::new(ResourceStore::new(&settings.resources.directory));
        let templates = TemplateRenderer::new(resources.clone());

        let assembler = PresentationAssembler::new(
            knit.clone(),
            parser,
            Arc::new(RevealSlideRenderer::new(markdown.clone())),
            templates.clone(),
            settings.presentation.program_mode,
        );
        let help = HelpService::new(
            knit.clone(),
            markdown,
            templates,
            settings.help.js_callbacks.clone(),
        );

        let state = match &settings.presentation.directory {
            Some(directory) => PresentationState::active(directory),
            None => PresentationState::inactive(),
        };

        Self {
            state: Arc::new(state),
            resources,
            knit,
            assembler: Arc::new(assembler),
            help: Arc::new(help),
            range_cache: Arc::new(FileRangeCache::new()),
            assets: Arc::new(AssetRoots::new(
                &settings.resources.directory,
                &settings.resources.mathjax_path,
            )),
            builds: Arc::new(SourceBuildContext::new(
                runner,
                knit_settings.r_path,
                knit_settings.timeout,
            )),
            accounts: AccountService::new(Arc::new(InMemoryAccounts::default())),
        }
    }
}
