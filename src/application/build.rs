//! Source build hook: compiles a C++ source file through `Rcpp::sourceCpp` and
//! reports progress to subscribers as [`BuildEvent`]s.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    application::knit::BuildError,
    infra::{
        files::create_aliased_path,
        lock::{self, LockSite},
        process::{ProcessRequest, ProcessRunner},
    },
};

const EVENT_CAPACITY: usize = 16;

static GCC_DIAGNOSTIC: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(.+?):(\d+):(\d+):\s+(fatal error|error|warning):\s+(.*)$").ok()
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// The build was started from code rather than by the user; no completion event.
    pub from_code: bool,
    pub show_output: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildOutputKind {
    Normal,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutput {
    pub kind: BuildOutputKind,
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileErrorKind {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub path: PathBuf,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    SourceBuildStarted,
    SourceBuildCompleted {
        target_file: String,
        outputs: Vec<BuildOutput>,
        errors: Vec<CompileError>,
    },
}

/// One build at a time; subscribers receive events through a broadcast channel.
pub struct SourceBuildContext {
    runner: Arc<dyn ProcessRunner>,
    r_path: PathBuf,
    timeout: Duration,
    events: broadcast::Sender<BuildEvent>,
    running: Mutex<()>,
}

impl SourceBuildContext {
    pub fn new(runner: Arc<dyn ProcessRunner>, r_path: PathBuf, timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            runner,
            r_path,
            timeout,
            events,
            running: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events.subscribe()
    }

    /// Runs the build and returns whether it succeeded.
    pub fn build(&self, source: &Path, options: BuildOptions) -> Result<bool, BuildError> {
        let _guard = lock::exclusive(&self.running, LockSite::SourceBuild, "build");
        let started_at = Instant::now();
        self.emit(BuildEvent::SourceBuildStarted);

        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().replace('\'', "\\'"))
            .unwrap_or_default();
        let directory = source
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let request = ProcessRequest::new(&self.r_path, self.timeout)
            .args(["--silent", "--no-save", "--no-restore", "-e"])
            .arg(format!("Rcpp::sourceCpp('{file_name}')"))
            .current_dir(directory);
        let output = match self.runner.run(&request) {
            Ok(output) => output,
            Err(err) => {
                let err = BuildError::from(err);
                warn!(
                    target = "application::build",
                    op = "build::source",
                    result = "error",
                    source_path = %source.display(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "Source build did not run to completion"
                );
                if !options.from_code {
                    self.emit(BuildEvent::SourceBuildCompleted {
                        target_file: create_aliased_path(source),
                        outputs: vec![BuildOutput {
                            kind: BuildOutputKind::Error,
                            output: err.to_string(),
                        }],
                        errors: Vec::new(),
                    });
                }
                return Err(err);
            }
        };
        let succeeded = output.success();

        info!(
            target = "application::build",
            op = "build::source",
            result = if succeeded { "ok" } else { "failed" },
            source_path = %source.display(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Source build finished"
        );

        if options.from_code {
            return Ok(succeeded);
        }

        let stdout = if !succeeded || options.show_output {
            output.stdout
        } else {
            String::new()
        };
        let errors = parse_compile_errors(&format!("{stdout}\n{}", output.stderr), directory);
        self.emit(BuildEvent::SourceBuildCompleted {
            target_file: create_aliased_path(source),
            outputs: vec![
                BuildOutput {
                    kind: BuildOutputKind::Normal,
                    output: stdout,
                },
                BuildOutput {
                    kind: BuildOutputKind::Error,
                    output: output.stderr,
                },
            ],
            errors,
        });

        Ok(succeeded)
    }

    fn emit(&self, event: BuildEvent) {
        if self.events.send(event).is_err() {
            debug!(
                target = "application::build",
                op = "build::emit",
                "No build event subscribers"
            );
        }
    }
}

/// Parses gcc-style `file:line:col: error: message` diagnostics. Relative
/// paths are resolved against `base_dir`.
pub fn parse_compile_errors(output: &str, base_dir: &Path) -> Vec<CompileError> {
    let Some(pattern) = GCC_DIAGNOSTIC.as_ref() else {
        return Vec::new();
    };

    output
        .lines()
        .filter_map(|line| {
            let captures = pattern.captures(line.trim_end())?;
            let path = PathBuf::from(&captures[1]);
            let kind = match &captures[4] {
                "warning" => CompileErrorKind::Warning,
                _ => CompileErrorKind::Error,
            };
            Some(CompileError {
                kind,
                path: if path.is_absolute() {
                    path
                } else {
                    base_dir.join(path)
                },
                line: captures[2].parse().ok()?,
                column: captures[3].parse().ok()?,
                message: captures[5].to_string(),
            })
        })
        .collect()
}
