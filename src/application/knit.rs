//! Keeping `slides.md` (or any knitted markdown) in step with its R markdown source.

use std::{
    cmp::Ordering,
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use metrics::counter;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    config::{KnitSettings, StalenessPolicy},
    infra::{
        process::{ProcessError, ProcessRequest, ProcessRunner},
        telemetry::KNIT_RUNS,
    },
};

const DIGEST_FILE: &str = "source.sha256";
const R_ARGS: [&str; 3] = ["--silent", "--no-save", "--no-restore"];

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("knitr version {minimum} or greater is required for presentations")]
    ToolVersion { minimum: String },
    #[error("failed to run R: {0}")]
    Launch(String),
    #[error("Error occurred during knit: {stderr}")]
    Failed { stderr: String },
    #[error("knit did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("knit completed but `{}` was not produced", path.display())]
    MissingArtifact { path: PathBuf },
    #[error("i/o error on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BuildError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<ProcessError> for BuildError {
    fn from(error: ProcessError) -> Self {
        match error {
            ProcessError::TimedOut { timeout, .. } => BuildError::TimedOut(timeout),
            other => BuildError::Launch(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnitOutcome {
    UpToDate,
    Knitted,
}

/// Reports the installed knitr version, or `None` when knitr is absent.
pub trait KnitrVersionCheck: Send + Sync {
    fn installed_version(&self) -> Result<Option<String>, BuildError>;
}

/// Asks R for `packageVersion("knitr")`, remembering the first installed version.
/// An absent knitr is asked about again on the next call.
pub struct ScriptVersionCheck {
    runner: Arc<dyn ProcessRunner>,
    r_path: PathBuf,
    timeout: Duration,
    cached: OnceLock<String>,
}

impl ScriptVersionCheck {
    pub fn new(runner: Arc<dyn ProcessRunner>, r_path: PathBuf, timeout: Duration) -> Self {
        Self {
            runner,
            r_path,
            timeout,
            cached: OnceLock::new(),
        }
    }
}

impl KnitrVersionCheck for ScriptVersionCheck {
    fn installed_version(&self) -> Result<Option<String>, BuildError> {
        if let Some(version) = self.cached.get() {
            return Ok(Some(version.clone()));
        }

        let script = "cat(if (requireNamespace('knitr', quietly = TRUE)) \
                      as.character(utils::packageVersion('knitr')) else '')";
        let request = ProcessRequest::new(&self.r_path, self.timeout)
            .args(R_ARGS)
            .args(["-e", script]);
        let output = self.runner.run(&request)?;
        if !output.success() {
            return Err(BuildError::Launch(format!(
                "knitr version check failed: {}",
                output.stderr.trim()
            )));
        }

        let version = output.stdout.trim();
        if version.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.cached.get_or_init(|| version.to_string()).clone()))
    }
}

/// Decides whether derived markdown is stale and re-knits it when it is.
pub struct KnitGate {
    runner: Arc<dyn ProcessRunner>,
    version_check: Arc<dyn KnitrVersionCheck>,
    settings: KnitSettings,
}

impl KnitGate {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        version_check: Arc<dyn KnitrVersionCheck>,
        settings: KnitSettings,
    ) -> Self {
        Self {
            runner,
            version_check,
            settings,
        }
    }

    pub fn settings(&self) -> &KnitSettings {
        &self.settings
    }

    /// Whether the derived markdown for `source` can be used as-is.
    pub fn is_fresh(&self, source: &Path) -> Result<bool, BuildError> {
        let derived = derived_path(source);
        if !derived.exists() {
            return Ok(false);
        }

        match self.settings.staleness {
            StalenessPolicy::Mtime => {
                let source_mtime = modified(source)?;
                let derived_mtime = modified(&derived)?;
                Ok(derived_mtime >= source_mtime)
            }
            StalenessPolicy::ContentHash => {
                let current = source_digest(source)?;
                let recorded = fs::read_to_string(digest_path(source)).unwrap_or_default();
                Ok(recorded.trim() == current)
            }
        }
    }

    pub fn ensure_fresh(&self, source: &Path) -> Result<KnitOutcome, BuildError> {
        let started_at = Instant::now();
        if self.is_fresh(source)? {
            return Ok(KnitOutcome::UpToDate);
        }

        self.check_knitr_version()?;

        let derived = derived_path(source);
        match fs::remove_file(&derived) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(BuildError::io(&derived, err)),
        }

        let request = ProcessRequest::new(&self.settings.r_path, self.settings.timeout)
            .args(R_ARGS)
            .arg("-e")
            .arg(knit_script(source, &self.settings.encoding))
            .current_dir(working_dir(source));

        counter!(KNIT_RUNS).increment(1);
        let output = self.runner.run(&request).map_err(|err| {
            warn!(
                target = "application::knit",
                op = "knit::ensure_fresh",
                result = "error",
                source_path = %source.display(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                error_code = err.code(),
                error = %err,
                "Knit subprocess could not complete"
            );
            BuildError::from(err)
        })?;

        if !output.success() {
            warn!(
                target = "application::knit",
                op = "knit::ensure_fresh",
                result = "error",
                source_path = %source.display(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                exit_code = output.exit_code.map(i64::from).unwrap_or(-1),
                error_code = "knit_failed",
                "Knit reported an error"
            );
            return Err(BuildError::Failed {
                stderr: output.stderr,
            });
        }

        if !derived.exists() {
            return Err(BuildError::MissingArtifact { path: derived });
        }

        if self.settings.staleness == StalenessPolicy::ContentHash {
            record_digest(source)?;
        }

        info!(
            target = "application::knit",
            op = "knit::ensure_fresh",
            result = "knitted",
            source_path = %source.display(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Knit completed"
        );

        Ok(KnitOutcome::Knitted)
    }

    fn check_knitr_version(&self) -> Result<(), BuildError> {
        let minimum = &self.settings.minimum_knitr_version;
        let installed = self.version_check.installed_version()?;
        match installed {
            Some(version) if version_at_least(&version, minimum) => Ok(()),
            _ => Err(BuildError::ToolVersion {
                minimum: minimum.clone(),
            }),
        }
    }
}

/// `dir/slides.Rmd` → `dir/slides.md`.
pub fn derived_path(source: &Path) -> PathBuf {
    source.with_extension("md")
}

fn stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|value| value.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn working_dir(source: &Path) -> PathBuf {
    match source.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn digest_path(source: &Path) -> PathBuf {
    working_dir(source)
        .join(format!("{}-cache", stem(source)))
        .join(DIGEST_FILE)
}

fn knit_script(source: &Path, encoding: &str) -> String {
    let stem = r_string(&stem(source));
    let file_name = source
        .file_name()
        .map(|value| value.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(
        "library(knitr); \
         opts_chunk$set(cache=TRUE, cache.path='{stem}-cache/', fig.path='{stem}-figure/', \
         tidy=FALSE, warning=FALSE, message=FALSE, comment=NA); \
         knit('{}', encoding='{}');",
        r_string(&file_name),
        r_string(encoding)
    )
}

fn r_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn modified(path: &Path) -> Result<std::time::SystemTime, BuildError> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|err| BuildError::io(path, err))
}

fn source_digest(source: &Path) -> Result<String, BuildError> {
    let bytes = fs::read(source).map_err(|err| BuildError::io(source, err))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn record_digest(source: &Path) -> Result<(), BuildError> {
    let digest = source_digest(source)?;
    let path = digest_path(source);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| BuildError::io(parent, err))?;
    }
    fs::write(&path, digest).map_err(|err| BuildError::io(&path, err))
}

/// Compare dotted version strings numerically (`1.10` > `1.9`).
pub fn version_at_least(installed: &str, minimum: &str) -> bool {
    let parse = |value: &str| -> Vec<u64> {
        value
            .trim()
            .split(['.', '-'])
            .map(|part| part.parse().unwrap_or(0))
            .collect()
    };
    let (installed, minimum) = (parse(installed), parse(minimum));
    let len = installed.len().max(minimum.len());
    for index in 0..len {
        let left = installed.get(index).copied().unwrap_or(0);
        let right = minimum.get(index).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Greater => return true,
            Ordering::Less => return false,
            Ordering::Equal => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::process::ProcessOutput;
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering as AtomicOrdering},
        },
        time::SystemTime,
    };
    use tempfile::TempDir;

    type Behaviour = dyn Fn(&ProcessRequest) -> Result<ProcessOutput, ProcessError> + Send + Sync;

    struct ScriptedRunner {
        calls: Mutex<Vec<ProcessRequest>>,
        behaviour: Box<Behaviour>,
    }

    impl ScriptedRunner {
        fn new(
            behaviour: impl Fn(&ProcessRequest) -> Result<ProcessOutput, ProcessError>
            + Send
            + Sync
            + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                behaviour: Box::new(behaviour),
            })
        }

        fn calls(&self) -> Vec<ProcessRequest> {
            self.calls.lock().expect("calls").clone()
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput, ProcessError> {
            self.calls.lock().expect("calls").push(request.clone());
            (self.behaviour)(request)
        }
    }

    struct FixedVersion(Option<&'static str>);

    impl KnitrVersionCheck for FixedVersion {
        fn installed_version(&self) -> Result<Option<String>, BuildError> {
            Ok(self.0.map(str::to_string))
        }
    }

    fn ok(stdout: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    fn writes_markdown(request: &ProcessRequest) -> Result<ProcessOutput, ProcessError> {
        let dir = request.working_dir.clone().expect("working dir");
        fs::write(dir.join("slides.md"), "Title\n=====\n").expect("write derived");
        Ok(ok(""))
    }

    fn gate(runner: Arc<ScriptedRunner>, version: Option<&'static str>) -> KnitGate {
        KnitGate::new(runner, Arc::new(FixedVersion(version)), KnitSettings::default())
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = fs::OpenOptions::new().write(true).open(path).expect("open");
        file.set_modified(time).expect("set mtime");
    }

    #[test]
    fn fresh_derived_file_skips_the_tool() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("slides.Rmd");
        let derived = dir.path().join("slides.md");
        fs::write(&source, "src").expect("write source");
        fs::write(&derived, "md").expect("write derived");
        let now = SystemTime::now();
        set_mtime(&source, now - Duration::from_secs(60));
        set_mtime(&derived, now);

        let runner = ScriptedRunner::new(writes_markdown);
        let outcome = gate(runner.clone(), Some("1.5")).ensure_fresh(&source).expect("fresh");

        assert_eq!(outcome, KnitOutcome::UpToDate);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn equal_timestamps_count_as_fresh() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("slides.Rmd");
        let derived = dir.path().join("slides.md");
        fs::write(&source, "src").expect("write source");
        fs::write(&derived, "md").expect("write derived");
        let now = SystemTime::now();
        set_mtime(&source, now);
        set_mtime(&derived, now);

        let runner = ScriptedRunner::new(writes_markdown);
        assert!(gate(runner, Some("1.5")).is_fresh(&source).expect("checked"));
    }

    #[test]
    fn stale_derived_file_is_rebuilt_once() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("slides.Rmd");
        let derived = dir.path().join("slides.md");
        fs::write(&derived, "old").expect("write derived");
        fs::write(&source, "src").expect("write source");
        let now = SystemTime::now();
        set_mtime(&derived, now - Duration::from_secs(60));
        set_mtime(&source, now);

        let runner = ScriptedRunner::new(writes_markdown);
        let outcome = gate(runner.clone(), Some("1.2")).ensure_fresh(&source).expect("knit");

        assert_eq!(outcome, KnitOutcome::Knitted);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        let request = &calls[0];
        assert_eq!(request.program, PathBuf::from("R"));
        assert_eq!(request.working_dir.as_deref(), Some(dir.path()));
        let args: Vec<String> = request
            .args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(&args[..4], ["--silent", "--no-save", "--no-restore", "-e"]);
        assert_eq!(
            args[4],
            "library(knitr); opts_chunk$set(cache=TRUE, cache.path='slides-cache/', \
             fig.path='slides-figure/', tidy=FALSE, warning=FALSE, message=FALSE, comment=NA); \
             knit('slides.Rmd', encoding='UTF-8');"
        );
        assert_eq!(fs::read_to_string(&derived).expect("derived"), "Title\n=====\n");
    }

    #[test]
    fn old_knitr_blocks_the_run() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("slides.Rmd");
        fs::write(&source, "src").expect("write source");

        let runner = ScriptedRunner::new(writes_markdown);
        let err = gate(runner.clone(), Some("0.9")).ensure_fresh(&source).expect_err("too old");

        assert_eq!(
            err.to_string(),
            "knitr version 1.0 or greater is required for presentations"
        );
        assert!(runner.calls().is_empty());

        let missing = gate(runner.clone(), None).ensure_fresh(&source).expect_err("absent");
        assert!(matches!(missing, BuildError::ToolVersion { .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn tool_failure_surfaces_stderr() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("slides.Rmd");
        fs::write(&source, "src").expect("write source");

        let runner = ScriptedRunner::new(|_| {
            Ok(ProcessOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "object 'x' not found".to_string(),
            })
        });
        let err = gate(runner, Some("1.0")).ensure_fresh(&source).expect_err("failed");

        assert_eq!(
            err.to_string(),
            "Error occurred during knit: object 'x' not found"
        );
    }

    #[test]
    fn stale_output_is_removed_before_running() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("slides.Rmd");
        let derived = dir.path().join("slides.md");
        fs::write(&derived, "old").expect("write derived");
        fs::write(&source, "src").expect("write source");
        let now = SystemTime::now();
        set_mtime(&derived, now - Duration::from_secs(60));
        set_mtime(&source, now);

        let runner = ScriptedRunner::new(|_| Ok(ok("")));
        let err = gate(runner, Some("1.0")).ensure_fresh(&source).expect_err("no output");

        assert!(matches!(err, BuildError::MissingArtifact { .. }));
        assert!(!derived.exists());
    }

    #[test]
    fn timeouts_and_launch_failures_become_build_errors() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("slides.Rmd");
        fs::write(&source, "src").expect("write source");

        let runner = ScriptedRunner::new(|request| {
            Err(ProcessError::TimedOut {
                program: request.program.display().to_string(),
                timeout: request.timeout,
            })
        });
        let err = gate(runner, Some("1.0")).ensure_fresh(&source).expect_err("timeout");
        assert!(matches!(err, BuildError::TimedOut(timeout) if timeout == Duration::from_secs(300)));

        let runner = ScriptedRunner::new(|request| {
            Err(ProcessError::Launch {
                program: request.program.display().to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            })
        });
        let err = gate(runner, Some("1.0")).ensure_fresh(&source).expect_err("launch");
        assert!(matches!(err, BuildError::Launch(_)));
    }

    #[test]
    fn content_hash_policy_ignores_timestamps() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("slides.Rmd");
        fs::write(&source, "src").expect("write source");

        let settings = KnitSettings {
            staleness: StalenessPolicy::ContentHash,
            ..KnitSettings::default()
        };
        let runner = ScriptedRunner::new(writes_markdown);
        let gate = KnitGate::new(runner.clone(), Arc::new(FixedVersion(Some("1.4"))), settings);

        assert_eq!(gate.ensure_fresh(&source).expect("first"), KnitOutcome::Knitted);
        assert!(dir.path().join("slides-cache/source.sha256").exists());

        set_mtime(&source, SystemTime::now() + Duration::from_secs(120));
        assert_eq!(gate.ensure_fresh(&source).expect("touched"), KnitOutcome::UpToDate);

        fs::write(&source, "changed").expect("edit source");
        assert_eq!(gate.ensure_fresh(&source).expect("edited"), KnitOutcome::Knitted);
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn script_check_caches_successful_answers() {
        let runner = ScriptedRunner::new(|_| Ok(ok("1.45\n")));
        let version_check = ScriptVersionCheck::new(runner.clone(), PathBuf::from("R"), Duration::from_secs(5));

        assert_eq!(version_check.installed_version().expect("first").as_deref(), Some("1.45"));
        assert_eq!(version_check.installed_version().expect("second").as_deref(), Some("1.45"));
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn missing_knitr_is_asked_again_until_installed() {
        let attempts = AtomicUsize::new(0);
        let runner = ScriptedRunner::new(move |_| {
            let answer = if attempts.fetch_add(1, AtomicOrdering::SeqCst) == 0 { "" } else { "1.45" };
            Ok(ok(answer))
        });
        let version_check = ScriptVersionCheck::new(runner.clone(), PathBuf::from("R"), Duration::from_secs(5));

        assert_eq!(version_check.installed_version().expect("absent"), None);
        assert_eq!(version_check.installed_version().expect("installed").as_deref(), Some("1.45"));
        assert_eq!(version_check.installed_version().expect("cached").as_deref(), Some("1.45"));
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn versions_compare_numerically() {
        assert!(version_at_least("1.10", "1.9"));
        assert!(version_at_least("1.0", "1.0"));
        assert!(version_at_least("1", "1.0"));
        assert!(version_at_least("1.0.1", "1.0"));
        assert!(!version_at_least("0.9.9", "1.0"));
    }

    #[test]
    fn derived_path_swaps_extension() {
        assert_eq!(
            derived_path(Path::new("/deck/slides.Rmd")),
            PathBuf::from("/deck/slides.md")
        );
    }
}
