//! Running external tools (R, knitr, Rcpp) with captured output and a deadline.

use std::{
    ffi::OsString,
    io::{self, ErrorKind, Read},
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One invocation of an external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl ProcessRequest {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    #[error("failed to wait for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Launch { source, .. } if source.kind() == ErrorKind::NotFound => "not_found",
            Self::Launch { .. } => "launch",
            Self::TimedOut { .. } => "timed_out",
            Self::Wait { .. } => "wait",
        }
    }
}

/// Seam for executing external tools; tests substitute scripted runners.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput, ProcessError>;
}

/// Runs programs with `std::process::Command`, draining both pipes on helper
/// threads so a chatty child cannot block on a full pipe buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput, ProcessError> {
        let started_at = Instant::now();
        let program = request.program.display().to_string();

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| {
            warn!(
                target = "infra::process",
                op = "process::run",
                result = "error",
                program = %program,
                error_code = "spawn",
                error = %source,
                "Failed to spawn external tool"
            );
            ProcessError::Launch {
                program: program.clone(),
                source,
            }
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_with_deadline(&mut child, request.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                // Grandchildren may still hold the pipes open; leave the readers detached.
                drop((stdout, stderr));
                warn!(
                    target = "infra::process",
                    op = "process::run",
                    result = "timed_out",
                    program = %program,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    timeout_ms = request.timeout.as_millis() as u64,
                    "External tool killed after timeout"
                );
                return Err(ProcessError::TimedOut {
                    program,
                    timeout: request.timeout,
                });
            }
            Err(source) => {
                let _ = child.kill();
                return Err(ProcessError::Wait { program, source });
            }
        };

        let output = ProcessOutput {
            exit_code: status.code(),
            stdout: join_drain(stdout),
            stderr: join_drain(stderr),
        };

        info!(
            target = "infra::process",
            op = "process::run",
            result = if output.success() { "ok" } else { "failed" },
            program = %program,
            exit_code = output.exit_code.map(i64::from).unwrap_or(-1),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "External tool finished"
        );

        Ok(output)
    }
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = reader.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
