//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "slidepane";
const ENV_PREFIX: &str = "SLIDEPANE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8787;
const DEFAULT_RESOURCES_DIR: &str = "resources";
const DEFAULT_MATHJAX_PATH: &str = "resources/mathjax";
pub(crate) const DEFAULT_R_PATH: &str = "R";
const DEFAULT_KNIT_ENCODING: &str = "UTF-8";
const DEFAULT_MINIMUM_KNITR_VERSION: &str = "1.0";
const DEFAULT_KNIT_TIMEOUT_SECS: u64 = 300;

/// Command-line arguments for the slidepane binary.
#[derive(Debug, Parser)]
#[command(name = "slidepane", version, about = "Local presentation server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SLIDEPANE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve the active presentation and help documents over HTTP.
    Serve(Box<ServeArgs>),
    /// Write the self-contained HTML rendering of a presentation directory.
    Export(ExportArgs),
    /// Re-knit an R markdown source if its derived markdown is stale.
    Knit(KnitArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct KnitOverrides {
    /// Override the R executable used to knit documents.
    #[arg(long = "knit-r-path", value_name = "PATH")]
    pub r_path: Option<PathBuf>,

    /// Override the knit subprocess timeout.
    #[arg(long = "knit-timeout-seconds", value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// Choose how derived markdown staleness is decided.
    #[arg(long = "knit-staleness", value_name = "POLICY")]
    pub staleness: Option<StalenessPolicy>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub knit: KnitOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Directory of the presentation to activate on startup.
    #[arg(long = "presentation", value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub presentation_directory: Option<PathBuf>,

    /// Host program mode (server|desktop).
    #[arg(long = "program-mode", value_name = "MODE")]
    pub program_mode: Option<ProgramMode>,

    /// Override the resource directory holding templates and reveal.js.
    #[arg(long = "resources-directory", value_name = "PATH")]
    pub resources_directory: Option<PathBuf>,

    /// Override the MathJax installation directory.
    #[arg(long = "mathjax-path", value_name = "PATH")]
    pub mathjax_path: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub knit: KnitOverrides,

    /// Override the resource directory holding templates and reveal.js.
    #[arg(long = "resources-directory", value_name = "PATH")]
    pub resources_directory: Option<PathBuf>,

    /// Presentation directory containing `slides.md` or `slides.Rmd`.
    #[arg(value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub directory: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct KnitArgs {
    #[command(flatten)]
    pub knit: KnitOverrides,

    /// R markdown source to knit.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub presentation: PresentationSettings,
    pub resources: ResourceSettings,
    pub knit: KnitSettings,
    pub help: HelpSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProgramMode {
    #[default]
    Server,
    Desktop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StalenessPolicy {
    /// Derived markdown is fresh when it is at least as new as its source.
    #[default]
    Mtime,
    /// Derived markdown is fresh when the source digest matches the last knit.
    ContentHash,
}

#[derive(Debug, Clone)]
pub struct PresentationSettings {
    pub directory: Option<PathBuf>,
    pub program_mode: ProgramMode,
}

#[derive(Debug, Clone)]
pub struct ResourceSettings {
    pub directory: PathBuf,
    pub mathjax_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct KnitSettings {
    pub r_path: PathBuf,
    pub encoding: String,
    pub minimum_knitr_version: String,
    pub timeout: Duration,
    pub staleness: StalenessPolicy,
}

impl Default for KnitSettings {
    fn default() -> Self {
        Self {
            r_path: PathBuf::from(DEFAULT_R_PATH),
            encoding: DEFAULT_KNIT_ENCODING.to_string(),
            minimum_knitr_version: DEFAULT_MINIMUM_KNITR_VERSION.to_string(),
            timeout: Duration::from_secs(DEFAULT_KNIT_TIMEOUT_SECS),
            staleness: StalenessPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HelpSettings {
    pub js_callbacks: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Export(args)) => {
            raw.apply_knit_overrides(&args.knit);
            if let Some(directory) = args.resources_directory.as_ref() {
                raw.resources.directory = Some(directory.clone());
            }
        }
        Some(Command::Knit(args)) => raw.apply_knit_overrides(&args.knit),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    presentation: RawPresentationSettings,
    resources: RawResourceSettings,
    knit: RawKnitSettings,
    help: RawHelpSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(directory) = overrides.presentation_directory.as_ref() {
            self.presentation.directory = Some(directory.clone());
        }
        if let Some(mode) = overrides.program_mode {
            self.presentation.program_mode = Some(mode);
        }
        if let Some(directory) = overrides.resources_directory.as_ref() {
            self.resources.directory = Some(directory.clone());
        }
        if let Some(path) = overrides.mathjax_path.as_ref() {
            self.resources.mathjax_path = Some(path.clone());
        }
        self.apply_knit_overrides(&overrides.knit);
    }

    fn apply_knit_overrides(&mut self, overrides: &KnitOverrides) {
        if let Some(path) = overrides.r_path.as_ref() {
            self.knit.r_path = Some(path.clone());
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.knit.timeout_seconds = Some(seconds);
        }
        if let Some(policy) = overrides.staleness {
            self.knit.staleness = Some(policy);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            presentation,
            resources,
            knit,
            help,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            presentation: build_presentation_settings(presentation)?,
            resources: build_resource_settings(resources)?,
            knit: build_knit_settings(knit)?,
            help: HelpSettings {
                js_callbacks: help.js_callbacks.unwrap_or_default(),
            },
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_presentation_settings(
    presentation: RawPresentationSettings,
) -> Result<PresentationSettings, LoadError> {
    let directory = presentation
        .directory
        .filter(|path| !path.as_os_str().is_empty());

    Ok(PresentationSettings {
        directory,
        program_mode: presentation.program_mode.unwrap_or_default(),
    })
}

fn build_resource_settings(resources: RawResourceSettings) -> Result<ResourceSettings, LoadError> {
    let directory = resources
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RESOURCES_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "resources.directory",
            "path must not be empty",
        ));
    }

    let mathjax_path = resources
        .mathjax_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MATHJAX_PATH));
    if mathjax_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "resources.mathjax_path",
            "path must not be empty",
        ));
    }

    Ok(ResourceSettings {
        directory,
        mathjax_path,
    })
}

fn build_knit_settings(knit: RawKnitSettings) -> Result<KnitSettings, LoadError> {
    let r_path = knit
        .r_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_R_PATH));
    if r_path.as_os_str().is_empty() {
        return Err(LoadError::invalid("knit.r_path", "path must not be empty"));
    }

    let encoding = knit
        .encoding
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_KNIT_ENCODING.to_string());
    if encoding.is_empty() {
        return Err(LoadError::invalid("knit.encoding", "must not be empty"));
    }

    let minimum_knitr_version = knit
        .minimum_knitr_version
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_MINIMUM_KNITR_VERSION.to_string());
    let well_formed = !minimum_knitr_version.is_empty()
        && minimum_knitr_version
            .split(['.', '-'])
            .all(|part| part.parse::<u64>().is_ok());
    if !well_formed {
        return Err(LoadError::invalid(
            "knit.minimum_knitr_version",
            format!("`{minimum_knitr_version}` is not a dotted version number"),
        ));
    }

    let timeout_seconds = knit.timeout_seconds.unwrap_or(DEFAULT_KNIT_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "knit.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(KnitSettings {
        r_path,
        encoding,
        minimum_knitr_version,
        timeout: Duration::from_secs(timeout_seconds),
        staleness: knit.staleness.unwrap_or_default(),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPresentationSettings {
    directory: Option<PathBuf>,
    program_mode: Option<ProgramMode>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawResourceSettings {
    directory: Option<PathBuf>,
    mathjax_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawKnitSettings {
    r_path: Option<PathBuf>,
    encoding: Option<String>,
    minimum_knitr_version: Option<String>,
    timeout_seconds: Option<u64>,
    staleness: Option<StalenessPolicy>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHelpSettings {
    js_callbacks: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
