#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use slidepane::{
    application::{
        context::{Collaborators, PresentationContext},
        knit::{BuildError, KnitrVersionCheck},
    },
    config::{
        HelpSettings, KnitSettings, LogFormat, LoggingSettings, PresentationSettings,
        ProgramMode, ResourceSettings, ServerSettings, Settings,
    },
    infra::{
        http::build_router,
        process::{ProcessError, ProcessOutput, ProcessRequest, ProcessRunner},
    },
};
use tempfile::TempDir;
use tower::ServiceExt;
use tracing::level_filters::LevelFilter;

pub const HELP_CALLBACKS: &str = "window.helpCallbacks = true;";

/// Resource tree built from the shipped templates plus stand-in reveal.js and MathJax files.
pub struct Workspace {
    pub root: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let root = TempDir::new().expect("workspace");
        let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("resources");
        copy_tree(&shipped, &root.path().join("resources"));

        let stubs = [
            ("resources/presentation/revealjs/css/reveal.css", "/* reveal */"),
            ("resources/presentation/revealjs/js/reveal.js", "var Reveal = {};"),
            ("mathjax/MathJax.js", "var MathJax = {};"),
        ];
        for (path, text) in stubs {
            write(&root.path().join(path), text);
        }
        fs::create_dir_all(root.path().join("decks")).expect("decks dir");

        Self { root }
    }

    pub fn resources(&self) -> PathBuf {
        self.root.path().join("resources")
    }

    pub fn deck(&self, name: &str) -> PathBuf {
        let dir = self.root.path().join("decks").join(name);
        fs::create_dir_all(&dir).expect("deck dir");
        dir
    }

    pub fn settings(&self, presentation: Option<PathBuf>) -> Settings {
        Settings {
            server: ServerSettings {
                addr: "127.0.0.1:0".parse().expect("addr"),
            },
            logging: LoggingSettings {
                level: LevelFilter::INFO,
                format: LogFormat::Compact,
            },
            presentation: PresentationSettings {
                directory: presentation,
                program_mode: ProgramMode::Server,
            },
            resources: ResourceSettings {
                directory: self.resources(),
                mathjax_path: self.root.path().join("mathjax"),
            },
            knit: KnitSettings::default(),
            help: HelpSettings {
                js_callbacks: HELP_CALLBACKS.to_string(),
            },
        }
    }

    pub fn context(&self, presentation: Option<PathBuf>, runner: Arc<RecordingRunner>) -> PresentationContext {
        let collaborators = Collaborators::system()
            .with_runner(runner)
            .with_version_check(Arc::new(FixedVersion(Some("1.40"))));
        PresentationContext::new(&self.settings(presentation), collaborators)
    }
}

pub fn write(path: &Path, text: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, text).expect("write");
}

fn copy_tree(from: &Path, to: &Path) {
    fs::create_dir_all(to).expect("mkdir");
    for entry in fs::read_dir(from).expect("read dir") {
        let entry = entry.expect("entry");
        let target = to.join(entry.file_name());
        if entry.file_type().expect("file type").is_dir() {
            copy_tree(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), target).expect("copy");
        }
    }
}

type Behaviour = dyn Fn(&ProcessRequest) -> ProcessOutput + Send + Sync;

/// Records every request and answers with a scripted output.
pub struct RecordingRunner {
    pub requests: Mutex<Vec<ProcessRequest>>,
    behaviour: Box<Behaviour>,
}

impl RecordingRunner {
    pub fn new(behaviour: impl Fn(&ProcessRequest) -> ProcessOutput + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            behaviour: Box::new(behaviour),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(|_| exit(0, "", ""))
    }

    pub fn runs(&self) -> usize {
        self.requests.lock().expect("requests").len()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput, ProcessError> {
        self.requests.lock().expect("requests").push(request.clone());
        Ok((self.behaviour)(request))
    }
}

pub fn exit(code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        exit_code: Some(code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

pub struct FixedVersion(pub Option<&'static str>);

impl KnitrVersionCheck for FixedVersion {
    fn installed_version(&self) -> Result<Option<String>, BuildError> {
        Ok(self.0.map(str::to_string))
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

pub fn router(ctx: PresentationContext) -> Router {
    build_router(ctx)
}

pub async fn send(router: &Router, method: Method, uri: &str, headers: &[(&str, &str)], body: Body) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(body).expect("request should build");
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");

    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    Reply {
        status,
        headers,
        body,
    }
}

pub async fn get(router: &Router, uri: &str) -> Reply {
    send(router, Method::GET, uri, &[], Body::empty()).await
}

pub async fn get_with(router: &Router, uri: &str, headers: &[(&str, &str)]) -> Reply {
    send(router, Method::GET, uri, headers, Body::empty()).await
}

pub async fn post_json(router: &Router, uri: &str, json: &str) -> Reply {
    send(
        router,
        Method::POST,
        uri,
        &[("content-type", "application/json")],
        Body::from(json.to_string()),
    )
    .await
}
