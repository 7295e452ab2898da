use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Which part of the server a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Presentation,
    Help,
    Rpc,
    Other,
}

impl Surface {
    pub fn for_path(path: &str) -> Self {
        if path.starts_with("/presentation/") {
            Surface::Presentation
        } else if path.starts_with("/help/presentation/") {
            Surface::Help
        } else if path.starts_with("/rpc/") {
            Surface::Rpc
        } else {
            Surface::Other
        }
    }

    fn name(self) -> &'static str {
        match self {
            Surface::Presentation => "presentation",
            Surface::Help => "help",
            Surface::Rpc => "rpc",
            Surface::Other => "other",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub surface: Surface,
}

/// Tags the request with an id and its surface, and echoes the id back.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
        surface: Surface::for_path(request.uri().path()),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Logs 4xx/5xx responses with the diagnostic chain carried by an [`ErrorReport`].
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();
    let ctx = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(|| RequestContext {
            request_id: String::new(),
            surface: Surface::for_path(uri.path()),
        });

    let mut response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let failure = Failure {
        status,
        report: response.extensions_mut().remove::<ErrorReport>(),
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    let (source, detail, chain) = failure.diagnostics();

    if status.is_server_error() {
        error!(
            target = "slidepane::http::response",
            surface = ctx.surface.name(),
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms = failure.elapsed_ms,
            source,
            detail = %detail,
            chain = ?chain,
            request_id = %ctx.request_id,
            "request failed",
        );
    } else {
        warn!(
            target = "slidepane::http::response",
            surface = ctx.surface.name(),
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms = failure.elapsed_ms,
            source,
            detail = %detail,
            chain = ?chain,
            request_id = %ctx.request_id,
            "request rejected",
        );
    }

    response
}

struct Failure {
    status: StatusCode,
    report: Option<ErrorReport>,
    elapsed_ms: u64,
}

impl Failure {
    fn diagnostics(&self) -> (&'static str, String, Vec<String>) {
        match &self.report {
            Some(report) => (
                report.source,
                report
                    .messages
                    .first()
                    .cloned()
                    .unwrap_or_else(|| self.fallback_detail()),
                report.messages.clone(),
            ),
            None => ("unknown", self.fallback_detail(), Vec::new()),
        }
    }

    fn fallback_detail(&self) -> String {
        self.status
            .canonical_reason()
            .unwrap_or("no diagnostic available")
            .to_string()
    }
}
