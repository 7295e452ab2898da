mod help;
mod middleware;
mod presentation;
pub mod range;
mod rpc;

use std::io;

use axum::{
    Router,
    http::{HeaderValue, StatusCode, header},
    middleware as axum_middleware,
    response::{Html, IntoResponse, Response},
};

use crate::application::{context::PresentationContext, error::HttpError};

pub use middleware::RequestContext;

/// Router for the presentation pane, the help pane and the host RPC surface.
pub fn build_router(ctx: PresentationContext) -> Router {
    Router::new()
        .merge(presentation::routes())
        .merge(help::routes())
        .merge(rpc::routes())
        .with_state(ctx)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

fn no_cache_html(html: String) -> Response {
    let mut response = Html(html).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// A missing file is 404; any other read failure is a server error.
fn read_failure(source: &'static str, err: &io::Error, request_path: &str) -> Response {
    if err.kind() == io::ErrorKind::NotFound {
        HttpError::not_found(source, format!("{request_path} not found")).into_response()
    } else {
        HttpError::from_error(source, StatusCode::INTERNAL_SERVER_ERROR, err).into_response()
    }
}
