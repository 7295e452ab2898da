use std::path::PathBuf;

use axum::{
    Router,
    extract::{OriginalUri, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use tracing::error;

use crate::{
    application::{
        context::PresentationContext, error::HttpError, presentation::RenderMode,
    },
    infra::{
        assets::{build_response, serve_from},
        files::{content_type_for, join_within},
    },
};

use super::{no_cache_html, range::range_response, read_failure};

const SOURCE: &str = "infra::http::presentation";

pub(super) fn routes() -> Router<PresentationContext> {
    Router::new()
        .route("/presentation/", get(pane_root))
        .route("/presentation/{*path}", get(pane_path))
}

async fn pane_root(
    State(ctx): State<PresentationContext>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    dispatch(ctx, String::new(), uri.path(), &headers).await
}

async fn pane_path(
    State(ctx): State<PresentationContext>,
    Path(path): Path<String>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    dispatch(ctx, path, uri.path(), &headers).await
}

async fn dispatch(
    ctx: PresentationContext,
    path: String,
    request_path: &str,
    headers: &HeaderMap,
) -> Response {
    let Some(directory) = ctx.state.directory() else {
        return HttpError::not_found(SOURCE, format!("{request_path} not found")).into_response();
    };

    if let Some(mode) = RenderMode::for_pane_path(&path) {
        return render_pane(ctx, directory, mode).await;
    }
    if let Some(rest) = path.strip_prefix("revealjs/") {
        return serve_from(&ctx.assets.revealjs, rest, SOURCE).await;
    }
    if let Some(rest) = path.strip_prefix("mathjax/") {
        return serve_from(&ctx.assets.mathjax, rest, SOURCE).await;
    }

    let Some(target) = join_within(&directory, &path) else {
        return HttpError::not_found(SOURCE, format!("{request_path} not found")).into_response();
    };
    match headers.get(header::RANGE).and_then(|value| value.to_str().ok()) {
        Some(range) => serve_range(ctx, target, range.to_string(), request_path).await,
        None => serve_file(target, request_path).await,
    }
}

async fn render_pane(
    ctx: PresentationContext,
    directory: PathBuf,
    mode: RenderMode,
) -> Response {
    let assembler = ctx.assembler.clone();
    let rendered =
        tokio::task::spawn_blocking(move || assembler.assemble(&directory, mode)).await;

    match rendered {
        Ok(Ok(document)) => no_cache_html(document.html),
        Ok(Err(err)) => err.into_http(SOURCE).into_response(),
        Err(join_error) => {
            error!(
                target = SOURCE,
                op = "presentation::render",
                error = %join_error,
                "Presentation render task failed"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "presentation render task failed",
            )
            .into_response()
        }
    }
}

async fn serve_range(
    ctx: PresentationContext,
    target: PathBuf,
    range: String,
    request_path: &str,
) -> Response {
    let cache = ctx.range_cache.clone();
    match tokio::task::spawn_blocking(move || cache.fetch(&target)).await {
        Ok(Ok(file)) => range_response(file, &range),
        Ok(Err(err)) => read_failure(SOURCE, &err, request_path),
        Err(join_error) => HttpError::new(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("range read task failed: {join_error}"),
        )
        .into_response(),
    }
}

async fn serve_file(target: PathBuf, request_path: &str) -> Response {
    match tokio::fs::read(&target).await {
        Ok(contents) => {
            let mut response = build_response(Bytes::from(contents), &content_type_for(&target));
            response
                .headers_mut()
                .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            response
        }
        Err(err) => read_failure(SOURCE, &err, request_path),
    }
}
