use std::path::PathBuf;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use serde::Deserialize;

use crate::{
    application::{
        context::PresentationContext,
        error::HttpError,
        help::HelpContent,
    },
    infra::{
        assets::build_response,
        files::{content_type_for, resolve_aliased_path},
    },
};

use super::{no_cache_html, read_failure};

const SOURCE: &str = "infra::http::help";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HelpQuery {
    file: Option<String>,
}

pub(super) fn routes() -> Router<PresentationContext> {
    Router::new()
        .route("/help/presentation/", get(help_root))
        .route("/help/presentation/{*path}", get(help_path))
}

async fn help_root(
    State(ctx): State<PresentationContext>,
    Query(query): Query<HelpQuery>,
) -> Response {
    dispatch(ctx, query, String::new()).await
}

async fn help_path(
    State(ctx): State<PresentationContext>,
    Path(path): Path<String>,
    Query(query): Query<HelpQuery>,
) -> Response {
    dispatch(ctx, query, path).await
}

async fn dispatch(ctx: PresentationContext, query: HelpQuery, path: String) -> Response {
    let help = ctx.help.clone();
    let outcome = tokio::task::spawn_blocking(move || match query.file.filter(|f| !f.is_empty()) {
        Some(file) => help.open(&resolve_aliased_path(&file)),
        None => help.resolve_relative(&path).map(HelpContent::File),
    })
    .await;

    match outcome {
        Ok(Ok(HelpContent::Document(html))) => no_cache_html(html),
        Ok(Ok(HelpContent::File(target))) => serve_file(target).await,
        Ok(Err(err)) => err.into_http(SOURCE).into_response(),
        Err(join_error) => HttpError::new(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("help task failed: {join_error}"),
        )
        .into_response(),
    }
}

async fn serve_file(target: PathBuf) -> Response {
    match tokio::fs::read(&target).await {
        Ok(contents) => build_response(Bytes::from(contents), &content_type_for(&target)),
        Err(err) => read_failure(SOURCE, &err, &target.display().to_string()),
    }
}
