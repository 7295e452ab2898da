//! JSON RPC endpoints for the host: source builds and account management.

use std::path::PathBuf;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};

use crate::{
    application::{
        accounts::AccountError, build::BuildOptions, context::PresentationContext,
        error::HttpError,
    },
    infra::files::resolve_aliased_path,
};

const SOURCE: &str = "infra::http::rpc";

#[derive(Debug, Deserialize)]
struct SourceBuildParams {
    file: String,
    #[serde(default)]
    from_code: bool,
    #[serde(default)]
    show_output: bool,
}

#[derive(Debug, Serialize)]
struct SourceBuildResult {
    succeeded: bool,
}

#[derive(Debug, Deserialize)]
struct AccountParams {
    name: String,
}

#[derive(Debug, Serialize)]
struct AccountList {
    accounts: Vec<String>,
}

pub(super) fn routes() -> Router<PresentationContext> {
    Router::new()
        .route("/rpc/source_build", post(source_build))
        .route("/rpc/get_account_list", post(get_account_list))
        .route("/rpc/add_account", post(add_account))
        .route("/rpc/remove_account", post(remove_account))
}

async fn source_build(
    State(ctx): State<PresentationContext>,
    Json(params): Json<SourceBuildParams>,
) -> Response {
    let builds = ctx.builds.clone();
    let source: PathBuf = resolve_aliased_path(&params.file);
    let options = BuildOptions {
        from_code: params.from_code,
        show_output: params.show_output,
    };

    match tokio::task::spawn_blocking(move || builds.build(&source, options)).await {
        Ok(Ok(succeeded)) => Json(SourceBuildResult { succeeded }).into_response(),
        Ok(Err(err)) => {
            HttpError::from_error(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, &err).into_response()
        }
        Err(join_error) => HttpError::new(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("build task failed: {join_error}"),
        )
        .into_response(),
    }
}

async fn get_account_list(State(ctx): State<PresentationContext>) -> Json<AccountList> {
    Json(AccountList {
        accounts: ctx.accounts.list().await,
    })
}

async fn add_account(
    State(ctx): State<PresentationContext>,
    Json(params): Json<AccountParams>,
) -> Response {
    account_response(ctx.accounts.add(&params.name).await)
}

async fn remove_account(
    State(ctx): State<PresentationContext>,
    Json(params): Json<AccountParams>,
) -> Response {
    account_response(ctx.accounts.remove(&params.name).await)
}

fn account_response(result: Result<(), AccountError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let status = match err {
                AccountError::Duplicate(_) => StatusCode::CONFLICT,
                AccountError::NotFound(_) => StatusCode::NOT_FOUND,
                AccountError::EmptyName => StatusCode::BAD_REQUEST,
            };
            HttpError::from_error(SOURCE, status, &err).into_response()
        }
    }
}
