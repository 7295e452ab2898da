//! Serving presentation assets (reveal.js, MathJax) from directories on disk.

use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use crate::application::error::ErrorReport;

use super::files::{content_type_for, join_within};

/// Directories backing the `revealjs/` and `mathjax/` URL prefixes.
#[derive(Debug, Clone)]
pub struct AssetRoots {
    pub revealjs: PathBuf,
    pub mathjax: PathBuf,
}

impl AssetRoots {
    /// `mathjax/<p>` requests resolve against the parent of the configured
    /// MathJax installation directory.
    pub fn new(resources_dir: &Path, mathjax_path: &Path) -> Self {
        let mathjax_base = mathjax_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| resources_dir.to_path_buf());
        Self {
            revealjs: resources_dir.join("presentation").join("revealjs"),
            mathjax: mathjax_base.join("mathjax"),
        }
    }
}

/// Serve `relative` from `root`, answering 404 for anything that cannot be
/// resolved to a readable file inside it.
pub async fn serve_from(root: &Path, relative: &str, source: &'static str) -> Response {
    let Some(path) = resolve_asset(root, relative) else {
        return not_found_response(source);
    };

    match tokio::fs::read(&path).await {
        Ok(contents) => build_response(Bytes::from(contents), &content_type_for(&path)),
        Err(_) => not_found_response(source),
    }
}

fn resolve_asset(root: &Path, relative: &str) -> Option<PathBuf> {
    let candidate = relative.trim_start_matches('/');
    if candidate.is_empty() || candidate.ends_with('/') || candidate.contains("..") {
        return None;
    }
    join_within(root, candidate)
}

fn not_found_response(source: &'static str) -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(source, StatusCode::NOT_FOUND, "Asset not found")
        .attach(&mut response);
    response
}

pub(crate) fn build_response(bytes: Bytes, content_type: &str) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }

    response
}
