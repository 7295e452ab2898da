use std::{error::Error as StdError, io};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{knit::BuildError, render::RenderError},
    config::LoadError,
    domain::slides::ParseError,
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }

        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Error response whose body is the given message as plain text.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    body: String,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(source: &'static str, status: StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        let report = ErrorReport::from_message(source, status, body.clone());
        Self {
            status,
            body,
            report,
        }
    }

    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            body: error.to_string(),
            report,
        }
    }

    pub fn not_found(source: &'static str, body: impl Into<String>) -> Self {
        Self::new(source, StatusCode::NOT_FOUND, body)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        self.report.attach(&mut response);
        response
    }
}

/// Failure while producing a presentation or help document.
#[derive(Debug, Error)]
pub enum PresentationError {
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PresentationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PresentationError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert into an HTTP error whose body carries the message verbatim.
    pub fn into_http(self, source: &'static str) -> HttpError {
        HttpError::from_error(source, self.status_code(), &self)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Presentation(#[from] PresentationError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
