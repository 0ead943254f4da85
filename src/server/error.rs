//! Mapping of errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::TreeError;
use crate::Error;

/// An error as answered to API clients.
///
/// Internal errors are logged and masked; everything else carries a
/// fixed, client facing message.
#[derive(Debug)]
pub enum ApiError {
    Internal(Error),
    UnsafePath,
    UnknownSource(String),
    SourceNotReady(String),
    NoSuchNode,
    NoSuchAsset,
    NotFound,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UnsafePath => StatusCode::BAD_REQUEST,
            Self::SourceNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnknownSource(_) | Self::NoSuchNode | Self::NoSuchAsset | Self::NotFound => {
                StatusCode::NOT_FOUND
            }
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Internal(_) => "Techniker ist informiert".to_string(),
            Self::UnsafePath => "Directory traversal attempt detected!".to_string(),
            Self::UnknownSource(name) => format!("No such source: {name}"),
            Self::SourceNotReady(name) => format!("Source {name} is not ready yet"),
            Self::NoSuchNode => "No such node".to_string(),
            Self::NoSuchAsset => "No such asset".to_string(),
            Self::NotFound => "Not found".to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Tree(TreeError::UnsafePath(path)) => {
                tracing::debug!(%path, "Rejected unsafe path");
                Self::UnsafePath
            }
            Error::SourceIncomplete(name) => Self::SourceNotReady(name),
            Error::NotFound(_) => Self::NotFound,
            other => Self::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(e) => tracing::error!(error = %e, "Error (masked) while responding"),
            Self::UnsafePath => tracing::warn!("Directory traversal attempt"),
            _ => {}
        }
        let body = ErrorBody {
            error: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
