use anyhow::Error as AnyError;
use bytes::Bytes;
use serde_json::json;
use thiserror::Error;

use crate::http::{header::CONTENT_TYPE, HeaderValue, Response, StatusCode};
use crate::response::{response_with_body, IntoResponse};

/// Fatal error raised while wiring the pipeline at startup.
///
/// None of these are recoverable: the pipeline is never built and no phase
/// handler runs. They surface to the operator exactly once.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("variable `{name}` is already registered")]
    DuplicateVariable { name: String },
    #[error("variable table is full ({capacity} slots), cannot register `{name}`")]
    TableFull { name: String, capacity: usize },
    #[error("no variable named `{name}` is registered")]
    UnknownVariable { name: String },
}

impl StartupError {
    pub fn duplicate_variable(name: impl Into<String>) -> Self {
        StartupError::DuplicateVariable { name: name.into() }
    }

    pub fn table_full(name: impl Into<String>, capacity: usize) -> Self {
        StartupError::TableFull {
            name: name.into(),
            capacity,
        }
    }

    pub fn unknown_variable(name: impl Into<String>) -> Self {
        StartupError::UnknownVariable { name: name.into() }
    }

    /// Name of the variable the failed operation referred to.
    pub fn variable(&self) -> &str {
        match self {
            StartupError::DuplicateVariable { name }
            | StartupError::TableFull { name, .. }
            | StartupError::UnknownVariable { name } => name,
        }
    }
}

/// Per-request error raised by a phase handler.
///
/// A `Rejected` carries the status the handler denied the request with;
/// everything else collapses into `Internal` and answers that one request
/// with a 500. Other requests are unaffected.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("request rejected with status {status}")]
    Rejected { status: StatusCode },
    #[error("internal error: {source}")]
    Internal {
        #[from]
        source: AnyError,
    },
}

impl PhaseError {
    pub fn rejected(status: StatusCode) -> Self {
        PhaseError::Rejected { status }
    }

    pub fn internal<E>(error: E) -> Self
    where
        E: Into<AnyError>,
    {
        PhaseError::Internal {
            source: error.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PhaseError::Rejected { status } => *status,
            PhaseError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            PhaseError::Rejected { status } => format!("request rejected with status {status}"),
            PhaseError::Internal { source } => format!("internal error: {}", source),
        }
    }

    pub fn source_error(&self) -> Option<&AnyError> {
        match self {
            PhaseError::Internal { source } => Some(source),
            _ => None,
        }
    }
}

impl IntoResponse for PhaseError {
    fn into_response(self) -> Response {
        let payload = json!({
            "error": {
                "status": self.status().as_u16(),
                "message": self.message(),
            }
        });

        let body = serde_json::to_vec(&payload)
            .map(Bytes::from)
            .unwrap_or_else(|_| Bytes::from_static(b"internal error"));
        let mut response = response_with_body(self.status(), body);
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}
