// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Daemon error taxonomy.
///
/// Every variant carries a human-readable message; the variant itself is the
/// machine-readable code surfaced to API and bus clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonError {
    /// Malformed ingress; state was not altered.
    Validation(String),
    /// Unknown device or scene.
    NotFound(String),
    /// Transient I/O failure talking to a device.
    Transport(String),
    /// Error raised inside scene `init`/`render`/`cleanup`.
    Scene(String),
    /// State Store flush failed.
    Persistence(String),
    /// Anything else; treated as a 500.
    Internal(String),
}

impl DaemonError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Transport(_) => 502,
            Self::Scene(_) => 500,
            Self::Persistence(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Transport(_) => "TRANSPORT",
            Self::Scene(_) => "SCENE_ERROR",
            Self::Persistence(_) => "PERSISTENCE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m)
            | Self::NotFound(m)
            | Self::Transport(m)
            | Self::Scene(m)
            | Self::Persistence(m)
            | Self::Internal(m) => m,
        }
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody { code: self.code().to_owned(), message: self.message().to_owned() }
    }

    pub fn to_http_response(&self) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body() };
        (status, Json(body))
    }
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for DaemonError {}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
