//! Wire protocol for the control API.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hive_control_core::{ContextDescriptor, TrafficRecord};
use hive_control_executor::{DEFAULT_TOTAL_TIMEOUT, ExecutorError, StepResult, StepSpec};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Header carrying the raw API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Body of `POST /execute`.
///
/// Everything is optional here so missing fields produce a validation
/// message instead of a deserializer error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default, deserialize_with = "lenient_id")]
    pub context_id: Option<String>,
    #[serde(default)]
    pub steps: Option<Vec<StepSpec>>,
    /// Total budget in milliseconds. Kept raw; see [`Self::total_timeout`].
    #[serde(default)]
    pub timeout: Option<Value>,
}

impl ExecuteRequest {
    /// Total budget for the request. A missing, negative or unparsable
    /// value falls back to [`DEFAULT_TOTAL_TIMEOUT`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn total_timeout(&self) -> Duration {
        let millis = match &self.timeout {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match millis {
            Some(ms) if ms.is_finite() && ms >= 0.0 => Duration::from_millis(ms as u64),
            _ => DEFAULT_TOTAL_TIMEOUT,
        }
    }
}

/// Context ids are strings, but callers often send numeric ids.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Query of `GET /traffic`. Numbers are parsed leniently by the handler.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficQuery {
    pub context_id: Option<String>,
    pub since: Option<String>,
    pub limit: Option<String>,
}

/// A declared context annotated with its live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEntry {
    pub id: String,
    pub url: String,
    pub title: String,
    /// Whether scripts can currently be executed in this context.
    pub is_accessible: bool,
}

impl WorkspaceEntry {
    /// Annotate a directory entry.
    #[must_use]
    pub fn new(descriptor: ContextDescriptor, is_accessible: bool) -> Self {
        Self {
            id: descriptor.id,
            url: descriptor.url,
            title: descriptor.title,
            is_accessible,
        }
    }
}

/// Body of `GET /workspaces`.
#[derive(Debug, Serialize)]
pub struct WorkspacesResponse {
    pub success: bool,
    pub workspaces: Vec<WorkspaceEntry>,
}

/// Body of `POST /execute`.
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub results: Vec<StepResult>,
}

/// Body of `GET /traffic`.
#[derive(Debug, Serialize)]
pub struct TrafficResponse {
    pub success: bool,
    pub traffic: Vec<TrafficRecord>,
}

/// Error body shared by every failure.
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

/// API error, mapped to a status code and a JSON error body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: invalid or missing API key")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ExecutorError> for ApiError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::ContextNotFound(_) => Self::NotFound(err.to_string()),
            ExecutorError::InvalidRequest(msg) => Self::Validation(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
