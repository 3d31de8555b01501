//! Local HTTP control API.
//!
//! Every request except `OPTIONS` must carry the configured API key in the
//! `x-api-key` header. Preflights are answered before authentication and
//! never reach a handler.

use std::{any::Any, future::Future, net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{
        Query, Request, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::ServerConfig,
    plane::ControlPlane,
    protocol::{
        API_KEY_HEADER, ApiError, ExecuteRequest, ExecuteResponse, TrafficQuery, TrafficResponse,
        WorkspacesResponse,
    },
};

/// Default number of records returned by `/traffic`.
const DEFAULT_TRAFFIC_LIMIT: usize = 100;

/// Server error.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("API key is not configured; refusing to start")]
    MissingApiKey,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
struct AppState {
    plane: Arc<ControlPlane>,
    api_key: Arc<str>,
}

/// Build the API router over a control plane.
pub fn build_router(plane: Arc<ControlPlane>, api_key: &str) -> Router {
    let state = AppState {
        plane,
        api_key: Arc::from(api_key),
    };

    Router::new()
        .route("/workspaces", get(list_workspaces).fallback(not_found))
        .route("/execute", post(execute).fallback(not_found))
        .route("/traffic", get(traffic).fallback(not_found))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(answer_preflight))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A bound, not yet running, control API server.
pub struct ControlServer {
    listener: TcpListener,
    app: Router,
}

impl ControlServer {
    /// Bind the listener.
    ///
    /// # Errors
    /// Returns error if no API key is configured or the address cannot be
    /// bound.
    pub async fn bind(config: &ServerConfig, plane: Arc<ControlPlane>) -> Result<Self, ServerError> {
        if !config.has_api_key() {
            return Err(ServerError::MissingApiKey);
        }
        let listener = TcpListener::bind(config.bind_addr()).await?;
        let app = build_router(plane, config.api_key.trim());
        Ok(Self { listener, app })
    }

    /// Address actually bound. Useful with port 0.
    ///
    /// # Errors
    /// Returns error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process exits.
    ///
    /// # Errors
    /// Returns error if the server fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `signal` resolves, then drain in-flight requests.
    ///
    /// # Errors
    /// Returns error if the server fails.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!("Control API listening on http://{addr}");
        }
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(signal)
            .await?;
        tracing::info!("Control API stopped");
        Ok(())
    }
}

async fn answer_preflight(request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, POST, OPTIONS"),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("content-type, x-api-key"),
            ),
        ],
    )
        .into_response()
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if presented == Some(state.api_key.as_ref()) {
        next.run(request).await
    } else {
        tracing::warn!(path = %request.uri().path(), "rejected request without valid API key");
        ApiError::Unauthorized.into_response()
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| (*s).to_string()))
        .unwrap_or_else(|| "internal error".to_string());
    ApiError::Internal(message).into_response()
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}

async fn list_workspaces(
    State(state): State<AppState>,
) -> Result<Json<WorkspacesResponse>, ApiError> {
    let workspaces = state
        .plane
        .workspaces()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(WorkspacesResponse {
        success: true,
        workspaces,
    }))
}

async fn execute(
    State(state): State<AppState>,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::Validation(e.body_text()))?;
    let timeout = request.total_timeout();

    let context_id = request
        .context_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("contextId is required".to_string()))?;
    let steps = request
        .steps
        .filter(|steps| !steps.is_empty())
        .ok_or_else(|| ApiError::Validation("steps must be a non-empty array".to_string()))?;

    let results = state.plane.execute(&context_id, &steps, timeout).await?;

    Ok(Json(ExecuteResponse {
        success: true,
        results,
    }))
}

async fn traffic(
    State(state): State<AppState>,
    query: Result<Query<TrafficQuery>, QueryRejection>,
) -> Result<Json<TrafficResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;

    let context_id = query
        .context_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("contextId is required".to_string()))?;
    let since = query
        .since
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(0);
    let limit = query
        .limit
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_TRAFFIC_LIMIT);

    let traffic = state
        .plane
        .traffic(&context_id, since, limit)
        .ok_or_else(|| ApiError::Unavailable("Traffic capture is not enabled".to_string()))?;

    Ok(Json(TrafficResponse {
        success: true,
        traffic,
    }))
}
