//! HTTP surface of one node: session creation and teardown, health, and
//! pool metrics.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use grid::GridError;
use grid::pool::PoolManager;
use grid::session::SessionRegistry;
use grid_protocol::{CreateBrowserRequest, CreateBrowserResponse, NodeHealth, NodeStatus};
use grid_runtime::Supervise;
use serde_json::json;
use tracing::warn;

use crate::gauges;

pub struct AppState<S: Supervise> {
	pub registry: Arc<SessionRegistry<S>>,
	pub pool: Arc<PoolManager<S>>,
}

impl<S: Supervise> Clone for AppState<S> {
	fn clone(&self) -> Self {
		Self {
			registry: Arc::clone(&self.registry),
			pool: Arc::clone(&self.pool),
		}
	}
}

pub fn router<S: Supervise + 'static>(state: AppState<S>) -> Router {
	Router::new()
		.route("/browser", post(create_browser))
		.route("/browser/{session_id}", axum::routing::delete(delete_browser))
		.route("/health", get(health))
		.route("/metrics", get(metrics))
		.with_state(state)
}

async fn create_browser<S: Supervise + 'static>(State(state): State<AppState<S>>, body: Bytes) -> Response {
	// An empty body means the default browser kind.
	let request: CreateBrowserRequest = if body.is_empty() {
		CreateBrowserRequest::default()
	} else {
		match serde_json::from_slice(&body) {
			Ok(request) => request,
			Err(err) => {
				return (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("invalid request body: {err}") }))).into_response();
			}
		}
	};

	match state.registry.create_session(request.browser_type).await {
		Ok(session) => {
			let container = session.container();
			Json(CreateBrowserResponse {
				session_id: session.session_id().to_string(),
				cdp_url: container.cdp_url(),
				ws_endpoint: container.ws_endpoint(),
				port: container.port,
			})
			.into_response()
		}
		Err(err) => ApiError(err).into_response(),
	}
}

async fn delete_browser<S: Supervise + 'static>(
	State(state): State<AppState<S>>,
	Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.registry.end_session(&session_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn health<S: Supervise + 'static>(State(state): State<AppState<S>>) -> Json<NodeHealth> {
	Json(NodeHealth {
		status: NodeStatus::Healthy,
		cpu_usage: gauges::cpu_usage_percent(),
		memory_usage: gauges::memory_usage_percent(),
		active_connections: state.registry.session_count(),
	})
}

async fn metrics<S: Supervise + 'static>(State(state): State<AppState<S>>) -> impl IntoResponse {
	Json(state.pool.metrics())
}

pub struct ApiError(GridError);

impl From<GridError> for ApiError {
	fn from(err: GridError) -> Self {
		Self(err)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = match &self.0 {
			GridError::NotFound { .. } | GridError::ElementNotFound { .. } => StatusCode::NOT_FOUND,
			GridError::CreationFailed(_) | GridError::NoHealthyNodes => StatusCode::SERVICE_UNAVAILABLE,
			GridError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		};
		if status == StatusCode::INTERNAL_SERVER_ERROR {
			warn!(target = "gridd", error = %self.0, "request failed");
		}
		(status, Json(json!({ "error": self.0.to_string() }))).into_response()
	}
}
