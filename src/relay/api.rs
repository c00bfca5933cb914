use std::sync::Arc;

use axum::{
  Json, Router,
  extract::{DefaultBodyLimit, Path, State, rejection::JsonRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use chrono::Utc;

use crate::{
  automation::{ActionResponse, ContinueRequest, HealthStatus, SessionDetail, SessionList, StartRequest},
  config::DEFAULT_MAX_BODY_BYTES,
  error::CyberpilotError,
};

use super::{diagnostics, orchestrator::Orchestrator};

pub const SERVICE_NAME: &str = "cyberpilot-relay";

#[derive(Clone)]
pub struct ApiState {
  pub orchestrator: Arc<Orchestrator>,
  pub max_body_bytes: usize,
}

impl ApiState {
  pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
    Self {
      orchestrator,
      max_body_bytes: DEFAULT_MAX_BODY_BYTES,
    }
  }

  pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
    self.max_body_bytes = max_body_bytes;
    self
  }
}

#[derive(Debug)]
struct ApiError {
  status: StatusCode,
  message: String,
}

impl ApiError {
  fn bad_request(message: &str) -> Self {
    Self {
      status: StatusCode::BAD_REQUEST,
      message: message.to_string(),
    }
  }
}

impl From<CyberpilotError> for ApiError {
  fn from(err: CyberpilotError) -> Self {
    let status = match &err {
      CyberpilotError::NotFound(_) => StatusCode::NOT_FOUND,
      CyberpilotError::OutOfOrder(_) | CyberpilotError::InvalidState(_) => StatusCode::CONFLICT,
      CyberpilotError::InvalidPayload(_) | CyberpilotError::Base64Error(_) => StatusCode::BAD_REQUEST,
      CyberpilotError::OracleFailure(_) => StatusCode::BAD_GATEWAY,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    Self {
      status,
      message: err.to_string(),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    let status = match rejection.status() {
      StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
      _ => StatusCode::BAD_REQUEST,
    };
    Self {
      status,
      message: rejection.body_text(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    if self.status.is_server_error() {
      tracing::error!(target: "relay", status = %self.status, error = %self.message, "request failed");
    } else {
      tracing::debug!(target: "relay", status = %self.status, error = %self.message, "request rejected");
    }
    (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
  }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: ApiState) -> Router {
  let body_limit = state.max_body_bytes;
  Router::new()
    .route("/", get(get_health))
    .route("/api/v1/start", post(post_start))
    .route("/api/v1/continue", post(post_continue))
    .route("/api/v1/sessions", get(get_sessions))
    .route("/api/v1/session/:session_id", get(get_session).delete(delete_session))
    .route("/internal/diagnostics", get(get_diagnostics))
    .layer(DefaultBodyLimit::max(body_limit))
    .with_state(state)
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthStatus> {
  Json(HealthStatus {
    service: SERVICE_NAME.to_string(),
    status: "running".to_string(),
    model: state.orchestrator.model().to_string(),
    timestamp: Utc::now(),
  })
}

async fn post_start(
  State(state): State<ApiState>,
  payload: std::result::Result<Json<StartRequest>, JsonRejection>,
) -> ApiResult<Json<ActionResponse>> {
  let Json(request) = payload?;
  if request.prompt.trim().is_empty() {
    return Err(ApiError::bad_request("`prompt` must not be empty"));
  }
  if request.screenshot.is_empty() {
    return Err(ApiError::bad_request("`screenshot` must not be empty"));
  }
  let outcome = state
    .orchestrator
    .start_turn(request.prompt, request.screenshot)
    .await?;
  Ok(Json(outcome.into()))
}

async fn post_continue(
  State(state): State<ApiState>,
  payload: std::result::Result<Json<ContinueRequest>, JsonRejection>,
) -> ApiResult<Json<ActionResponse>> {
  let Json(request) = payload?;
  if request.screenshot.is_empty() {
    return Err(ApiError::bad_request("`screenshot` must not be empty"));
  }
  let outcome = state
    .orchestrator
    .continue_turn(
      &request.session_id,
      request.function_results,
      request.screenshot,
      request.current_url,
    )
    .await?;
  Ok(Json(outcome.into()))
}

async fn get_sessions(State(state): State<ApiState>) -> Json<SessionList> {
  Json(state.orchestrator.list_sessions().await)
}

async fn get_session(
  State(state): State<ApiState>,
  Path(session_id): Path<String>,
) -> ApiResult<Json<SessionDetail>> {
  Ok(Json(state.orchestrator.session_detail(&session_id).await?))
}

async fn delete_session(
  State(state): State<ApiState>,
  Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
  state.orchestrator.delete_session(&session_id).await?;
  Ok(Json(serde_json::json!({
    "status": "deleted",
    "session_id": session_id,
  })))
}

async fn get_diagnostics(State(state): State<ApiState>) -> Json<serde_json::Value> {
  let sessions = state.orchestrator.list_sessions().await.total_sessions;
  Json(diagnostics::collect(sessions))
}
