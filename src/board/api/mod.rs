mod auth;
mod members;
mod projects;
mod tasks;
mod workspaces;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    extract::{FromRequest, FromRequestParts},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use tokio::sync::broadcast;
use tracing::error;

use super::auth::AuthSettings;
use super::db::DbHandle;
use super::ws::BoardEvent;
use crate::errors::BoardError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<BoardEvent>,
    pub auth: AuthSettings,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(db: DbHandle, auth: AuthSettings) -> Self {
        let (ws_tx, _) = broadcast::channel(256);
        Self { db, ws_tx, auth }
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        let msg = err.to_string();
        match err {
            BoardError::Unauthenticated | BoardError::InvalidCredentials => {
                ApiError::Unauthorized(msg)
            }
            BoardError::Forbidden(_) => ApiError::Forbidden(msg),
            BoardError::WorkspaceNotFound { .. }
            | BoardError::ProjectNotFound { .. }
            | BoardError::TaskNotFound { .. }
            | BoardError::MemberNotFound { .. } => ApiError::NotFound(msg),
            BoardError::Validation(_)
            | BoardError::AlreadyMember
            | BoardError::InvalidInviteCode
            | BoardError::Reorder(_) => ApiError::BadRequest(msg),
            BoardError::EmailTaken { .. } | BoardError::LastMember | BoardError::LastAdmin => {
                ApiError::Conflict(msg)
            }
            BoardError::LockPoisoned => {
                error!(error = %msg, "Request failed");
                ApiError::Internal("Internal server error".to_string())
            }
            BoardError::Other(inner) => ApiError::from(inner),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<BoardError>() {
            Ok(board_err) => ApiError::from(board_err),
            Err(err) => {
                error!(error = %format!("{:#}", err), "Request failed");
                ApiError::Internal("Internal server error".to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

// ── Extractors ────────────────────────────────────────────────────────
//
// Thin wrappers over axum's extractors so malformed input is reported as a
// 400 with the usual `{"error": ...}` body.

/// JSON request body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

/// Trimmed, non-empty display name.
pub(crate) fn required_name(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BoardError::validation(format!("{} is required", field)).into());
    }
    Ok(value.to_string())
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/current", get(auth::current))
        .route(
            "/api/workspaces",
            get(workspaces::list_workspaces).post(workspaces::create_workspace),
        )
        .route(
            "/api/workspaces/{id}",
            get(workspaces::get_workspace)
                .patch(workspaces::update_workspace)
                .delete(workspaces::delete_workspace),
        )
        .route("/api/workspaces/{id}/info", get(workspaces::get_workspace_info))
        .route(
            "/api/workspaces/{id}/reset-invite-code",
            post(workspaces::reset_invite_code),
        )
        .route("/api/workspaces/{id}/join", post(workspaces::join_workspace))
        .route(
            "/api/workspaces/{id}/analytics",
            get(workspaces::workspace_analytics),
        )
        .route("/api/workspaces/{id}/board", get(workspaces::get_board))
        .route("/api/members", get(members::list_members))
        .route(
            "/api/members/{id}",
            patch(members::update_member).delete(members::delete_member),
        )
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/api/projects/{id}/analytics", get(projects::project_analytics))
        .route("/api/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/api/tasks/bulk-update", post(tasks::bulk_update))
        .route("/api/tasks/move", post(tasks::move_task))
        .route(
            "/api/tasks/{id}",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "ok"
}
