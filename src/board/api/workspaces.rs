use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::{ApiError, JsonBody, PathParam, QueryParams, SharedState, required_name};
use crate::board::analytics::{AnalyticsScope, compute_analytics};
use crate::board::auth::CurrentUser;
use crate::board::db::ImageInput;
use crate::board::models::WorkspaceInfo;
use crate::board::ws::{WsMessage, broadcast_message};

#[derive(Deserialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
    pub image: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateWorkspaceRequest {
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Deserialize)]
pub struct JoinWorkspaceRequest {
    pub code: String,
}

#[derive(Deserialize)]
pub struct BoardQuery {
    pub project_id: Option<i64>,
}

pub(super) async fn list_workspaces(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let workspaces = state
        .db
        .call(move |db| db.list_workspaces_for_user(user.id))
        .await?;
    Ok(Json(workspaces))
}

pub(super) async fn create_workspace(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<CreateWorkspaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = required_name("name", &req.name)?;
    let image = ImageInput::from_field(req.image)?;
    let workspace = state
        .db
        .call(move |db| db.create_workspace(user.id, &name, image))
        .await?;
    info!(workspace_id = workspace.id, user_id = user.id, "Workspace created");
    Ok((StatusCode::CREATED, Json(workspace)))
}

pub(super) async fn get_workspace(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state
        .db
        .call(move |db| {
            let workspace = db.require_workspace(id)?;
            db.require_member(id, user.id)?;
            Ok(workspace)
        })
        .await?;
    Ok(Json(workspace))
}

/// Public summary shown on the join page; any signed-in user may read it.
pub(super) async fn get_workspace_info(
    State(state): State<SharedState>,
    CurrentUser(_user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state.db.call(move |db| db.require_workspace(id)).await?;
    Ok(Json(WorkspaceInfo::from(workspace)))
}

pub(super) async fn update_workspace(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
    JsonBody(req): JsonBody<UpdateWorkspaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req
        .name
        .as_deref()
        .map(|n| required_name("name", n))
        .transpose()?;
    let image = ImageInput::from_field(req.image)?;
    let workspace = state
        .db
        .call(move |db| {
            db.require_workspace(id)?;
            db.require_admin(id, user.id)?;
            db.update_workspace(id, name.as_deref(), image)
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        id,
        &WsMessage::WorkspaceUpdated {
            workspace: workspace.clone(),
        },
    );
    Ok(Json(workspace))
}

pub(super) async fn delete_workspace(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .call(move |db| {
            db.require_workspace(id)?;
            db.require_admin(id, user.id)?;
            db.delete_workspace(id)
        })
        .await?;
    info!(workspace_id = id, user_id = user.id, "Workspace deleted");
    broadcast_message(&state.ws_tx, id, &WsMessage::WorkspaceDeleted { id });
    Ok(Json(serde_json::json!({"id": id})))
}

pub(super) async fn reset_invite_code(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state
        .db
        .call(move |db| {
            db.require_workspace(id)?;
            db.require_admin(id, user.id)?;
            db.reset_invite_code(id)
        })
        .await?;
    info!(workspace_id = id, "Invite code reset");
    Ok(Json(workspace))
}

pub(super) async fn join_workspace(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
    JsonBody(req): JsonBody<JoinWorkspaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (workspace, member) = state
        .db
        .call(move |db| {
            let member = db.join_workspace(id, user.id, &req.code)?;
            Ok((db.require_workspace(id)?, member))
        })
        .await?;
    info!(workspace_id = id, user_id = user.id, "Member joined");
    broadcast_message(&state.ws_tx, id, &WsMessage::MemberJoined { member });
    Ok(Json(workspace))
}

pub(super) async fn workspace_analytics(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now().naive_utc();
    let analytics = state
        .db
        .call(move |db| {
            db.require_workspace(id)?;
            let member = db.require_member(id, user.id)?;
            compute_analytics(db, AnalyticsScope::Workspace(id), member.id, now)
        })
        .await?;
    Ok(Json(analytics))
}

pub(super) async fn get_board(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
    QueryParams(query): QueryParams<BoardQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let board = state
        .db
        .call(move |db| {
            db.require_workspace(id)?;
            db.require_member(id, user.id)?;
            db.get_board(id, query.project_id)
        })
        .await?;
    Ok(Json(board))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_list_workspaces() {
        let app = TestApp::new();
        let token = app.sign_up("Ada", "ada@example.com").await;
        let first = app.workspace(&token, "Acme").await;
        let second = app.workspace(&token, "Beta").await;
        assert_eq!(first["invite_code"].as_str().unwrap().len(), 7);

        let (status, body) = app.request("GET", "/api/workspaces", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<i64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![second["id"].as_i64().unwrap(), first["id"].as_i64().unwrap()]);

        let other = app.sign_up("Bo", "bo@example.com").await;
        let (_, body) = app.request("GET", "/api/workspaces", Some(&other), None).await;
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_workspace_requires_name_and_session() {
        let app = TestApp::new();
        let (status, _) = app
            .request("POST", "/api/workspaces", None, Some(json!({"name": "Acme"})))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = app.sign_up("Ada", "ada@example.com").await;
        let (status, _) = app
            .request("POST", "/api/workspaces", Some(&token), Some(json!({"name": " "})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_workspace_is_members_only_but_info_is_not() {
        let app = TestApp::new();
        let owner = app.sign_up("Ada", "ada@example.com").await;
        let workspace = app.workspace(&owner, "Acme").await;
        let stranger = app.sign_up("Bo", "bo@example.com").await;
        let uri = format!("/api/workspaces/{}", workspace["id"]);

        let (status, _) = app.request("GET", &uri, Some(&stranger), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .request("GET", &format!("{uri}/info"), Some(&stranger), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Acme");
        assert!(body.get("invite_code").is_none());

        let (status, _) = app.request("GET", "/api/workspaces/999", Some(&owner), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_and_reset_require_admin() {
        let app = TestApp::new();
        let owner = app.sign_up("Ada", "ada@example.com").await;
        let workspace = app.workspace(&owner, "Acme").await;
        let (member, _) = app.member(&workspace, "Bo", "bo@example.com").await;
        let uri = format!("/api/workspaces/{}", workspace["id"]);

        let (status, _) = app
            .request("PATCH", &uri, Some(&member), Some(json!({"name": "Nope"})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .request(
                "PATCH",
                &uri,
                Some(&owner),
                Some(json!({"name": "Renamed", "image": "data:image/png;base64,AAAA"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Renamed");
        assert!(body["image_id"].is_i64());

        let (status, _) = app
            .request("POST", &format!("{uri}/reset-invite-code"), Some(&member), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = app
            .request("POST", &format!("{uri}/reset-invite-code"), Some(&owner), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(body["invite_code"], workspace["invite_code"]);
    }

    #[tokio::test]
    async fn test_join_workspace_errors() {
        let app = TestApp::new();
        let owner = app.sign_up("Ada", "ada@example.com").await;
        let workspace = app.workspace(&owner, "Acme").await;
        let joiner = app.sign_up("Bo", "bo@example.com").await;
        let uri = format!("/api/workspaces/{}/join", workspace["id"]);

        let (status, _) = app
            .request("POST", &uri, Some(&joiner), Some(json!({"code": "bad"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .request(
                "POST",
                &uri,
                Some(&joiner),
                Some(json!({"code": workspace["invite_code"]})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], workspace["id"]);

        let (status, body) = app
            .request(
                "POST",
                &uri,
                Some(&joiner),
                Some(json!({"code": workspace["invite_code"]})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Already a member"));
    }

    #[tokio::test]
    async fn test_delete_workspace() {
        let app = TestApp::new();
        let owner = app.sign_up("Ada", "ada@example.com").await;
        let workspace = app.workspace(&owner, "Acme").await;
        app.project(&owner, workspace["id"].as_i64().unwrap(), "Site").await;
        let uri = format!("/api/workspaces/{}", workspace["id"]);

        let (status, body) = app.request("DELETE", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], workspace["id"]);

        let (status, _) = app.request("GET", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_workspace_analytics_and_board() {
        let app = TestApp::new();
        let owner = app.sign_up("Ada", "ada@example.com").await;
        let workspace = app.workspace(&owner, "Acme").await;
        let uri = format!("/api/workspaces/{}", workspace["id"]);

        let (status, body) = app
            .request("GET", &format!("{uri}/analytics"), Some(&owner), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task_count"], 0);
        assert_eq!(body["overdue_task_diff"], 0);

        let (status, body) = app
            .request("GET", &format!("{uri}/board"), Some(&owner), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let statuses: Vec<&str> = body["columns"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["status"].as_str().unwrap())
            .collect();
        assert_eq!(statuses, vec!["BACKLOG", "TODO", "IN_PROGRESS", "IN_REVIEW", "DONE"]);
    }
}
