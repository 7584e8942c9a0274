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
use crate::board::ws::{WsMessage, broadcast_message};

#[derive(Deserialize)]
pub struct ProjectsQuery {
    pub workspace_id: i64,
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub workspace_id: i64,
    pub image: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub image: Option<String>,
}

pub(super) async fn list_projects(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    QueryParams(query): QueryParams<ProjectsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace_id = query.workspace_id;
    let projects = state
        .db
        .call(move |db| {
            db.require_workspace(workspace_id)?;
            db.require_member(workspace_id, user.id)?;
            db.list_projects(workspace_id)
        })
        .await?;
    Ok(Json(projects))
}

pub(super) async fn get_project(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .db
        .call(move |db| {
            let project = db.require_project(id)?;
            db.require_member(project.workspace_id, user.id)?;
            Ok(project)
        })
        .await?;
    Ok(Json(project))
}

pub(super) async fn create_project(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = required_name("name", &req.name)?;
    let image = ImageInput::from_field(req.image)?;
    let workspace_id = req.workspace_id;
    let project = state
        .db
        .call(move |db| {
            db.require_workspace(workspace_id)?;
            db.require_member(workspace_id, user.id)?;
            db.create_project(workspace_id, &name, image)
        })
        .await?;
    info!(project_id = project.id, workspace_id, "Project created");
    broadcast_message(
        &state.ws_tx,
        workspace_id,
        &WsMessage::ProjectCreated {
            project: project.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(project)))
}

pub(super) async fn update_project(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
    JsonBody(req): JsonBody<UpdateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req
        .name
        .as_deref()
        .map(|n| required_name("name", n))
        .transpose()?;
    let image = ImageInput::from_field(req.image)?;
    let project = state
        .db
        .call(move |db| {
            let project = db.require_project(id)?;
            db.require_member(project.workspace_id, user.id)?;
            db.update_project(id, name.as_deref(), image)
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        project.workspace_id,
        &WsMessage::ProjectUpdated {
            project: project.clone(),
        },
    );
    Ok(Json(project))
}

pub(super) async fn delete_project(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .db
        .call(move |db| {
            let project = db.require_project(id)?;
            db.require_member(project.workspace_id, user.id)?;
            db.delete_project(id)
        })
        .await?;
    info!(project_id = id, workspace_id = project.workspace_id, "Project deleted");
    broadcast_message(
        &state.ws_tx,
        project.workspace_id,
        &WsMessage::ProjectDeleted { id },
    );
    Ok(Json(
        serde_json::json!({"id": id, "workspace_id": project.workspace_id}),
    ))
}

pub(super) async fn project_analytics(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now().naive_utc();
    let analytics = state
        .db
        .call(move |db| {
            let project = db.require_project(id)?;
            let member = db.require_member(project.workspace_id, user.id)?;
            compute_analytics(db, AnalyticsScope::Project(id), member.id, now)
        })
        .await?;
    Ok(Json(analytics))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_project_crud() {
        let app = TestApp::new();
        let owner = app.sign_up("Ada", "ada@example.com").await;
        let workspace = app.workspace(&owner, "Acme").await;
        let ws_id = workspace["id"].as_i64().unwrap();
        let project = app.project(&owner, ws_id, "Website").await;
        let uri = format!("/api/projects/{}", project["id"]);

        let (status, body) = app
            .request("GET", &format!("/api/projects?workspace_id={ws_id}"), Some(&owner), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = app
            .request("PATCH", &uri, Some(&owner), Some(json!({"name": "Site v2"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Site v2");

        let (status, body) = app.request("DELETE", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], project["id"]);
        assert_eq!(body["workspace_id"], ws_id);

        let (status, _) = app.request("GET", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_projects_are_members_only() {
        let app = TestApp::new();
        let owner = app.sign_up("Ada", "ada@example.com").await;
        let workspace = app.workspace(&owner, "Acme").await;
        let ws_id = workspace["id"].as_i64().unwrap();
        let project = app.project(&owner, ws_id, "Website").await;
        let stranger = app.sign_up("Bo", "bo@example.com").await;

        let (status, _) = app
            .request(
                "POST",
                "/api/projects",
                Some(&stranger),
                Some(json!({"name": "Sneaky", "workspace_id": ws_id})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .request("GET", &format!("/api/projects/{}", project["id"]), Some(&stranger), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .request(
                "GET",
                &format!("/api/projects/{}/analytics", project["id"]),
                Some(&stranger),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_project_analytics_counts_tasks() {
        let app = TestApp::new();
        let owner = app.sign_up("Ada", "ada@example.com").await;
        let workspace = app.workspace(&owner, "Acme").await;
        let ws_id = workspace["id"].as_i64().unwrap();
        let project = app.project(&owner, ws_id, "Website").await;
        let (_, members) = app
            .request("GET", &format!("/api/members?workspace_id={ws_id}"), Some(&owner), None)
            .await;
        let (status, _) = app
            .request(
                "POST",
                "/api/tasks",
                Some(&owner),
                Some(json!({
                    "name": "Ship",
                    "status": "DONE",
                    "workspace_id": ws_id,
                    "project_id": project["id"],
                    "assignee_id": members[0]["id"],
                    "due_date": "2099-01-01"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app
            .request(
                "GET",
                &format!("/api/projects/{}/analytics", project["id"]),
                Some(&owner),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task_count"], 1);
        assert_eq!(body["assigned_task_count"], 1);
        assert_eq!(body["completed_task_count"], 1);
        assert_eq!(body["incomplete_task_count"], 0);
    }
}
