use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, JsonBody, PathParam, QueryParams, SharedState, required_name};
use crate::board::auth::CurrentUser;
use crate::board::models::*;
use crate::board::ws::{WsMessage, broadcast_message};
use crate::errors::BoardError;

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    pub status: TaskStatus,
    pub workspace_id: i64,
    pub project_id: i64,
    pub due_date: String,
    pub assignee_id: i64,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateTaskRequest {
    pub name: Option<String>,
    pub status: Option<TaskStatus>,
    pub project_id: Option<i64>,
    /// `null` unassigns the task.
    #[serde(default, deserialize_with = "present")]
    pub assignee_id: Option<Option<i64>>,
    pub due_date: Option<String>,
    /// `null` clears the description.
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
}

impl UpdateTaskRequest {
    fn into_changes(self) -> Result<TaskChanges, ApiError> {
        Ok(TaskChanges {
            name: self
                .name
                .as_deref()
                .map(|n| required_name("name", n))
                .transpose()?,
            description: self.description,
            status: self.status,
            project_id: self.project_id,
            assignee_id: self.assignee_id,
            due_date: self
                .due_date
                .as_deref()
                .map(parse_due_date)
                .transpose()?,
        })
    }
}

#[derive(Deserialize)]
pub struct BulkUpdateRequest {
    pub tasks: Vec<PositionUpdate>,
}

#[derive(Deserialize)]
pub struct MoveTaskRequest {
    pub task_id: i64,
    pub status: TaskStatus,
    pub index: usize,
    pub project_id: Option<i64>,
}

#[derive(Serialize)]
pub struct MoveTaskResponse {
    pub updates: Vec<PositionUpdate>,
}

pub(super) async fn list_tasks(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    QueryParams(filter): QueryParams<TaskFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let tasks = state
        .db
        .call(move |db| {
            db.require_workspace(filter.workspace_id)?;
            db.require_member(filter.workspace_id, user.id)?;
            let tasks = db.list_tasks(&filter)?;
            db.populate_tasks(tasks)
        })
        .await?;
    Ok(Json(tasks))
}

pub(super) async fn create_task(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new = NewTask {
        workspace_id: req.workspace_id,
        project_id: req.project_id,
        assignee_id: req.assignee_id,
        name: required_name("name", &req.name)?,
        description: req.description,
        status: req.status,
        due_date: parse_due_date(&req.due_date)?,
    };
    let task = state
        .db
        .call(move |db| {
            db.require_workspace(new.workspace_id)?;
            db.require_member(new.workspace_id, user.id)?;
            db.create_task(&new)
        })
        .await?;
    info!(task_id = task.id, workspace_id = task.workspace_id, "Task created");
    broadcast_message(
        &state.ws_tx,
        task.workspace_id,
        &WsMessage::TaskCreated { task: task.clone() },
    );
    Ok((StatusCode::CREATED, Json(task)))
}

pub(super) async fn get_task(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .db
        .call(move |db| {
            let task = db.require_task(id)?;
            db.require_member(task.workspace_id, user.id)?;
            db.get_task_detail(id)
        })
        .await?;
    match detail {
        Some(detail) => Ok(Json(detail)),
        None => Err(BoardError::TaskNotFound { id }.into()),
    }
}

pub(super) async fn update_task(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
    JsonBody(req): JsonBody<UpdateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let changes = req.into_changes()?;
    let task = state
        .db
        .call(move |db| {
            let task = db.require_task(id)?;
            db.require_member(task.workspace_id, user.id)?;
            if changes.is_empty() {
                return Ok(task);
            }
            db.update_task(id, &changes)
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        task.workspace_id,
        &WsMessage::TaskUpdated { task: task.clone() },
    );
    Ok(Json(task))
}

pub(super) async fn delete_task(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .db
        .call(move |db| {
            let task = db.require_task(id)?;
            db.require_member(task.workspace_id, user.id)?;
            db.delete_task(id)
        })
        .await?;
    info!(task_id = id, workspace_id = task.workspace_id, "Task deleted");
    broadcast_message(&state.ws_tx, task.workspace_id, &WsMessage::TaskDeleted { id });
    Ok(Json(
        serde_json::json!({"id": id, "workspace_id": task.workspace_id}),
    ))
}

/// Persist a client-computed reorder. Every task must live in one workspace
/// the caller belongs to.
pub(super) async fn bulk_update(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<BulkUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let updates = req.tasks;
    let broadcast_updates = updates.clone();
    let (workspace_id, tasks) = state
        .db
        .call(move |db| {
            let ids: Vec<i64> = updates.iter().map(|u| u.id).collect();
            let workspace_id = db.workspace_of_tasks(&ids)?;
            db.require_member(workspace_id, user.id)?;
            Ok((workspace_id, db.apply_position_updates(&updates)?))
        })
        .await?;
    info!(workspace_id, count = tasks.len(), "Tasks reordered");
    broadcast_message(
        &state.ws_tx,
        workspace_id,
        &WsMessage::TasksReordered {
            updates: broadcast_updates,
        },
    );
    Ok(Json(tasks))
}

/// Server-side drag and drop: compute and persist the reorder for one move.
pub(super) async fn move_task(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<MoveTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (workspace_id, updates) = state
        .db
        .call(move |db| {
            let task = db.require_task(req.task_id)?;
            db.require_member(task.workspace_id, user.id)?;
            let updates = db.move_task(req.task_id, req.status, req.index, req.project_id)?;
            Ok((task.workspace_id, updates))
        })
        .await?;
    info!(
        task_id = req.task_id,
        status = %req.status,
        index = req.index,
        changed = updates.len(),
        "Task moved"
    );
    broadcast_message(
        &state.ws_tx,
        workspace_id,
        &WsMessage::TasksReordered {
            updates: updates.clone(),
        },
    );
    Ok(Json(MoveTaskResponse { updates }))
}
