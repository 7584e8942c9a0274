use axum::{
    Json,
    extract::State,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;

use super::{ApiError, JsonBody, PathParam, QueryParams, SharedState};
use crate::board::auth::CurrentUser;
use crate::board::models::MemberRole;
use crate::board::ws::{WsMessage, broadcast_message};
use crate::errors::BoardError;

#[derive(Deserialize)]
pub struct MembersQuery {
    pub workspace_id: i64,
}

#[derive(Deserialize)]
pub struct UpdateMemberRequest {
    pub role: MemberRole,
}

pub(super) async fn list_members(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    QueryParams(query): QueryParams<MembersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace_id = query.workspace_id;
    let members = state
        .db
        .call(move |db| {
            db.require_workspace(workspace_id)?;
            db.require_member(workspace_id, user.id)?;
            db.list_members(workspace_id)
        })
        .await?;
    Ok(Json(members))
}

/// Members may remove themselves; admins may remove anyone.
pub(super) async fn delete_member(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .db
        .call(move |db| {
            let target = db
                .get_member_by_id(id)?
                .ok_or(BoardError::MemberNotFound { id })?;
            let acting = db.require_member(target.workspace_id, user.id)?;
            if acting.id != target.id && !acting.is_admin() {
                return Err(BoardError::forbidden("Only admins can remove other members").into());
            }
            db.remove_member(id)
        })
        .await?;
    info!(member_id = id, workspace_id = removed.workspace_id, "Member removed");
    broadcast_message(
        &state.ws_tx,
        removed.workspace_id,
        &WsMessage::MemberRemoved { id },
    );
    Ok(Json(serde_json::json!({"id": id})))
}

pub(super) async fn update_member(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
    JsonBody(req): JsonBody<UpdateMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let member = state
        .db
        .call(move |db| {
            let target = db
                .get_member_by_id(id)?
                .ok_or(BoardError::MemberNotFound { id })?;
            db.require_admin(target.workspace_id, user.id)?;
            db.set_member_role(id, req.role)
        })
        .await?;
    info!(member_id = id, role = %member.role, "Member role changed");
    broadcast_message(
        &state.ws_tx,
        member.workspace_id,
        &WsMessage::MemberRoleChanged {
            member: member.clone(),
        },
    );
    Ok(Json(member))
}
