use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};

pub use workboard_common::{MemberRole, PositionUpdate, TaskStatus};

use crate::errors::BoardError;

/// Storage format for every timestamp column (matches SQLite `datetime()`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    pub id: i64,
    pub name: String,
    pub user_id: i64,
    pub image_url: Option<String>,
    pub image_id: Option<i64>,
    pub invite_code: String,
    pub created_at: String,
    pub updated_at: String,
}

/// What a non-member may see before joining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub id: i64,
    pub name: String,
    pub image_url: Option<String>,
}

impl From<Workspace> for WorkspaceInfo {
    fn from(w: Workspace) -> Self {
        Self {
            id: w.id,
            name: w.name,
            image_url: w.image_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub id: i64,
    pub workspace_id: i64,
    pub user_id: i64,
    pub role: MemberRole,
    pub created_at: String,
}

impl Member {
    pub fn is_admin(&self) -> bool {
        self.role == MemberRole::Admin
    }
}

/// Member joined with the user's display fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberProfile {
    #[serde(flatten)]
    pub member: Member,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
    pub image_url: Option<String>,
    pub image_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSummary {
    pub id: i64,
    pub name: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub workspace_id: i64,
    pub project_id: i64,
    pub assignee_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_date: String,
    pub position: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Task populated with its project and assignee for list/detail views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub project: Option<ProjectSummary>,
    pub assignee: Option<MemberProfile>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub workspace_id: i64,
    pub project_id: i64,
    pub assignee_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_date: NaiveDateTime,
}

/// Partial task update; `None` leaves a field unchanged. Nullable columns use
/// a nested option where `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub project_id: Option<i64>,
    pub assignee_id: Option<Option<i64>>,
    pub due_date: Option<NaiveDateTime>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.project_id.is_none()
            && self.assignee_id.is_none()
            && self.due_date.is_none()
    }
}

/// Deserialize a present field (including an explicit `null`) as `Some`.
///
/// Paired with `#[serde(default)]` so an absent field stays `None`.
pub fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub workspace_id: i64,
    pub project_id: Option<i64>,
    pub assignee_id: Option<i64>,
    pub status: Option<TaskStatus>,
    pub search: Option<String>,
    pub due_date: Option<NaiveDate>,
}

// API view types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    pub workspace_id: i64,
    pub project_id: Option<i64>,
    pub columns: Vec<ColumnView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnView {
    pub status: TaskStatus,
    pub task_count: usize,
    pub tasks: Vec<TaskDetail>,
}

/// Month-over-month task counts for a workspace or project.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Analytics {
    pub task_count: i64,
    pub task_diff: i64,
    pub assigned_task_count: i64,
    pub assigned_task_diff: i64,
    pub completed_task_count: i64,
    pub completed_task_diff: i64,
    pub incomplete_task_count: i64,
    pub incomplete_task_diff: i64,
    pub overdue_task_count: i64,
    pub overdue_task_diff: i64,
}

/// Parse a due date given as `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339.
///
/// Date-only values mean midnight UTC of that day; RFC 3339 values are
/// converted to UTC.
pub fn parse_due_date(raw: &str) -> Result<NaiveDateTime, BoardError> {
    let raw = raw.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Ok(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    Err(BoardError::validation(format!("Invalid due date: {}", raw)))
}

pub fn format_timestamp(dt: NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}
