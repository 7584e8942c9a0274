use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};
use workboard_common::{Board, Card, MAX_POSITION, POSITION_STEP};

use super::BoardDb;
use crate::board::analytics::{AnalyticsScope, MonthWindow, TaskMetric};
use crate::board::models::*;
use crate::errors::BoardError;

struct TaskRow {
    id: i64,
    workspace_id: i64,
    project_id: i64,
    assignee_id: Option<i64>,
    name: String,
    description: Option<String>,
    status: String,
    due_date: String,
    position: i64,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            project_id: row.get(2)?,
            assignee_id: row.get(3)?,
            name: row.get(4)?,
            description: row.get(5)?,
            status: row.get(6)?,
            due_date: row.get(7)?,
            position: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        Ok(Task {
            id: self.id,
            workspace_id: self.workspace_id,
            project_id: self.project_id,
            assignee_id: self.assignee_id,
            name: self.name,
            description: self.description,
            status: TaskStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?,
            due_date: self.due_date,
            position: self.position,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const TASK_COLUMNS: &str = "id, workspace_id, project_id, assignee_id, name, description, status, due_date, position, created_at, updated_at";

impl BoardDb {
    /// Position for a task appended to a column: one step past the current
    /// maximum, capped at `MAX_POSITION`.
    pub fn next_position(&self, workspace_id: i64, status: TaskStatus) -> Result<i64> {
        let max: Option<i64> = self
            .conn
            .query_row(
                "SELECT MAX(position) FROM tasks WHERE workspace_id = ?1 AND status = ?2",
                params![workspace_id, status.as_str()],
                |row| row.get(0),
            )
            .context("Failed to get max position")?;
        Ok(match max {
            Some(max) => max.saturating_add(POSITION_STEP).min(MAX_POSITION),
            None => POSITION_STEP,
        })
    }

    fn check_task_refs(
        &self,
        workspace_id: i64,
        project_id: Option<i64>,
        assignee_id: Option<i64>,
    ) -> Result<()> {
        if let Some(project_id) = project_id {
            let project = self.require_project(project_id)?;
            if project.workspace_id != workspace_id {
                return Err(
                    BoardError::validation("Project does not belong to this workspace").into(),
                );
            }
        }
        if let Some(assignee_id) = assignee_id {
            let in_workspace = self
                .get_member_by_id(assignee_id)?
                .is_some_and(|m| m.workspace_id == workspace_id);
            if !in_workspace {
                return Err(BoardError::validation(
                    "Assignee is not a member of this workspace",
                )
                .into());
            }
        }
        Ok(())
    }

    pub fn create_task(&self, new: &NewTask) -> Result<Task> {
        self.check_task_refs(new.workspace_id, Some(new.project_id), Some(new.assignee_id))?;
        let position = self.next_position(new.workspace_id, new.status)?;
        self.conn
            .execute(
                "INSERT INTO tasks (workspace_id, project_id, assignee_id, name, description, status, due_date, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    new.workspace_id,
                    new.project_id,
                    new.assignee_id,
                    new.name,
                    new.description,
                    new.status.as_str(),
                    format_timestamp(new.due_date),
                    position
                ],
            )
            .context("Failed to insert task")?;
        let id = self.conn.last_insert_rowid();
        self.get_task(id)?.context("Task not found after insert")
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        self.conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                TaskRow::from_row,
            )
            .optional()
            .context("Failed to query task")?
            .map(TaskRow::into_task)
            .transpose()
    }

    pub fn require_task(&self, id: i64) -> Result<Task> {
        self.get_task(id)?
            .ok_or_else(|| BoardError::TaskNotFound { id }.into())
    }

    /// Tasks matching `filter`, newest first.
    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE workspace_id = ?1");
        let mut values = vec![Value::Integer(filter.workspace_id)];
        let mut push = |clause: &str, value: Value| {
            values.push(value);
            sql.push_str(&format!(" AND {clause} ?{}", values.len()));
        };
        if let Some(project_id) = filter.project_id {
            push("project_id =", Value::Integer(project_id));
        }
        if let Some(assignee_id) = filter.assignee_id {
            push("assignee_id =", Value::Integer(assignee_id));
        }
        if let Some(status) = filter.status {
            push("status =", Value::Text(status.as_str().to_string()));
        }
        if let Some(day) = filter.due_date {
            push("substr(due_date, 1, 10) =", Value::Text(day.format("%Y-%m-%d").to_string()));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            values.push(Value::Text(search.to_lowercase()));
            sql.push_str(&format!(" AND instr(lower(name), ?{}) > 0", values.len()));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_tasks")?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), TaskRow::from_row)
            .context("Failed to query tasks")?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.context("Failed to read task row")?.into_task()?);
        }
        Ok(tasks)
    }

    /// Attach project summaries and assignee profiles to tasks.
    pub fn populate_tasks(&self, tasks: Vec<Task>) -> Result<Vec<TaskDetail>> {
        let mut projects: HashMap<i64, Option<ProjectSummary>> = HashMap::new();
        let mut assignees: HashMap<i64, Option<MemberProfile>> = HashMap::new();
        let mut details = Vec::with_capacity(tasks.len());
        for task in tasks {
            let project = match projects.get(&task.project_id) {
                Some(p) => p.clone(),
                None => {
                    let p = self.get_project_summary(task.project_id)?;
                    projects.insert(task.project_id, p.clone());
                    p
                }
            };
            let assignee = match task.assignee_id {
                Some(id) => match assignees.get(&id) {
                    Some(a) => a.clone(),
                    None => {
                        let a = self.get_member_profile(id)?;
                        assignees.insert(id, a.clone());
                        a
                    }
                },
                None => None,
            };
            details.push(TaskDetail {
                task,
                project,
                assignee,
            });
        }
        Ok(details)
    }

    pub fn get_task_detail(&self, id: i64) -> Result<Option<TaskDetail>> {
        match self.get_task(id)? {
            Some(task) => Ok(self.populate_tasks(vec![task])?.pop()),
            None => Ok(None),
        }
    }

    /// Apply a partial update. A status change appends the task to the end
    /// of its new column.
    pub fn update_task(&self, id: i64, changes: &TaskChanges) -> Result<Task> {
        self.transaction(|db| {
            let current = db.require_task(id)?;
            db.check_task_refs(
                current.workspace_id,
                changes.project_id,
                changes.assignee_id.flatten(),
            )?;
            let position = match changes.status {
                Some(status) if status != current.status => {
                    Some(db.next_position(current.workspace_id, status)?)
                }
                _ => None,
            };
            // Clearable columns take a "was provided" flag next to the value.
            db.conn
                .execute(
                    "UPDATE tasks SET
                        name = COALESCE(?1, name),
                        description = CASE WHEN ?2 THEN ?3 ELSE description END,
                        status = COALESCE(?4, status),
                        project_id = COALESCE(?5, project_id),
                        assignee_id = CASE WHEN ?6 THEN ?7 ELSE assignee_id END,
                        due_date = COALESCE(?8, due_date),
                        position = COALESCE(?9, position),
                        updated_at = datetime('now')
                     WHERE id = ?10",
                    params![
                        changes.name,
                        changes.description.is_some(),
                        changes.description.clone().flatten(),
                        changes.status.map(|s| s.as_str()),
                        changes.project_id,
                        changes.assignee_id.is_some(),
                        changes.assignee_id.flatten(),
                        changes.due_date.map(format_timestamp),
                        position,
                        id
                    ],
                )
                .context("Failed to update task")?;
            db.require_task(id)
        })
    }

    pub fn delete_task(&self, id: i64) -> Result<Task> {
        let task = self.require_task(id)?;
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .context("Failed to delete task")?;
        Ok(task)
    }

    /// The single workspace that owns every task in `ids`.
    pub fn workspace_of_tasks(&self, ids: &[i64]) -> Result<i64> {
        let mut workspace_id = None;
        for &id in ids {
            let task = self.require_task(id)?;
            match workspace_id {
                None => workspace_id = Some(task.workspace_id),
                Some(ws) if ws != task.workspace_id => {
                    return Err(BoardError::validation(
                        "All tasks must belong to the same workspace",
                    )
                    .into());
                }
                Some(_) => {}
            }
        }
        workspace_id.ok_or_else(|| BoardError::validation("No tasks given").into())
    }

    /// Write status/position changes atomically.
    pub fn apply_position_updates(&self, updates: &[PositionUpdate]) -> Result<Vec<Task>> {
        if let Some(bad) = updates
            .iter()
            .find(|u| !(POSITION_STEP..=MAX_POSITION).contains(&u.position))
        {
            return Err(BoardError::validation(format!(
                "Position {} for task {} is outside {}..={}",
                bad.position, bad.id, POSITION_STEP, MAX_POSITION
            ))
            .into());
        }
        self.transaction(|db| {
            let mut tasks = Vec::with_capacity(updates.len());
            for update in updates {
                let affected = db
                    .conn
                    .execute(
                        "UPDATE tasks SET status = ?1, position = ?2, updated_at = datetime('now')
                         WHERE id = ?3",
                        params![update.status.as_str(), update.position, update.id],
                    )
                    .context("Failed to update task position")?;
                if affected == 0 {
                    return Err(BoardError::TaskNotFound { id: update.id }.into());
                }
                tasks.push(db.require_task(update.id)?);
            }
            Ok(tasks)
        })
    }

    fn board_cards(&self, workspace_id: i64, project_id: Option<i64>) -> Result<Vec<Card>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, status, position FROM tasks
                 WHERE workspace_id = ?1 AND (?2 IS NULL OR project_id = ?2)",
            )
            .context("Failed to prepare board_cards")?;
        let rows = stmt
            .query_map(params![workspace_id, project_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get(2)?))
            })
            .context("Failed to query board cards")?;
        let mut cards = Vec::new();
        for row in rows {
            let (id, status, position) = row.context("Failed to read card row")?;
            cards.push(Card {
                id,
                status: TaskStatus::from_str(&status).map_err(|e| anyhow::anyhow!(e))?,
                position,
            });
        }
        Ok(cards)
    }

    /// Move a task to `index` within the `status` column of its workspace
    /// board (optionally restricted to one project) and persist every
    /// resulting position change.
    pub fn move_task(
        &self,
        task_id: i64,
        status: TaskStatus,
        index: usize,
        project_id: Option<i64>,
    ) -> Result<Vec<PositionUpdate>> {
        let task = self.require_task(task_id)?;
        if project_id.is_some_and(|p| p != task.project_id) {
            return Err(BoardError::validation("Task is not in the given project").into());
        }
        let mut board = Board::from_cards(self.board_cards(task.workspace_id, project_id)?);
        let updates = board
            .move_card_by_id(task_id, status, index)
            .map_err(BoardError::from)?;
        self.apply_position_updates(&updates)?;
        Ok(updates)
    }

    /// Kanban view: one column per status in board order, tasks by position.
    pub fn get_board(&self, workspace_id: i64, project_id: Option<i64>) -> Result<BoardView> {
        let tasks = self.list_tasks(&TaskFilter {
            workspace_id,
            project_id,
            ..Default::default()
        })?;
        let mut grouped: HashMap<TaskStatus, Vec<TaskDetail>> = HashMap::new();
        for detail in self.populate_tasks(tasks)? {
            grouped.entry(detail.task.status).or_default().push(detail);
        }
        let columns = TaskStatus::ALL
            .iter()
            .map(|status| {
                let mut tasks = grouped.remove(status).unwrap_or_default();
                tasks.sort_by_key(|t| (t.task.position, t.task.id));
                ColumnView {
                    status: *status,
                    task_count: tasks.len(),
                    tasks,
                }
            })
            .collect();
        Ok(BoardView {
            workspace_id,
            project_id,
            columns,
        })
    }

    /// Count tasks created inside `window` that match `metric`.
    pub fn count_tasks(
        &self,
        scope: AnalyticsScope,
        window: &MonthWindow,
        metric: &TaskMetric,
    ) -> Result<i64> {
        let (column, scope_id) = match scope {
            AnalyticsScope::Workspace(id) => ("workspace_id", id),
            AnalyticsScope::Project(id) => ("project_id", id),
        };
        let mut sql = format!(
            "SELECT COUNT(*) FROM tasks WHERE {column} = ?1 AND created_at >= ?2 AND created_at < ?3"
        );
        let mut values = vec![
            Value::Integer(scope_id),
            Value::Text(format_timestamp(window.start)),
            Value::Text(format_timestamp(window.end)),
        ];
        match metric {
            TaskMetric::All => {}
            TaskMetric::AssignedTo(member_id) => {
                sql.push_str(" AND assignee_id = ?4");
                values.push(Value::Integer(*member_id));
            }
            TaskMetric::Completed => sql.push_str(" AND status = 'DONE'"),
            TaskMetric::Incomplete => sql.push_str(" AND status != 'DONE'"),
            TaskMetric::Overdue(now) => {
                sql.push_str(" AND status != 'DONE' AND due_date < ?4");
                values.push(Value::Text(format_timestamp(*now)));
            }
        }
        self.conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
            .context("Failed to count tasks")
    }
}
