use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};

use super::{BoardDb, ImageInput};
use crate::board::models::{Project, ProjectSummary};
use crate::errors::BoardError;

fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        name: row.get(2)?,
        image_url: row.get(3)?,
        image_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const PROJECT_COLUMNS: &str = "id, workspace_id, name, image_url, image_id, created_at, updated_at";

impl BoardDb {
    pub fn create_project(
        &self,
        workspace_id: i64,
        name: &str,
        image: ImageInput,
    ) -> Result<Project> {
        self.transaction(|db| {
            let (image_url, image_id) = db.resolve_image(None, None, image)?;
            db.conn
                .execute(
                    "INSERT INTO projects (workspace_id, name, image_url, image_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![workspace_id, name, image_url, image_id],
                )
                .context("Failed to insert project")?;
            let id = db.conn.last_insert_rowid();
            db.get_project(id)?.context("Project not found after insert")
        })
    }

    /// Projects in a workspace, newest first.
    pub fn list_projects(&self, workspace_id: i64) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {PROJECT_COLUMNS} FROM projects WHERE workspace_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ))
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map(params![workspace_id], project_from_row)
            .context("Failed to query projects")?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row.context("Failed to read project row")?);
        }
        Ok(projects)
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                params![id],
                project_from_row,
            )
            .optional()
            .context("Failed to query project")
    }

    pub fn require_project(&self, id: i64) -> Result<Project> {
        self.get_project(id)?
            .ok_or_else(|| BoardError::ProjectNotFound { id }.into())
    }

    pub fn get_project_summary(&self, id: i64) -> Result<Option<ProjectSummary>> {
        Ok(self.get_project(id)?.map(|p| ProjectSummary {
            id: p.id,
            name: p.name,
            image_url: p.image_url,
        }))
    }

    pub fn update_project(
        &self,
        id: i64,
        name: Option<&str>,
        image: ImageInput,
    ) -> Result<Project> {
        self.transaction(|db| {
            let current = db.require_project(id)?;
            let (image_url, image_id) =
                db.resolve_image(current.image_url, current.image_id, image)?;
            db.conn
                .execute(
                    "UPDATE projects
                     SET name = COALESCE(?1, name), image_url = ?2, image_id = ?3,
                         updated_at = datetime('now')
                     WHERE id = ?4",
                    params![name, image_url, image_id, id],
                )
                .context("Failed to update project")?;
            db.require_project(id)
        })
    }

    /// Delete a project, its tasks and its uploaded image.
    pub fn delete_project(&self, id: i64) -> Result<Project> {
        self.transaction(|db| {
            let project = db.require_project(id)?;
            if let Some(image_id) = project.image_id {
                db.delete_image(image_id)?;
            }
            db.conn
                .execute("DELETE FROM projects WHERE id = ?1", params![id])
                .context("Failed to delete project")?;
            Ok(project)
        })
    }
}
