use anyhow::{Context, Result};
use rand::Rng;
use rusqlite::{OptionalExtension, params};

use super::{BoardDb, ImageInput};
use crate::board::models::{Member, MemberRole, Workspace};
use crate::errors::BoardError;

const INVITE_CODE_ALPHABET: &[u8] =
    b"afuicndijsf43uwbcHN8CH843B8yhnyuobYOB8HFDJVB7Hb8iwub34irhcf4379f";
pub const INVITE_CODE_LENGTH: usize = 7;

pub fn generate_invite_code() -> String {
    let mut rng = rand::rng();
    (0..INVITE_CODE_LENGTH)
        .map(|_| INVITE_CODE_ALPHABET[rng.random_range(0..INVITE_CODE_ALPHABET.len())] as char)
        .collect()
}

const WORKSPACE_COLUMNS: &str =
    "id, name, user_id, image_url, image_id, invite_code, created_at, updated_at";

fn workspace_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: row.get(0)?,
        name: row.get(1)?,
        user_id: row.get(2)?,
        image_url: row.get(3)?,
        image_id: row.get(4)?,
        invite_code: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl BoardDb {
    /// Create a workspace and make `user_id` its first admin.
    pub fn create_workspace(
        &self,
        user_id: i64,
        name: &str,
        image: ImageInput,
    ) -> Result<Workspace> {
        self.transaction(|db| {
            let (image_url, image_id) = db.resolve_image(None, None, image)?;
            db.conn
                .execute(
                    "INSERT INTO workspaces (name, user_id, image_url, image_id, invite_code)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![name, user_id, image_url, image_id, generate_invite_code()],
                )
                .context("Failed to insert workspace")?;
            let id = db.conn.last_insert_rowid();
            db.insert_member(id, user_id, MemberRole::Admin)?;
            db.get_workspace(id)?
                .context("Workspace not found after insert")
        })
    }

    pub fn get_workspace(&self, id: i64) -> Result<Option<Workspace>> {
        self.conn
            .query_row(
                &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?1"),
                params![id],
                workspace_from_row,
            )
            .optional()
            .context("Failed to query workspace")
    }

    pub fn require_workspace(&self, id: i64) -> Result<Workspace> {
        self.get_workspace(id)?
            .ok_or_else(|| BoardError::WorkspaceNotFound { id }.into())
    }

    /// Workspaces the user belongs to, newest first.
    pub fn list_workspaces_for_user(&self, user_id: i64) -> Result<Vec<Workspace>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT w.id, w.name, w.user_id, w.image_url, w.image_id, w.invite_code,
                        w.created_at, w.updated_at
                 FROM workspaces w JOIN members m ON m.workspace_id = w.id
                 WHERE m.user_id = ?1
                 ORDER BY w.created_at DESC, w.id DESC",
            )
            .context("Failed to prepare list_workspaces_for_user")?;
        let rows = stmt
            .query_map(params![user_id], workspace_from_row)
            .context("Failed to query workspaces")?;
        let mut workspaces = Vec::new();
        for row in rows {
            workspaces.push(row.context("Failed to read workspace row")?);
        }
        Ok(workspaces)
    }

    pub fn update_workspace(
        &self,
        id: i64,
        name: Option<&str>,
        image: ImageInput,
    ) -> Result<Workspace> {
        self.transaction(|db| {
            let current = db.require_workspace(id)?;
            let (image_url, image_id) =
                db.resolve_image(current.image_url, current.image_id, image)?;
            db.conn
                .execute(
                    "UPDATE workspaces
                     SET name = COALESCE(?1, name), image_url = ?2, image_id = ?3,
                         updated_at = datetime('now')
                     WHERE id = ?4",
                    params![name, image_url, image_id, id],
                )
                .context("Failed to update workspace")?;
            db.require_workspace(id)
        })
    }

    /// Delete a workspace with its members, projects, tasks and images.
    pub fn delete_workspace(&self, id: i64) -> Result<Workspace> {
        self.transaction(|db| {
            let workspace = db.require_workspace(id)?;
            let mut stmt = db
                .conn
                .prepare("SELECT image_id FROM projects WHERE workspace_id = ?1 AND image_id IS NOT NULL")
                .context("Failed to prepare project image lookup")?;
            let image_ids = stmt
                .query_map(params![id], |row| row.get::<_, i64>(0))
                .context("Failed to query project images")?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read project image row")?;
            for image_id in image_ids.into_iter().chain(workspace.image_id) {
                db.delete_image(image_id)?;
            }
            db.conn
                .execute("DELETE FROM workspaces WHERE id = ?1", params![id])
                .context("Failed to delete workspace")?;
            Ok(workspace)
        })
    }

    pub fn reset_invite_code(&self, id: i64) -> Result<Workspace> {
        let affected = self
            .conn
            .execute(
                "UPDATE workspaces SET invite_code = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![generate_invite_code(), id],
            )
            .context("Failed to reset invite code")?;
        if affected == 0 {
            return Err(BoardError::WorkspaceNotFound { id }.into());
        }
        self.require_workspace(id)
    }

    /// Join a workspace as a regular member using its invite code.
    pub fn join_workspace(&self, workspace_id: i64, user_id: i64, code: &str) -> Result<Member> {
        let workspace = self.require_workspace(workspace_id)?;
        if self.get_member(workspace_id, user_id)?.is_some() {
            return Err(BoardError::AlreadyMember.into());
        }
        if workspace.invite_code != code.trim() {
            return Err(BoardError::InvalidInviteCode.into());
        }
        self.insert_member(workspace_id, user_id, MemberRole::Member)
    }
}
