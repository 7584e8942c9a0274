use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};

use super::BoardDb;
use crate::board::models::{Member, MemberProfile, MemberRole};
use crate::errors::BoardError;

struct MemberRow {
    id: i64,
    workspace_id: i64,
    user_id: i64,
    role: String,
    created_at: String,
}

impl MemberRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            user_id: row.get(2)?,
            role: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_member(self) -> Result<Member> {
        Ok(Member {
            id: self.id,
            workspace_id: self.workspace_id,
            user_id: self.user_id,
            role: MemberRole::from_str(&self.role).map_err(|e| anyhow::anyhow!(e))?,
            created_at: self.created_at,
        })
    }
}

const MEMBER_COLUMNS: &str = "id, workspace_id, user_id, role, created_at";

impl BoardDb {
    pub(crate) fn insert_member(
        &self,
        workspace_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> Result<Member> {
        self.conn
            .execute(
                "INSERT INTO members (workspace_id, user_id, role) VALUES (?1, ?2, ?3)",
                params![workspace_id, user_id, role.as_str()],
            )
            .context("Failed to insert member")?;
        let id = self.conn.last_insert_rowid();
        self.get_member_by_id(id)?
            .context("Member not found after insert")
    }

    /// Membership of `user_id` in `workspace_id`, if any.
    pub fn get_member(&self, workspace_id: i64, user_id: i64) -> Result<Option<Member>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {MEMBER_COLUMNS} FROM members WHERE workspace_id = ?1 AND user_id = ?2"
                ),
                params![workspace_id, user_id],
                MemberRow::from_row,
            )
            .optional()
            .context("Failed to query member")?
            .map(MemberRow::into_member)
            .transpose()
    }

    pub fn get_member_by_id(&self, id: i64) -> Result<Option<Member>> {
        self.conn
            .query_row(
                &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1"),
                params![id],
                MemberRow::from_row,
            )
            .optional()
            .context("Failed to query member")?
            .map(MemberRow::into_member)
            .transpose()
    }

    /// The user's membership, or `Forbidden` when they are not in the workspace.
    pub fn require_member(&self, workspace_id: i64, user_id: i64) -> Result<Member> {
        self.get_member(workspace_id, user_id)?
            .ok_or_else(|| BoardError::forbidden("Not a member of this workspace").into())
    }

    pub fn require_admin(&self, workspace_id: i64, user_id: i64) -> Result<Member> {
        let member = self.require_member(workspace_id, user_id)?;
        if !member.is_admin() {
            return Err(BoardError::forbidden("Admin role required").into());
        }
        Ok(member)
    }

    pub fn list_members(&self, workspace_id: i64) -> Result<Vec<MemberProfile>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT m.id, m.workspace_id, m.user_id, m.role, m.created_at, u.name, u.email
                 FROM members m JOIN users u ON u.id = m.user_id
                 WHERE m.workspace_id = ?1
                 ORDER BY m.created_at, m.id",
            )
            .context("Failed to prepare list_members")?;
        let rows = stmt
            .query_map(params![workspace_id], |row| {
                Ok((MemberRow::from_row(row)?, row.get(5)?, row.get(6)?))
            })
            .context("Failed to query members")?;
        let mut members = Vec::new();
        for row in rows {
            let (member, name, email) = row.context("Failed to read member row")?;
            members.push(MemberProfile {
                member: member.into_member()?,
                name,
                email,
            });
        }
        Ok(members)
    }

    pub fn get_member_profile(&self, id: i64) -> Result<Option<MemberProfile>> {
        let found = self
            .conn
            .query_row(
                "SELECT m.id, m.workspace_id, m.user_id, m.role, m.created_at, u.name, u.email
                 FROM members m JOIN users u ON u.id = m.user_id
                 WHERE m.id = ?1",
                params![id],
                |row| Ok((MemberRow::from_row(row)?, row.get(5)?, row.get(6)?)),
            )
            .optional()
            .context("Failed to query member profile")?;
        match found {
            Some((member, name, email)) => Ok(Some(MemberProfile {
                member: member.into_member()?,
                name,
                email,
            })),
            None => Ok(None),
        }
    }

    fn count_members(&self, workspace_id: i64, role: Option<MemberRole>) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM members WHERE workspace_id = ?1 AND (?2 IS NULL OR role = ?2)",
                params![workspace_id, role.map(|r| r.as_str())],
                |row| row.get(0),
            )
            .context("Failed to count members")
    }

    /// Delete a member, keeping at least one member and one admin in the
    /// workspace. Tasks assigned to the member become unassigned.
    pub fn remove_member(&self, id: i64) -> Result<Member> {
        self.transaction(|db| {
            let member = db
                .get_member_by_id(id)?
                .ok_or(BoardError::MemberNotFound { id })?;
            if db.count_members(member.workspace_id, None)? <= 1 {
                return Err(BoardError::LastMember.into());
            }
            if member.is_admin() && db.count_members(member.workspace_id, Some(MemberRole::Admin))? <= 1 {
                return Err(BoardError::LastAdmin.into());
            }
            db.conn
                .execute("DELETE FROM members WHERE id = ?1", params![id])
                .context("Failed to delete member")?;
            Ok(member)
        })
    }

    /// Change a member's role. Demoting the only member or the only admin fails.
    pub fn set_member_role(&self, id: i64, role: MemberRole) -> Result<Member> {
        self.transaction(|db| {
            let member = db
                .get_member_by_id(id)?
                .ok_or(BoardError::MemberNotFound { id })?;
            if member.is_admin() && role == MemberRole::Member {
                if db.count_members(member.workspace_id, None)? <= 1 {
                    return Err(BoardError::LastMember.into());
                }
                if db.count_members(member.workspace_id, Some(MemberRole::Admin))? <= 1 {
                    return Err(BoardError::LastAdmin.into());
                }
            }
            db.conn
                .execute(
                    "UPDATE members SET role = ?1 WHERE id = ?2",
                    params![role.as_str(), id],
                )
                .context("Failed to update member role")?;
            db.get_member_by_id(id)?
                .context("Member not found after update")
        })
    }
}
