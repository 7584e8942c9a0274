use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{OptionalExtension, params};

use super::BoardDb;
use crate::board::auth::token_digest;
use crate::board::models::{Session, User, format_timestamp};
use crate::errors::BoardError;

/// Stored password material for a user, looked up at sign-in.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

impl BoardDb {
    // ── Users ─────────────────────────────────────────────────────────

    /// Insert a user. Emails are stored lower-cased and must be unique.
    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User> {
        let email = email.trim().to_lowercase();
        let exists: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                params![email],
                |row| row.get(0),
            )
            .context("Failed to check email")?;
        if exists {
            return Err(BoardError::EmailTaken { email }.into());
        }
        self.conn
            .execute(
                "INSERT INTO users (name, email, password_hash) VALUES (?1, ?2, ?3)",
                params![name, email, password_hash],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, name, email, created_at FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to query user")
    }

    pub fn find_user_credentials(&self, email: &str) -> Result<Option<UserCredentials>> {
        self.conn
            .query_row(
                "SELECT id, name, email, created_at, password_hash
                 FROM users WHERE email = ?1",
                params![email.trim().to_lowercase()],
                |row| {
                    Ok(UserCredentials {
                        user: User {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            email: row.get(2)?,
                            created_at: row.get(3)?,
                        },
                        password_hash: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("Failed to query user credentials")
    }

    // ── Sessions ──────────────────────────────────────────────────────
    //
    // Tokens are stored as SHA-256 digests; lookups hash the presented token.

    pub fn create_session(
        &self,
        user_id: i64,
        token: &str,
        expires_at: NaiveDateTime,
    ) -> Result<Session> {
        let expires_at = format_timestamp(expires_at);
        self.conn
            .execute(
                "INSERT INTO sessions (token_digest, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token_digest(token), user_id, expires_at],
            )
            .context("Failed to insert session")?;
        Ok(Session {
            token: token.to_string(),
            user_id,
            expires_at,
        })
    }

    /// User owning a session that is still valid at `now`.
    pub fn get_session_user(&self, token: &str, now: NaiveDateTime) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT u.id, u.name, u.email, u.created_at
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token_digest = ?1 AND s.expires_at > ?2",
                params![token_digest(token), format_timestamp(now)],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to query session")
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM sessions WHERE token_digest = ?1",
                params![token_digest(token)],
            )
            .context("Failed to delete session")?;
        Ok(affected > 0)
    }

    /// Remove sessions that expired before `now`; returns how many were dropped.
    pub fn purge_expired_sessions(&self, now: NaiveDateTime) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![format_timestamp(now)],
            )
            .context("Failed to purge sessions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_create_user_lowercases_email() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let user = db.create_user("Ada", " Ada@Example.COM ", "h")?;
        assert_eq!(user.email, "ada@example.com");

        let creds = db.find_user_credentials("ADA@example.com")?.unwrap();
        assert_eq!(creds.user.id, user.id);
        assert_eq!(creds.password_hash, "h");
        Ok(())
    }

    #[test]
    fn test_duplicate_email_rejected() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.create_user("Ada", "ada@example.com", "h")?;
        let err = db
            .create_user("Other", "ADA@example.com", "h")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BoardError>(),
            Some(BoardError::EmailTaken { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_session_lifecycle() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let user = db.create_user("Ada", "ada@example.com", "h")?;
        let now = Utc::now().naive_utc();
        db.create_session(user.id, "tok", now + Duration::hours(1))?;

        assert_eq!(db.get_session_user("tok", now)?.map(|u| u.id), Some(user.id));
        assert!(db.get_session_user("tok", now + Duration::hours(2))?.is_none());
        assert!(db.get_session_user("other", now)?.is_none());

        assert!(db.delete_session("tok")?);
        assert!(db.get_session_user("tok", now)?.is_none());
        Ok(())
    }

    #[test]
    fn test_session_tokens_stored_as_digests() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let user = db.create_user("Ada", "ada@example.com", "h")?;
        let now = Utc::now().naive_utc();
        db.create_session(user.id, "plain-token", now + Duration::hours(1))?;

        let stored: String = db
            .conn
            .query_row("SELECT token_digest FROM sessions", [], |row| row.get(0))?;
        assert_ne!(stored, "plain-token");
        assert_eq!(stored, token_digest("plain-token"));
        assert!(db.get_session_user(&stored, now)?.is_none());
        Ok(())
    }

    #[test]
    fn test_purge_expired_sessions() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let user = db.create_user("Ada", "ada@example.com", "h")?;
        let now = Utc::now().naive_utc();
        db.create_session(user.id, "old", now - Duration::hours(1))?;
        db.create_session(user.id, "new", now + Duration::hours(1))?;
        assert_eq!(db.purge_expired_sessions(now)?, 1);
        assert!(db.get_session_user("new", now)?.is_some());
        Ok(())
    }
}
