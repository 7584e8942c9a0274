//! SQLite persistence for users, sessions, workspaces, members, projects,
//! tasks and uploaded images.
//!
//! `BoardDb` is synchronous; the async service reaches it only through
//! [`DbHandle::call`], which runs each closure on the blocking pool while
//! holding the connection mutex. A closure is therefore the unit of
//! atomicity: membership checks and the writes they guard run inside one call.

mod images;
mod members;
mod projects;
mod tasks;
mod users;
mod workspaces;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::errors::BoardError;

pub use images::ImageInput;
pub use users::UserCredentials;
pub use workspaces::{INVITE_CODE_LENGTH, generate_invite_code};

/// Async-safe handle to the board database.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| BoardError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. For startup and tests only.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, BoardDb>> {
        self.inner
            .lock()
            .map_err(|_| BoardError::LockPoisoned.into())
    }
}

pub struct BoardDb {
    conn: Connection,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token_digest TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    expires_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS images (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS workspaces (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    image_url TEXT,
                    image_id INTEGER,
                    invite_code TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS members (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workspace_id INTEGER NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    role TEXT NOT NULL DEFAULT 'MEMBER',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(workspace_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workspace_id INTEGER NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    image_url TEXT,
                    image_id INTEGER,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workspace_id INTEGER NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    assignee_id INTEGER REFERENCES members(id) ON DELETE SET NULL,
                    name TEXT NOT NULL,
                    description TEXT,
                    status TEXT NOT NULL DEFAULT 'BACKLOG',
                    due_date TEXT NOT NULL,
                    position INTEGER NOT NULL DEFAULT 1000,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
                CREATE INDEX IF NOT EXISTS idx_members_user ON members(user_id);
                CREATE INDEX IF NOT EXISTS idx_projects_workspace ON projects(workspace_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_workspace ON tasks(workspace_id, status);
                CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON tasks(assignee_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Run `f` inside a transaction, committing only if it succeeds.
    pub fn transaction<R>(&self, f: impl FnOnce(&Self) -> Result<R>) -> Result<R> {
        // DbHandle's mutex already serializes access to the connection.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let result = f(self)?;
        tx.commit().context("Failed to commit transaction")?;
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::board::models::*;

    /// A user who owns one workspace that has one project.
    pub struct Fixture {
        pub db: BoardDb,
        pub owner: User,
        pub workspace: Workspace,
        pub admin: Member,
        pub project: Project,
    }

    pub fn fixture() -> Fixture {
        let db = BoardDb::new_in_memory().unwrap();
        let owner = db
            .create_user("Owner", "owner@example.com", "hash")
            .unwrap();
        let workspace = db
            .create_workspace(owner.id, "Acme", ImageInput::Unchanged)
            .unwrap();
        let admin = db.get_member(workspace.id, owner.id).unwrap().unwrap();
        let project = db
            .create_project(workspace.id, "Website", ImageInput::Unchanged)
            .unwrap();
        Fixture {
            db,
            owner,
            workspace,
            admin,
            project,
        }
    }

    pub fn new_task(f: &Fixture, name: &str, status: TaskStatus) -> Task {
        f.db.create_task(&NewTask {
            workspace_id: f.workspace.id,
            project_id: f.project.id,
            assignee_id: f.admin.id,
            name: name.to_string(),
            description: None,
            status,
            due_date: parse_due_date("2030-01-01").unwrap(),
        })
        .unwrap()
    }

    pub fn join(f: &Fixture, name: &str, email: &str) -> (User, Member) {
        let user = f.db.create_user(name, email, "hash").unwrap();
        let member = f
            .db
            .join_workspace(f.workspace.id, user.id, &f.workspace.invite_code)
            .unwrap();
        (user, member)
    }

    impl BoardDb {
        pub(crate) fn set_task_created_at(&self, id: i64, created_at: &str) {
            self.conn
                .execute(
                    "UPDATE tasks SET created_at = ?1 WHERE id = ?2",
                    rusqlite::params![created_at, id],
                )
                .unwrap();
        }
    }
}
