//! Typed error hierarchy for the Workboard service.
//!
//! Storage code returns `anyhow::Result` and raises a `BoardError` whenever the
//! failure has a meaning the HTTP layer must preserve (missing record, failed
//! membership check, violated invariant). The API layer downcasts back to
//! `BoardError` to choose a status code; everything else is a 500.

use thiserror::Error;
use workboard_common::ReorderError;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("Workspace {id} not found")]
    WorkspaceNotFound { id: i64 },

    #[error("Project {id} not found")]
    ProjectNotFound { id: i64 },

    #[error("Task {id} not found")]
    TaskNotFound { id: i64 },

    #[error("Member {id} not found")]
    MemberNotFound { id: i64 },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Email {email} is already registered")]
    EmailTaken { email: String },

    #[error("Already a member of this workspace")]
    AlreadyMember,

    #[error("Invalid invite code")]
    InvalidInviteCode,

    #[error("Cannot remove or demote the last member of a workspace")]
    LastMember,

    #[error("Cannot remove or demote the last admin of a workspace")]
    LastAdmin,

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Reorder(#[from] ReorderError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BoardError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
