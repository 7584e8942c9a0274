//! Shared domain types for the Workboard service.
//!
//! Kept free of I/O so the ordering rules can be reused by any client of the
//! board (the HTTP service, CLI tooling, tests).

pub mod kanban;
pub mod types;

pub use kanban::{
    Board, Card, MAX_POSITION, POSITION_STEP, PositionUpdate, ReorderError, position_for_index,
};
pub use types::{MemberRole, TaskStatus};
