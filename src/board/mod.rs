//! Collaborative task board: workspaces, members, projects and tasks.
//!
//! `db` owns persistence, `api` exposes it over HTTP, `ws` pushes change
//! events to connected clients and `server` wires everything into one router.

pub mod analytics;
pub mod api;
pub mod auth;
pub mod db;
pub mod models;
pub mod server;
pub mod ws;
