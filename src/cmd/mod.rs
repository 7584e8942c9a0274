//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `db`     | `InitDb`         |
//! | `config` | `Config`         |

pub mod config;
pub mod db;
pub mod serve;

pub use config::cmd_config;
pub use db::cmd_init_db;
pub use serve::{ServeOverrides, cmd_serve};
