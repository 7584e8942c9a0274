//! Database setup command: `workboard init-db`.

use anyhow::Result;
use std::path::{Path, PathBuf};

use workboard::board::server::open_database;
use workboard::config::WorkboardConfig;

pub fn cmd_init_db(config_path: &Path, db_path: Option<PathBuf>) -> Result<()> {
    let config = WorkboardConfig::resolve(config_path)?;
    let db_path = db_path.unwrap_or(config.database.path);

    let db = open_database(&db_path)?;
    let purged = db.purge_expired_sessions(chrono::Utc::now().naive_utc())?;

    println!("Workboard database initialized at {}", db_path.display());
    if purged > 0 {
        println!("Removed {} expired session(s)", purged);
    }
    Ok(())
}
