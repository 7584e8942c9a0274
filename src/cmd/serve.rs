//! Board server command: `workboard serve`.

use anyhow::Result;
use std::path::{Path, PathBuf};

use workboard::board::server::{ServerConfig, start_server};
use workboard::config::WorkboardConfig;
use workboard::logging::init_logging;

/// Command-line flags that take precedence over file and environment settings.
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub db_path: Option<PathBuf>,
    pub dev: bool,
}

impl ServeOverrides {
    fn apply(self, config: &mut WorkboardConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(path) = self.db_path {
            config.database.path = path;
        }
        if self.dev {
            config.server.dev_mode = true;
        }
    }
}

pub async fn cmd_serve(config_path: &Path, overrides: ServeOverrides) -> Result<()> {
    let mut config = WorkboardConfig::resolve(config_path)?;
    overrides.apply(&mut config);

    // Held until the server exits so buffered file logs are flushed.
    let _guard = init_logging(&config.logging)?;

    for warning in config.validate() {
        tracing::warn!(%warning, "Configuration warning");
    }

    start_server(ServerConfig::from(&config)).await
}
