//! Service configuration.
//!
//! Settings are layered: `workboard.toml` → `WORKBOARD_*` environment
//! variables (a `.env` file is honoured) → command-line flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! dev_mode = false
//!
//! [database]
//! path = ".workboard/workboard.db"
//!
//! [auth]
//! session_ttl_hours = 720
//! cookie_name = "workboard-session"
//!
//! [logging]
//! level = "info"
//! json = false
//! directory = ".workboard/logs"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "workboard.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a locally served UI
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".workboard/workboard.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    /// Lifetime of a login session
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u32,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

fn default_session_ttl_hours() -> u32 {
    24 * 30
}

fn default_cookie_name() -> String {
    "workboard-session".to_string()
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
            cookie_name: default_cookie_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines on the console instead of the human format
    #[serde(default)]
    pub json: bool,
    /// When set, JSON logs are also written to daily-rotated files here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

/// Top-level `workboard.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkboardConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl WorkboardConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse workboard.toml")
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Load the file, then apply `.env` and `WORKBOARD_*` overrides.
    pub fn resolve(path: &Path) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::load_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("WORKBOARD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("WORKBOARD_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid WORKBOARD_PORT '{}'", port))?;
        }
        if let Some(dev) = lookup("WORKBOARD_DEV_MODE") {
            self.server.dev_mode = matches!(dev.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(path) = lookup("WORKBOARD_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(ttl) = lookup("WORKBOARD_SESSION_TTL_HOURS") {
            self.auth.session_ttl_hours = ttl
                .parse()
                .with_context(|| format!("Invalid WORKBOARD_SESSION_TTL_HOURS '{}'", ttl))?;
        }
        if let Some(level) = lookup("WORKBOARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(dir) = lookup("WORKBOARD_LOG_DIR") {
            self.logging.directory = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Human-readable problems with the current settings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.server.port == 0 {
            warnings.push("server.port is 0; an ephemeral port will be chosen".to_string());
        }
        if self.auth.session_ttl_hours == 0 {
            warnings.push("auth.session_ttl_hours is 0; sessions expire immediately".to_string());
        }
        if self.auth.cookie_name.trim().is_empty()
            || self
                .auth
                .cookie_name
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, ';' | ',' | '='))
        {
            warnings.push(format!(
                "auth.cookie_name '{}' is not a valid cookie name",
                self.auth.cookie_name
            ));
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            warnings.push(format!(
                "logging.level '{}' is not a valid filter directive",
                self.logging.level
            ));
        }
        if self.server.dev_mode && self.server.host != "127.0.0.1" && self.server.host != "localhost"
        {
            warnings.push(format!(
                "dev_mode enables permissive CORS while listening on {}",
                self.server.host
            ));
        }
        warnings
    }
}
