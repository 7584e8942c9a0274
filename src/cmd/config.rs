//! Configuration view and validation commands: `workboard config`.

use anyhow::Result;
use std::path::Path;

use workboard::config::WorkboardConfig;

use super::super::ConfigCommands;

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Workboard Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No config file at {} (using defaults)", config_path.display());
            }
            println!();

            let config = WorkboardConfig::resolve(config_path)?;
            println!("Effective values (with env overrides):");
            println!();
            println!("[server]");
            println!("  host = \"{}\"", config.server.host);
            println!("  port = {}", config.server.port);
            println!("  dev_mode = {}", config.server.dev_mode);
            println!();
            println!("[database]");
            println!("  path = \"{}\"", config.database.path.display());
            println!();
            println!("[auth]");
            println!("  session_ttl_hours = {}", config.auth.session_ttl_hours);
            println!("  cookie_name = \"{}\"", config.auth.cookie_name);
            println!();
            println!("[logging]");
            println!("  level = \"{}\"", config.logging.level);
            println!("  json = {}", config.logging.json);
            match &config.logging.directory {
                Some(dir) => println!("  directory = \"{}\"", dir.display()),
                None => println!("  directory = (console only)"),
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No config file found. Using defaults (valid).");
                return Ok(());
            }

            let config = WorkboardConfig::load(config_path)?;
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("Config already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            WorkboardConfig::default().save(config_path)?;

            println!("Created {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, dev_mode");
            println!("  - [database] path");
            println!("  - [auth] session_ttl_hours, cookie_name");
            println!("  - [logging] level, json, directory");
            println!();
        }
    }

    Ok(())
}
