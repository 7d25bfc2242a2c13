//! Configuration lookup for `service-queue run`.
//!
//! A configuration is a directory holding `config.json`. The service log is
//! written next to it as `service_queue.log`.

use anyhow::{bail, Context, Result};
use service_queue_broker::BrokerConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory tried when no configuration is named.
pub const DEFAULT_CONFIG_DIR: &str = "default";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const LOG_FILE_NAME: &str = "service_queue.log";

/// A loaded configuration and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: BrokerConfig,
    /// Directory the configuration was read from, `None` for built-in defaults
    pub directory: Option<PathBuf>,
}

impl LoadedConfig {
    /// Default log file location for this configuration.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.directory.as_ref().map(|dir| dir.join(LOG_FILE_NAME))
    }
}

/// Loads `<name>/config.json`.
///
/// A named directory must contain a configuration file. Without a name,
/// `default/config.json` is used if present, otherwise built-in defaults.
pub fn load(name: Option<&str>) -> Result<LoadedConfig> {
    match name {
        Some(name) => load_directory(Path::new(name)),
        None => {
            let directory = Path::new(DEFAULT_CONFIG_DIR);
            if directory.join(CONFIG_FILE_NAME).is_file() {
                load_directory(directory)
            } else {
                debug!("No {} found, using built-in defaults", DEFAULT_CONFIG_DIR);
                Ok(LoadedConfig {
                    config: BrokerConfig::default(),
                    directory: None,
                })
            }
        }
    }
}

fn load_directory(directory: &Path) -> Result<LoadedConfig> {
    let file = directory.join(CONFIG_FILE_NAME);
    if !file.is_file() {
        bail!("Config error: {} not found", file.display());
    }

    let config = BrokerConfig::from_file(&file)
        .with_context(|| format!("Config error in {}", file.display()))?;

    Ok(LoadedConfig {
        config,
        directory: Some(directory.to_path_buf()),
    })
}
