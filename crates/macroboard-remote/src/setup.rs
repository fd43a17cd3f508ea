//! Config loading and host identity.

use std::path::PathBuf;

use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::RemoteError;

/// Load configuration from the given path, or the default location.
pub fn load_config(path: Option<&str>) -> Result<Config, RemoteError> {
    let config_path = match path {
        Some(p) => PathBuf::from(p),
        None => default_config_path(),
    };

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| RemoteError::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| RemoteError::Config(format!("failed to parse config: {e}")))?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        info!("no config file found, using defaults");
        Ok(Config::default())
    }
}

/// The configured serial number, or a freshly generated one when empty.
pub fn serial_number_or_generate(configured: &str) -> String {
    if configured.trim().is_empty() {
        let serial = Uuid::new_v4().simple().to_string();
        info!(serial = %serial, "generated serial number");
        serial
    } else {
        configured.to_string()
    }
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("macroboard")
}

/// Get the default config file path.
fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}
