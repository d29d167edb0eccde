//! Config loading and default paths.

use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::error::DaemonError;

/// Load configuration from the given path, or the default location.
pub fn load_config(path: Option<&str>) -> Result<Config, DaemonError> {
    let config_path = match path {
        Some(p) => PathBuf::from(p),
        None => default_config_path(),
    };

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| DaemonError::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| DaemonError::Config(format!("failed to parse config: {e}")))?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else if path.is_some() {
        Err(DaemonError::Config(format!(
            "config file not found: {}",
            config_path.display()
        )))
    } else {
        info!("no config file found, using defaults");
        Ok(Config::default())
    }
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("webshell")
}

/// Get the default config file path.
fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the default command-channel socket path.
pub fn default_command_socket() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("webshell.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[daemon]\nipc_port = 9100\n").unwrap();

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.daemon.ipc_port, 9100);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(matches!(
            load_config(path.to_str()),
            Err(DaemonError::Config(_))
        ));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[daemon\n").unwrap();
        assert!(matches!(
            load_config(path.to_str()),
            Err(DaemonError::Config(_))
        ));
    }

    #[test]
    fn command_socket_has_fixed_name() {
        assert!(default_command_socket().ends_with("webshell.sock"));
    }
}
