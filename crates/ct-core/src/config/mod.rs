//! Configuration management for ctlterm

mod client;
pub mod serde_utils;
mod server;

pub use client::ClientConfig;
pub use server::ServerConfig;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ctlterm")
}

/// Default server configuration file path
pub fn default_server_config_path() -> PathBuf {
    default_config_dir().join("server.toml")
}

/// Default client configuration file path
pub fn default_client_config_path() -> PathBuf {
    default_config_dir().join("client.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_save_and_load_server_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("server.toml");

        let mut config = ServerConfig::default();
        config.bind_address = "127.0.0.1:4000".to_string();
        config.reply_timeout = Some(Duration::from_secs(45));
        config.max_connections = Some(8);

        save_config(&path, &config).unwrap();
        let loaded: ServerConfig = load_config(&path).unwrap();

        assert_eq!(loaded.bind_address, "127.0.0.1:4000");
        assert_eq!(loaded.reply_timeout, Some(Duration::from_secs(45)));
        assert_eq!(loaded.max_connections, Some(8));
    }

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let result: Result<ClientConfig, _> = load_config(&path);
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "debug = true\n").unwrap();

        let loaded: ClientConfig = load_config(&path).unwrap();
        assert!(loaded.debug);
        assert_eq!(loaded.server_address, ClientConfig::default().server_address);
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "bind_address = [").unwrap();

        let result: Result<ServerConfig, _> = load_config(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
