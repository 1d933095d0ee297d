//! Configuration file support for sleepon.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (SLEEPON_*)
//! 3. Local config file (./sleepon.toml)
//! 4. Global config file (~/.config/sleepon/config.toml)

use directories::ProjectDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the local configuration file.
pub const LOCAL_CONFIG_FILE: &str = "sleepon.toml";

/// Wristband selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Bluetooth address of the wristband (e.g., "DE:7A:47:65:08:1F").
    pub address: Option<String>,
}

/// Connection tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Delay between connection attempts, in milliseconds.
    pub retry_delay_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device configuration.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "sleepon").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.device.address.is_some() {
            self.device.address = other.device.address;
        }
        if other.connection.retry_delay_ms.is_some() {
            self.connection.retry_delay_ms = other.connection.retry_delay_ms;
        }
    }

    /// Configured retry delay, if any.
    pub fn retry_delay(&self) -> Option<Duration> {
        self.connection.retry_delay_ms.map(Duration::from_millis)
    }

    /// Remember `address` as the default wristband.
    ///
    /// Writes to `./sleepon.toml` if it exists, otherwise to the global
    /// config file. Returns the path written.
    pub fn remember_address(&mut self, address: &str) -> anyhow::Result<PathBuf> {
        let path = if Path::new(LOCAL_CONFIG_FILE).exists() {
            PathBuf::from(LOCAL_CONFIG_FILE)
        } else if let Some(global_dir) = Self::global_config_dir() {
            fs::create_dir_all(&global_dir)?;
            global_dir.join("config.toml")
        } else {
            PathBuf::from(LOCAL_CONFIG_FILE)
        };

        self.save_address_to(&path, address)?;
        Ok(path)
    }

    /// Store `address` in the config file at `path`, keeping its other settings.
    fn save_address_to(&mut self, path: &Path, address: &str) -> anyhow::Result<()> {
        let mut on_disk = Self::load_from_file(path).unwrap_or_default();
        on_disk.device.address = Some(address.to_string());
        self.device.address = Some(address.to_string());

        let content = toml::to_string_pretty(&on_disk)?;
        fs::write(path, content)?;
        info!("Saved device address to {}", path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Default values ----

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.device.address.is_none());
        assert!(config.connection.retry_delay_ms.is_none());
        assert!(config.retry_delay().is_none());
    }

    // ---- Config merge ----

    #[test]
    fn test_config_merge_address() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.device.address = Some("DE:7A:47:65:08:1F".to_string());

        base.merge(other);

        assert_eq!(base.device.address.as_deref(), Some("DE:7A:47:65:08:1F"));
    }

    #[test]
    fn test_config_merge_retry_delay() {
        let mut base = Config::default();
        base.connection.retry_delay_ms = Some(100);

        let mut other = Config::default();
        other.connection.retry_delay_ms = Some(250);

        base.merge(other);
        assert_eq!(base.retry_delay(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.device.address = Some("DE:7A:47:65:08:1F".to_string());
        base.connection.retry_delay_ms = Some(100);

        let other = Config::default(); // all None
        base.merge(other);

        assert_eq!(base.device.address.as_deref(), Some("DE:7A:47:65:08:1F"));
        assert_eq!(base.connection.retry_delay_ms, Some(100));
    }

    // ---- TOML serialization/deserialization ----

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[device]
address = "DE:7A:47:65:08:1F"

[connection]
retry_delay_ms = 500
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.device.address.as_deref(), Some("DE:7A:47:65:08:1F"));
        assert_eq!(config.retry_delay(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.device.address.is_none());
        assert!(config.connection.retry_delay_ms.is_none());
    }

    #[test]
    fn test_config_from_partial_toml() {
        let toml_str = r#"
[connection]
retry_delay_ms = 50
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.device.address.is_none());
        assert_eq!(config.connection.retry_delay_ms, Some(50));
    }

    // ---- load_from_path with tempfile ----

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_config.toml");
        fs::write(
            &path,
            r#"
[device]
address = "AA:BB:CC:DD:EE:FF"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.device.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_load_from_path_invalid_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "invalid toml [[[").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.device.address.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        // Should return default
        assert!(config.device.address.is_none());
    }

    #[test]
    fn test_save_address_keeps_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCAL_CONFIG_FILE);
        fs::write(&path, "[connection]\nretry_delay_ms = 300\n").unwrap();

        let mut config = Config::default();
        config
            .save_address_to(&path, "DE:7A:47:65:08:1F")
            .unwrap();
        assert_eq!(config.device.address.as_deref(), Some("DE:7A:47:65:08:1F"));

        let saved = Config::load_from_path(&path);
        assert_eq!(saved.device.address.as_deref(), Some("DE:7A:47:65:08:1F"));
        assert_eq!(saved.connection.retry_delay_ms, Some(300));
    }

    // ---- global_config_path ----

    #[test]
    fn test_global_config_path_is_some() {
        // On most systems this should return Some
        let path = Config::global_config_path();
        if let Some(p) = path {
            assert!(p.to_str().unwrap().contains("sleepon"));
            assert!(p.to_str().unwrap().ends_with("config.toml"));
        }
    }
}
