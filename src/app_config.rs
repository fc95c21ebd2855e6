//! Configuration management for wgtunnel

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{TunnelError, TunnelResult};

/// Where the CLI looks for its configuration unless told otherwise
pub const DEFAULT_CONFIG_PATH: &str = "/etc/wgtunnel/wgtunnel.toml";

/// Main wgtunnel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Configuration file paths
    #[serde(default)]
    pub paths: ConfigPaths,
    /// Worker pool settings
    #[serde(default)]
    pub worker: WorkerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigPaths {
    /// Directory holding one `<name>.conf` per tunnel
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Persisted preferences (last used tunnel, running set, restore flag)
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
    /// Scratch directory for configs handed to wg-quick
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Maximum number of backend/storage calls in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/wgtunnel/tunnels")
}

fn default_settings_file() -> PathBuf {
    PathBuf::from("/var/lib/wgtunnel/settings.toml")
}

fn default_runtime_dir() -> PathBuf {
    PathBuf::from("/run/wgtunnel")
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            settings_file: default_settings_file(),
            runtime_dir: default_runtime_dir(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: ConfigPaths::default(),
            worker: WorkerSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> TunnelResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| TunnelError::Config(format!("Failed to read config: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TunnelError::Config(format!("Failed to parse config: {}", e)))?;

        if config.worker.max_concurrency == 0 {
            return Err(TunnelError::Config("worker.max_concurrency must be at least 1".to_string()));
        }
        Ok(config)
    }

    /// Load configuration from file, or fall back to defaults if it does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> TunnelResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> TunnelResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TunnelError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| TunnelError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Ensure all directories exist
    pub fn ensure_directories(&self) -> TunnelResult<()> {
        let settings_dir = self.paths.settings_file.parent().unwrap_or_else(|| Path::new("."));
        for dir in [&self.paths.config_dir, &self.paths.runtime_dir, &settings_dir.to_path_buf()] {
            std::fs::create_dir_all(dir)
                .map_err(|e| TunnelError::Config(format!("Failed to create directory {:?}: {}", dir, e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "[paths]\nconfig_dir = \"/tmp/tunnels\"\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.paths.config_dir, PathBuf::from("/tmp/tunnels"));
        assert_eq!(config.paths.runtime_dir, default_runtime_dir());
        assert_eq!(config.worker.max_concurrency, 4);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.toml");
        let mut config = AppConfig::default();
        config.worker.max_concurrency = 8;
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "[worker]\nmax_concurrency = 0\n").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(TunnelError::Config(_))));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_ensure_directories() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.paths.config_dir = dir.path().join("tunnels");
        config.paths.runtime_dir = dir.path().join("run");
        config.paths.settings_file = dir.path().join("state").join("settings.toml");
        config.ensure_directories().unwrap();
        assert!(config.paths.config_dir.is_dir());
        assert!(config.paths.runtime_dir.is_dir());
        assert!(dir.path().join("state").is_dir());
    }
}
