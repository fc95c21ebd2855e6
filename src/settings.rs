//! Persisted preferences
//!
//! Three keys survive restarts: the last used tunnel, the set of tunnels that
//! were running at the last save, and whether that set should be brought back
//! up at boot. Writes go straight through; concurrent writers are
//! last-write-wins.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::error::TunnelResult;

pub const KEY_LAST_USED_TUNNEL: &str = "last_used_tunnel";
pub const KEY_RESTORE_ON_BOOT: &str = "restore_on_boot";
pub const KEY_RUNNING_TUNNELS: &str = "enabled_configs";

/// Preference storage consumed by the tunnel manager
pub trait Settings: Send + Sync {
    fn last_used_tunnel(&self) -> Option<String>;

    /// Store or clear (`None`) the last used tunnel name
    fn set_last_used_tunnel(&self, name: Option<&str>) -> TunnelResult<()>;

    fn restore_on_boot(&self) -> bool;

    fn set_restore_on_boot(&self, enabled: bool) -> TunnelResult<()>;

    /// Names running at the last save, or `None` if never saved
    fn running_tunnels(&self) -> Option<BTreeSet<String>>;

    fn set_running_tunnels(&self, names: &BTreeSet<String>) -> TunnelResult<()>;
}

/// On-disk shape of the settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_tunnel: Option<String>,
    #[serde(default)]
    pub restore_on_boot: bool,
    #[serde(default, rename = "enabled_configs", skip_serializing_if = "Option::is_none")]
    pub running_tunnels: Option<BTreeSet<String>>,
}

fn lock(data: &Mutex<SettingsData>) -> MutexGuard<'_, SettingsData> {
    data.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Settings persisted as a TOML file
pub struct FileSettings {
    path: PathBuf,
    data: Mutex<SettingsData>,
}

impl FileSettings {
    /// Open the settings file, starting empty if it does not exist yet
    pub fn open<P: AsRef<Path>>(path: P) -> TunnelResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            SettingsData::default()
        };
        debug!("Loaded settings from {}", path.display());
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the changed data, keeping it only once it is on disk
    fn update(&self, apply: impl FnOnce(&mut SettingsData)) -> TunnelResult<()> {
        let mut data = lock(&self.data);
        let mut changed = data.clone();
        apply(&mut changed);
        let content = toml::to_string_pretty(&changed)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        *data = changed;
        Ok(())
    }
}

impl Settings for FileSettings {
    fn last_used_tunnel(&self) -> Option<String> {
        lock(&self.data).last_used_tunnel.clone()
    }

    fn set_last_used_tunnel(&self, name: Option<&str>) -> TunnelResult<()> {
        self.update(|data| data.last_used_tunnel = name.map(str::to_string))
    }

    fn restore_on_boot(&self) -> bool {
        lock(&self.data).restore_on_boot
    }

    fn set_restore_on_boot(&self, enabled: bool) -> TunnelResult<()> {
        self.update(|data| data.restore_on_boot = enabled)
    }

    fn running_tunnels(&self) -> Option<BTreeSet<String>> {
        lock(&self.data).running_tunnels.clone()
    }

    fn set_running_tunnels(&self, names: &BTreeSet<String>) -> TunnelResult<()> {
        self.update(|data| data.running_tunnels = Some(names.clone()))
    }
}

/// In-process settings, for embedding and tests
#[derive(Default)]
pub struct MemorySettings {
    data: Mutex<SettingsData>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: SettingsData) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }

    pub fn snapshot(&self) -> SettingsData {
        lock(&self.data).clone()
    }
}

impl Settings for MemorySettings {
    fn last_used_tunnel(&self) -> Option<String> {
        lock(&self.data).last_used_tunnel.clone()
    }

    fn set_last_used_tunnel(&self, name: Option<&str>) -> TunnelResult<()> {
        lock(&self.data).last_used_tunnel = name.map(str::to_string);
        Ok(())
    }

    fn restore_on_boot(&self) -> bool {
        lock(&self.data).restore_on_boot
    }

    fn set_restore_on_boot(&self, enabled: bool) -> TunnelResult<()> {
        lock(&self.data).restore_on_boot = enabled;
        Ok(())
    }

    fn running_tunnels(&self) -> Option<BTreeSet<String>> {
        lock(&self.data).running_tunnels.clone()
    }

    fn set_running_tunnels(&self, names: &BTreeSet<String>) -> TunnelResult<()> {
        lock(&self.data).running_tunnels = Some(names.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_settings_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let settings = FileSettings::open(&path).unwrap();
        assert_eq!(settings.last_used_tunnel(), None);
        assert_eq!(settings.running_tunnels(), None);
        assert!(!settings.restore_on_boot());

        settings.set_last_used_tunnel(Some("home")).unwrap();
        settings.set_restore_on_boot(true).unwrap();
        let running: BTreeSet<String> = ["a", "c"].iter().map(|s| s.to_string()).collect();
        settings.set_running_tunnels(&running).unwrap();

        let reopened = FileSettings::open(&path).unwrap();
        assert_eq!(reopened.last_used_tunnel().as_deref(), Some("home"));
        assert!(reopened.restore_on_boot());
        assert_eq!(reopened.running_tunnels(), Some(running));
    }

    #[test]
    fn test_file_uses_preference_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        let settings = FileSettings::open(&path).unwrap();
        settings.set_last_used_tunnel(Some("wg0")).unwrap();
        settings.set_running_tunnels(&BTreeSet::new()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(KEY_LAST_USED_TUNNEL));
        assert!(content.contains(KEY_RUNNING_TUNNELS));
        assert!(content.contains(KEY_RESTORE_ON_BOOT));
    }

    #[test]
    fn test_failed_write_keeps_previous_value() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let settings = FileSettings::open(blocker.join("settings.toml")).unwrap();

        assert!(settings.set_last_used_tunnel(Some("wg0")).is_err());
        assert_eq!(settings.last_used_tunnel(), None);
        assert!(settings.set_restore_on_boot(true).is_err());
        assert!(!settings.restore_on_boot());
    }

    #[test]
    fn test_clearing_last_used() {
        let settings = MemorySettings::new();
        settings.set_last_used_tunnel(Some("x")).unwrap();
        settings.set_last_used_tunnel(None).unwrap();
        assert_eq!(settings.last_used_tunnel(), None);
    }

    #[test]
    fn test_corrupt_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "restore_on_boot = \"maybe\"").unwrap();
        assert!(FileSettings::open(&path).is_err());
    }
}
