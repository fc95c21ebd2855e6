//! Durable storage of tunnel configs

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::config::Config;
use crate::error::TunnelResult;

pub mod file;
pub mod memory;

pub use file::FileConfigStore;
pub use memory::MemoryConfigStore;

/// Capability to persist one config per tunnel name
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Names of every stored config
    async fn enumerate(&self) -> TunnelResult<BTreeSet<String>>;

    /// Store a config under a new name; fails if the name is taken
    async fn create(&self, name: &str, config: &Config) -> TunnelResult<Config>;

    async fn load(&self, name: &str) -> TunnelResult<Config>;

    /// Overwrite the config stored under an existing name
    async fn save(&self, name: &str, config: &Config) -> TunnelResult<Config>;

    async fn delete(&self, name: &str) -> TunnelResult<()>;

    /// Move a stored config; fails if `replacement` is taken
    async fn rename(&self, name: &str, replacement: &str) -> TunnelResult<()>;
}
